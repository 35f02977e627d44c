use serde::{Deserialize, Serialize};

/// Page-number pagination shared by every listing query. Implementors only
/// expose the raw query parameters.
pub trait Paged {
    const DEFAULT_PER_PAGE: u32 = 10;
    const MAX_PER_PAGE: u32 = 100;

    fn requested_page(&self) -> Option<u32>;
    fn requested_per_page(&self) -> Option<u32>;

    fn page(&self) -> u32 {
        self.requested_page().unwrap_or(1).max(1)
    }

    fn per_page(&self) -> u32 {
        self.requested_per_page().unwrap_or(Self::DEFAULT_PER_PAGE).clamp(1, Self::MAX_PER_PAGE)
    }

    fn offset(&self) -> u32 {
        (self.page() - 1).saturating_mul(self.per_page())
    }
}

/// Trimmed search text, or `None` when blank.
pub fn search_term(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|term| !term.is_empty())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, page: u32, per_page: u32) -> Self {
        let total_pages = total.div_ceil(u64::from(per_page.max(1)));
        Self { items, total, page, per_page, total_pages }
    }

    /// Page sized and numbered after `query`.
    pub fn for_query(items: Vec<T>, total: u64, query: &impl Paged) -> Self {
        Self::new(items, total, query.page(), query.per_page())
    }
}
