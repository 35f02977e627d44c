/// Implements `as_str` and a strict, case-insensitive `FromStr` for enums
/// persisted as SCREAMING_SNAKE_CASE text.
macro_rules! persisted_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::errors::DomainError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value.trim().to_ascii_uppercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(crate::errors::DomainError::UnknownVariant {
                        kind: $kind,
                        value: value.to_string(),
                    }),
                }
            }
        }
    };
}

pub(crate) use persisted_enum;

pub mod approval;
pub mod asset;
pub mod customization;
pub mod license;
pub mod manpower;
pub mod page;
pub mod physical_server;
pub mod request;
pub mod user;
pub mod vm;
