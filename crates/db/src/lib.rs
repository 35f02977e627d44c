pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;
pub mod workflow;

pub use connection::{connect, connect_with_settings, DbPool};
pub use fixtures::{DemoSeedDataset, DemoUser, SeedResult, VerificationResult};
pub use workflow::{
    ApprovalWorkflow, CatalogService, CustomizationWorkflow, InventoryService, ManpowerService,
    ProvisioningWorkflow, RequestWorkflow, Workflows,
};
