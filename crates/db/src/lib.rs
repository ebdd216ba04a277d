pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect_config, connect_with_settings, DbPool};
pub use fixtures::{CampusSeedDataset, SeedResult, VerificationResult};
pub use repositories::{
    InMemoryCampusDirectory, RepositoryError, SqlPolicyStore, SqlStudentDirectory,
    SqlWorkflowStore,
};
