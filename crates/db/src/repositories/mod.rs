use thiserror::Error;

use deptflow_core::store::StoreError;

pub mod memory;
pub mod policy;
pub mod student;
pub mod workflow;

pub use memory::InMemoryCampusDirectory;
pub use policy::SqlPolicyStore;
pub use student::SqlStudentDirectory;
pub use workflow::SqlWorkflowStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(source) => StoreError::Backend(source.to_string()),
            RepositoryError::Decode(reason) => StoreError::Decode(reason),
        }
    }
}

pub(crate) fn decode_column<'r, T>(
    row: &'r sqlx::sqlite::SqliteRow,
    column: &str,
) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    use sqlx::Row;
    row.try_get(column).map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}
