use async_trait::async_trait;

use deptflow_core::domain::department::DepartmentId;
use deptflow_core::domain::policy::Policy;
use deptflow_core::store::{PolicyStore, StoreError};

use super::{decode_column, RepositoryError};
use crate::DbPool;

pub struct SqlPolicyStore {
    pool: DbPool,
}

impl SqlPolicyStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Active policy with the given name owned by `department`.
    pub async fn find_active(
        &self,
        name: &str,
        department: &DepartmentId,
    ) -> Result<Option<Policy>, RepositoryError> {
        let row = sqlx::query(
            "SELECT name, description, version, rules_json
             FROM policies
             WHERE name = ?1 AND department = ?2 AND status = 'active'",
        )
        .bind(name)
        .bind(department.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_policy).transpose()
    }
}

fn row_to_policy(row: &sqlx::sqlite::SqliteRow) -> Result<Policy, RepositoryError> {
    let name: String = decode_column(row, "name")?;
    let rules_json: String = decode_column(row, "rules_json")?;
    let version: i64 = decode_column(row, "version")?;

    let rules = serde_json::from_str(&rules_json)
        .map_err(|error| RepositoryError::Decode(format!("policy `{name}` rules: {error}")))?;
    let version = u32::try_from(version)
        .map_err(|_| RepositoryError::Decode(format!("policy `{name}` version {version}")))?;

    Ok(Policy::new(name, decode_column::<String>(row, "description")?, rules).with_version(version))
}

#[async_trait]
impl PolicyStore for SqlPolicyStore {
    async fn get_policy_by_name(
        &self,
        name: &str,
        department: &DepartmentId,
    ) -> Result<Option<Policy>, StoreError> {
        Ok(self.find_active(name, department).await?)
    }
}
