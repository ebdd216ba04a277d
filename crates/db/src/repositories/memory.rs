use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use deptflow_core::domain::department::DepartmentId;
use deptflow_core::domain::policy::Policy;
use deptflow_core::domain::student::InternshipStudentRecord;
use deptflow_core::store::{PolicyStore, StoreError, StudentDirectory};

use crate::fixtures::{seed_interns, seed_swap_policy, swap_policy_department};

/// Student directory and policy store held in memory, for runs without a database.
#[derive(Default)]
pub struct InMemoryCampusDirectory {
    interns: RwLock<Vec<InternshipStudentRecord>>,
    policies: RwLock<HashMap<(String, DepartmentId), Policy>>,
}

impl InMemoryCampusDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory preloaded with the campus seed dataset.
    pub fn seeded() -> Self {
        let mut policies = HashMap::new();
        let policy = seed_swap_policy();
        policies.insert(
            (policy.name.clone(), DepartmentId::from(swap_policy_department())),
            policy,
        );
        Self { interns: RwLock::new(seed_interns()), policies: RwLock::new(policies) }
    }

    pub async fn add_intern(&self, intern: InternshipStudentRecord) {
        let mut interns = self.interns.write().await;
        interns.retain(|existing| existing.id != intern.id);
        interns.push(intern);
        interns.sort_by(|left, right| left.id.cmp(&right.id));
    }

    pub async fn put_policy(&self, department: DepartmentId, policy: Policy) {
        self.policies.write().await.insert((policy.name.clone(), department), policy);
    }

    pub async fn remove_policy(&self, name: &str, department: &DepartmentId) -> Option<Policy> {
        self.policies.write().await.remove(&(name.to_string(), department.clone()))
    }
}

#[async_trait]
impl StudentDirectory for InMemoryCampusDirectory {
    async fn internship_students(&self) -> Result<Vec<InternshipStudentRecord>, StoreError> {
        Ok(self.interns.read().await.clone())
    }
}

#[async_trait]
impl PolicyStore for InMemoryCampusDirectory {
    async fn get_policy_by_name(
        &self,
        name: &str,
        department: &DepartmentId,
    ) -> Result<Option<Policy>, StoreError> {
        let policies = self.policies.read().await;
        Ok(policies.get(&(name.to_string(), department.clone())).cloned())
    }
}
