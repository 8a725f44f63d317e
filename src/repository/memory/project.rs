use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::model::{EpochMillis, Project};
use crate::repository::ProjectRepository;

#[derive(Default)]
pub struct InMemoryProjectRepository {
    rows: Mutex<HashMap<String, Project>>,
}

impl InMemoryProjectRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectRepository for InMemoryProjectRepository {
    async fn create(&self, project: Project) -> Result<Project, GatewayError> {
        self.rows.lock().unwrap().insert(project.id.clone(), project.clone());
        Ok(project)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Project>, GatewayError> {
        Ok(self.rows.lock().unwrap().get(id).cloned())
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Project>, GatewayError> {
        let rows = self.rows.lock().unwrap();
        Ok(ids.iter().filter_map(|id| rows.get(id).cloned()).collect())
    }

    async fn find_by_user(&self, user_id: &str) -> Result<Vec<Project>, GatewayError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.user_id == user_id && !p.is_deleted())
            .cloned()
            .collect())
    }

    async fn soft_delete(&self, id: &str) -> Result<bool, GatewayError> {
        let mut rows = self.rows.lock().unwrap();
        let project = rows
            .get_mut(id)
            .ok_or_else(|| GatewayError::NotFound(format!("project {id}")))?;
        if project.is_deleted() {
            return Ok(false);
        }
        project.deleted_at = Some(EpochMillis::now());
        Ok(true)
    }
}
