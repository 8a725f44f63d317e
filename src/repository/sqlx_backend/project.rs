use async_trait::async_trait;
use sqlx::Row;

use crate::error::{classify_db_error, GatewayError};
use crate::model::{EpochMillis, Project};
use crate::repository::ProjectRepository;

use super::PgBackend;

fn row_to_project(row: &sqlx::postgres::PgRow) -> Result<Project, GatewayError> {
    Ok(Project {
        id: row.try_get("id").map_err(classify_db_error)?,
        name: row.try_get("name").map_err(classify_db_error)?,
        user_id: row.try_get("user_id").map_err(classify_db_error)?,
        description: row.try_get("description").map_err(classify_db_error)?,
        system_prompt: row.try_get("system_prompt").map_err(classify_db_error)?,
        default_agent_id: row.try_get("default_agent_id").map_err(classify_db_error)?,
        created_at: EpochMillis(row.try_get("created_at").map_err(classify_db_error)?),
        updated_at: row
            .try_get::<Option<i64>, _>("updated_at")
            .map_err(classify_db_error)?
            .map(EpochMillis),
        deleted_at: row
            .try_get::<Option<i64>, _>("deleted_at")
            .map_err(classify_db_error)?
            .map(EpochMillis),
    })
}

#[async_trait]
impl ProjectRepository for PgBackend {
    async fn create(&self, project: Project) -> Result<Project, GatewayError> {
        sqlx::query(
            "INSERT INTO projects (id, name, user_id, description, system_prompt, \
             default_agent_id, created_at, updated_at, deleted_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
        )
        .bind(&project.id)
        .bind(&project.name)
        .bind(&project.user_id)
        .bind(&project.description)
        .bind(&project.system_prompt)
        .bind(&project.default_agent_id)
        .bind(project.created_at.0)
        .bind(project.updated_at.map(|t| t.0))
        .bind(project.deleted_at.map(|t| t.0))
        .execute(&self.pool)
        .await
        .map_err(classify_db_error)?;
        Ok(project)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Project>, GatewayError> {
        let row = sqlx::query("SELECT * FROM projects WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify_db_error)?;
        row.as_ref().map(row_to_project).transpose()
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Project>, GatewayError> {
        let rows = sqlx::query("SELECT * FROM projects WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(classify_db_error)?;
        rows.iter().map(row_to_project).collect()
    }

    async fn find_by_user(&self, user_id: &str) -> Result<Vec<Project>, GatewayError> {
        let rows = sqlx::query("SELECT * FROM projects WHERE user_id = $1 AND deleted_at IS NULL")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(classify_db_error)?;
        rows.iter().map(row_to_project).collect()
    }

    async fn soft_delete(&self, id: &str) -> Result<bool, GatewayError> {
        let now = EpochMillis::now();
        let result = sqlx::query(
            "UPDATE projects SET deleted_at = $1 WHERE id = $2 AND deleted_at IS NULL",
        )
        .bind(now.0)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(classify_db_error)?;
        if result.rows_affected() == 0 {
            let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM projects WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(classify_db_error)?;
            if exists.is_none() {
                return Err(GatewayError::NotFound(format!("project {id}")));
            }
            return Ok(false);
        }
        Ok(true)
    }
}
