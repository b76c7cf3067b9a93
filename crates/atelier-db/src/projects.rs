use atelier_common::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, params, params_from_iter};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::pool::Database;
use crate::timestamps;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    /// Opaque workspace content, stored as a JSON document.
    pub code_content: Option<serde_json::Value>,
    pub preview_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub code_content: Option<serde_json::Value>,
    pub preview_url: Option<String>,
}

/// Partial update for a project. Only set fields are written; an empty
/// changeset degenerates to a plain ownership-scoped fetch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub code_content: Option<serde_json::Value>,
    pub preview_url: Option<String>,
}

impl ProjectChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.code_content.is_none()
            && self.preview_url.is_none()
    }
}

pub struct ProjectStore {
    db: Database,
}

impl ProjectStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create_project(&self, user_id: &str, project: NewProject) -> Result<Project> {
        if project.name.trim().is_empty() {
            return Err(Error::Validation("project name cannot be empty".into()));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let code_content = project
            .code_content
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.db.conn()?;
        conn.execute(
            "INSERT INTO projects (id, user_id, name, description, code_content, preview_url, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                id,
                user_id,
                project.name,
                project.description,
                code_content,
                project.preview_url,
                now,
                now
            ],
        )
        .map_err(|e| Error::Database(format!("failed to insert project: {e}")))?;
        drop(conn);

        self.get_project_by_id(&id, user_id)
            .await?
            .ok_or_else(|| Error::Database("inserted project row not found".into()))
    }

    /// Ownership-scoped fetch: a project owned by someone else looks
    /// exactly like a missing one.
    pub async fn get_project_by_id(&self, project_id: &str, user_id: &str) -> Result<Option<Project>> {
        let conn = self.db.conn()?;
        conn.query_row(
            "SELECT id, user_id, name, description, code_content, preview_url, created_at, updated_at
             FROM projects WHERE id = ? AND user_id = ?",
            params![project_id, user_id],
            row_to_project,
        )
        .optional()
        .map_err(|e| Error::Database(format!("failed to fetch project: {e}")))
    }

    /// Most recently touched first; id breaks ties so repeated reads
    /// without intervening writes return identical ordering.
    pub async fn get_projects_by_user_id(&self, user_id: &str) -> Result<Vec<Project>> {
        let conn = self.db.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, name, description, code_content, preview_url, created_at, updated_at
                 FROM projects WHERE user_id = ?
                 ORDER BY updated_at DESC, id",
            )
            .map_err(|e| Error::Database(format!("failed to prepare project list: {e}")))?;

        let rows = stmt
            .query_map(params![user_id], row_to_project)
            .map_err(|e| Error::Database(format!("failed to list projects: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect project rows: {e}")))
    }

    /// Apply a changeset. The column list is fixed at compile time; only
    /// parameter values vary per call.
    pub async fn update_project(
        &self,
        project_id: &str,
        user_id: &str,
        changes: ProjectChanges,
    ) -> Result<Option<Project>> {
        if changes.is_empty() {
            return self.get_project_by_id(project_id, user_id).await;
        }
        if let Some(name) = &changes.name
            && name.trim().is_empty()
        {
            return Err(Error::Validation("project name cannot be empty".into()));
        }

        let mut sets: Vec<&'static str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(name) = changes.name {
            sets.push("name = ?");
            values.push(Value::Text(name));
        }
        if let Some(description) = changes.description {
            sets.push("description = ?");
            values.push(Value::Text(description));
        }
        if let Some(code_content) = changes.code_content {
            sets.push("code_content = ?");
            values.push(Value::Text(serde_json::to_string(&code_content)?));
        }
        if let Some(preview_url) = changes.preview_url {
            sets.push("preview_url = ?");
            values.push(Value::Text(preview_url));
        }
        sets.push("updated_at = ?");
        values.push(Value::Text(Utc::now().to_rfc3339()));

        values.push(Value::Text(project_id.to_string()));
        values.push(Value::Text(user_id.to_string()));

        let sql = format!(
            "UPDATE projects SET {} WHERE id = ? AND user_id = ?",
            sets.join(", ")
        );

        let conn = self.db.conn()?;
        let updated = conn
            .execute(&sql, params_from_iter(values))
            .map_err(|e| Error::Database(format!("failed to update project: {e}")))?;
        drop(conn);

        if updated == 0 {
            return Ok(None);
        }
        self.get_project_by_id(project_id, user_id).await
    }

    /// `Ok(true)` when a row was deleted, `Ok(false)` when nothing under
    /// that owner matched, `Err` only for infrastructure failure.
    pub async fn delete_project(&self, project_id: &str, user_id: &str) -> Result<bool> {
        let conn = self.db.conn()?;
        let deleted = conn
            .execute(
                "DELETE FROM projects WHERE id = ? AND user_id = ?",
                params![project_id, user_id],
            )
            .map_err(|e| Error::Database(format!("failed to delete project: {e}")))?;

        if deleted > 0 {
            info!("deleted project {project_id} for user {user_id}");
        }
        Ok(deleted > 0)
    }
}

fn row_to_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    let code_content_str: Option<String> = row.get(4)?;
    let code_content = code_content_str
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .unwrap_or(None);

    let created_at_str: String = row.get(6)?;
    let updated_at_str: String = row.get(7)?;

    Ok(Project {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        code_content,
        preview_url: row.get(5)?,
        created_at: timestamps::parse(&created_at_str).map_err(timestamps::conversion_err)?,
        updated_at: timestamps::parse(&updated_at_str).map_err(timestamps::conversion_err)?,
    })
}
