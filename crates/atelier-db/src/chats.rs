use atelier_common::{Error, MessageRole, NewMessage, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::embedding;
use crate::pool::Database;
use crate::timestamps;

/// Conversation row. Messages live in their own table, ordered by `seq`.
#[derive(Debug, Clone, Serialize)]
pub struct Chat {
    pub id: String,
    pub user_id: String,
    pub project_id: Option<String>,
    pub description: Option<String>,
    pub metadata: serde_json::Value,
    /// Conversation-level embedding used for similarity ranking.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub id: String,
    pub chat_id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub seq: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatWithMessages {
    #[serde(flatten)]
    pub chat: Chat,
    pub messages: Vec<ChatMessage>,
}

/// Point-in-time workspace state attached to a chat. Kept as an ordered
/// history; "latest" is the highest `(created_at, id)`.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub id: String,
    pub chat_id: String,
    pub snapshot_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

pub struct ChatStore {
    db: Database,
}

impl ChatStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a chat under a project the caller owns. Fails closed on an
    /// ownership miss: logs a warning and returns `None` instead of erring.
    pub async fn create_chat(
        &self,
        user_id: &str,
        project_id: &str,
        initial_messages: &[NewMessage],
    ) -> Result<Option<String>> {
        validate_messages(initial_messages)?;

        let mut conn = self.db.conn()?;
        let tx = begin(&mut conn)?;

        if !owned_project(&tx, project_id, user_id)? {
            warn!("create_chat: project {project_id} is not owned by user {user_id}");
            return Ok(None);
        }

        let now = Utc::now().to_rfc3339();
        let chat_id = insert_chat(
            &tx,
            user_id,
            Some(project_id),
            None,
            &serde_json::json!({}),
            &now,
        )?;
        for (i, message) in initial_messages.iter().enumerate() {
            insert_message(&tx, &chat_id, message, i as i64, &now)?;
        }

        commit(tx)?;
        Ok(Some(chat_id))
    }

    pub async fn get_chat_by_id(
        &self,
        chat_id: &str,
        user_id: &str,
    ) -> Result<Option<ChatWithMessages>> {
        let conn = self.db.conn()?;
        let Some(chat) = owned_chat(&conn, chat_id, user_id)? else {
            return Ok(None);
        };

        let messages = chat_messages(&conn, chat_id)?;
        Ok(Some(ChatWithMessages { chat, messages }))
    }

    /// Chats in a project, ownership-filtered via join on the project row.
    pub async fn get_chats_by_project_id(
        &self,
        project_id: &str,
        user_id: &str,
    ) -> Result<Vec<Chat>> {
        let conn = self.db.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT c.id, c.user_id, c.project_id, c.description, c.metadata, c.embedding,
                        c.created_at, c.updated_at
                 FROM chats c
                 JOIN projects p ON p.id = c.project_id
                 WHERE c.project_id = ? AND p.user_id = ?
                 ORDER BY c.updated_at DESC, c.id",
            )
            .map_err(|e| Error::Database(format!("failed to prepare chat list: {e}")))?;

        let rows = stmt
            .query_map(params![project_id, user_id], row_to_chat)
            .map_err(|e| Error::Database(format!("failed to list chats: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect chat rows: {e}")))
    }

    /// Replace the entire message list. Individual messages are immutable;
    /// the unit of update is the whole history.
    pub async fn update_chat_messages(
        &self,
        chat_id: &str,
        user_id: &str,
        messages: &[NewMessage],
    ) -> Result<bool> {
        validate_messages(messages)?;

        let mut conn = self.db.conn()?;
        let tx = begin(&mut conn)?;

        if owned_chat(&tx, chat_id, user_id)?.is_none() {
            return Ok(false);
        }

        tx.execute("DELETE FROM messages WHERE chat_id = ?", params![chat_id])
            .map_err(|e| Error::Database(format!("failed to clear messages: {e}")))?;

        let now = Utc::now().to_rfc3339();
        for (i, message) in messages.iter().enumerate() {
            insert_message(&tx, chat_id, message, i as i64, &now)?;
        }
        touch_chat(&tx, chat_id, &now)?;

        commit(tx)?;
        Ok(true)
    }

    pub async fn update_chat_embedding(
        &self,
        chat_id: &str,
        user_id: &str,
        chat_embedding: &[f32],
    ) -> Result<bool> {
        embedding::ensure_dimension(chat_embedding)?;

        let mut conn = self.db.conn()?;
        let tx = begin(&mut conn)?;

        if owned_chat(&tx, chat_id, user_id)?.is_none() {
            return Ok(false);
        }

        tx.execute(
            "UPDATE chats SET embedding = ?, updated_at = ? WHERE id = ?",
            params![
                embedding::to_blob(chat_embedding),
                Utc::now().to_rfc3339(),
                chat_id
            ],
        )
        .map_err(|e| Error::Database(format!("failed to update chat embedding: {e}")))?;

        commit(tx)?;
        Ok(true)
    }

    pub async fn delete_chat(&self, chat_id: &str, user_id: &str) -> Result<bool> {
        let conn = self.db.conn()?;
        let deleted = conn
            .execute(
                "DELETE FROM chats WHERE id = ? AND user_id = ?",
                params![chat_id, user_id],
            )
            .map_err(|e| Error::Database(format!("failed to delete chat: {e}")))?;
        Ok(deleted > 0)
    }

    /// Append a snapshot to the chat's history.
    pub async fn save_snapshot(
        &self,
        chat_id: &str,
        user_id: &str,
        snapshot_data: serde_json::Value,
    ) -> Result<Option<String>> {
        let conn = self.db.conn()?;
        if owned_chat(&conn, chat_id, user_id)?.is_none() {
            return Ok(None);
        }

        let snapshot_id = insert_snapshot(&conn, chat_id, &snapshot_data, &Utc::now().to_rfc3339())?;
        Ok(Some(snapshot_id))
    }

    pub async fn latest_snapshot(&self, chat_id: &str, user_id: &str) -> Result<Option<Snapshot>> {
        let conn = self.db.conn()?;
        if owned_chat(&conn, chat_id, user_id)?.is_none() {
            return Ok(None);
        }
        latest_snapshot_row(&conn, chat_id)
    }
}

pub(crate) fn begin(conn: &mut Connection) -> Result<rusqlite::Transaction<'_>> {
    conn.transaction()
        .map_err(|e| Error::Database(format!("failed to begin transaction: {e}")))
}

pub(crate) fn commit(tx: rusqlite::Transaction<'_>) -> Result<()> {
    tx.commit()
        .map_err(|e| Error::Database(format!("failed to commit transaction: {e}")))
}

/// Authorize-and-load: the chat row if and only if the caller owns it.
/// Every mutating path goes through this, on the same connection (or
/// transaction) that performs the write.
pub(crate) fn owned_chat(conn: &Connection, chat_id: &str, user_id: &str) -> Result<Option<Chat>> {
    conn.query_row(
        "SELECT id, user_id, project_id, description, metadata, embedding, created_at, updated_at
         FROM chats WHERE id = ? AND user_id = ?",
        params![chat_id, user_id],
        row_to_chat,
    )
    .optional()
    .map_err(|e| Error::Database(format!("failed to fetch chat: {e}")))
}

pub(crate) fn owned_project(conn: &Connection, project_id: &str, user_id: &str) -> Result<bool> {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM projects WHERE id = ? AND user_id = ?)",
            params![project_id, user_id],
            |row| row.get(0),
        )
        .map_err(|e| Error::Database(format!("failed to check project ownership: {e}")))?;
    Ok(exists != 0)
}

pub(crate) fn chat_messages(conn: &Connection, chat_id: &str) -> Result<Vec<ChatMessage>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, chat_id, role, content, embedding, seq, created_at
             FROM messages WHERE chat_id = ?
             ORDER BY seq",
        )
        .map_err(|e| Error::Database(format!("failed to prepare message list: {e}")))?;

    let rows = stmt
        .query_map(params![chat_id], row_to_message)
        .map_err(|e| Error::Database(format!("failed to list messages: {e}")))?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Database(format!("failed to collect message rows: {e}")))
}

pub(crate) fn insert_chat(
    conn: &Connection,
    user_id: &str,
    project_id: Option<&str>,
    description: Option<&str>,
    metadata: &serde_json::Value,
    now: &str,
) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    let metadata_json = serde_json::to_string(metadata)?;

    conn.execute(
        "INSERT INTO chats (id, user_id, project_id, description, metadata, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![id, user_id, project_id, description, metadata_json, now, now],
    )
    .map_err(|e| Error::Database(format!("failed to insert chat: {e}")))?;

    Ok(id)
}

pub(crate) fn insert_message(
    conn: &Connection,
    chat_id: &str,
    message: &NewMessage,
    seq: i64,
    now: &str,
) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    let embedding_blob = message.embedding.as_deref().map(embedding::to_blob);

    conn.execute(
        "INSERT INTO messages (id, chat_id, role, content, embedding, seq, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
            id,
            chat_id,
            message.role.as_str(),
            message.content,
            embedding_blob,
            seq,
            now
        ],
    )
    .map_err(|e| Error::Database(format!("failed to insert message: {e}")))?;

    Ok(id)
}

/// Copy a message into another chat preserving role, content, embedding,
/// ordering, and the original timestamp.
pub(crate) fn copy_message(conn: &Connection, chat_id: &str, message: &ChatMessage) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    let embedding_blob = message.embedding.as_deref().map(embedding::to_blob);

    conn.execute(
        "INSERT INTO messages (id, chat_id, role, content, embedding, seq, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
            id,
            chat_id,
            message.role.as_str(),
            message.content,
            embedding_blob,
            message.seq,
            message.created_at.to_rfc3339()
        ],
    )
    .map_err(|e| Error::Database(format!("failed to copy message: {e}")))?;

    Ok(id)
}

pub(crate) fn next_seq(conn: &Connection, chat_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(seq) + 1, 0) FROM messages WHERE chat_id = ?",
        params![chat_id],
        |row| row.get(0),
    )
    .map_err(|e| Error::Database(format!("failed to read message sequence: {e}")))
}

pub(crate) fn touch_chat(conn: &Connection, chat_id: &str, now: &str) -> Result<()> {
    conn.execute(
        "UPDATE chats SET updated_at = ? WHERE id = ?",
        params![now, chat_id],
    )
    .map_err(|e| Error::Database(format!("failed to touch chat: {e}")))?;
    Ok(())
}

pub(crate) fn insert_snapshot(
    conn: &Connection,
    chat_id: &str,
    snapshot_data: &serde_json::Value,
    now: &str,
) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    let data_json = serde_json::to_string(snapshot_data)?;

    conn.execute(
        "INSERT INTO snapshots (id, chat_id, snapshot_data, created_at) VALUES (?, ?, ?, ?)",
        params![id, chat_id, data_json, now],
    )
    .map_err(|e| Error::Database(format!("failed to insert snapshot: {e}")))?;

    Ok(id)
}

pub(crate) fn latest_snapshot_row(conn: &Connection, chat_id: &str) -> Result<Option<Snapshot>> {
    conn.query_row(
        "SELECT id, chat_id, snapshot_data, created_at
         FROM snapshots WHERE chat_id = ?
         ORDER BY created_at DESC, id DESC
         LIMIT 1",
        params![chat_id],
        row_to_snapshot,
    )
    .optional()
    .map_err(|e| Error::Database(format!("failed to fetch latest snapshot: {e}")))
}

fn validate_messages(messages: &[NewMessage]) -> Result<()> {
    for message in messages {
        if message.content.is_empty() {
            return Err(Error::Validation("message content cannot be empty".into()));
        }
        if let Some(e) = &message.embedding {
            embedding::ensure_dimension(e)?;
        }
    }
    Ok(())
}

pub(crate) fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    let metadata_str: String = row.get(4)?;
    let metadata = serde_json::from_str(&metadata_str).unwrap_or(serde_json::Value::Null);

    let embedding_blob: Option<Vec<u8>> = row.get(5)?;
    let chat_embedding = embedding_blob
        .as_deref()
        .map(embedding::from_blob)
        .transpose()
        .map_err(timestamps::conversion_err)?;

    let created_at_str: String = row.get(6)?;
    let updated_at_str: String = row.get(7)?;

    Ok(Chat {
        id: row.get(0)?,
        user_id: row.get(1)?,
        project_id: row.get(2)?,
        description: row.get(3)?,
        metadata,
        embedding: chat_embedding,
        created_at: timestamps::parse(&created_at_str).map_err(timestamps::conversion_err)?,
        updated_at: timestamps::parse(&updated_at_str).map_err(timestamps::conversion_err)?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    let role_str: String = row.get(2)?;
    let role = MessageRole::from_db(&role_str).map_err(timestamps::conversion_err)?;

    let embedding_blob: Option<Vec<u8>> = row.get(4)?;
    let message_embedding = embedding_blob
        .as_deref()
        .map(embedding::from_blob)
        .transpose()
        .map_err(timestamps::conversion_err)?;

    let created_at_str: String = row.get(6)?;

    Ok(ChatMessage {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        role,
        content: row.get(3)?,
        embedding: message_embedding,
        seq: row.get(5)?,
        created_at: timestamps::parse(&created_at_str).map_err(timestamps::conversion_err)?,
    })
}

fn row_to_snapshot(row: &rusqlite::Row<'_>) -> rusqlite::Result<Snapshot> {
    let data_str: String = row.get(2)?;
    let snapshot_data = serde_json::from_str(&data_str).unwrap_or(serde_json::Value::Null);

    let created_at_str: String = row.get(3)?;

    Ok(Snapshot {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        snapshot_data,
        created_at: timestamps::parse(&created_at_str).map_err(timestamps::conversion_err)?,
    })
}

#[cfg(test)]
mod tests {
    use super::ChatStore;
    use crate::embedding::EMBEDDING_DIM;
    use crate::pool::Database;
    use crate::projects::{NewProject, ProjectStore};
    use crate::users::UserStore;
    use atelier_common::{MessageRole, NewMessage};

    struct Fixture {
        chats: ChatStore,
        user_id: String,
        project_id: String,
    }

    async fn fixture(email: &str) -> Fixture {
        let db = Database::in_memory().expect("failed to open in-memory database");
        let users = UserStore::new(db.clone());
        let user = users
            .create_user(email, "hash", None, None)
            .await
            .expect("create_user should succeed");

        let projects = ProjectStore::new(db.clone());
        let project = projects
            .create_project(
                &user.id,
                NewProject {
                    name: "fixture".to_string(),
                    description: None,
                    code_content: None,
                    preview_url: None,
                },
            )
            .await
            .expect("create_project should succeed");

        Fixture {
            chats: ChatStore::new(db),
            user_id: user.id,
            project_id: project.id,
        }
    }

    fn unit_embedding(axis: usize) -> Vec<f32> {
        let mut e = vec![0.0f32; EMBEDDING_DIM];
        e[axis] = 1.0;
        e
    }

    #[tokio::test]
    async fn create_and_fetch_chat_with_messages() {
        let f = fixture("chat@example.com").await;
        let chat_id = f
            .chats
            .create_chat(
                &f.user_id,
                &f.project_id,
                &[
                    NewMessage::text(MessageRole::User, "hi"),
                    NewMessage::text(MessageRole::Assistant, "hello"),
                ],
            )
            .await
            .expect("create_chat should succeed")
            .expect("ownership check should pass");

        let chat = f
            .chats
            .get_chat_by_id(&chat_id, &f.user_id)
            .await
            .expect("fetch should succeed")
            .expect("chat should exist");

        assert_eq!(chat.messages.len(), 2);
        assert_eq!(chat.messages[0].content, "hi");
        assert_eq!(chat.messages[0].seq, 0);
        assert_eq!(chat.messages[1].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn create_chat_under_foreign_project_fails_closed() {
        let f = fixture("closed@example.com").await;
        let result = f
            .chats
            .create_chat(
                "somebody-else",
                &f.project_id,
                &[NewMessage::text(MessageRole::User, "hi")],
            )
            .await
            .expect("should not error");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn foreign_user_cannot_read_chat() {
        let f = fixture("private@example.com").await;
        let chat_id = f
            .chats
            .create_chat(
                &f.user_id,
                &f.project_id,
                &[NewMessage::text(MessageRole::User, "hi")],
            )
            .await
            .expect("create_chat should succeed")
            .expect("ownership check should pass");

        let stolen = f
            .chats
            .get_chat_by_id(&chat_id, "intruder")
            .await
            .expect("fetch should not error");
        assert!(stolen.is_none());
    }

    #[tokio::test]
    async fn update_messages_replaces_whole_list() {
        let f = fixture("replace@example.com").await;
        let chat_id = f
            .chats
            .create_chat(
                &f.user_id,
                &f.project_id,
                &[
                    NewMessage::text(MessageRole::User, "old one"),
                    NewMessage::text(MessageRole::Assistant, "old two"),
                ],
            )
            .await
            .expect("create_chat should succeed")
            .expect("ownership check should pass");

        let replaced = f
            .chats
            .update_chat_messages(
                &chat_id,
                &f.user_id,
                &[NewMessage::text(MessageRole::User, "only one now")],
            )
            .await
            .expect("update should succeed");
        assert!(replaced);

        let chat = f
            .chats
            .get_chat_by_id(&chat_id, &f.user_id)
            .await
            .expect("fetch should succeed")
            .expect("chat should exist");
        assert_eq!(chat.messages.len(), 1);
        assert_eq!(chat.messages[0].content, "only one now");

        let denied = f
            .chats
            .update_chat_messages(
                &chat_id,
                "intruder",
                &[NewMessage::text(MessageRole::User, "overwrite")],
            )
            .await
            .expect("foreign update should not error");
        assert!(!denied);
    }

    #[tokio::test]
    async fn embedding_round_trips_numerically() {
        let f = fixture("embed@example.com").await;
        let chat_id = f
            .chats
            .create_chat(
                &f.user_id,
                &f.project_id,
                &[NewMessage::text(MessageRole::User, "hi")],
            )
            .await
            .expect("create_chat should succeed")
            .expect("ownership check should pass");

        let mut stored = unit_embedding(7);
        stored[100] = -0.25;
        stored[1535] = 0.5;

        assert!(f
            .chats
            .update_chat_embedding(&chat_id, &f.user_id, &stored)
            .await
            .expect("update_chat_embedding should succeed"));

        let chat = f
            .chats
            .get_chat_by_id(&chat_id, &f.user_id)
            .await
            .expect("fetch should succeed")
            .expect("chat should exist");
        assert_eq!(chat.chat.embedding.as_deref(), Some(stored.as_slice()));
    }

    #[tokio::test]
    async fn wrong_dimension_embedding_is_rejected() {
        let f = fixture("dims@example.com").await;
        let chat_id = f
            .chats
            .create_chat(
                &f.user_id,
                &f.project_id,
                &[NewMessage::text(MessageRole::User, "hi")],
            )
            .await
            .expect("create_chat should succeed")
            .expect("ownership check should pass");

        let result = f
            .chats
            .update_chat_embedding(&chat_id, &f.user_id, &[1.0, 2.0, 3.0])
            .await;
        assert!(matches!(result, Err(atelier_common::Error::Validation(_))));
    }

    #[tokio::test]
    async fn snapshots_keep_ordered_history() {
        let f = fixture("snap@example.com").await;
        let chat_id = f
            .chats
            .create_chat(
                &f.user_id,
                &f.project_id,
                &[NewMessage::text(MessageRole::User, "hi")],
            )
            .await
            .expect("create_chat should succeed")
            .expect("ownership check should pass");

        f.chats
            .save_snapshot(&chat_id, &f.user_id, serde_json::json!({ "rev": 1 }))
            .await
            .expect("first snapshot should succeed")
            .expect("ownership check should pass");
        f.chats
            .save_snapshot(&chat_id, &f.user_id, serde_json::json!({ "rev": 2 }))
            .await
            .expect("second snapshot should succeed")
            .expect("ownership check should pass");

        let latest = f
            .chats
            .latest_snapshot(&chat_id, &f.user_id)
            .await
            .expect("latest_snapshot should succeed")
            .expect("snapshot should exist");
        assert_eq!(latest.snapshot_data, serde_json::json!({ "rev": 2 }));

        let denied = f
            .chats
            .latest_snapshot(&chat_id, "intruder")
            .await
            .expect("foreign read should not error");
        assert!(denied.is_none());
    }

    #[tokio::test]
    async fn delete_chat_is_ownership_checked() {
        let f = fixture("delchat@example.com").await;
        let chat_id = f
            .chats
            .create_chat(
                &f.user_id,
                &f.project_id,
                &[NewMessage::text(MessageRole::User, "hi")],
            )
            .await
            .expect("create_chat should succeed")
            .expect("ownership check should pass");

        assert!(!f
            .chats
            .delete_chat(&chat_id, "intruder")
            .await
            .expect("foreign delete should not error"));
        assert!(f
            .chats
            .delete_chat(&chat_id, &f.user_id)
            .await
            .expect("delete should succeed"));
        assert!(f
            .chats
            .get_chat_by_id(&chat_id, &f.user_id)
            .await
            .expect("fetch should not error")
            .is_none());
    }
}
