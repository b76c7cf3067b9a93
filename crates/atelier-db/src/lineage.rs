use atelier_common::{Error, NewMessage, Result};
use chrono::Utc;
use rusqlite::params;
use tracing::{info, warn};

use crate::chats;
use crate::embedding;
use crate::pool::Database;

/// Parameters for the shared create-or-append save path.
#[derive(Debug, Clone, Default)]
pub struct SaveChatRequest {
    /// Present: append to this chat. Absent: create a new one.
    pub chat_id: Option<String>,
    pub project_id: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Derived-chat workflows: duplicate, fork, the shared save path, and
/// bulk delete. Every operation runs inside one transaction on one
/// pooled connection; any failure rolls the whole operation back, so a
/// partial copy is never observable.
///
/// Concurrent operations on the same chat are not fenced beyond SQLite's
/// own locking: two simultaneous forks can both read the same pre-fork
/// state and both succeed.
pub struct Lineage {
    db: Database,
}

impl Lineage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Copy a chat the caller owns: all messages (role, content,
    /// embedding, ordering, original timestamps) plus the latest
    /// snapshot, under a fresh chat id.
    pub async fn duplicate_chat(
        &self,
        original_chat_id: &str,
        user_id: &str,
    ) -> Result<Option<String>> {
        let mut conn = self.db.conn()?;
        let tx = chats::begin(&mut conn)?;

        let Some(original) = chats::owned_chat(&tx, original_chat_id, user_id)? else {
            return Ok(None);
        };

        let now = Utc::now().to_rfc3339();
        let description = match &original.description {
            Some(d) => format!("Copy of {d}"),
            None => "Copy of untitled chat".to_string(),
        };

        let new_chat_id = chats::insert_chat(
            &tx,
            user_id,
            original.project_id.as_deref(),
            Some(&description),
            &original.metadata,
            &now,
        )?;

        for message in chats::chat_messages(&tx, original_chat_id)? {
            chats::copy_message(&tx, &new_chat_id, &message)?;
        }

        if let Some(snapshot) = chats::latest_snapshot_row(&tx, original_chat_id)? {
            chats::insert_snapshot(&tx, &new_chat_id, &snapshot.snapshot_data, &now)?;
        }

        chats::commit(tx)?;
        info!("duplicated chat {original_chat_id} -> {new_chat_id}");
        Ok(Some(new_chat_id))
    }

    /// Copy the message prefix of a chat up to and including the first
    /// message whose id is `message_id`, by stored order. An unknown id
    /// is a client error and rolls back without leaving an orphan chat.
    /// No snapshot is copied: the latest snapshot may postdate the fork
    /// point, so forks start without one.
    pub async fn fork_chat(
        &self,
        original_chat_id: &str,
        message_id: &str,
        user_id: &str,
    ) -> Result<Option<String>> {
        let mut conn = self.db.conn()?;
        let tx = chats::begin(&mut conn)?;

        let Some(original) = chats::owned_chat(&tx, original_chat_id, user_id)? else {
            return Ok(None);
        };

        let now = Utc::now().to_rfc3339();
        let description = match &original.description {
            Some(d) => format!("Fork of {d}"),
            None => "Fork of untitled chat".to_string(),
        };

        let new_chat_id = chats::insert_chat(
            &tx,
            user_id,
            original.project_id.as_deref(),
            Some(&description),
            &original.metadata,
            &now,
        )?;

        let messages = chats::chat_messages(&tx, original_chat_id)?;
        let fork_index = messages
            .iter()
            .position(|m| m.id == message_id)
            .ok_or_else(|| {
                Error::Validation(format!(
                    "message {message_id} does not exist in chat {original_chat_id}"
                ))
            })?;

        for message in &messages[..=fork_index] {
            chats::copy_message(&tx, &new_chat_id, message)?;
        }

        chats::commit(tx)?;
        info!(
            "forked chat {original_chat_id} at message {message_id} -> {new_chat_id} ({} messages)",
            fork_index + 1
        );
        Ok(Some(new_chat_id))
    }

    /// The single write path for both creating a chat and appending to
    /// one, so validation and timestamp touching behave identically in
    /// both cases. With `chat_id` absent a new chat is inserted; present,
    /// the chat is re-touched (description/metadata updated when
    /// supplied) and the messages appended after the current sequence.
    pub async fn save_chat_messages(
        &self,
        user_id: &str,
        messages: &[NewMessage],
        request: SaveChatRequest,
    ) -> Result<Option<String>> {
        if messages.is_empty() {
            return Err(Error::Validation("messages cannot be empty".into()));
        }
        for message in messages {
            if message.content.is_empty() {
                return Err(Error::Validation("message content cannot be empty".into()));
            }
            if let Some(e) = &message.embedding {
                embedding::ensure_dimension(e)?;
            }
        }

        let mut conn = self.db.conn()?;
        let tx = chats::begin(&mut conn)?;
        let now = Utc::now().to_rfc3339();

        let chat_id = match &request.chat_id {
            Some(chat_id) => {
                if chats::owned_chat(&tx, chat_id, user_id)?.is_none() {
                    warn!("save_chat_messages: chat {chat_id} is not owned by user {user_id}");
                    return Ok(None);
                }

                let metadata_json = request
                    .metadata
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?;
                tx.execute(
                    "UPDATE chats
                     SET updated_at = ?,
                         description = COALESCE(?, description),
                         metadata = COALESCE(?, metadata)
                     WHERE id = ?",
                    params![now, request.description, metadata_json, chat_id],
                )
                .map_err(|e| Error::Database(format!("failed to touch chat: {e}")))?;

                chat_id.clone()
            }
            None => {
                if let Some(project_id) = &request.project_id
                    && !chats::owned_project(&tx, project_id, user_id)?
                {
                    warn!(
                        "save_chat_messages: project {project_id} is not owned by user {user_id}"
                    );
                    return Ok(None);
                }

                chats::insert_chat(
                    &tx,
                    user_id,
                    request.project_id.as_deref(),
                    request.description.as_deref(),
                    request
                        .metadata
                        .as_ref()
                        .unwrap_or(&serde_json::json!({})),
                    &now,
                )?
            }
        };

        let mut seq = chats::next_seq(&tx, &chat_id)?;
        for message in messages {
            chats::insert_message(&tx, &chat_id, message, seq, &now)?;
            seq += 1;
        }

        chats::commit(tx)?;
        Ok(Some(chat_id))
    }

    /// Delete every chat the user owns. Cascading foreign keys remove
    /// dependent messages and snapshots in the same statement. There is
    /// no soft delete and no recovery path.
    pub async fn delete_all_chat_data_for_user(&self, user_id: &str) -> Result<usize> {
        let conn = self.db.conn()?;
        let deleted = conn
            .execute("DELETE FROM chats WHERE user_id = ?", params![user_id])
            .map_err(|e| Error::Database(format!("failed to delete chats for user: {e}")))?;

        info!("deleted {deleted} chats for user {user_id}");
        Ok(deleted)
    }
}
