use atelier_common::{Error, Result};
use rusqlite::{Connection, params};
use tracing::info;

/// A single versioned schema change. Migrations are applied in order
/// and tracked in the `_migrations` table.
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: "CREATE TABLE IF NOT EXISTS users (
              id TEXT PRIMARY KEY,
              email TEXT NOT NULL UNIQUE,
              password_hash TEXT NOT NULL,
              name TEXT,
              avatar_url TEXT,
              created_at TEXT NOT NULL,
              updated_at TEXT NOT NULL
          );

          CREATE TABLE IF NOT EXISTS projects (
              id TEXT PRIMARY KEY,
              user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
              name TEXT NOT NULL,
              description TEXT,
              code_content TEXT,
              preview_url TEXT,
              created_at TEXT NOT NULL,
              updated_at TEXT NOT NULL
          );
          CREATE INDEX IF NOT EXISTS idx_projects_user
              ON projects(user_id, updated_at);

          CREATE TABLE IF NOT EXISTS chats (
              id TEXT PRIMARY KEY,
              user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
              project_id TEXT REFERENCES projects(id) ON DELETE CASCADE,
              description TEXT,
              metadata TEXT NOT NULL DEFAULT '{}',
              embedding BLOB,
              created_at TEXT NOT NULL,
              updated_at TEXT NOT NULL
          );
          CREATE INDEX IF NOT EXISTS idx_chats_project
              ON chats(project_id, updated_at);
          CREATE INDEX IF NOT EXISTS idx_chats_user
              ON chats(user_id);

          CREATE TABLE IF NOT EXISTS messages (
              id TEXT PRIMARY KEY,
              chat_id TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
              role TEXT NOT NULL,
              content TEXT NOT NULL,
              embedding BLOB,
              seq INTEGER NOT NULL,
              created_at TEXT NOT NULL
          );
          CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_chat_seq
              ON messages(chat_id, seq);

          CREATE TABLE IF NOT EXISTS snapshots (
              id TEXT PRIMARY KEY,
              chat_id TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
              snapshot_data TEXT NOT NULL,
              created_at TEXT NOT NULL
          );
          CREATE INDEX IF NOT EXISTS idx_snapshots_chat
              ON snapshots(chat_id, created_at);",
}];

/// Apply every migration newer than the recorded schema version.
pub fn apply(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| Error::Database(format!("failed to create migrations table: {e}")))?;

    let current: u32 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| {
            row.get(0)
        })
        .map_err(|e| Error::Database(format!("failed to read schema version: {e}")))?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        conn.execute_batch(migration.sql).map_err(|e| {
            Error::Database(format!(
                "migration v{} ({}) failed: {e}",
                migration.version, migration.name
            ))
        })?;
        conn.execute(
            "INSERT INTO _migrations (version, name) VALUES (?, ?)",
            params![migration.version, migration.name],
        )
        .map_err(|e| {
            Error::Database(format!(
                "failed to record migration v{}: {e}",
                migration.version
            ))
        })?;
        info!("applied migration v{} ({})", migration.version, migration.name);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::apply;
    use rusqlite::Connection;

    #[test]
    fn apply_is_idempotent() {
        let conn = Connection::open_in_memory().expect("failed to open in-memory database");

        apply(&conn).expect("first apply should succeed");
        apply(&conn).expect("second apply should be a no-op");

        let recorded: i64 = conn
            .query_row("SELECT count(*) FROM _migrations", [], |row| row.get(0))
            .expect("failed to count migrations");
        assert_eq!(recorded, super::MIGRATIONS.len() as i64);
    }

    #[test]
    fn schema_has_cascading_message_and_snapshot_tables() {
        let conn = Connection::open_in_memory().expect("failed to open in-memory database");
        apply(&conn).expect("apply should succeed");

        for table in ["messages", "snapshots"] {
            let sql: String = conn
                .query_row(
                    "SELECT sql FROM sqlite_master WHERE type='table' AND name=?",
                    [table],
                    |row| row.get(0),
                )
                .expect("table should exist");
            assert!(sql.contains("ON DELETE CASCADE"), "{table} must cascade");
        }
    }
}
