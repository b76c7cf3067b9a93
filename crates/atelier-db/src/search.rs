use atelier_common::{Error, Result};
use rusqlite::params;
use serde::Serialize;

use crate::embedding;
use crate::pool::Database;

pub const DEFAULT_SIMILAR_LIMIT: usize = 5;
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.8;
const MAX_SIMILAR_LIMIT: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct SimilarChat {
    pub chat_id: String,
    pub description: Option<String>,
    /// Cosine similarity in [-1, 1]; higher is closer.
    pub similarity: f32,
}

/// Embedding-based ranking over a project's chats. Ranking happens in
/// one SQL query through sqlite-vec's cosine distance; correctness does
/// not depend on any approximate index.
pub struct SimilaritySearch {
    db: Database,
}

impl SimilaritySearch {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Rank a project's chats against a query embedding. The threshold
    /// is clamped into the cosine-similarity domain [-1, 1]; a limit of
    /// zero falls back to the default. Chats without an embedding never
    /// match, and an empty result is not an error.
    pub async fn find_similar_chats(
        &self,
        project_id: &str,
        user_id: &str,
        query_embedding: &[f32],
        limit: usize,
        similarity_threshold: f32,
    ) -> Result<Vec<SimilarChat>> {
        embedding::ensure_dimension(query_embedding)?;

        let limit = if limit == 0 {
            DEFAULT_SIMILAR_LIMIT
        } else {
            limit.min(MAX_SIMILAR_LIMIT)
        };
        let max_distance = f64::from(1.0 - similarity_threshold.clamp(-1.0, 1.0));
        let query_blob = embedding::to_blob(query_embedding);

        let conn = self.db.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT c.id, c.description, vec_distance_cosine(c.embedding, ?1) AS distance
                 FROM chats c
                 JOIN projects p ON p.id = c.project_id
                 WHERE c.project_id = ?2
                   AND p.user_id = ?3
                   AND c.embedding IS NOT NULL
                   AND vec_distance_cosine(c.embedding, ?1) < ?4
                 ORDER BY distance
                 LIMIT ?5",
            )
            .map_err(|e| Error::Database(format!("failed to prepare similarity query: {e}")))?;

        let rows = stmt
            .query_map(
                params![query_blob, project_id, user_id, max_distance, limit as i64],
                |row| {
                    let distance: f64 = row.get(2)?;
                    Ok(SimilarChat {
                        chat_id: row.get(0)?,
                        description: row.get(1)?,
                        similarity: 1.0 - distance as f32,
                    })
                },
            )
            .map_err(|e| Error::Database(format!("failed to execute similarity query: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect similarity rows: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_SIMILAR_LIMIT, SimilaritySearch};
    use crate::chats::ChatStore;
    use crate::embedding::EMBEDDING_DIM;
    use crate::pool::Database;
    use crate::projects::{NewProject, ProjectStore};
    use crate::users::UserStore;
    use atelier_common::{MessageRole, NewMessage};

    struct Fixture {
        chats: ChatStore,
        search: SimilaritySearch,
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
            chats: ChatStore::new(db.clone()),
            search: SimilaritySearch::new(db),
            user_id: user.id,
            project_id: project.id,
        }
    }

    fn unit_embedding(axis: usize) -> Vec<f32> {
        let mut e = vec![0.0f32; EMBEDDING_DIM];
        e[axis] = 1.0;
        e
    }

    async fn chat_with_embedding(f: &Fixture, description: &str, axis: usize) -> String {
        let chat_id = f
            .chats
            .create_chat(
                &f.user_id,
                &f.project_id,
                &[NewMessage::text(MessageRole::User, description)],
            )
            .await
            .expect("create_chat should succeed")
            .expect("ownership check should pass");
        f.chats
            .update_chat_embedding(&chat_id, &f.user_id, &unit_embedding(axis))
            .await
            .expect("update_chat_embedding should succeed");
        chat_id
    }

    #[tokio::test]
    async fn orthogonal_embeddings_clear_nothing_at_high_threshold() {
        let f = fixture("ortho@example.com").await;
        chat_with_embedding(&f, "axis one", 1).await;
        chat_with_embedding(&f, "axis two", 2).await;

        let results = f
            .search
            .find_similar_chats(&f.project_id, &f.user_id, &unit_embedding(0), 5, 0.9)
            .await
            .expect("search should succeed");
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn identical_embedding_ranks_first_with_similarity_one() {
        let f = fixture("rank@example.com").await;
        let target = chat_with_embedding(&f, "match", 0).await;
        chat_with_embedding(&f, "noise", 1).await;

        let results = f
            .search
            .find_similar_chats(&f.project_id, &f.user_id, &unit_embedding(0), 5, 0.8)
            .await
            .expect("search should succeed");

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chat_id, target);
        assert!((results[0].similarity - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn threshold_is_clamped_not_rejected() {
        let f = fixture("clamp@example.com").await;
        chat_with_embedding(&f, "anything", 3).await;

        // A threshold below -1 clamps to -1 and matches everything with
        // an embedding.
        let results = f
            .search
            .find_similar_chats(&f.project_id, &f.user_id, &unit_embedding(0), 5, -40.0)
            .await
            .expect("search should succeed");
        assert_eq!(results.len(), 1);

        // Above 1 clamps to 1 and nothing can clear it.
        let results = f
            .search
            .find_similar_chats(&f.project_id, &f.user_id, &unit_embedding(3), 5, 40.0)
            .await
            .expect("search should succeed");
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn results_are_scoped_to_the_owner() {
        let f = fixture("scope@example.com").await;
        chat_with_embedding(&f, "mine", 0).await;

        let results = f
            .search
            .find_similar_chats(&f.project_id, "intruder", &unit_embedding(0), 5, 0.0)
            .await
            .expect("search should not error");
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn zero_limit_falls_back_to_default() {
        let f = fixture("limit@example.com").await;
        for axis in 0..(DEFAULT_SIMILAR_LIMIT + 3) {
            chat_with_embedding(&f, "bulk", axis).await;
        }

        // Threshold -1 admits every embedded chat, so only the limit caps
        // the result set.
        let results = f
            .search
            .find_similar_chats(&f.project_id, &f.user_id, &unit_embedding(0), 0, -1.0)
            .await
            .expect("search should succeed");
        assert_eq!(results.len(), DEFAULT_SIMILAR_LIMIT);
    }

    #[tokio::test]
    async fn wrong_dimension_query_is_rejected() {
        let f = fixture("baddim@example.com").await;
        let result = f
            .search
            .find_similar_chats(&f.project_id, &f.user_id, &[1.0, 0.0], 5, 0.8)
            .await;
        assert!(matches!(result, Err(atelier_common::Error::Validation(_))));
    }
}
