pub mod chats;
pub mod embedding;
pub mod lineage;
pub mod migrations;
pub mod pool;
pub mod projects;
pub mod search;
pub mod users;

mod timestamps;

pub use chats::{Chat, ChatMessage, ChatStore, ChatWithMessages, Snapshot};
pub use embedding::EMBEDDING_DIM;
pub use lineage::{Lineage, SaveChatRequest};
pub use pool::{Database, PoolOptions};
pub use projects::{NewProject, Project, ProjectChanges, ProjectStore};
pub use search::{SimilarChat, SimilaritySearch};
pub use users::{User, UserStore};
