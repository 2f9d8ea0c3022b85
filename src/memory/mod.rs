//! 记忆层：短期（单任务消息历史）、长期（会话持久化 + 相似度检索）

pub mod long_term;
pub mod message;
pub mod short_term;
pub mod stores;
pub mod tokenizer;
pub mod vector;

pub use long_term::{
    ConversationStore, LongTermMemory, MemoryError, MemoryRecord, RecordSummary,
};
pub use message::{Message, Role};
pub use short_term::ShortTermMemory;
pub use stores::{InMemoryStore, SqliteStore};
pub use vector::{InMemoryVectorIndex, KeywordIndex, SimilarMatch, VectorIndex};
