//! 会话存储实现：内存与 SQLite
//!
//! InMemoryStore 供测试与无持久化场景；SqliteStore 用 rusqlite（bundled）
//! 落盘，同步调用统一包在 spawn_blocking 中执行，避免阻塞运行时。

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::memory::long_term::{ConversationStore, MemoryError, MemoryRecord, RecordSummary};

/// 内存存储：HashMap<conversation_id, MemoryRecord>
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, MemoryRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn save(&self, record: MemoryRecord) -> Result<(), MemoryError> {
        self.records
            .write()
            .unwrap()
            .insert(record.conversation_id.clone(), record);
        Ok(())
    }

    async fn load(&self, conversation_id: &str) -> Result<Option<MemoryRecord>, MemoryError> {
        Ok(self.records.read().unwrap().get(conversation_id).cloned())
    }

    async fn delete(&self, conversation_id: &str) -> Result<bool, MemoryError> {
        Ok(self.records.write().unwrap().remove(conversation_id).is_some())
    }

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<RecordSummary>, MemoryError> {
        let records = self.records.read().unwrap();
        let mut summaries: Vec<RecordSummary> = records
            .values()
            .map(|r| RecordSummary {
                conversation_id: r.conversation_id.clone(),
                message_count: r.messages.len(),
                saved_at: r.saved_at,
            })
            .collect();
        summaries.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(summaries.into_iter().skip(offset).take(limit).collect())
    }
}

/// SQLite 存储：单表，messages/metadata 序列化为 JSON 列
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// 打开（或创建）数据库文件并建表
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| MemoryError::Storage(e.to_string()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS conversations (
                conversation_id TEXT PRIMARY KEY,
                messages        TEXT NOT NULL,
                metadata        TEXT NOT NULL,
                message_count   INTEGER NOT NULL,
                saved_at        TEXT NOT NULL
            );",
        )
        .map_err(|e| MemoryError::Storage(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 进程内临时库（测试用）
    pub fn open_in_memory() -> Result<Self, MemoryError> {
        let conn =
            Connection::open_in_memory().map_err(|e| MemoryError::Storage(e.to_string()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS conversations (
                conversation_id TEXT PRIMARY KEY,
                messages        TEXT NOT NULL,
                metadata        TEXT NOT NULL,
                message_count   INTEGER NOT NULL,
                saved_at        TEXT NOT NULL
            );",
        )
        .map_err(|e| MemoryError::Storage(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 在 spawn_blocking 中执行同步 rusqlite 调用
    async fn run_blocking<T, F>(&self, f: F) -> Result<T, MemoryError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, MemoryError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            f(&conn)
        })
        .await
        .map_err(|e| MemoryError::Storage(format!("blocking task failed: {}", e)))?
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn save(&self, record: MemoryRecord) -> Result<(), MemoryError> {
        self.run_blocking(move |conn| {
            let messages = serde_json::to_string(&record.messages)
                .map_err(|e| MemoryError::Serialization(e.to_string()))?;
            let metadata = serde_json::to_string(&record.metadata)
                .map_err(|e| MemoryError::Serialization(e.to_string()))?;
            conn.execute(
                "INSERT OR REPLACE INTO conversations
                 (conversation_id, messages, metadata, message_count, saved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    record.conversation_id,
                    messages,
                    metadata,
                    record.messages.len() as i64,
                    record.saved_at,
                ],
            )
            .map_err(|e| MemoryError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn load(&self, conversation_id: &str) -> Result<Option<MemoryRecord>, MemoryError> {
        let conversation_id = conversation_id.to_string();
        self.run_blocking(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT conversation_id, messages, metadata, saved_at
                     FROM conversations WHERE conversation_id = ?1",
                )
                .map_err(|e| MemoryError::Storage(e.to_string()))?;
            let mut rows = stmt
                .query(rusqlite::params![conversation_id])
                .map_err(|e| MemoryError::Storage(e.to_string()))?;
            let Some(row) = rows.next().map_err(|e| MemoryError::Storage(e.to_string()))? else {
                return Ok(None);
            };
            let cid: String = row.get(0).map_err(|e| MemoryError::Storage(e.to_string()))?;
            let messages: String =
                row.get(1).map_err(|e| MemoryError::Storage(e.to_string()))?;
            let metadata: String =
                row.get(2).map_err(|e| MemoryError::Storage(e.to_string()))?;
            let saved_at: DateTime<Utc> =
                row.get(3).map_err(|e| MemoryError::Storage(e.to_string()))?;
            Ok(Some(MemoryRecord {
                conversation_id: cid,
                messages: serde_json::from_str(&messages)
                    .map_err(|e| MemoryError::Serialization(e.to_string()))?,
                metadata: serde_json::from_str(&metadata)
                    .map_err(|e| MemoryError::Serialization(e.to_string()))?,
                saved_at,
            }))
        })
        .await
    }

    async fn delete(&self, conversation_id: &str) -> Result<bool, MemoryError> {
        let conversation_id = conversation_id.to_string();
        self.run_blocking(move |conn| {
            let n = conn
                .execute(
                    "DELETE FROM conversations WHERE conversation_id = ?1",
                    rusqlite::params![conversation_id],
                )
                .map_err(|e| MemoryError::Storage(e.to_string()))?;
            Ok(n > 0)
        })
        .await
    }

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<RecordSummary>, MemoryError> {
        self.run_blocking(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT conversation_id, message_count, saved_at
                     FROM conversations
                     ORDER BY saved_at DESC, rowid DESC
                     LIMIT ?1 OFFSET ?2",
                )
                .map_err(|e| MemoryError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(
                    rusqlite::params![limit as i64, offset as i64],
                    |row| {
                        Ok(RecordSummary {
                            conversation_id: row.get(0)?,
                            message_count: row.get::<_, i64>(1)? as usize,
                            saved_at: row.get(2)?,
                        })
                    },
                )
                .map_err(|e| MemoryError::Storage(e.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| MemoryError::Storage(e.to_string()))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Message;

    fn record(id: &str) -> MemoryRecord {
        MemoryRecord::new(
            id,
            vec![Message::user("hello"), Message::assistant("hi")],
            HashMap::from([("source".to_string(), "test".to_string())]),
        )
    }

    #[tokio::test]
    async fn test_in_memory_roundtrip() {
        let store = InMemoryStore::new();
        store.save(record("c1")).await.unwrap();
        let loaded = store.load("c1").await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.metadata.get("source").unwrap(), "test");
    }

    #[tokio::test]
    async fn test_in_memory_overwrite() {
        let store = InMemoryStore::new();
        store.save(record("c1")).await.unwrap();
        let mut updated = record("c1");
        updated.messages.push(Message::user("more"));
        store.save(updated).await.unwrap();
        let loaded = store.load("c1").await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 3);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("memory.db")).unwrap();
        store.save(record("c1")).await.unwrap();

        let loaded = store.load("c1").await.unwrap().unwrap();
        assert_eq!(loaded.conversation_id, "c1");
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[0].content, "hello");

        assert!(store.delete("c1").await.unwrap());
        assert!(!store.delete("c1").await.unwrap());
        assert!(store.load("c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_list_pagination() {
        let store = SqliteStore::open_in_memory().unwrap();
        for i in 0..5 {
            store.save(record(&format!("c{}", i))).await.unwrap();
        }
        let page = store.list(2, 0).await.unwrap();
        assert_eq!(page.len(), 2);
        let rest = store.list(10, 2).await.unwrap();
        assert_eq!(rest.len(), 3);
        for s in page.iter().chain(rest.iter()) {
            assert_eq!(s.message_count, 2);
        }
    }
}
