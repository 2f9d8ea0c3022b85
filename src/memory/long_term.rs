//! 长期记忆：按会话 id 保存/加载对话历史，跨会话检索
//!
//! ConversationStore 负责持久化（内存 / SQLite 实现见 stores.rs），
//! LongTermMemory 在其上叠加可选的相似度检索后端：配置了嵌入时走向量
//! 索引，否则退化为关键词索引；两者都没有时 search_similar 返回空而非报错。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::EmbeddingProvider;
use crate::memory::vector::{KeywordIndex, SimilarMatch, VectorIndex};
use crate::memory::Message;

/// 记忆子系统错误
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// 一条长期记忆记录：会话 id + 完整消息列表 + 元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub conversation_id: String,
    pub messages: Vec<Message>,
    pub metadata: HashMap<String, String>,
    pub saved_at: DateTime<Utc>,
}

impl MemoryRecord {
    pub fn new(
        conversation_id: impl Into<String>,
        messages: Vec<Message>,
        metadata: HashMap<String, String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            messages,
            metadata,
            saved_at: Utc::now(),
        }
    }
}

/// list 返回的轻量摘要（不携带消息体）
#[derive(Debug, Clone)]
pub struct RecordSummary {
    pub conversation_id: String,
    pub message_count: usize,
    pub saved_at: DateTime<Utc>,
}

/// 会话存储 trait：save / load / delete / list，均为潜在阻塞 I/O
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// 保存（同 id 重复保存为覆盖）
    async fn save(&self, record: MemoryRecord) -> Result<(), MemoryError>;

    /// 加载；不存在时返回 Ok(None)
    async fn load(&self, conversation_id: &str) -> Result<Option<MemoryRecord>, MemoryError>;

    /// 删除；返回是否确有删除
    async fn delete(&self, conversation_id: &str) -> Result<bool, MemoryError>;

    /// 按保存时间降序分页列出摘要
    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<RecordSummary>, MemoryError>;
}

/// 长期记忆门面：存储 + 可选相似度检索后端
pub struct LongTermMemory {
    store: Arc<dyn ConversationStore>,
    vector: Option<(Arc<dyn VectorIndex>, Arc<dyn EmbeddingProvider>)>,
    keyword: Option<Arc<KeywordIndex>>,
}

impl LongTermMemory {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self {
            store,
            vector: None,
            keyword: None,
        }
    }

    /// 配置向量检索后端（索引 + 嵌入提供方）
    pub fn with_vector_backend(
        mut self,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        self.vector = Some((index, embedder));
        self
    }

    /// 配置关键词退化检索（无嵌入时使用）
    pub fn with_keyword_fallback(mut self, index: Arc<KeywordIndex>) -> Self {
        self.keyword = Some(index);
        self
    }

    /// 是否配置了任一检索后端
    pub fn search_enabled(&self) -> bool {
        self.vector.is_some() || self.keyword.is_some()
    }

    /// 保存会话并同步写入检索索引；索引失败仅记日志，不影响保存结果
    pub async fn save(
        &self,
        conversation_id: &str,
        messages: Vec<Message>,
        metadata: HashMap<String, String>,
    ) -> Result<(), MemoryError> {
        let record = MemoryRecord::new(conversation_id, messages, metadata);
        let indexable: Vec<String> = record
            .messages
            .iter()
            .filter(|m| !m.content.trim().is_empty())
            .map(|m| m.content.clone())
            .collect();
        self.store.save(record).await?;

        // 覆盖保存时重建索引条目
        if let Some((index, embedder)) = &self.vector {
            index.remove_conversation(conversation_id);
            for text in &indexable {
                match embedder.embed(text).await {
                    Ok(embedding) if !embedding.is_empty() => {
                        index.add(conversation_id, text, embedding);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("embedding failed, entry not indexed: {}", e);
                    }
                }
            }
        }
        if let Some(keyword) = &self.keyword {
            keyword.remove_conversation(conversation_id);
            for text in &indexable {
                keyword.add(conversation_id, text);
            }
        }
        Ok(())
    }

    pub async fn load(&self, conversation_id: &str) -> Result<Option<MemoryRecord>, MemoryError> {
        self.store.load(conversation_id).await
    }

    pub async fn delete(&self, conversation_id: &str) -> Result<bool, MemoryError> {
        if let Some((index, _)) = &self.vector {
            index.remove_conversation(conversation_id);
        }
        if let Some(keyword) = &self.keyword {
            keyword.remove_conversation(conversation_id);
        }
        self.store.delete(conversation_id).await
    }

    pub async fn list(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RecordSummary>, MemoryError> {
        self.store.list(limit, offset).await
    }

    /// 相似度检索：向量后端优先，其次关键词；两者皆无时返回空
    pub async fn search_similar(
        &self,
        query: &str,
        top_k: usize,
        conversation_id: Option<&str>,
    ) -> Vec<SimilarMatch> {
        if let Some((index, embedder)) = &self.vector {
            match embedder.embed(query).await {
                Ok(embedding) if !embedding.is_empty() => {
                    return index.search(&embedding, top_k, conversation_id);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("query embedding failed, falling back: {}", e);
                }
            }
        }
        if let Some(keyword) = &self.keyword {
            return keyword.search(query, top_k, conversation_id);
        }
        Vec::new()
    }
}
