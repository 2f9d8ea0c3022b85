//! 相似度检索后端
//!
//! VectorIndex trait + 内存余弦相似度实现；未配置嵌入时可退化为
//! KeywordIndex（分词 + Jaccard），保证 search_similar 永远可用。
//! 排序规则：相似度降序，同分时较新的条目在前。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::memory::tokenizer;

/// 一条检索命中
#[derive(Debug, Clone)]
pub struct SimilarMatch {
    pub conversation_id: String,
    pub text: String,
    /// 相似度分数（余弦或 Jaccard，均为越大越相似）
    pub score: f32,
}

/// 向量索引 trait：按会话写入文本向量，按查询向量检索
pub trait VectorIndex: Send + Sync {
    /// 写入一段文本及其向量
    fn add(&self, conversation_id: &str, text: &str, embedding: Vec<f32>);

    /// 删除某会话的全部条目
    fn remove_conversation(&self, conversation_id: &str);

    /// 检索 top_k；conversation_id 给定时仅在该会话内检索
    fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        conversation_id: Option<&str>,
    ) -> Vec<SimilarMatch>;
}

/// 余弦相似度
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// 索引条目：seq 单调递增，用于同分时按较新优先排序
struct VectorEntry {
    seq: u64,
    conversation_id: String,
    text: String,
    embedding: Vec<f32>,
}

/// 内存向量索引：线性扫描 + 余弦相似度，超出 max_entries 时淘汰最旧条目
pub struct InMemoryVectorIndex {
    entries: RwLock<Vec<VectorEntry>>,
    next_seq: AtomicU64,
    max_entries: usize,
}

impl InMemoryVectorIndex {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            next_seq: AtomicU64::new(0),
            max_entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryVectorIndex {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl VectorIndex for InMemoryVectorIndex {
    fn add(&self, conversation_id: &str, text: &str, embedding: Vec<f32>) {
        let text = text.trim();
        if text.is_empty() || embedding.is_empty() {
            return;
        }
        let mut entries = self.entries.write().unwrap();
        entries.push(VectorEntry {
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            conversation_id: conversation_id.to_string(),
            text: text.to_string(),
            embedding,
        });
        let n = entries.len();
        if n > self.max_entries {
            entries.drain(0..n - self.max_entries);
        }
    }

    fn remove_conversation(&self, conversation_id: &str) {
        self.entries
            .write()
            .unwrap()
            .retain(|e| e.conversation_id != conversation_id);
    }

    fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        conversation_id: Option<&str>,
    ) -> Vec<SimilarMatch> {
        if query_embedding.is_empty() || top_k == 0 {
            return Vec::new();
        }
        let entries = self.entries.read().unwrap();
        let mut scored: Vec<(f32, u64, &VectorEntry)> = entries
            .iter()
            .filter(|e| conversation_id.is_none_or(|cid| e.conversation_id == cid))
            .map(|e| (cosine_similarity(query_embedding, &e.embedding), e.seq, e))
            .filter(|(score, _, _)| *score > 0.0)
            .collect();
        // 分数降序；同分时 seq 大（较新）在前
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.1.cmp(&a.1))
        });
        scored
            .into_iter()
            .take(top_k)
            .map(|(score, _, e)| SimilarMatch {
                conversation_id: e.conversation_id.clone(),
                text: e.text.clone(),
                score,
            })
            .collect()
    }
}

/// 关键词索引：无嵌入后端时的退化实现（分词 + Jaccard 相似度）
pub struct KeywordIndex {
    entries: RwLock<Vec<KeywordEntry>>,
    next_seq: AtomicU64,
    max_entries: usize,
}

struct KeywordEntry {
    seq: u64,
    conversation_id: String,
    text: String,
    tokens: std::collections::HashSet<String>,
}

impl KeywordIndex {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            next_seq: AtomicU64::new(0),
            max_entries,
        }
    }

    pub fn add(&self, conversation_id: &str, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let tokens = tokenizer::tokenize_to_set(text);
        let mut entries = self.entries.write().unwrap();
        entries.push(KeywordEntry {
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            conversation_id: conversation_id.to_string(),
            text: text.to_string(),
            tokens,
        });
        let n = entries.len();
        if n > self.max_entries {
            entries.drain(0..n - self.max_entries);
        }
    }

    pub fn remove_conversation(&self, conversation_id: &str) {
        self.entries
            .write()
            .unwrap()
            .retain(|e| e.conversation_id != conversation_id);
    }

    pub fn search(
        &self,
        query: &str,
        top_k: usize,
        conversation_id: Option<&str>,
    ) -> Vec<SimilarMatch> {
        let query_tokens = tokenizer::tokenize_to_set(query);
        if query_tokens.is_empty() || top_k == 0 {
            return Vec::new();
        }
        let entries = self.entries.read().unwrap();
        let mut scored: Vec<(f32, u64, &KeywordEntry)> = entries
            .iter()
            .filter(|e| conversation_id.is_none_or(|cid| e.conversation_id == cid))
            .map(|e| {
                (
                    tokenizer::jaccard_similarity(&query_tokens, &e.tokens),
                    e.seq,
                    e,
                )
            })
            .filter(|(score, _, _)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.1.cmp(&a.1))
        });
        scored
            .into_iter()
            .take(top_k)
            .map(|(score, _, e)| SimilarMatch {
                conversation_id: e.conversation_id.clone(),
                text: e.text.clone(),
                score,
            })
            .collect()
    }
}

impl Default for KeywordIndex {
    fn default() -> Self {
        Self::new(10_000)
    }
}
