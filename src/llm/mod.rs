//! 完成服务客户端抽象与实现（OpenAI 兼容 / Mock）、嵌入 API

pub mod embedding;
pub mod mock;
pub mod openai;
pub mod traits;

pub use embedding::{create_embedder_from_config, EmbeddingProvider, OpenAiEmbedder};
pub use mock::MockChatClient;
pub use openai::{OpenAiChatClient, TokenUsage};
pub use traits::{
    ChatClient, ChatDelta, ChatOutcome, ChatStream, LlmError, ToolCallRequest, ToolSchema,
};
