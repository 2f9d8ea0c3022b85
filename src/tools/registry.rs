//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema /
//! execute），由 ToolRegistry 按名注册与分发。注册时校验：名称非空、
//! 不与已注册工具重名（除非显式允许覆盖）、schema 必须是 object 类型。
//! 注册表启动后以读为主，动态注册走 RwLock 写端（单写多读）。

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::core::AgentError;
use crate::llm::ToolSchema;

/// 工具 trait：名称、描述（供模型理解）、参数 schema、异步执行（args 为 JSON 对象）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名（注册表内唯一）
    fn name(&self) -> &str;

    /// 工具描述（供模型理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认返回无参数的空 object
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具；Err 文本会被包装为 ToolExecutionFailed
    async fn execute(&self, args: Value) -> Result<String, String>;
}

/// 函数式工具：把一个异步闭包包装成 Tool（按名调用任意能力的统一契约）
pub struct FunctionTool<F> {
    name: String,
    description: String,
    schema: Value,
    handler: F,
}

impl<F, Fut> FunctionTool<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<String, String>> + Send,
{
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        handler: F,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            handler,
        }
    }
}

#[async_trait]
impl<F, Fut> Tool for FunctionTool<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<String, String>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        (self.handler)(args).await
    }
}

/// schema 合法性：必须是 JSON 对象且 type 为 "object"
fn is_valid_object_schema(schema: &Value) -> bool {
    schema.is_object() && schema.get("type").and_then(|t| t.as_str()) == Some("object")
}

/// 工具注册表：按名称存储 Arc<dyn Tool>，可在多个引擎间共享
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    /// 插入顺序，list_schemas 按注册顺序输出
    order: RwLock<Vec<String>>,
    allow_override: bool,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 允许同名重复注册（后注册者覆盖）
    pub fn with_override(mut self, allow: bool) -> Self {
        self.allow_override = allow;
        self
    }

    /// 注册工具；名称为空、重名（未允许覆盖）或 schema 非法时失败，注册表不变
    pub fn register(&self, tool: impl Tool + 'static) -> Result<(), AgentError> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&self, tool: Arc<dyn Tool>) -> Result<(), AgentError> {
        let name = tool.name().to_string();
        if name.trim().is_empty() {
            return Err(AgentError::Validation(
                "tool name must not be empty".to_string(),
            ));
        }
        if !is_valid_object_schema(&tool.parameters_schema()) {
            return Err(AgentError::Validation(format!(
                "tool '{}' has an invalid parameters schema (object schema required)",
                name
            )));
        }
        let mut tools = self.tools.write().unwrap();
        if tools.contains_key(&name) {
            if !self.allow_override {
                return Err(AgentError::Validation(format!(
                    "tool '{}' is already registered",
                    name
                )));
            }
        } else {
            self.order.write().unwrap().push(name.clone());
        }
        tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().unwrap().get(name).cloned()
    }

    /// 执行指定工具；未注册返回 ToolNotFound，工具失败转为 ToolExecutionFailed
    pub async fn execute(&self, name: &str, args: Value) -> Result<String, AgentError> {
        // 先取出 Arc 再 await，避免跨 await 持锁
        let tool = self
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;
        tool.execute(args)
            .await
            .map_err(AgentError::ToolExecutionFailed)
    }

    /// 按注册顺序输出全部工具 schema，用于构建完成服务的工具调用契约
    pub fn list_schemas(&self) -> Vec<ToolSchema> {
        let tools = self.tools.read().unwrap();
        self.order
            .read()
            .unwrap()
            .iter()
            .filter_map(|name| tools.get(name))
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.order.read().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.tools.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
