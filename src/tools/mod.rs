//! 工具箱：Tool trait、注册表、执行器与内置演示工具

pub mod builtin;
pub mod executor;
pub mod registry;
pub mod schema;

pub use builtin::{ClockTool, EchoTool};
pub use executor::{ToolCallRecord, ToolExecutor};
pub use registry::{FunctionTool, Tool, ToolRegistry};
pub use schema::tool_call_schema_json;
