pub mod agent;
pub mod capability;
pub mod config;
pub mod error;
pub mod stream;
pub mod tool;

pub use agent::{
    AgentEvent, AgentEventType, AgentSession, AgentState, Decision, ToolCallResult,
    ToolDescriptor, TraceEntry, TransportKind,
};
pub use capability::{LlmCapabilities, ModelRole, ToolSupport};
pub use config::{Config, ConfigError, ConfigSeverity};
pub use error::{Error, Result};
pub use stream::{BoxStream, StreamEvent, Usage};
pub use tool::{ContentPart, Message, MessageContent, Role, ToolCall, ToolDefinition};
