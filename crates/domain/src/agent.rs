//! Core data model for the agent loop: state machine, planner decisions,
//! tool descriptors, and the append-only run trace.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of a single agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Planning,
    Executing,
    Summarising,
    Done,
    Error,
}

impl AgentState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AgentState::Done | AgentState::Error)
    }
}

/// A decision returned by the planner for one step.
///
/// Exactly one variant; a planner response that doesn't parse into one of
/// these is a `PlannerParse` error, not a variant of this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Call {
        tool_name: String,
        arguments: Value,
    },
    GoalReached {},
    Terminate {
        reason: String,
    },
}

/// A tool advertised by some MCP server, flattened into the broker's global
/// name -> descriptor registry. `name` is unique across all connected servers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub server_id: String,
    pub transport: TransportKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Http,
    Stdio,
}

/// The result of invoking a tool: the concatenated text parts of the
/// server's structured response, plus the raw payload for callers that want
/// more than text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

impl ToolCallResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            raw: None,
        }
    }
}

/// One completed step of a run: what was planned, what happened, and how it
/// was summarised for the next planning round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub plan: Decision,
    pub act: Option<ToolCallResult>,
    pub observation: String,
}

/// A single run of the agent loop against one user prompt.
///
/// Created per run, never shared across concurrent runs, discarded once
/// `state` reaches a terminal value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSession {
    pub user_prompt: String,
    pub state: AgentState,
    pub max_steps: u32,
    pub step_index: u32,
    pub tools_meta: Vec<ToolDescriptor>,
    pub last_decision: Option<Decision>,
    pub last_observation: Option<String>,
    pub trace: Vec<TraceEntry>,
}

impl AgentSession {
    /// `max_steps` must be >= 1; the caller is expected to have validated
    /// this already (see the HTTP/WS edge handlers).
    pub fn new(user_prompt: impl Into<String>, max_steps: u32) -> Self {
        Self {
            user_prompt: user_prompt.into(),
            state: AgentState::Planning,
            max_steps: max_steps.max(1),
            step_index: 0,
            tools_meta: Vec::new(),
            last_decision: None,
            last_observation: None,
            trace: Vec::new(),
        }
    }
}

/// Event types published to a run's subscriber over the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentEventType {
    SessionStarted,
    PlanningStarted,
    ReplanningStarted,
    PlanGenerated,
    ExecutionStepStarted,
    ExecutionStepCompleted,
    SummaryReceived,
    Error,
}

/// A published event. `data` is a value type; subscribers must not assume
/// they're sharing a reference with the publisher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    #[serde(rename = "type")]
    pub event_type: AgentEventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl AgentEvent {
    pub fn new(event_type: AgentEventType, data: Option<Value>) -> Self {
        Self { event_type, data }
    }
}
