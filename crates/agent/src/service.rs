//! The agent service: drives the session state machine using the LLM
//! port, the MCP broker, and (optionally) an event bus.

use serde_json::Value;
use stepwise_domain::agent::{AgentEvent, AgentEventType, AgentSession, AgentState, Decision, TraceEntry};
use stepwise_llm::{LlmPort, LlmRequest};
use stepwise_mcp::McpBroker;

use crate::event_bus::EventPublisher;
use crate::planner::Planner;
use crate::prompt_registry::PromptRegistry;
use crate::session;

/// The service never raises to its caller; every path returns a final
/// observation string plus the trace accumulated so far.
pub struct AgentOutcome {
    pub final_observation: String,
    pub trace: Vec<TraceEntry>,
}

/// Run the agent loop to completion (or exhaustion) against `session`.
///
/// Mirrors the spec's 4.8 algorithm: initialize tools_meta, loop
/// plan/act/summarise while budget remains, and fall back to an ERROR
/// outcome on any unexpected failure rather than propagating it.
pub async fn run(
    session: &mut AgentSession,
    llm: &dyn LlmPort,
    broker: &McpBroker,
    prompts: &PromptRegistry,
    events: Option<&EventPublisher>,
) -> AgentOutcome {
    session::start(session);

    if session.tools_meta.is_empty() {
        session.tools_meta = broker.tool_descriptors().await;
    }

    if let Some(pub_) = events {
        pub_.publish(AgentEvent::new(AgentEventType::SessionStarted, None)).await;
    }

    let planner = Planner::new(llm, prompts);
    let mut final_observation = String::new();

    while !session.state.is_terminal() && session.step_index < session.max_steps {
        match run_step(session, &planner, llm, broker, events).await {
            Ok(StepOutcome::Continue(observation)) => final_observation = observation,
            Ok(StepOutcome::GoalCompleted) => {
                session.trace.push(TraceEntry {
                    plan: session.last_decision.clone().unwrap_or(Decision::GoalReached {}),
                    act: None,
                    observation: "Planning indicated completion.".into(),
                });
                session.state = AgentState::Done;
                break;
            }
            Err(message) => {
                session::on_error(session);
                if let Some(pub_) = events {
                    pub_.publish(AgentEvent::new(
                        AgentEventType::Error,
                        Some(serde_json::json!({ "message": message })),
                    ))
                    .await;
                }
                return AgentOutcome {
                    final_observation: format!("Agent error: {message}"),
                    trace: session.trace.clone(),
                };
            }
        }
    }

    AgentOutcome {
        final_observation,
        trace: session.trace.clone(),
    }
}

enum StepOutcome {
    Continue(String),
    GoalCompleted,
}

async fn run_step(
    session: &mut AgentSession,
    planner: &Planner<'_>,
    llm: &dyn LlmPort,
    broker: &McpBroker,
    events: Option<&EventPublisher>,
) -> Result<StepOutcome, String> {
    if let Some(pub_) = events {
        pub_.publish(AgentEvent::new(AgentEventType::PlanningStarted, None)).await;
    }

    let context_note = session
        .trace
        .last()
        .map(|entry| format!("Previous step observation: {}", entry.observation))
        .unwrap_or_default();

    let decision = planner
        .plan(session, &context_note)
        .await
        .map_err(|e| e.to_string())?;

    if let Some(pub_) = events {
        pub_.publish(AgentEvent::new(
            AgentEventType::PlanGenerated,
            Some(serde_json::json!({ "decision": &decision })),
        ))
        .await;
    }

    if matches!(decision, Decision::GoalReached {} | Decision::Terminate { .. }) {
        session.last_decision = Some(decision);
        return Ok(StepOutcome::GoalCompleted);
    }

    session::on_planned(session, decision.clone());

    if let Some(pub_) = events {
        pub_.publish(AgentEvent::new(AgentEventType::ExecutionStepStarted, None)).await;
    }

    let (tool_name, arguments) = match &decision {
        Decision::Call { tool_name, arguments } => (tool_name.clone(), arguments.clone()),
        _ => unreachable!("GoalReached/Terminate handled above"),
    };

    let observation = call_tool_as_text(broker, &tool_name, arguments).await;

    if let Some(pub_) = events {
        pub_.publish(AgentEvent::new(AgentEventType::ExecutionStepCompleted, None)).await;
    }

    session::on_executed(session, observation.clone());

    let summary = summarise_step(llm, planner.prompts(), &tool_name, &observation)
        .await
        .unwrap_or(observation.clone());

    if let Some(pub_) = events {
        pub_.publish(AgentEvent::new(
            AgentEventType::SummaryReceived,
            Some(serde_json::json!({ "summary": &summary })),
        ))
        .await;
    }

    session.trace.push(TraceEntry {
        plan: decision,
        act: Some(stepwise_domain::agent::ToolCallResult::text(observation)),
        observation: summary.clone(),
    });

    session::on_summarised(session);

    // Safety net: preserve forward progress even if a lifecycle variant
    // left the session DONE with budget remaining.
    if session.state == AgentState::Done && session.step_index < session.max_steps {
        tracing::warn!(
            step_index = session.step_index,
            max_steps = session.max_steps,
            "session reached Done with budget remaining after summarise; forcing back to Planning"
        );
        session.state = AgentState::Planning;
    }

    Ok(StepOutcome::Continue(summary))
}

async fn call_tool_as_text(broker: &McpBroker, tool_name: &str, arguments: Value) -> String {
    match broker.call_tool(tool_name, arguments).await {
        Ok(result) => extract_text(&result),
        Err(e) => format!("tool call failed: {e}"),
    }
}

/// Per the broker contract: if `content` is a list of parts, return the
/// `text` field of the first part (or its string form); otherwise return
/// the stringified content.
fn extract_text(result: &stepwise_mcp::protocol::ToolCallResult) -> String {
    match result.content.first() {
        Some(part) if !part.text.is_empty() => part.text.clone(),
        Some(part) => part.content_type.clone(),
        None => String::new(),
    }
}

async fn summarise_step(
    llm: &dyn LlmPort,
    prompts: &PromptRegistry,
    tool_name: &str,
    observation: &str,
) -> Option<String> {
    let mut vars = std::collections::HashMap::new();
    vars.insert("tool_name".to_string(), tool_name.to_string());
    vars.insert("arguments".to_string(), String::new());
    vars.insert("observation".to_string(), observation.to_string());
    let prompt = prompts.render_latest("step_summary", &vars).ok()?;

    llm.call(LlmRequest {
        prompt,
        ..Default::default()
    })
    .await
    .ok()
}
