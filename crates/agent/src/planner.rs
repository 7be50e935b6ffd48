//! Builds planning prompts, calls the LLM in JSON mode, and parses the
//! resulting decision.

use std::collections::HashMap;

use serde_json::Value;
use stepwise_domain::agent::{AgentSession, Decision};
use stepwise_domain::error::{Error, Result};
use stepwise_llm::{LlmPort, LlmRequest};

use crate::prompt_registry::PromptRegistry;

/// A tool the session's active goal has pre-selected. When present the
/// planner runs in Mode B: it only fills arguments, and the resulting
/// decision's tool name is force-set to this regardless of model output.
///
/// This is a supplemental field (see DESIGN.md) not named by the core
/// planner spec, grounded in the original goal-directed planning mode.
#[derive(Debug, Clone)]
pub struct PreselectedTool {
    pub tool_name: String,
}

/// Context carried across a re-plan: the tool/argument pairs already
/// executed this session, so the planner can be told not to repeat them.
#[derive(Debug, Clone, Default)]
pub struct ExecutedPair {
    pub tool_name: String,
    pub arguments: Value,
}

pub struct Planner<'a> {
    llm: &'a dyn LlmPort,
    prompts: &'a PromptRegistry,
}

impl<'a> Planner<'a> {
    pub fn new(llm: &'a dyn LlmPort, prompts: &'a PromptRegistry) -> Self {
        Self { llm, prompts }
    }

    pub fn prompts(&self) -> &'a PromptRegistry {
        self.prompts
    }

    /// Mode A: build the full planning prompt from session state and call
    /// the LLM. `context_note` is empty on step 0; otherwise it should
    /// summarise the previous tool/result and the anti-repeat/termination
    /// policy per the `planning` v2 template.
    pub async fn plan(&self, session: &AgentSession, context_note: &str) -> Result<Decision> {
        let system = self
            .prompts
            .render_latest("system", &HashMap::new())
            .unwrap_or_default();

        let mut vars = HashMap::new();
        vars.insert("goal".to_string(), session.user_prompt.clone());
        vars.insert("step_index".to_string(), session.step_index.to_string());
        vars.insert("context_note".to_string(), context_note.to_string());
        let user_prompt = self.prompts.render_latest("planning", &vars)?;

        let raw = self
            .llm
            .call(LlmRequest {
                prompt: user_prompt,
                system_prompt: Some(system),
                json_mode: true,
                ..Default::default()
            })
            .await?;

        parse_decision(&raw)
    }

    /// Mode B: the goal has already chosen a tool; only ask the model to
    /// fill in arguments, then force the decision's tool name regardless
    /// of what the model returned.
    pub async fn plan_with_preselected_tool(
        &self,
        session: &AgentSession,
        preselected: &PreselectedTool,
    ) -> Result<Decision> {
        let decision = self.plan(session, "").await?;
        Ok(match decision {
            Decision::Call { arguments, .. } => Decision::Call {
                tool_name: preselected.tool_name.clone(),
                arguments,
            },
            other => other,
        })
    }

    /// Re-invoke the planner after a summary indicates the step did not
    /// make progress. `already_executed` is checked so the planner never
    /// proposes a (tool, args) pair it has already tried.
    pub async fn replan(
        &self,
        session: &AgentSession,
        latest_summary: &str,
        already_executed: &[ExecutedPair],
    ) -> Result<Decision> {
        let context_note = format!(
            "Previous attempt did not complete the goal. Latest summary: {latest_summary}. \
             Already tried: {}",
            already_executed
                .iter()
                .map(|p| format!("{}({})", p.tool_name, p.arguments))
                .collect::<Vec<_>>()
                .join("; ")
        );

        let decision = self.plan(session, &context_note).await?;

        if let Decision::Call { tool_name, arguments } = &decision {
            let repeats = already_executed
                .iter()
                .any(|p| &p.tool_name == tool_name && &p.arguments == arguments);
            if repeats {
                return Err(Error::PlannerParse(format!(
                    "planner repeated an already-executed call: {tool_name}"
                )));
            }
        }

        Ok(decision)
    }
}

/// Parse and validate a decision from the planner's raw JSON output.
///
/// Exactly one of `call_function` (string), `goal_reached` (true), or
/// `terminate` (true, with a `reason` string) must be present. Any parse
/// or shape failure maps to [`Error::PlannerParse`].
pub fn parse_decision(raw: &str) -> Result<Decision> {
    let value: Value = serde_json::from_str(raw).map_err(|e| Error::PlannerParse(e.to_string()))?;

    let obj = value
        .as_object()
        .ok_or_else(|| Error::PlannerParse("decision is not a JSON object".into()))?;

    let has_call = obj.get("call_function").and_then(Value::as_str).is_some();
    let has_goal_reached = obj.get("goal_reached").and_then(Value::as_bool).unwrap_or(false);
    let has_terminate = obj.get("terminate").and_then(Value::as_bool).unwrap_or(false);

    let variant_count = [has_call, has_goal_reached, has_terminate].iter().filter(|b| **b).count();
    if variant_count != 1 {
        return Err(Error::PlannerParse(format!(
            "decision must set exactly one of call_function/goal_reached/terminate, got {variant_count}"
        )));
    }

    if has_call {
        let tool_name = obj.get("call_function").and_then(Value::as_str).unwrap().to_string();
        let arguments = obj.get("arguments").cloned().unwrap_or_else(|| Value::Object(Default::default()));
        return Ok(Decision::Call { tool_name, arguments });
    }

    if has_goal_reached {
        return Ok(Decision::GoalReached {});
    }

    let reason = obj
        .get("reason")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::PlannerParse("terminate decision missing 'reason'".into()))?
        .to_string();
    Ok(Decision::Terminate { reason })
}
