//! Pure state-machine transitions over [`AgentSession`].
//!
//! No side effects, no I/O, no suspension points: callers drive the
//! transitions, the transitions only validate and mutate in-memory state.
//! An illegal transition is a programmer error, not a recoverable one, so
//! these functions panic in debug builds via `debug_assert!` rather than
//! returning a `Result` the caller is tempted to paper over.

use stepwise_domain::agent::{AgentSession, AgentState, Decision};

/// Move a freshly-constructed session into PLANNING. A no-op beyond the
/// assertion since `AgentSession::new` already starts in PLANNING.
pub fn start(session: &mut AgentSession) {
    debug_assert_eq!(session.state, AgentState::Planning, "start() called on a non-initial session");
}

/// PLANNING -> EXECUTING (Call) or PLANNING -> DONE (GoalReached/Terminate).
pub fn on_planned(session: &mut AgentSession, decision: Decision) {
    debug_assert_eq!(session.state, AgentState::Planning, "on_planned called outside PLANNING");

    session.state = match &decision {
        Decision::Call { .. } => AgentState::Executing,
        Decision::GoalReached {} | Decision::Terminate { .. } => AgentState::Done,
    };
    session.last_decision = Some(decision);
}

/// EXECUTING -> SUMMARISING.
pub fn on_executed(session: &mut AgentSession, observation: impl Into<String>) {
    debug_assert_eq!(session.state, AgentState::Executing, "on_executed called outside EXECUTING");
    debug_assert!(session.last_decision.is_some(), "EXECUTING session must carry a last_decision");

    session.last_observation = Some(observation.into());
    session.state = AgentState::Summarising;
}

/// SUMMARISING -> PLANNING (if budget remains) or SUMMARISING -> DONE.
/// `step_index` increments here, and only here.
pub fn on_summarised(session: &mut AgentSession) {
    debug_assert_eq!(session.state, AgentState::Summarising, "on_summarised called outside SUMMARISING");

    session.step_index += 1;
    session.state = if session.step_index < session.max_steps {
        AgentState::Planning
    } else {
        AgentState::Done
    };
}

/// any -> ERROR.
pub fn on_error(session: &mut AgentSession) {
    session.state = AgentState::Error;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fresh() -> AgentSession {
        AgentSession::new("book a flight", 3)
    }

    #[test]
    fn on_planned_call_moves_to_executing() {
        let mut session = fresh();
        on_planned(
            &mut session,
            Decision::Call {
                tool_name: "search_flights".into(),
                arguments: json!({}),
            },
        );
        assert_eq!(session.state, AgentState::Executing);
        assert!(session.last_decision.is_some());
    }

    #[test]
    fn on_planned_goal_reached_moves_to_done() {
        let mut session = fresh();
        on_planned(&mut session, Decision::GoalReached {});
        assert_eq!(session.state, AgentState::Done);
    }

    #[test]
    fn on_planned_terminate_moves_to_done() {
        let mut session = fresh();
        on_planned(
            &mut session,
            Decision::Terminate {
                reason: "precondition unmet".into(),
            },
        );
        assert_eq!(session.state, AgentState::Done);
    }

    #[test]
    fn full_cycle_increments_step_index_once() {
        let mut session = fresh();
        on_planned(
            &mut session,
            Decision::Call {
                tool_name: "t".into(),
                arguments: json!({}),
            },
        );
        on_executed(&mut session, "observation");
        assert_eq!(session.step_index, 0);
        on_summarised(&mut session);
        assert_eq!(session.step_index, 1);
        assert_eq!(session.state, AgentState::Planning);
    }

    #[test]
    fn summarised_at_final_step_moves_to_done() {
        let mut session = AgentSession::new("goal", 1);
        on_planned(
            &mut session,
            Decision::Call {
                tool_name: "t".into(),
                arguments: json!({}),
            },
        );
        on_executed(&mut session, "obs");
        on_summarised(&mut session);
        assert_eq!(session.step_index, 1);
        assert_eq!(session.state, AgentState::Done);
    }

    #[test]
    fn on_error_is_reachable_from_any_state() {
        let mut session = fresh();
        on_error(&mut session);
        assert_eq!(session.state, AgentState::Error);
    }
}
