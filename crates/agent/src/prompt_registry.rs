//! Prompt registry: versioned planner/summariser templates with strict
//! required-variable validation.

use std::collections::{HashMap, HashSet};

use stepwise_domain::error::{Error, Result};

/// Whether a template renders the system preamble or a user-turn message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    System,
    User,
}

/// A versioned prompt template.
#[derive(Debug, Clone)]
pub struct PromptSpec {
    pub kind: PromptKind,
    pub template: String,
    pub required_vars: Vec<String>,
    pub json_mode: bool,
}

impl PromptSpec {
    pub fn new(
        kind: PromptKind,
        template: impl Into<String>,
        required_vars: impl IntoIterator<Item = &'static str>,
        json_mode: bool,
    ) -> Self {
        Self {
            kind,
            template: template.into(),
            required_vars: required_vars.into_iter().map(String::from).collect(),
            json_mode,
        }
    }

    /// Render the template, substituting `{var}` placeholders.
    ///
    /// Fails with [`Error::Config`] (MissingVars) if `required_vars` is not a
    /// subset of the keys in `vars`.
    pub fn render(&self, vars: &HashMap<String, String>) -> Result<String> {
        let provided: HashSet<&str> = vars.keys().map(String::as_str).collect();
        let missing: Vec<&str> = self
            .required_vars
            .iter()
            .map(String::as_str)
            .filter(|v| !provided.contains(v))
            .collect();

        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "prompt template missing required variables: {}",
                missing.join(", ")
            )));
        }

        let mut out = self.template.clone();
        for (key, value) in vars {
            out = out.replace(&format!("{{{key}}}"), value);
        }
        Ok(out)
    }
}

/// Keyed store of (template_id, version) -> [`PromptSpec`]. Immutable after
/// startup: `register` is the only mutator and rejects duplicates.
#[derive(Default)]
pub struct PromptRegistry {
    specs: HashMap<(String, u32), PromptSpec>,
}

impl PromptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template under `(id, version)`. Fails if that key already
    /// exists — duplicate registration is a startup-time programmer error.
    pub fn register(&mut self, id: impl Into<String>, version: u32, spec: PromptSpec) -> Result<()> {
        let key = (id.into(), version);
        if self.specs.contains_key(&key) {
            return Err(Error::Config(format!(
                "duplicate prompt registration: {}@{}",
                key.0, key.1
            )));
        }
        self.specs.insert(key, spec);
        Ok(())
    }

    /// Fetch a specific (id, version) pair.
    pub fn get(&self, id: &str, version: u32) -> Option<&PromptSpec> {
        self.specs.get(&(id.to_string(), version))
    }

    /// Fetch the highest registered version for `id`.
    pub fn latest(&self, id: &str) -> Option<&PromptSpec> {
        self.specs
            .iter()
            .filter(|((spec_id, _), _)| spec_id == id)
            .max_by_key(|((_, version), _)| *version)
            .map(|(_, spec)| spec)
    }

    /// Render the highest version of `id` with `vars`.
    pub fn render_latest(&self, id: &str, vars: &HashMap<String, String>) -> Result<String> {
        let spec = self
            .latest(id)
            .ok_or_else(|| Error::Config(format!("no prompt registered for id '{id}'")))?;
        spec.render(vars)
    }
}

/// Build the registry populated with the runtime's built-in templates:
/// `planning` v1/v2, `goal_decomposition` v1, `step_summary` v1, `system` v1.
pub fn builtin_registry() -> PromptRegistry {
    let mut registry = PromptRegistry::new();

    registry
        .register(
            "system",
            1,
            PromptSpec::new(
                PromptKind::System,
                "You are an autonomous agent that accomplishes goals by calling tools. \
                 Respond only with a single JSON object describing your next decision.",
                [],
                false,
            ),
        )
        .expect("builtin prompt registration must not collide");

    registry
        .register(
            "planning",
            1,
            PromptSpec::new(
                PromptKind::User,
                "Goal: {goal}\nStep: {step_index}\nRespond with a JSON decision.",
                ["goal", "step_index"],
                true,
            ),
        )
        .expect("builtin prompt registration must not collide");

    registry
        .register(
            "planning",
            2,
            PromptSpec::new(
                PromptKind::User,
                "Goal: {goal}\nStep: {step_index}\n{context_note}\n\
                 Policy: do not repeat a (tool, arguments) pair you have already tried. \
                 If a precondition for the goal cannot be met, return terminate. \
                 If the goal has been reached, return goal_reached. \
                 Respond with a single JSON decision object.",
                ["goal", "step_index", "context_note"],
                true,
            ),
        )
        .expect("builtin prompt registration must not collide");

    registry
        .register(
            "goal_decomposition",
            1,
            PromptSpec::new(
                PromptKind::User,
                "Goal: {goal}\nDecompose this goal into an ordered list of subgoals.",
                ["goal"],
                true,
            ),
        )
        .expect("builtin prompt registration must not collide");

    registry
        .register(
            "step_summary",
            1,
            PromptSpec::new(
                PromptKind::User,
                "Tool: {tool_name}\nArguments: {arguments}\nObservation: {observation}\n\
                 Summarise the outcome of this step in one or two sentences.",
                ["tool_name", "arguments", "observation"],
                false,
            ),
        )
        .expect("builtin prompt registration must not collide");

    registry
}
