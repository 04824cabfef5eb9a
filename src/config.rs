use std::env;

/// Environment variable overriding the interactive prompt.
pub const PROMPT_VAR: &str = "MINISH_PROMPT";
/// Environment variable selecting per-command assignment scope when set to `1`/`true`.
pub const SCOPED_ASSIGNMENTS_VAR: &str = "MINISH_SCOPED_ASSIGNMENTS";

const DEFAULT_PROMPT: &str = "$ ";

/// Lifetime of `NAME=value` prefixes on a command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AssignmentScope {
    /// Assignments stay in the session table after the line runs.
    #[default]
    Session,
    /// Assignments are visible while the line runs and discarded afterwards.
    Command,
}

/// Settings for an interpreter session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    /// Printed before every line read interactively.
    pub prompt: String,

    /// See [`AssignmentScope`].
    pub assignment_scope: AssignmentScope,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            assignment_scope: AssignmentScope::Session,
        }
    }
}

impl ShellConfig {
    /// Defaults, overridden by `MINISH_PROMPT` and `MINISH_SCOPED_ASSIGNMENTS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(prompt) = lookup(PROMPT_VAR) {
            config.prompt = prompt;
        }
        if let Some(value) = lookup(SCOPED_ASSIGNMENTS_VAR) {
            match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => config.assignment_scope = AssignmentScope::Command,
                "" | "0" | "false" | "no" => {}
                other => log::warn!("ignoring {}={:?}", SCOPED_ASSIGNMENTS_VAR, other),
            }
        }
        config
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_assignment_scope(mut self, scope: AssignmentScope) -> Self {
        self.assignment_scope = scope;
        self
    }
}
