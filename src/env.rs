use std::collections::HashMap;
use std::env as stdenv;
use std::path::{Path, PathBuf};

/// Session state visible to every stage.
///
/// The environment contains:
/// - `vars`: variables assigned during this session. Lookups fall back to the
///   host process environment, and spawned programs receive these on top of it.
/// - `current_dir`: the working directory for relative paths and child processes.
/// - `should_exit`: set by `exit`; the read-eval step reports it to its caller.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Session variable table (e.g. set by `X=1`).
    pub vars: HashMap<String, String>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
    /// When set to true, indicates that the session should end.
    pub should_exit: bool,
}

impl Environment {
    /// Start a session in the process's current directory with an empty table.
    pub fn new() -> Self {
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::in_dir(current_dir)
    }

    /// Start a session rooted at `dir` with an empty table.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            vars: HashMap::new(),
            current_dir: dir.into(),
            should_exit: false,
        }
    }

    /// Get the value of a variable.
    ///
    /// Looks up the key in `self.vars` first, falling back to `std::env::var`.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| stdenv::var(key).ok())
    }

    /// Set or override a variable in `self.vars`.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Interpret `path` relative to the session working directory.
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.current_dir.join(path)
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::env::Environment;
    use std::path::Path;

    #[test]
    fn test_env_set_and_get_var() {
        let mut env = Environment::in_dir("/");

        // initially absent
        assert_eq!(env.get_var("SOME_RANDOM_ENV_VAR_12345"), None);

        env.set_var("KEY", "VALUE");

        assert_eq!(env.get_var("KEY"), Some("VALUE".to_string()));
    }

    #[test]
    fn test_env_reads_from_process_env() {
        let env = Environment::new();
        assert!(env.vars.is_empty());
        assert!(env.get_var("PATH").is_some());
    }

    #[test]
    fn test_session_value_shadows_process_env() {
        let mut env = Environment::new();
        env.set_var("PATH", "/nowhere");
        assert_eq!(env.get_var("PATH").as_deref(), Some("/nowhere"));
    }

    #[test]
    fn test_relative_paths_follow_current_dir() {
        let env = Environment::in_dir("/tmp/session");
        assert_eq!(env.resolve_path("a.txt"), Path::new("/tmp/session/a.txt"));
        assert_eq!(env.resolve_path("/etc/hosts"), Path::new("/etc/hosts"));
    }
}
