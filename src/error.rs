use std::io;

/// Session-level failures.
///
/// These signal that the interpreter itself can no longer make progress
/// (the OS refused a pipe or a process), as opposed to a stage failing,
/// which is reported through its exit code.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("failed to create pipe: {0}")]
    Pipe(#[source] io::Error),

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read input: {0}")]
    Read(#[source] io::Error),

    #[error("write failed: {0}")]
    Write(#[source] io::Error),

    #[error("line editor error: {0}")]
    Readline(#[from] rustyline::error::ReadlineError),
}

/// Errors produced while turning tokens into stages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("syntax error: empty command")]
    EmptyCommand,

    #[error("syntax error near unexpected token `{0}'")]
    UnexpectedOperator(String),
}
