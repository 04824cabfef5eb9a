use crate::error::ResolveError;
use crate::lexer::Token;
use std::fmt;

/// Commands implemented inside the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    Echo,
    Cat,
    Wc,
    Pwd,
    Cd,
    Ls,
    Grep,
    Exit,
}

impl BuiltinKind {
    /// Look up a builtin by the name used to invoke it.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "echo" => Self::Echo,
            "cat" => Self::Cat,
            "wc" => Self::Wc,
            "pwd" => Self::Pwd,
            "cd" => Self::Cd,
            "ls" => Self::Ls,
            "grep" => Self::Grep,
            "exit" => Self::Exit,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Echo => "echo",
            Self::Cat => "cat",
            Self::Wc => "wc",
            Self::Pwd => "pwd",
            Self::Cd => "cd",
            Self::Ls => "ls",
            Self::Grep => "grep",
            Self::Exit => "exit",
        }
    }
}

/// One command of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    /// Runs in-process.
    Builtin { kind: BuiltinKind, args: Vec<String> },
    /// Runs as a child process. `program` is looked up in `PATH` unless it
    /// contains a path separator.
    External { program: String, args: Vec<String> },
}

impl Stage {
    /// Name the stage was invoked by.
    pub fn name(&self) -> &str {
        match self {
            Stage::Builtin { kind, .. } => kind.name(),
            Stage::External { program, .. } => program,
        }
    }

    fn from_words(mut words: Vec<String>) -> Result<Self, ResolveError> {
        if words.is_empty() {
            return Err(ResolveError::EmptyCommand);
        }
        let name = words.remove(0);
        Ok(match BuiltinKind::from_name(&name) {
            Some(kind) => Stage::Builtin { kind, args: words },
            None => Stage::External {
                program: name,
                args: words,
            },
        })
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = match self {
            Stage::Builtin { args, .. } | Stage::External { args, .. } => args,
        };
        write!(f, "{}", self.name())?;
        for arg in args {
            write!(f, " {:?}", arg)?;
        }
        Ok(())
    }
}

/// Stages connected by pipes, first to last.
pub type Pipeline = Vec<Stage>;

/// Pipelines joined by `&&`: each runs only if the previous one succeeded.
pub type CommandList = Vec<Pipeline>;

/// Turn the tokens of one pipeline into its stages.
///
/// Every `|`-separated segment must contain at least one word, and `&&` is
/// rejected here; see [`resolve_list`] for conditional lists.
pub fn resolve(tokens: Vec<Token>) -> Result<Pipeline, ResolveError> {
    if tokens.is_empty() {
        return Err(ResolveError::EmptyCommand);
    }

    let mut pipeline = Vec::new();
    let mut words = Vec::new();
    for token in tokens {
        match token {
            Token::Word(w) => words.push(w),
            Token::Pipe => pipeline.push(Stage::from_words(std::mem::take(&mut words))?),
            Token::AndIf => {
                return Err(ResolveError::UnexpectedOperator(Token::AndIf.to_string()));
            }
        }
    }
    pipeline.push(Stage::from_words(words)?);

    log::debug!("resolved pipeline: {:?}", pipeline);
    Ok(pipeline)
}

/// Split tokens on `&&` and resolve every part as a pipeline.
pub fn resolve_list(tokens: Vec<Token>) -> Result<CommandList, ResolveError> {
    let mut list = Vec::new();
    let mut part = Vec::new();
    for token in tokens {
        if token == Token::AndIf {
            list.push(resolve(std::mem::take(&mut part))?);
        } else {
            part.push(token);
        }
    }
    list.push(resolve(part)?);
    Ok(list)
}
