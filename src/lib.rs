//! A minimal command interpreter.
//!
//! A line of input is tokenized (quotes, `$NAME` expansion and leading
//! `NAME=value` assignments), resolved into a pipeline of builtin and
//! external stages, and executed with every stage connected to the next by
//! an OS pipe. Builtins (`echo`, `cat`, `wc`, `pwd`, `cd`, `ls`, `grep`,
//! `exit`) run inside the interpreter; anything else is launched as a child
//! process found through `PATH`.
//!
//! The main entry point is [`Interpreter`]. The [`command`] and [`stream`]
//! modules expose the stream endpoints stages read from and write to, so the
//! interpreter can be driven from memory as well as from a terminal.

mod builtin;
pub mod command;
pub mod config;
pub mod env;
pub mod error;
pub mod executor;
pub mod external;
mod interpreter;
pub mod lexer;
pub mod parser;
pub mod stream;

pub use command::{ExitCode, Input, Output};
pub use config::{AssignmentScope, ShellConfig};
pub use env::Environment;
pub use error::{ResolveError, ShellError};
pub use interpreter::{Flow, Interpreter, SYNTAX_ERROR};
pub use stream::{Captured, Diagnostics, InheritedStdin, MemReader, MemWriter};
