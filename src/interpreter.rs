use crate::command::{ExitCode, Input, Output};
use crate::config::{AssignmentScope, ShellConfig};
use crate::env::Environment;
use crate::error::ShellError;
use crate::stream::{Diagnostics, InheritedStdin};
use crate::{executor, lexer, parser};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::{self, BufRead, Write};

/// Status of a line that failed to resolve into stages.
pub const SYNTAX_ERROR: ExitCode = 2;

/// What the session loop should do after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Read the next line. Carries the status of the line just run.
    Continue(ExitCode),
    /// `exit` was run; stop reading lines.
    Exit,
}

/// A minimal shell-like interpreter that can execute built-in and external commands.
///
/// The interpreter owns the session [`Environment`] and runs one line at a
/// time through [`Interpreter::step`]. Each pipeline of the line gets fresh
/// endpoints from the `input` and `output` closures.
///
/// Example
/// ```
/// use minish::{Diagnostics, Flow, Input, Interpreter, MemReader, MemWriter, Output};
///
/// let mut sh = Interpreter::default();
/// let (_, captured) = MemWriter::with_handle();
/// let (diagnostics, _) = Diagnostics::captured();
/// let flow = sh
///     .step(
///         "echo hello | wc -w",
///         || -> Box<dyn Input> { Box::new(MemReader::empty()) },
///         || -> Box<dyn Output> { Box::new(captured.writer()) },
///         &diagnostics,
///     )
///     .unwrap();
/// assert_eq!(flow, Flow::Continue(0));
/// assert_eq!(captured.text(), "       1\n");
/// ```
pub struct Interpreter {
    env: Environment,
    config: ShellConfig,
    last_status: ExitCode,
}

impl Interpreter {
    /// Create an interpreter in the process's current directory.
    pub fn new(config: ShellConfig) -> Self {
        Self::with_env(Environment::new(), config)
    }

    /// Create an interpreter with a prepared session environment.
    pub fn with_env(env: Environment, config: ShellConfig) -> Self {
        Self {
            env,
            config,
            last_status: 0,
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    /// Status of the most recent line.
    pub fn last_status(&self) -> ExitCode {
        self.last_status
    }

    /// Run one line of input.
    ///
    /// Blank lines and lines made only of assignments succeed without running
    /// anything. A line that does not resolve prints `minish: <error>` to
    /// `diagnostics` and has status 2. Pipelines joined by `&&` run until one
    /// fails or `exit` is run.
    ///
    /// Only failures of the interpreter itself are returned as `Err`.
    pub fn step<I, O>(
        &mut self,
        line: &str,
        mut input: I,
        mut output: O,
        diagnostics: &Diagnostics,
    ) -> Result<Flow, ShellError>
    where
        I: FnMut() -> Box<dyn Input>,
        O: FnMut() -> Box<dyn Output>,
    {
        let saved_vars =
            (self.config.assignment_scope == AssignmentScope::Command).then(|| self.env.vars.clone());

        let tokens = lexer::tokenize(line, &mut self.env);
        let result = if tokens.is_empty() {
            Ok(0)
        } else {
            self.run_tokens(tokens, &mut input, &mut output, diagnostics)
        };

        if let Some(vars) = saved_vars {
            self.env.vars = vars;
        }

        self.last_status = result?;
        if self.env.should_exit {
            log::debug!("exit requested");
            Ok(Flow::Exit)
        } else {
            Ok(Flow::Continue(self.last_status))
        }
    }

    fn run_tokens(
        &mut self,
        tokens: Vec<lexer::Token>,
        input: &mut dyn FnMut() -> Box<dyn Input>,
        output: &mut dyn FnMut() -> Box<dyn Output>,
        diagnostics: &Diagnostics,
    ) -> Result<ExitCode, ShellError> {
        let list = match parser::resolve_list(tokens) {
            Ok(list) => list,
            Err(e) => {
                log::debug!("resolve failed: {}", e);
                let mut diagnostics = diagnostics.clone();
                writeln!(diagnostics, "minish: {}", e).map_err(ShellError::Write)?;
                return Ok(SYNTAX_ERROR);
            }
        };

        let mut status = 0;
        for pipeline in &list {
            status = executor::execute(pipeline, input(), output(), diagnostics, &mut self.env)?;
            if status != 0 || self.env.should_exit {
                break;
            }
        }
        Ok(status)
    }

    /// Run every line of `reader` until it ends or `exit` is run.
    ///
    /// Stages read empty input. Returns the status of the last line run.
    pub fn run_script<R, O>(
        &mut self,
        reader: R,
        mut output: O,
        diagnostics: &Diagnostics,
    ) -> Result<ExitCode, ShellError>
    where
        R: BufRead,
        O: FnMut() -> Box<dyn Output>,
    {
        for line in reader.lines() {
            let line = line.map_err(ShellError::Read)?;
            let flow = self.step(
                &line,
                || -> Box<dyn Input> { Box::new(crate::stream::MemReader::empty()) },
                &mut output,
                diagnostics,
            )?;
            if flow == Flow::Exit {
                break;
            }
        }
        Ok(self.last_status)
    }

    /// Read-Eval-Print Loop on the controlling terminal.
    ///
    /// Ctrl-C abandons the current line; Ctrl-D ends the session. Returns the
    /// status of the last line run.
    pub fn repl(&mut self) -> Result<ExitCode, ShellError> {
        // Basic example in: https://github.com/kkawakam/rustyline
        let mut rl = DefaultEditor::new()?;
        let diagnostics = Diagnostics::stderr();

        loop {
            let readline = rl.readline(&self.config.prompt);
            match readline {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        rl.add_history_entry(line.as_str())?;
                    }
                    let flow = self.step(
                        &line,
                        || -> Box<dyn Input> { Box::new(InheritedStdin::new()) },
                        || -> Box<dyn Output> { Box::new(io::stdout()) },
                        &diagnostics,
                    )?;
                    if flow == Flow::Exit {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    log::debug!("line abandoned");
                    continue;
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err.into()),
            }
        }

        Ok(self.last_status)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(ShellConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{Captured, MemReader, MemWriter};
    use std::fs;

    struct Session {
        sh: Interpreter,
        out: Captured,
        diagnostics: Diagnostics,
        errors: Captured,
    }

    impl Session {
        fn new(config: ShellConfig) -> Self {
            let (_, out) = MemWriter::with_handle();
            let (diagnostics, errors) = Diagnostics::captured();
            Self {
                sh: Interpreter::with_env(Environment::new(), config),
                out,
                diagnostics,
                errors,
            }
        }

        fn step(&mut self, line: &str) -> Flow {
            let out = self.out.clone();
            self.sh
                .step(
                    line,
                    || -> Box<dyn Input> { Box::new(MemReader::empty()) },
                    || -> Box<dyn Output> { Box::new(out.writer()) },
                    &self.diagnostics,
                )
                .unwrap()
        }
    }

    #[test]
    fn test_echo_pipe_wc_output() {
        let mut session = Session::new(ShellConfig::default());

        let flow = session.step("echo \"22\" | wc");

        assert_eq!(flow, Flow::Continue(0));
        assert_eq!(session.out.text(), "       1       1       3\n");
    }

    #[test]
    fn blank_and_assignment_only_lines_succeed() {
        let mut session = Session::new(ShellConfig::default());

        assert_eq!(session.step("   "), Flow::Continue(0));
        assert_eq!(session.step("X=1 Y=two"), Flow::Continue(0));

        assert_eq!(session.sh.env().get_var("X").as_deref(), Some("1"));
        assert_eq!(session.sh.env().get_var("Y").as_deref(), Some("two"));
        assert!(session.out.bytes().is_empty());
    }

    #[test]
    fn assignments_persist_in_session_scope() {
        let mut session = Session::new(ShellConfig::default());

        session.step("GREETING=hi echo $GREETING");
        session.step("echo $GREETING");

        assert_eq!(session.out.text(), "hi\nhi\n");
    }

    #[test]
    fn assignments_are_dropped_in_command_scope() {
        let config = ShellConfig::default().with_assignment_scope(AssignmentScope::Command);
        let mut session = Session::new(config);

        session.step("GREETING=hi echo $GREETING");
        session.step("echo [$GREETING]");

        assert_eq!(session.out.text(), "hi\n[]\n");
        assert_eq!(session.sh.env().vars.get("GREETING"), None);
    }

    #[test]
    fn command_scope_still_keeps_cd() {
        let dir = tempfile::tempdir().unwrap();
        let target = fs::canonicalize(dir.path()).unwrap();
        let config = ShellConfig::default().with_assignment_scope(AssignmentScope::Command);
        let mut session = Session::new(config);

        session.step(&format!("D={} cd $D", target.display()));

        assert_eq!(session.sh.env().current_dir, target);
    }

    #[test]
    fn resolve_errors_are_reported_with_status_2() {
        let mut session = Session::new(ShellConfig::default());

        assert_eq!(session.step("echo a | | wc"), Flow::Continue(SYNTAX_ERROR));
        assert_eq!(session.errors.text(), "minish: syntax error: empty command\n");
        assert_eq!(session.sh.last_status(), SYNTAX_ERROR);

        assert_eq!(session.step("echo ok"), Flow::Continue(0));
        assert_eq!(session.out.text(), "ok\n");
    }

    #[test]
    fn and_list_stops_at_first_failure() {
        let mut session = Session::new(ShellConfig::default());

        let flow = session.step("echo one && ls /definitely/missing && echo two");

        assert_eq!(flow, Flow::Continue(1));
        assert_eq!(session.out.text(), "one\n");
    }

    #[test]
    fn and_list_runs_all_on_success() {
        let mut session = Session::new(ShellConfig::default());

        let flow = session.step("echo one && echo two | wc -l");

        assert_eq!(flow, Flow::Continue(0));
        assert_eq!(session.out.text(), "one\n       1\n");
    }

    #[test]
    fn exit_ends_the_session() {
        let mut session = Session::new(ShellConfig::default());

        assert_eq!(session.step("exit"), Flow::Exit);
    }

    #[test]
    fn exit_stops_an_and_list() {
        let mut session = Session::new(ShellConfig::default());

        assert_eq!(session.step("exit && echo unreachable"), Flow::Exit);
        assert!(session.out.bytes().is_empty());
    }

    #[test]
    fn exit_inside_pipeline_does_not_end_session() {
        let mut session = Session::new(ShellConfig::default());

        assert_eq!(session.step("exit | echo still here"), Flow::Continue(0));
        assert_eq!(session.out.text(), "still here\n");
    }

    #[test]
    fn run_script_stops_at_exit() {
        let mut sh = Interpreter::default();
        let (_, out) = MemWriter::with_handle();
        let (diagnostics, _) = Diagnostics::captured();
        let script = "echo first\nls /definitely/missing\nexit\necho never\n";

        let status = sh
            .run_script(
                script.as_bytes(),
                || -> Box<dyn Output> { Box::new(out.writer()) },
                &diagnostics,
            )
            .unwrap();

        assert_eq!(status, 0);
        assert_eq!(out.text(), "first\n");
    }

    #[test]
    fn run_script_returns_last_status() {
        let mut sh = Interpreter::default();
        let (_, out) = MemWriter::with_handle();
        let (diagnostics, errors) = Diagnostics::captured();

        let status = sh
            .run_script(
                "echo a\ncat /definitely/missing\n".as_bytes(),
                || -> Box<dyn Output> { Box::new(out.writer()) },
                &diagnostics,
            )
            .unwrap();

        assert_eq!(status, 1);
        assert!(errors.text().starts_with("cat: /definitely/missing: "));
    }
}
