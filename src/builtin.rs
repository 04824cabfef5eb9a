use crate::command::{DEFAULT_BLOCK_SIZE, ExitCode};
use crate::env::Environment;
use crate::parser::BuiltinKind;
use anyhow::{Context, Result};
use argh::{EarlyExit, FromArgs};
use regex::{Regex, RegexBuilder};
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

/// Built-in commands known to the shell at compile time.
///
/// Most builtins are parsed using the [`argh`] crate (`FromArgs`); `echo` and
/// `exit` take their words as-is. All of them run directly in-process without
/// spawning a child process.
pub(crate) trait BuiltinCommand: Sized {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    /// Executes the command using provided IO streams and environment.
    ///
    /// Problems the command can recover from (a missing file among several)
    /// are written to `stderr` and reflected in the returned code; an `Err`
    /// aborts the command and is reported by the caller with status 1.
    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode>;
}

/// Parse `args` for the builtin `kind` and run it.
///
/// Never fails: argument errors print usage to `stderr` and yield 1, and any
/// error escaping the command becomes a diagnostic line and status 1.
pub(crate) fn run_builtin(
    kind: BuiltinKind,
    args: &[String],
    stdin: &mut dyn Read,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
    env: &mut Environment,
) -> ExitCode {
    match kind {
        BuiltinKind::Echo => {
            let echo = Echo {
                args: args.to_vec(),
            };
            finish(echo, stdin, stdout, stderr, env)
        }
        BuiltinKind::Exit => {
            let exit = Exit {
                args: args.to_vec(),
            };
            finish(exit, stdin, stdout, stderr, env)
        }
        BuiltinKind::Cat => invoke::<Cat>(args, stdin, stdout, stderr, env),
        BuiltinKind::Wc => invoke::<Wc>(args, stdin, stdout, stderr, env),
        BuiltinKind::Pwd => invoke::<Pwd>(args, stdin, stdout, stderr, env),
        BuiltinKind::Cd => invoke::<Cd>(args, stdin, stdout, stderr, env),
        BuiltinKind::Ls => invoke::<Ls>(args, stdin, stdout, stderr, env),
        BuiltinKind::Grep => invoke::<Grep>(args, stdin, stdout, stderr, env),
    }
}

fn invoke<T: BuiltinCommand + FromArgs>(
    args: &[String],
    stdin: &mut dyn Read,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
    env: &mut Environment,
) -> ExitCode {
    let argv: Vec<&str> = args.iter().map(String::as_str).collect();
    let cmd = match T::from_args(&[T::name()], &argv) {
        Ok(cmd) => cmd,
        Err(EarlyExit { output, status }) => {
            // `--help` succeeds and goes to stdout; everything else is a usage error.
            let (sink, code): (&mut dyn Write, ExitCode) = match status {
                Ok(()) => (&mut *stdout, 0),
                Err(()) => (&mut *stderr, 1),
            };
            if let Err(e) = sink.write_all(output.as_bytes()) {
                log::debug!("{}: cannot print usage: {}", T::name(), e);
            }
            return code;
        }
    };
    finish(cmd, stdin, stdout, stderr, env)
}

/// Run a parsed command and turn whatever escapes it into a status.
fn finish<T: BuiltinCommand>(
    cmd: T,
    stdin: &mut dyn Read,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
    env: &mut Environment,
) -> ExitCode {
    let result = cmd
        .execute(stdin, &mut *stdout, &mut *stderr, env)
        .and_then(|code| stdout.flush().map(|()| code).map_err(Into::into));
    match result {
        Ok(code) => code,
        Err(e) if is_broken_pipe(&e) => {
            log::debug!("{}: reader went away", T::name());
            1
        }
        Err(e) => {
            if let Err(write_err) = writeln!(stderr, "{}: {:#}", T::name(), e) {
                log::debug!("{}: cannot report {:#}: {}", T::name(), e, write_err);
            }
            1
        }
    }
}

fn is_broken_pipe(e: &anyhow::Error) -> bool {
    e.chain().any(|cause| {
        cause
            .downcast_ref::<io::Error>()
            .is_some_and(|io| io.kind() == io::ErrorKind::BrokenPipe)
    })
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{}", env.current_dir.to_string_lossy())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    #[argh(positional, greedy)]
    /// directory to switch to; absolute or relative to the current directory, a leading `~` means $HOME.
    pub args: Vec<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        if self.args.len() > 1 {
            writeln!(stderr, "cd: too many arguments")?;
            return Ok(1);
        }

        let target = match self.args.first() {
            Some(t) if t == "~" || t.starts_with("~/") => match env.get_var("HOME") {
                Some(home) => format!("{}{}", home, &t[1..]),
                None => {
                    writeln!(stderr, "cd: HOME not set")?;
                    return Ok(1);
                }
            },
            Some(t) if !t.is_empty() => t.clone(),
            _ => match env.get_var("HOME") {
                Some(home) => home,
                None => {
                    writeln!(stderr, "cd: HOME not set")?;
                    return Ok(1);
                }
            },
        };

        let canonical = match fs::canonicalize(env.resolve_path(&target)) {
            Ok(path) => path,
            Err(e) => {
                writeln!(stderr, "cd: {}: {}", target, e)?;
                return Ok(1);
            }
        };
        if !canonical.is_dir() {
            writeln!(stderr, "cd: {}: Not a directory", target)?;
            return Ok(1);
        }

        log::debug!("cd: {} -> {}", env.current_dir.display(), canonical.display());
        env.current_dir = canonical;
        Ok(0)
    }
}

/// End the interactive session. Any words after `exit` are ignored.
pub struct Exit {
    pub args: Vec<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        env.should_exit = true;
        Ok(0)
    }
}

/// Write the words to standard output, separated by spaces and followed by a
/// newline. Every word is printed literally, including ones starting with `-`.
pub struct Echo {
    pub args: Vec<String>,
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{}", self.args.join(" "))?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// print newline, word, and byte counts
pub struct Wc {
    #[argh(switch, short = 'l')]
    /// print the newline counts
    pub lines: bool,

    #[argh(switch, short = 'w')]
    /// print the word counts
    pub words: bool,

    #[argh(switch, short = 'c')]
    /// print the byte counts
    pub bytes: bool,

    #[argh(positional, greedy)]
    /// files to count; standard input when none are given.
    pub files: Vec<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Counts {
    lines: usize,
    words: usize,
    bytes: usize,
}

impl Counts {
    fn collect(reader: &mut dyn Read) -> io::Result<Self> {
        let mut counts = Counts::default();
        let mut in_word = false;
        let mut buf = [0u8; DEFAULT_BLOCK_SIZE];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            counts.bytes += n;
            for &b in &buf[..n] {
                if b == b'\n' {
                    counts.lines += 1;
                }
                // C `isspace`: includes vertical tab, unlike `is_ascii_whitespace`
                if matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c) {
                    if in_word {
                        counts.words += 1;
                        in_word = false;
                    }
                } else {
                    in_word = true;
                }
            }
        }
        if in_word {
            counts.words += 1;
        }
        Ok(counts)
    }

    fn add(&mut self, other: Counts) {
        self.lines += other.lines;
        self.words += other.words;
        self.bytes += other.bytes;
    }
}

impl Wc {
    fn format(&self, counts: Counts, name: Option<&str>) -> String {
        let all = !(self.lines || self.words || self.bytes);
        let mut line = String::new();
        for (selected, value) in [
            (self.lines, counts.lines),
            (self.words, counts.words),
            (self.bytes, counts.bytes),
        ] {
            if all || selected {
                line.push_str(&format!("{:>8}", value));
            }
        }
        if let Some(name) = name {
            line.push(' ');
            line.push_str(name);
        }
        line.push('\n');
        line
    }
}

impl BuiltinCommand for Wc {
    fn name() -> &'static str {
        "wc"
    }

    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        if self.files.is_empty() {
            let counts = Counts::collect(stdin).context("reading standard input")?;
            stdout.write_all(self.format(counts, None).as_bytes())?;
            return Ok(0);
        }

        let mut exit_code = 0;
        let mut total = Counts::default();
        for fname in &self.files {
            let counts = fs::File::open(env.resolve_path(fname))
                .and_then(|mut f| Counts::collect(&mut f));
            match counts {
                Ok(counts) => {
                    total.add(counts);
                    stdout.write_all(self.format(counts, Some(fname)).as_bytes())?;
                }
                Err(e) => {
                    writeln!(stderr, "wc: {}: {}", fname, e)?;
                    exit_code = 1;
                }
            }
        }
        if self.files.len() > 1 {
            stdout.write_all(self.format(total, Some("total")).as_bytes())?;
        }
        Ok(exit_code)
    }
}

#[derive(FromArgs)]
/// print file(s) to stdout
pub struct Cat {
    #[argh(positional, greedy)]
    /// files to print in order; standard input when none are given.
    pub files: Vec<String>,
}

impl BuiltinCommand for Cat {
    fn name() -> &'static str {
        "cat"
    }

    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        if self.files.is_empty() {
            io::copy(stdin, stdout)?;
            return Ok(0);
        }

        let mut exit_code = 0;
        for fname in &self.files {
            match fs::File::open(env.resolve_path(fname)) {
                Ok(mut f) => {
                    io::copy(&mut f, stdout).with_context(|| fname.clone())?;
                }
                Err(e) => {
                    writeln!(stderr, "cat: {}: {}", fname, e)?;
                    exit_code = 1;
                }
            }
        }
        Ok(exit_code)
    }
}

#[derive(FromArgs)]
/// list directory contents
pub struct Ls {
    #[argh(positional, greedy)]
    /// file or directory to list; the current directory when omitted.
    pub paths: Vec<String>,
}

impl BuiltinCommand for Ls {
    fn name() -> &'static str {
        "ls"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        if self.paths.len() > 1 {
            writeln!(stderr, "ls: too many arguments")?;
            return Ok(1);
        }

        let (shown, target) = match self.paths.first() {
            Some(p) => (p.clone(), env.resolve_path(p)),
            None => (".".to_string(), env.current_dir.clone()),
        };

        let meta = match fs::metadata(&target) {
            Ok(meta) => meta,
            Err(e) => {
                writeln!(stderr, "ls: cannot access '{}': {}", shown, e)?;
                return Ok(1);
            }
        };

        if !meta.is_dir() {
            let name = target
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or(shown);
            writeln!(stdout, "{}", name)?;
            return Ok(0);
        }

        let mut entries = fs::read_dir(&target)
            .with_context(|| format!("cannot open directory '{}'", shown))?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<io::Result<Vec<_>>>()
            .with_context(|| format!("reading directory '{}'", shown))?;
        entries.sort();
        for name in entries {
            writeln!(stdout, "{}", name)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// print lines matching a pattern
pub struct Grep {
    #[argh(positional)]
    /// the pattern to search for (a regular expression)
    pub pattern: String,

    #[argh(positional, greedy)]
    /// files to search. If none provided, reads from stdin.
    pub files: Vec<String>,

    #[argh(switch, short = 'w')]
    /// match only whole words (using non-word characters as boundaries)
    pub word_regexp: bool,

    #[argh(switch, short = 'i')]
    /// ignore case distinctions
    pub ignore_case: bool,

    #[argh(option, short = 'A', default = "0")]
    /// print NUM lines of trailing context after matching lines
    pub after_context: usize,
}

impl Grep {
    fn build_regex(&self) -> Result<Regex, regex::Error> {
        let pattern = if self.word_regexp {
            format!(r"\b(?:{})\b", self.pattern)
        } else {
            self.pattern.clone()
        };
        RegexBuilder::new(&pattern)
            .case_insensitive(self.ignore_case)
            .build()
    }

    fn process_source(
        &self,
        reader: &mut dyn Read,
        stdout: &mut dyn Write,
        file_name: Option<&str>,
        re: &Regex,
    ) -> Result<()> {
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;
        let text = String::from_utf8_lossy(&raw);

        let mut lines: Vec<&str> = text.split('\n').collect();
        if lines.last() == Some(&"") {
            lines.pop();
        }

        let total_lines = lines.len();
        let mut to_print = vec![false; total_lines];
        for (i, line) in lines.iter().enumerate() {
            if re.is_match(line) {
                let end_print = i
                    .saturating_add(self.after_context)
                    .saturating_add(1)
                    .min(total_lines);
                to_print[i..end_print].iter_mut().for_each(|p| *p = true);
            }
        }

        let prefix = file_name
            .map(|name| format!("{}:", name))
            .unwrap_or_default();
        let mut last_printed_index: Option<usize> = None;

        for (i, line) in lines.iter().enumerate() {
            if !to_print[i] {
                continue;
            }
            if self.after_context > 0 && last_printed_index.is_some_and(|last| i > last + 1) {
                stdout.write_all(b"--\n")?;
            }
            writeln!(stdout, "{}{}", prefix, line)?;
            last_printed_index = Some(i);
        }

        Ok(())
    }
}

impl BuiltinCommand for Grep {
    fn name() -> &'static str {
        "grep"
    }

    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let re = match self.build_regex() {
            Ok(re) => re,
            Err(e) => {
                writeln!(stderr, "grep: invalid regular expression: {}", e)?;
                return Ok(2);
            }
        };

        if self.files.is_empty() {
            self.process_source(stdin, stdout, None, &re)?;
            return Ok(0);
        }

        let show_names = self.files.len() > 1;
        let mut final_exit_code = 0;
        for file_name in &self.files {
            let path: PathBuf = env.resolve_path(file_name);
            match fs::File::open(&path) {
                Ok(mut f) => {
                    let name = show_names.then_some(file_name.as_str());
                    self.process_source(&mut f, stdout, name, &re)
                        .with_context(|| file_name.clone())?;
                }
                Err(e) => {
                    writeln!(stderr, "grep: {}: {}", file_name, e)?;
                    final_exit_code = 2;
                }
            }
        }
        Ok(final_exit_code)
    }
}
