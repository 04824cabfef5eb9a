use crate::command::{ExitCode, Input, Output};
use crate::env::Environment;
use crate::error::ShellError;
use crate::stream::{Diagnostics, pump};
use std::borrow::Cow;
use std::ffi::OsStr;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;

/// Status reported when the program cannot be found.
pub const NOT_FOUND: ExitCode = 127;
/// Status reported when the program exists but cannot be executed.
pub const NOT_EXECUTABLE: ExitCode = 126;

/// Run `program` as a child process and wait for it.
///
/// Stream endpoints backed by an OS descriptor are handed to the child as-is;
/// in-memory endpoints are connected through a pipe with a copying thread.
/// The child runs in the session directory and sees session variables on top
/// of the inherited process environment.
///
/// A program that cannot be found yields [`NOT_FOUND`] and a diagnostic line,
/// not an error: only failures of the interpreter itself are returned as `Err`.
pub fn launch(
    program: &str,
    args: &[String],
    input: Box<dyn Input>,
    output: Box<dyn Output>,
    diagnostics: &Diagnostics,
    env: &Environment,
) -> Result<ExitCode, ShellError> {
    let search_paths = env.get_var("PATH").unwrap_or_default();
    let Some(executable) =
        find_command_path(OsStr::new(&search_paths), &env.current_dir, Path::new(program))
    else {
        return report(diagnostics, program, "command not found", NOT_FOUND);
    };
    log::debug!("launching {} as {}", program, executable.display());

    let (stdin, input_bridge) = match input.into_stdio() {
        Ok(stdio) => (stdio, None),
        Err(mem) => (Stdio::piped(), Some(mem)),
    };
    let (stdout, output_bridge) = match output.into_stdio() {
        Ok(stdio) => (stdio, None),
        Err(mem) => (Stdio::piped(), Some(mem)),
    };
    let stderr = diagnostics.child_stdio();
    let bridge_stderr = stderr.is_none();

    let mut cmd = Command::new(&*executable);
    cmd.args(args)
        .stdin(stdin)
        .stdout(stdout)
        .stderr(stderr.unwrap_or_else(Stdio::piped))
        .envs(env.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .current_dir(&env.current_dir);

    let spawned = cmd.spawn();
    // The command owns the parent's copies of any pipe ends it was given.
    // Those must be closed now or the stage downstream never sees EOF.
    drop(cmd);
    let mut child = match spawned {
        Ok(child) => child,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return report(diagnostics, program, "command not found", NOT_FOUND);
        }
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            return report(diagnostics, program, "permission denied", NOT_EXECUTABLE);
        }
        Err(source) => {
            return Err(ShellError::Spawn {
                program: program.to_string(),
                source,
            });
        }
    };

    let child_stdin = child.stdin.take();
    let child_stdout = child.stdout.take();
    let child_stderr = child.stderr.take();

    let status = thread::scope(|s| {
        if let (Some(mut source), Some(mut sink)) = (input_bridge, child_stdin) {
            s.spawn(move || {
                // The child may exit without draining its input.
                if let Err(e) = pump(&mut *source, &mut sink) {
                    log::debug!("{}: stdin bridge stopped: {}", program, e);
                }
            });
        }
        if let (Some(mut sink), Some(source)) = (output_bridge, child_stdout) {
            s.spawn(move || copy_out(program, source, &mut *sink));
        }
        if let (true, Some(source)) = (bridge_stderr, child_stderr) {
            let mut sink = diagnostics.clone();
            s.spawn(move || copy_out(program, source, &mut sink));
        }
        child.wait()
    })
    .map_err(|source| ShellError::Wait {
        program: program.to_string(),
        source,
    })?;

    let code = exit_code(status);
    log::debug!("{} exited with {}", program, code);
    Ok(code)
}

fn report(
    diagnostics: &Diagnostics,
    program: &str,
    message: &str,
    code: ExitCode,
) -> Result<ExitCode, ShellError> {
    let mut diagnostics = diagnostics.clone();
    writeln!(diagnostics, "{}: {}", program, message).map_err(ShellError::Write)?;
    Ok(code)
}

fn copy_out(program: &str, mut source: impl Read, sink: &mut dyn Write) {
    if let Err(e) = io::copy(&mut source, sink).and_then(|_| sink.flush()) {
        log::debug!("{}: output bridge stopped: {}", program, e);
    }
}

fn exit_code(status: ExitStatus) -> ExitCode {
    match status.code() {
        Some(x) => x,
        None => terminated_by_signal(status),
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it names a file.
/// - Relative with multiple components (e.g., `bin/sh`) or `./`-prefixed:
///   looked up under `cwd`.
/// - Single path component (no separators): search each directory in `search_paths` (PATH)
///   and return the first existing match.
/// - Empty path: returns `None`.
pub fn find_command_path<'a>(
    search_paths: &OsStr,
    cwd: &Path,
    path: &'a Path,
) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        (None, None) => None,
        (Some(x), None) if !path.starts_with(".") => {
            find_in_path(search_paths, x.as_os_str()).map(Cow::Owned)
        }
        _ => {
            let candidate = cwd.join(path);
            find_by_path(&candidate)?;
            Some(Cow::Owned(candidate))
        }
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    for dir in std::env::split_paths(search_paths) {
        let path = dir.join(cmd);
        if let Some(path) = find_by_path(&path) {
            return Some(path.to_owned());
        }
    }
    None
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.is_file() { Some(path) } else { None }
}
