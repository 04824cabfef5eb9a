use crate::builtin::run_builtin;
use crate::command::{ExitCode, Input, Output};
use crate::env::Environment;
use crate::error::ShellError;
use crate::external::launch;
use crate::parser::Stage;
use crate::stream::{Diagnostics, create_pipe};
use std::thread;

/// Run the stages of `pipeline` with the output of each feeding the next.
///
/// `input` feeds the first stage and `output` receives the last one. The
/// pipeline's status is the status of its last stage.
///
/// A single stage runs on the calling thread against `env`, so `cd` and
/// `exit` affect the session. With more than one stage, every stage runs
/// concurrently on its own thread with a copy of `env`; their changes to it
/// are discarded. A stage that panics is reported as status 1; its pipe
/// ends are released while unwinding, so its neighbours still finish.
pub fn execute(
    pipeline: &[Stage],
    input: Box<dyn Input>,
    output: Box<dyn Output>,
    diagnostics: &Diagnostics,
    env: &mut Environment,
) -> Result<ExitCode, ShellError> {
    match pipeline {
        [] => Ok(0),
        [stage] => run_stage(stage, input, output, diagnostics, env),
        stages => run_concurrently(stages, input, output, diagnostics, env),
    }
}

fn run_concurrently(
    stages: &[Stage],
    input: Box<dyn Input>,
    output: Box<dyn Output>,
    diagnostics: &Diagnostics,
    env: &Environment,
) -> Result<ExitCode, ShellError> {
    let mut inputs: Vec<Box<dyn Input>> = vec![input];
    let mut outputs: Vec<Box<dyn Output>> = Vec::with_capacity(stages.len());
    for _ in 1..stages.len() {
        let (reader, writer) = create_pipe()?;
        outputs.push(Box::new(writer));
        inputs.push(Box::new(reader));
    }
    outputs.push(output);

    let results: Vec<Result<ExitCode, ShellError>> = thread::scope(|s| {
        let handles: Vec<_> = stages
            .iter()
            .zip(inputs.into_iter().zip(outputs))
            .map(|(stage, (input, output))| {
                let mut env = env.clone();
                s.spawn(move || run_stage(stage, input, output, diagnostics, &mut env))
            })
            .collect();

        handles
            .into_iter()
            .zip(stages)
            .map(|(handle, stage)| {
                handle.join().unwrap_or_else(|_| {
                    log::error!("stage `{}` panicked", stage);
                    Ok(1)
                })
            })
            .collect()
    });

    let mut last = 0;
    for result in results {
        last = result?;
    }
    Ok(last)
}

/// Run one stage to completion. Both endpoints are closed when it returns.
fn run_stage(
    stage: &Stage,
    mut input: Box<dyn Input>,
    mut output: Box<dyn Output>,
    diagnostics: &Diagnostics,
    env: &mut Environment,
) -> Result<ExitCode, ShellError> {
    log::debug!("running stage: {}", stage);
    match stage {
        Stage::Builtin { kind, args } => {
            let mut diagnostics = diagnostics.clone();
            Ok(run_builtin(
                *kind,
                args,
                &mut *input,
                &mut *output,
                &mut diagnostics,
                env,
            ))
        }
        Stage::External { program, args } => {
            launch(program, args, input, output, diagnostics, env)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::BuiltinKind;
    use crate::stream::{Captured, MemReader, MemWriter};
    use std::fs;

    fn builtin(kind: BuiltinKind, args: &[&str]) -> Stage {
        Stage::Builtin {
            kind,
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn external(program: &str, args: &[&str]) -> Stage {
        Stage::External {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn run(pipeline: &[Stage], env: &mut Environment) -> (ExitCode, Captured, Captured) {
        let (diag, errors) = Diagnostics::captured();
        let (out, captured) = MemWriter::with_handle();
        let code = execute(
            pipeline,
            Box::new(MemReader::empty()),
            Box::new(out),
            &diag,
            env,
        )
        .unwrap();
        (code, captured, errors)
    }

    #[test]
    fn single_stage_writes_to_output() {
        let mut env = Environment::new();
        let (code, out, _) = run(&[builtin(BuiltinKind::Echo, &["hello"])], &mut env);
        assert_eq!(code, 0);
        assert_eq!(out.text(), "hello\n");
    }

    #[test]
    fn single_stage_matches_direct_builtin_call() {
        let input: Vec<u8> = (0..20_000)
            .map(|i| format!("word{} more words\n", i))
            .collect::<String>()
            .into_bytes();
        assert!(input.len() > 4 * crate::command::DEFAULT_BLOCK_SIZE);
        let args = vec!["-l".to_string(), "-w".to_string()];

        let mut direct = Vec::new();
        let direct_code = run_builtin(
            BuiltinKind::Wc,
            &args,
            &mut input.as_slice(),
            &mut direct,
            &mut Vec::new(),
            &mut Environment::new(),
        );

        let (diag, _) = Diagnostics::captured();
        let (out, captured) = MemWriter::with_handle();
        let code = execute(
            &[Stage::Builtin {
                kind: BuiltinKind::Wc,
                args,
            }],
            Box::new(MemReader::new(input)),
            Box::new(out),
            &diag,
            &mut Environment::new(),
        )
        .unwrap();

        assert_eq!(code, direct_code);
        assert_eq!(captured.bytes(), direct);
        assert_eq!(captured.text(), "   20000   60000\n");
    }

    #[test]
    fn builtins_connect_through_a_pipe() {
        let mut env = Environment::new();
        let (code, out, _) = run(
            &[
                builtin(BuiltinKind::Echo, &["hello"]),
                builtin(BuiltinKind::Wc, &[]),
            ],
            &mut env,
        );
        assert_eq!(code, 0);
        assert_eq!(out.text(), "       1       1       6\n");
    }

    #[test]
    fn output_larger_than_pipe_buffer_does_not_deadlock() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("big"), vec![b'z'; 300_000]).unwrap();
        let mut env = Environment::in_dir(dir.path());

        let (code, out, _) = run(
            &[
                builtin(BuiltinKind::Cat, &["big"]),
                builtin(BuiltinKind::Cat, &[]),
                builtin(BuiltinKind::Wc, &["-c"]),
            ],
            &mut env,
        );

        assert_eq!(code, 0);
        assert_eq!(out.text(), "  300000\n");
    }

    #[test]
    #[cfg(unix)]
    fn builtins_and_externals_mix() {
        let mut env = Environment::new();
        let (code, out, _) = run(
            &[
                builtin(BuiltinKind::Echo, &["alpha\nbeta"]),
                external("cat", &[]),
                builtin(BuiltinKind::Grep, &["beta"]),
            ],
            &mut env,
        );
        assert_eq!(code, 0);
        assert_eq!(out.text(), "beta\n");
    }

    #[test]
    #[cfg(unix)]
    fn reader_sees_eof_after_external_writer_exits() {
        let mut env = Environment::new();
        let (code, out, _) = run(
            &[
                external("sh", &["-c", "printf 'one\\ntwo\\n'"]),
                external("sh", &["-c", "cat; echo done"]),
            ],
            &mut env,
        );
        assert_eq!(code, 0);
        assert_eq!(out.text(), "one\ntwo\ndone\n");
    }

    #[test]
    #[cfg(unix)]
    fn early_exit_of_reader_stops_endless_writer() {
        let mut env = Environment::new();
        let (code, out, _) = run(
            &[external("yes", &[]), external("head", &["-n", "2"])],
            &mut env,
        );
        assert_eq!(code, 0);
        assert_eq!(out.text(), "y\ny\n");
    }

    #[test]
    #[cfg(unix)]
    fn status_comes_from_last_stage() {
        let mut env = Environment::new();

        let (code, _, _) = run(
            &[
                external("sh", &["-c", "exit 4"]),
                builtin(BuiltinKind::Echo, &[]),
            ],
            &mut env,
        );
        assert_eq!(code, 0);

        let (code, _, _) = run(
            &[
                builtin(BuiltinKind::Echo, &[]),
                external("sh", &["-c", "exit 4"]),
            ],
            &mut env,
        );
        assert_eq!(code, 4);
    }

    #[test]
    fn missing_program_mid_pipeline_closes_its_output() {
        let mut env = Environment::new();
        let (code, out, errors) = run(
            &[
                external("no-such-program-for-minish", &[]),
                builtin(BuiltinKind::Wc, &["-l"]),
            ],
            &mut env,
        );
        assert_eq!(code, 0);
        assert_eq!(out.text(), "       0\n");
        assert_eq!(errors.text(), "no-such-program-for-minish: command not found\n");
    }

    #[test]
    fn session_changes_inside_a_pipeline_are_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let start = fs::canonicalize(dir.path()).unwrap();
        fs::create_dir(start.join("sub")).unwrap();
        let mut env = Environment::in_dir(&start);

        let (_, out, _) = run(
            &[
                builtin(BuiltinKind::Cd, &["sub"]),
                builtin(BuiltinKind::Pwd, &[]),
            ],
            &mut env,
        );
        assert_eq!(out.text(), format!("{}\n", start.display()));
        assert_eq!(env.current_dir, start);

        run(
            &[
                builtin(BuiltinKind::Exit, &[]),
                builtin(BuiltinKind::Echo, &[]),
            ],
            &mut env,
        );
        assert!(!env.should_exit);
    }

    #[test]
    fn single_stage_changes_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let start = fs::canonicalize(dir.path()).unwrap();
        fs::create_dir(start.join("sub")).unwrap();
        let mut env = Environment::in_dir(&start);

        let (code, _, _) = run(&[builtin(BuiltinKind::Cd, &["sub"])], &mut env);

        assert_eq!(code, 0);
        assert_eq!(env.current_dir, start.join("sub"));
    }

    #[test]
    fn first_stage_reads_the_given_input() {
        let mut env = Environment::new();
        let (diag, _) = Diagnostics::captured();
        let (out, captured) = MemWriter::with_handle();

        let code = execute(
            &[
                builtin(BuiltinKind::Cat, &[]),
                builtin(BuiltinKind::Grep, &["-i", "KEEP"]),
            ],
            Box::new(MemReader::new(b"keep me\ndrop me\n".to_vec())),
            Box::new(out),
            &diag,
            &mut env,
        )
        .unwrap();

        assert_eq!(code, 0);
        assert_eq!(captured.text(), "keep me\n");
    }
}
