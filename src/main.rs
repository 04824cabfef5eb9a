use argh::FromArgs;
use minish::{
    AssignmentScope, Diagnostics, ExitCode, InheritedStdin, Input, Interpreter, Output,
    ShellConfig,
};
use std::io::{self, IsTerminal};

#[derive(FromArgs)]
/// A minimal command interpreter with pipelines, variables and a few builtins.
struct Args {
    #[argh(option, short = 'c')]
    /// run a single command line and exit with its status
    command: Option<String>,

    #[argh(option)]
    /// prompt shown before each interactive line (default "$ ")
    prompt: Option<String>,

    #[argh(switch)]
    /// forget `NAME=value` prefixes once their line has run
    scoped_assignments: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Args = argh::from_env();
    let code = match run(args) {
        Ok(code) => code,
        Err(e) => {
            log::error!("session aborted: {:#}", e);
            eprintln!("minish: {:#}", e);
            1
        }
    };
    std::process::exit(code);
}

fn run(args: Args) -> anyhow::Result<ExitCode> {
    let mut config = ShellConfig::from_env();
    if let Some(prompt) = args.prompt {
        config = config.with_prompt(prompt);
    }
    if args.scoped_assignments {
        config = config.with_assignment_scope(AssignmentScope::Command);
    }
    log::debug!("starting with {:?}", config);

    let mut sh = Interpreter::new(config);
    let diagnostics = Diagnostics::stderr();

    if let Some(line) = args.command {
        sh.step(
            &line,
            || -> Box<dyn Input> { Box::new(InheritedStdin::new()) },
            || -> Box<dyn Output> { Box::new(io::stdout()) },
            &diagnostics,
        )?;
        return Ok(sh.last_status());
    }

    if io::stdin().is_terminal() {
        Ok(sh.repl()?)
    } else {
        let status = sh.run_script(
            io::stdin().lock(),
            || -> Box<dyn Output> { Box::new(io::stdout()) },
            &diagnostics,
        )?;
        Ok(status)
    }
}
