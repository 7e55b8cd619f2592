mod cli;
mod validate;

use std::process;

use clap::{CommandFactory, Parser};
use tokio_util::sync::CancellationToken;

use cli::{Cli, CompletionShell};
use fetch_core::error::Error;
use fetch_core::printer::Printer;
use fetch_core::resolve::{self, ResolvedRequest};
use fetch_core::{request, response, signal, update, ws};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Help and version are successful outcomes; everything else is
            // a CLI error with exit 1 and a help hint.
            use clap::error::ErrorKind;
            let ok = matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion);
            let _ = err.print();
            if !ok {
                eprintln!("Try 'fetch --help' for more details.");
                process::exit(1);
            }
            process::exit(0);
        }
    };

    if let Some(shell) = cli.complete {
        print_completions(shell);
        process::exit(0);
    }

    let raw = match validate::validate(&cli) {
        Ok(raw) => raw,
        Err(msg) => {
            eprintln!("error: {msg}");
            eprintln!("Try 'fetch --help' for more details.");
            process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    signal::install(cancel.clone());

    if cli.update {
        let mut stderr = Printer::stderr(cli.color.unwrap_or_default());
        let blocking = std::env::var_os(update::BACKGROUND_ENV).is_none();
        match update::run(&mut stderr, blocking).await {
            Ok(code) => process::exit(code),
            Err(err) => exit_with_error(err, &mut stderr),
        }
    }

    let resolved = match resolve::resolve(raw) {
        Ok(resolved) => resolved,
        Err(err) => {
            let mut stderr = Printer::stderr(cli.color.unwrap_or_default());
            err.render(&mut stderr);
            let _ = stderr.flush();
            eprintln!("Try 'fetch --help' for more details.");
            process::exit(err.exit_code());
        }
    };

    let mut stderr = Printer::stderr(resolved.color);
    let code = run(&resolved, &mut stderr, &cancel).await;
    process::exit(code);
}

async fn run(resolved: &ResolvedRequest, stderr: &mut Printer, cancel: &CancellationToken) -> i32 {
    if resolved.dry_run {
        let mut stdout = Printer::stdout(resolved.color);
        return match request::render_dry_run(resolved, &mut stdout).await {
            Ok(()) => 0,
            Err(err) => report(err, stderr),
        };
    }

    if resolved.ws {
        return match ws::run(resolved, stderr, cancel).await {
            Ok(code) => code,
            Err(err) => report(err, stderr),
        };
    }

    let outcome = match request::execute(resolved, cancel).await {
        Ok(outcome) => outcome,
        Err(err) => return report(err, stderr),
    };

    let code = match response::render(resolved, outcome, stderr, cancel).await {
        Ok(code) => code,
        Err(err) => return report(err, stderr),
    };

    // The request ran to completion; a due background update check may
    // piggyback on this invocation.
    if let Some(interval) = resolved.auto_update {
        update::maybe_spawn_background(interval);
    }

    code
}

fn report(err: Error, stderr: &mut Printer) -> i32 {
    err.render(stderr);
    let _ = stderr.flush();
    err.exit_code()
}

fn exit_with_error(err: Error, stderr: &mut Printer) -> ! {
    let code = report(err, stderr);
    process::exit(code);
}

fn print_completions(shell: CompletionShell) {
    let mut cmd = Cli::command();
    let shell = match shell {
        CompletionShell::Bash => clap_complete::Shell::Bash,
        CompletionShell::Fish => clap_complete::Shell::Fish,
        CompletionShell::Zsh => clap_complete::Shell::Zsh,
    };
    clap_complete::generate(shell, &mut cmd, "fetch", &mut std::io::stdout());
}
