//! tkube CLI entry point.

// CLI binary needs to output to stdout/stderr - this is intentional
#![allow(clippy::print_stdout, clippy::print_stderr)]

use tkube::cli::{self, Cli, EXIT_CLI, EXIT_FAILURE, EXIT_OK};
use tkube::commands::{App, exit_code_for, suggestion_hint};
use tkube::tracing::{TracingConfig, init_tracing};
use tkube_core::Paths;

fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let cli = cli::parse();

    if let Err(e) = init_tracing(TracingConfig::from_flags(cli.verbose, cli.log_json)) {
        eprintln!("{e:?}");
        std::process::exit(EXIT_CLI);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Fatal error: Failed to create tokio runtime: {e}");
            std::process::exit(EXIT_FAILURE);
        }
    };

    std::process::exit(runtime.block_on(run(cli)));
}

async fn run(cli: Cli) -> i32 {
    let paths = match cli.home {
        Some(home) => Paths::new(home),
        None => match Paths::discover() {
            Ok(paths) => paths,
            Err(e) => {
                eprintln!("{:?}", miette::Report::new(e));
                return EXIT_CLI;
            }
        },
    };

    let result = match App::new(&paths) {
        Ok(app) => app.execute(cli.command).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(output) => {
            println!("{output}");
            EXIT_OK
        }
        Err(e) => {
            let code = exit_code_for(&e);
            let hint = e.suggestion().map(|s| suggestion_hint(&s));
            eprintln!("{:?}", miette::Report::new(e));
            if let Some(hint) = hint {
                eprintln!("hint: {hint}");
            }
            code
        }
    }
}
