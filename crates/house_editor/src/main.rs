mod app;

use std::env;
use std::process::ExitCode;

use tracing::{error, info};

use app::CliCommand;

fn main() -> ExitCode {
    let args = env::args().skip(1).collect::<Vec<_>>();
    let options = match app::parse_args(&args) {
        Ok(CliCommand::Help) => {
            println!("{}", app::usage_text());
            return ExitCode::SUCCESS;
        }
        Ok(CliCommand::Replay(options)) => options,
        Err(err) => {
            eprintln!("{err}\n\n{}", app::usage_text());
            return ExitCode::from(2);
        }
    };

    app::init_tracing();
    info!("=== House Editor Replay ===");

    match app::build_app(options) {
        Ok(wiring) => app::run(wiring),
        Err(err) => {
            error!(error = %err, "startup_failed");
            ExitCode::FAILURE
        }
    }
}
