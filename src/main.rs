use clap::Parser;
use elecfee::app::App;
use elecfee::cli::{Args, Command};
use elecfee::config::Config;
use elecfee::console;
use elecfee::logging::setup_logging;
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config and setup logging before App::new() so startup logs are never silently dropped
    let config = Config::load().expect("Failed to load config");
    setup_logging(&config, args.tracing);

    let command = args.command.unwrap_or_default();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT_HASH"),
        ?command,
        environment = if cfg!(debug_assertions) {
            "development"
        } else {
            "production"
        },
        "starting elecfee"
    );

    let app = match App::new(config) {
        Ok(app) => app,
        Err(e) => {
            error!(error = ?e, "failed to initialize application");
            return ExitCode::FAILURE;
        }
    };

    match command {
        Command::Serve => app.serve().await,
        Command::Console => console::run(app.queries()).await,
    }
}
