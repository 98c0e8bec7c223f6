use clap::Parser;
use ploy_dqn::cli::output::OutputMode;
use ploy_dqn::cli::{Cli, Commands};
use ploy_dqn::config::{AppConfig, LoggingConfig};
use tracing_subscriber::EnvFilter;

mod main_commands;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from(&cli.config)?;
    cli.command.apply_to(&mut config);
    init_logging(&config.logging);

    if let Err(errors) = config.validate() {
        anyhow::bail!("invalid configuration:\n  - {}", errors.join("\n  - "));
    }

    let mode = OutputMode::from_json_flag(cli.json);
    match &cli.command {
        Commands::Train { .. } => main_commands::run_train(config, mode).await,
        Commands::Eval { .. } => main_commands::run_eval(config, mode),
        Commands::Info { .. } => main_commands::run_info(&config, mode),
    }
}

/// Initialize logging with optional file output.
///
/// Console output always; a daily rolling file under `PLOY_DQN_LOG_DIR`
/// when that variable names a writable directory.
fn init_logging(logging: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},ploy_dqn=debug", logging.level)));

    let log_dir = std::env::var("PLOY_DQN_LOG_DIR").ok();

    // `tracing_appender::rolling::daily` panics if it can't create the initial
    // log file, so preflight writability.
    let file_layer = log_dir.as_deref().and_then(|dir| {
        let writable = std::fs::create_dir_all(dir).is_ok()
            && std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(std::path::Path::new(dir).join(".ploy_dqn_write_test"))
                .is_ok();
        if !writable {
            eprintln!(
                "Warning: Could not write to log directory {}, file logging disabled",
                dir
            );
            return None;
        }
        let _ = std::fs::remove_file(std::path::Path::new(dir).join(".ploy_dqn_write_test"));

        let file_appender = tracing_appender::rolling::daily(dir, "ploy-dqn.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Keep the guard alive for the life of the process
        Box::leak(Box::new(guard));

        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
    });

    let (console_plain, console_json) = if logging.json {
        (None, Some(tracing_subscriber::fmt::layer().json().with_target(true)))
    } else {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false),
            ),
            None,
        )
    };

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(filter)
        .with(console_plain)
        .with(console_json)
        .with(file_layer)
        .init();

    if let (true, Some(dir)) = (file_logging_enabled, log_dir) {
        eprintln!("Logging to: {}/ploy-dqn.log", dir);
    }
}
