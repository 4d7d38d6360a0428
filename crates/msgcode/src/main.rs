mod app;
mod lifecycle;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use msgcode_core::config::RuntimeConfig;

/// Exit codes per the CLI contract: 0 success, 1 generic failure, 2 config
/// error, 3 precondition (permissions/binary missing).
mod exit {
    pub const OK: i32 = 0;
    pub const GENERIC_FAILURE: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
    pub const PRECONDITION: i32 = 3;
}

const VERSION_STRING: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("MSGCODE_GIT_SHA"), ")");

#[derive(Parser)]
#[command(name = "msgcode", version = VERSION_STRING)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `~/.config/msgcode` and its subdirectories.
    Init,
    /// Run the runtime in the foreground until stopped.
    Start {
        /// Verbose logging to stderr in addition to the rotating file sink.
        #[arg(long)]
        debug: bool,
    },
    /// Graceful shutdown (SIGTERM, waits for the process to exit).
    Stop,
    /// Emergency shutdown (SIGKILL, no grace period).
    Allstop,
}

fn main() {
    let cli = Cli::parse();
    let code = match cli.command {
        Command::Init => run_init(),
        Command::Start { debug } => run_start(debug),
        Command::Stop => run_stop(),
        Command::Allstop => run_allstop(),
    };
    std::process::exit(code);
}

fn init_minimal_logging() {
    let filter = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(format!("msgcode={filter}"))
                .unwrap_or_else(|_| "msgcode=info".into()),
        )
        .init();
}

/// Console + rotating-file logging for a foreground `start`. `debug`
/// forces `debug` level regardless of `LOG_LEVEL`; `LOG_CONSOLE` adds the
/// stderr layer even when not debugging (the file layer is always on).
fn init_runtime_logging(debug: bool) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::prelude::*;

    let level = if debug {
        "debug".to_string()
    } else {
        std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
    };
    let want_console = debug || std::env::var("LOG_CONSOLE").is_ok_and(|v| v == "1" || v == "true");

    let directives = format!(
        "msgcode={level},msgcode_agent={level},msgcode_ingress={level},msgcode_memory={level}"
    );
    let env_filter = tracing_subscriber::EnvFilter::try_new(&directives)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_dir = lifecycle::config_dir().join("log");
    std::fs::create_dir_all(&log_dir)?;

    // tracing-appender has no byte-size rotation; `NEVER` onto a fixed
    // filename is the closest approximation to the 10 MB/3-backup policy
    // this dependency can express (see DESIGN.md).
    let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
        .rotation(tracing_appender::rolling::Rotation::NEVER)
        .filename_prefix("msgcode")
        .filename_suffix("log")
        .build(&log_dir)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false);

    let registry = tracing_subscriber::registry().with(env_filter).with(file_layer);

    if want_console {
        registry.with(tracing_subscriber::fmt::layer()).init();
    } else {
        registry.init();
    }

    Ok(Some(guard))
}

fn run_init() -> i32 {
    init_minimal_logging();
    let dir = lifecycle::config_dir();
    for sub in ["souls", "log"] {
        if let Err(e) = std::fs::create_dir_all(dir.join(sub)) {
            error!("failed to create {}: {e}", dir.join(sub).display());
            return exit::PRECONDITION;
        }
    }
    match RuntimeConfig::load() {
        Ok(_) => {
            info!("msgcode initialized at {}", dir.display());
            exit::OK
        }
        Err(e) => {
            warn!("directories created, but config is incomplete: {e}");
            info!("set MSGCODE_OWNER and re-run `msgcode start` when ready");
            exit::OK
        }
    }
}

fn run_start(debug: bool) -> i32 {
    let _guard = match init_runtime_logging(debug) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialize logging: {e}");
            return exit::PRECONDITION;
        }
    };

    let config = match RuntimeConfig::load() {
        Ok(c) => c,
        Err(e) => {
            error!("config error: {e}");
            return exit::CONFIG_ERROR;
        }
    };

    let transport_bin = app::resolve_transport_bin(&config);
    if !lifecycle::binary_available(&transport_bin) {
        error!("transport binary not found: {transport_bin}");
        return exit::PRECONDITION;
    }

    let config_dir = lifecycle::config_dir();
    if let Err(e) = lifecycle::claim(&config_dir) {
        error!("{e}");
        return exit::PRECONDITION;
    }

    let result = build_and_run(config);
    lifecycle::release(&config_dir);

    match result {
        Ok(()) => exit::OK,
        Err(e) => {
            error!("runtime exited with an error: {e}");
            exit::GENERIC_FAILURE
        }
    }
}

fn build_and_run(config: RuntimeConfig) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let rt = app::Runtime::build(config)?;
        rt.run().await
    })
}

fn run_stop() -> i32 {
    init_minimal_logging();
    match lifecycle::stop(&lifecycle::config_dir()) {
        Ok(()) => exit::OK,
        Err(e) => {
            error!("{e}");
            exit::GENERIC_FAILURE
        }
    }
}

fn run_allstop() -> i32 {
    init_minimal_logging();
    match lifecycle::allstop(&lifecycle::config_dir()) {
        Ok(()) => exit::OK,
        Err(e) => {
            error!("{e}");
            exit::GENERIC_FAILURE
        }
    }
}
