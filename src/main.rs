use std::path::Path;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use lpbackend::config::{Config, LoadNotice, CONFIG_PATH};
use lpbackend::server::{Server, Shutdown};
use lpbackend::{logging, VERSION};

const LOGO: &str = concat!(
    r" __    ____  ____   ___    ___ __ __  ____ __  __ ____",
    "\n",
    r"||    || \\ || )) // \\  //   || // ||    ||\ || || \\",
    "\n",
    r"||    ||_// ||=)  ||=|| ((    ||<<  ||==  ||\\|| ||  ))",
    "\n",
    r"||__| ||    ||_)) || ||  \\__ || \\ ||___ || \|| ||_//",
    "\n",
);

#[derive(Parser)]
#[command(name = "lpbackend", version, about = "Laptis Dev Forum Backend Core")]
struct Cli {
    /// Initialize configurations only
    #[arg(long)]
    init: bool,
    /// Enable colored logging
    #[arg(long)]
    color: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            return match e.kind() {
                ErrorKind::DisplayVersion => {
                    print!("{}", e);
                    ExitCode::SUCCESS
                }
                ErrorKind::DisplayHelp => {
                    eprint!("{}", e);
                    ExitCode::FAILURE
                }
                _ => {
                    eprint!("{}", e);
                    ExitCode::FAILURE
                }
            };
        }
    };

    print!("{}", LOGO);

    // Configuration is read before the logging sink exists because the
    // sink's colourisation depends on it; load events are surfaced as
    // notices right after initialization.
    let config_path = Path::new(CONFIG_PATH);
    let (config, notices, load_error) = match Config::load(config_path) {
        Ok((config, notices)) => (config, notices, None),
        Err(e) => (Config::default(), Vec::new(), Some(e)),
    };

    logging::init(cli.color || config.logging.color_logging);
    info!("LPBackend {}", VERSION);

    if let Some(e) = load_error {
        error!("failed to load configuration, continuing with defaults: {}", e);
    }
    for notice in &notices {
        match notice {
            LoadNotice::Created => {
                warn!("failed to find {}, initialized a new one", CONFIG_PATH);
            }
            LoadNotice::MissingOption(option) => {
                warn!("configuration option {} missing, using its default", option);
            }
        }
    }

    if cli.init {
        info!("initialized configurations");
        return ExitCode::SUCCESS;
    }

    let server = match Server::new(config) {
        Ok(server) => server,
        Err(e) => {
            error!("failed to load SSL certificates: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let workers = server.config().asio.worker_threads.max(1) as usize;
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to build runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let bind_addr = format!(
        "{}:{}",
        server.config().networking.listen_address,
        server.config().networking.listen_port
    );
    let outcome = runtime.block_on(async {
        let listener = TcpListener::bind(&bind_addr).await?;
        server.run(listener).await
    });

    let code = match outcome {
        Ok(Shutdown::Graceful) => {
            drop(runtime);
            ExitCode::SUCCESS
        }
        Ok(Shutdown::Terminated) => {
            // Stop the scheduler without waiting for tasks to drain.
            runtime.shutdown_background();
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("server failed: {}", e);
            runtime.shutdown_background();
            ExitCode::FAILURE
        }
    };

    if let Err(e) = server.config().save(config_path) {
        error!("failed to save configuration: {}", e);
    }
    code
}
