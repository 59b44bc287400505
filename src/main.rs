//! dataviz - ask questions of registered databases from the command line.
//!
//! Every command prints a JSON envelope to stdout; logs go to stderr.

use dataviz_agent::api::{DataViz, Envelope};
use dataviz_agent::cli::{Cli, Command, ConnCommand};
use dataviz_agent::config::Config;
use dataviz_agent::error::Result;
use dataviz_agent::logging::{init_file_logging, init_stderr_logging};
use dataviz_agent::orchestrator::QueryRequest;
use serde::Serialize;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse_args();

    if cli.log_file {
        init_file_logging(cli.verbose);
    } else {
        init_stderr_logging(cli.verbose);
    }

    let ok = match run(cli).await {
        Ok(ok) => ok,
        Err(e) => {
            error!("{}: {}", e.category(), e);
            print_envelope(Envelope::<()>::from_result(Err(e)))
        }
    };

    if !ok {
        std::process::exit(1);
    }
}

/// Runs the command and prints its envelope. Returns false on failure.
async fn run(cli: Cli) -> Result<bool> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;
    config.apply_env_overrides();

    let ok = match cli.command {
        Command::Conn(command) => {
            let api = DataViz::registry_from_config(&config).await?;
            match command {
                ConnCommand::Add(args) => {
                    let result = api.add_connection(args.into_new_connection()).await;
                    print_envelope(Envelope::from_result(result))
                }
                ConnCommand::Verify(args) => {
                    let result = api.verify_connection(args.into_new_connection()).await;
                    print_envelope(Envelope::from_result(result))
                }
                ConnCommand::List => {
                    print_envelope(Envelope::from_result(api.list_connections().await))
                }
                ConnCommand::Show { id } => {
                    print_envelope(Envelope::from_result(api.get_connection(&id).await))
                }
                ConnCommand::Test { id } => {
                    print_envelope(Envelope::from_result(api.probe_connection(&id).await))
                }
                ConnCommand::Update { id, args } => {
                    let result = api.update_connection(&id, args.into_new_connection()).await;
                    print_envelope(Envelope::from_result(result))
                }
                ConnCommand::Remove { id } => {
                    print_envelope(Envelope::from_result(api.remove_connection(&id).await))
                }
            }
        }
        Command::Ask {
            question,
            connection,
            chart,
        } => {
            let api = DataViz::from_config(&config).await?;
            let mut request = QueryRequest::new(question, connection);
            if let Some(kind) = chart {
                request = request.with_chart(kind);
            }
            print_envelope(Envelope::from_result(api.run_query(request).await))
        }
    };

    Ok(ok)
}

fn print_envelope<T: Serialize>(envelope: Envelope<T>) -> bool {
    let ok = envelope.is_success();
    match serde_json::to_string_pretty(&envelope) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            return false;
        }
    }
    ok
}
