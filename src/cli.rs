//! Command-line argument parsing for dataviz.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::registry::{NewConnection, SslPolicy};
use crate::viz::ChartKind;

/// Ask questions of registered databases and get back SQL, rows, and chart data.
#[derive(Parser, Debug)]
#[command(name = "dataviz")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, value_name = "PATH", env = "DATAVIZ_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write logs to the state directory instead of stderr
    #[arg(long, global = true)]
    pub log_file: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage saved connections
    #[command(subcommand)]
    Conn(ConnCommand),

    /// Ask a question against a saved connection
    Ask {
        /// The question, in plain language
        question: String,

        /// Connection id to run against
        #[arg(short, long, value_name = "ID")]
        connection: String,

        /// Force a chart kind (line, bar, pie, card)
        #[arg(long, value_name = "KIND")]
        chart: Option<ChartKind>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConnCommand {
    /// Probe and save a connection
    Add(ConnectionArgs),
    /// Probe a connection without saving it
    Verify(ConnectionArgs),
    /// List saved connections
    List,
    /// Show one saved connection
    Show { id: String },
    /// Probe a saved connection
    Test { id: String },
    /// Replace a saved connection's details
    Update {
        id: String,
        #[command(flatten)]
        args: ConnectionArgs,
    },
    /// Delete a saved connection
    Remove { id: String },
}

#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Display name, unique across saved connections
    #[arg(long)]
    pub name: String,

    /// Backend: postgresql, mysql, or mongodb
    #[arg(long = "type", value_name = "TYPE")]
    pub kind: String,

    #[arg(short = 'H', long)]
    pub host: String,

    #[arg(short = 'p', long)]
    pub port: u16,

    #[arg(short = 'd', long)]
    pub database: String,

    #[arg(short = 'U', long)]
    pub username: String,

    #[arg(long, env = "DATAVIZ_DB_PASSWORD", hide_env_values = true, default_value = "")]
    pub password: String,

    /// Transport security mode passed to the driver (e.g. require, disable)
    #[arg(long, value_name = "MODE")]
    pub ssl_mode: Option<String>,

    /// Skip server certificate verification
    #[arg(long)]
    pub no_verify_peer: bool,
}

impl ConnectionArgs {
    pub fn into_new_connection(self) -> NewConnection {
        let ssl = if self.ssl_mode.is_some() || self.no_verify_peer {
            Some(SslPolicy {
                mode: self.ssl_mode,
                verify_peer: self.no_verify_peer.then_some(false),
            })
        } else {
            None
        };

        NewConnection {
            name: self.name,
            kind: self.kind,
            host: self.host,
            port: self.port,
            database: self.database,
            username: self.username,
            password: self.password,
            ssl,
        }
    }
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::Config::default_path)
    }
}
