//! docwire shell
//!
//! Connects to a server, prints what the handshake reported and optionally
//! runs one JSON command, printing the reply.

use std::{io::IsTerminal, path::PathBuf, time::Instant};

use anyhow::{Context, bail};
use clap::Parser;
use docwire_client::{Connection, Database, Host, RawCommand, TlsSettings};
use docwire_common::{DocwireError, Document, Value};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod format;

use config::ShellConfig;
use format::Formatter;

/// CLI arguments.
#[derive(Debug, Parser)]
#[command(name = "docwire", version, about = "Run commands against a document database server")]
struct Args {
    /// Server address as host[:port]. Overrides the config file.
    addr: Option<String>,

    /// Path to a TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// PEM file of trusted CA certificates; enables TLS.
    #[arg(long)]
    tls_ca: Option<PathBuf>,

    /// Name to verify the server certificate against.
    #[arg(long)]
    server_name: Option<String>,

    #[arg(long)]
    app_name: Option<String>,

    /// User name sent as the authentication mechanism hint.
    #[arg(short, long)]
    user: Option<String>,

    /// Database to run the command against.
    #[arg(short, long)]
    database: Option<String>,

    /// Append checksums to outgoing messages.
    #[arg(long)]
    checksum: bool,

    /// Print replies as extended JSON.
    #[arg(long)]
    json: bool,

    #[arg(long)]
    no_color: bool,

    /// Command document as a JSON object, e.g. '{"ping": 1}'.
    #[arg(short = 'e', long = "eval")]
    command: Option<String>,
}

impl Args {
    /// Layer command-line values over the loaded config.
    fn apply(&self, cfg: &mut ShellConfig) -> anyhow::Result<()> {
        if let Some(addr) = &self.addr {
            let host = Host::parse(addr)?;
            cfg.host = host.hostname;
            cfg.port = host.port;
        }
        if let Some(ca_path) = &self.tls_ca {
            let server_name = cfg.connection.tls.take().and_then(|tls| tls.server_name);
            cfg.connection.tls = Some(TlsSettings {
                ca_path: ca_path.clone(),
                server_name,
            });
        }
        if let Some(name) = &self.server_name {
            match cfg.connection.tls.as_mut() {
                Some(tls) => tls.server_name = Some(name.clone()),
                None => bail!("--server-name requires TLS (--tls-ca or a [connection.tls] section)"),
            }
        }
        if let Some(name) = &self.app_name {
            cfg.connection.app_name = Some(name.clone());
        }
        if let Some(user) = &self.user {
            cfg.connection.user = Some(user.clone());
        }
        if let Some(database) = &self.database {
            cfg.database = database.clone();
        }
        if self.checksum {
            cfg.connection.checksum = true;
        }
        Ok(())
    }
}

fn get_env_filter() -> EnvFilter {
    if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    } else if cfg!(debug_assertions) {
        EnvFilter::new("docwire=debug")
    } else {
        EnvFilter::new("docwire=info")
    }
}

/// Parse a command given on the command line. It must be a JSON object.
fn parse_command(text: &str) -> anyhow::Result<Document> {
    let json: serde_json::Value =
        serde_json::from_str(text).context("command is not valid JSON")?;
    match Value::from_json(json) {
        Value::Document(document) if !document.is_empty() => Ok(document),
        Value::Document(_) => bail!("command document is empty"),
        other => bail!("command must be a JSON object, got {}", other.type_name()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(get_env_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();

    let args = Args::parse();
    let mut cfg = ShellConfig::load(args.config.as_deref())?;
    args.apply(&mut cfg)?;

    let command = args.command.as_deref().map(parse_command).transpose()?;
    let formatter = Formatter::new(!args.no_color && std::io::stdout().is_terminal());

    let host = cfg.host();
    tracing::debug!(%host, tls = cfg.connection.tls.is_some(), "connecting");
    let connection = match Connection::connect(host.clone(), &cfg.connection).await {
        Ok(connection) => connection,
        Err(e) => fail(&formatter, &e, &format!("failed to connect to {host}"))?,
    };
    print!("{}", formatter.handshake(&host, connection.handshake()));

    let Some(command) = command else {
        return Ok(());
    };

    let database = Database::new(cfg.database.as_str());
    let started = Instant::now();
    let reply = match connection.run_command(&RawCommand(command), &database).await {
        Ok(reply) => reply,
        Err(e) => fail(&formatter, &e, "command failed")?,
    };
    tracing::debug!(elapsed = ?started.elapsed(), %database, "command complete");

    println!();
    if args.json {
        println!("{}", formatter.json(&reply));
    } else {
        println!("{}", formatter.document(&reply));
    }
    Ok(())
}

/// Print a library error the way the shell shows errors and bail out.
fn fail<T>(formatter: &Formatter, error: &DocwireError, context: &str) -> anyhow::Result<T> {
    eprintln!("{}", formatter.error(error));
    Err(anyhow::anyhow!("{context}: {error}"))
}
