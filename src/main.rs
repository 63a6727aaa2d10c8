//! Sockdial - SOCKS5 client probe
//!
//! Exercises CONNECT, UDP ASSOCIATE and BIND against a SOCKS5 proxy.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sockdial::config::load_config;
use sockdial::{Client, ClientConfig, TargetAddr};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// How long to wait for an answer to a probe
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Sockdial - SOCKS5 client probe
#[derive(Parser, Debug)]
#[command(name = "sockdial")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SOCKS5 server address (overrides the configuration file)
    #[arg(short, long)]
    server: Option<String>,

    /// Username (overrides the configuration file)
    #[arg(short, long)]
    username: Option<String>,

    /// Password (overrides the configuration file)
    #[arg(short, long)]
    password: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// CONNECT to a target, send a payload and print the reply
    Tcp {
        /// Target address (host:port)
        target: String,
        /// Payload to send
        #[arg(long, default_value = "ping")]
        payload: String,
    },
    /// UDP ASSOCIATE, send one datagram to a target and print the reply
    Udp {
        /// Target address (ipv4:port)
        target: String,
        /// Payload to send
        #[arg(long, default_value = "ping")]
        payload: String,
    },
    /// BIND, wait for one inbound connection and print what it sends
    Listen {
        /// Local listener address
        local: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level, args.json_log)?;

    let config = client_config(&args)?;
    info!("Sockdial v{}", sockdial::VERSION);
    info!("SOCKS5 server: {}", config.server_addr);

    let client = Client::new(config).context("Invalid client configuration")?;

    match &args.command {
        Command::Tcp { target, payload } => probe_tcp(&client, target, payload).await,
        Command::Udp { target, payload } => probe_udp(&client, target, payload).await,
        Command::Listen { local } => probe_listen(&client, *local).await,
    }
}

/// Merge the configuration file with command line overrides
fn client_config(args: &Args) -> Result<ClientConfig> {
    let mut config = match (&args.config, &args.server) {
        (Some(path), _) => {
            let config = load_config(path)?;
            info!("Configuration loaded from: {:?}", path);
            config.client
        }
        (None, Some(server)) => ClientConfig::new(server.clone()),
        (None, None) => bail!("either --config or --server is required"),
    };

    if let Some(server) = &args.server {
        config.server_addr = server.clone();
    }
    if args.username.is_some() {
        config.username = args.username.clone();
    }
    if args.password.is_some() {
        config.password = args.password.clone();
    }

    Ok(config)
}

async fn probe_tcp(client: &Client, target: &str, payload: &str) -> Result<()> {
    let target: TargetAddr = target
        .parse()
        .with_context(|| format!("Invalid target: {}", target))?;

    let mut stream = client
        .dial_tcp(&target)
        .await
        .with_context(|| format!("CONNECT to {} failed", target))?;
    info!("Connected {} -> {}", stream.local_addr(), stream.remote_addr());

    stream.write_all(payload.as_bytes()).await?;
    stream.set_read_deadline(Some(Instant::now() + REPLY_TIMEOUT));

    let mut buf = vec![0u8; 4096];
    let n = stream.read(&mut buf).await.context("No reply")?;
    println!("{}", String::from_utf8_lossy(&buf[..n]));

    stream.close().await?;
    Ok(())
}

async fn probe_udp(client: &Client, target: &str, payload: &str) -> Result<()> {
    let target: TargetAddr = target
        .parse()
        .with_context(|| format!("Invalid target: {}", target))?;

    let conn = client
        .dial_udp(&target)
        .await
        .with_context(|| format!("UDP ASSOCIATE for {} failed", target))?;
    info!("Relay {} for {}", conn.relay_addr(), target);

    let sent = conn.write(payload.as_bytes()).await?;
    info!("Sent {} bytes", sent);

    conn.set_read_deadline(Some(Instant::now() + REPLY_TIMEOUT));
    let mut buf = vec![0u8; 65_507];
    let n = conn.read(&mut buf).await.context("No reply")?;
    println!("{}", String::from_utf8_lossy(&buf[..n]));

    conn.close().await?;
    Ok(())
}

async fn probe_listen(client: &Client, local: SocketAddr) -> Result<()> {
    let mut listener = client
        .listen_tcp(local)
        .await
        .with_context(|| format!("BIND from {} failed", local))?;
    println!("Listening on {}", listener.addr());

    let accepted = tokio::select! {
        accepted = listener.accept() => Some(accepted?),
        _ = tokio::signal::ctrl_c() => None,
    };
    let Some(mut stream) = accepted else {
        info!("Received Ctrl+C, shutting down...");
        listener.close().await?;
        return Ok(());
    };
    info!("Accepted connection from {}", stream.remote_addr());

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    println!("{}", String::from_utf8_lossy(&buf));

    stream.close().await?;
    listener.close().await?;
    Ok(())
}

/// Setup logging based on configuration
///
/// `RUST_LOG` directives take precedence over `--log-level`.
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(parse_level(level).into())
        .from_env_lossy();

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}

fn parse_level(level: &str) -> LevelFilter {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    LevelFilter::from_level(level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_tcp() {
        let args = Args::parse_from([
            "sockdial",
            "--server",
            "127.0.0.1:1080",
            "tcp",
            "example.com:80",
        ]);
        assert!(matches!(args.command, Command::Tcp { ref payload, .. } if payload == "ping"));

        let config = client_config(&args).unwrap();
        assert_eq!(config.server_addr, "127.0.0.1:1080");
        assert_eq!(config.username, None);
    }

    #[test]
    fn test_args_credentials_override() {
        let args = Args::parse_from([
            "sockdial",
            "-s",
            "proxy:1080",
            "-u",
            "alice",
            "-p",
            "secret",
            "udp",
            "198.51.100.2:9001",
            "--payload",
            "hi",
        ]);
        let config = client_config(&args).unwrap();
        assert_eq!(config.username.as_deref(), Some("alice"));
        assert_eq!(config.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), LevelFilter::DEBUG);
        assert_eq!(parse_level("warning"), LevelFilter::WARN);
        assert_eq!(parse_level("bogus"), LevelFilter::INFO);
    }

    #[test]
    fn test_args_require_server() {
        let args = Args::parse_from(["sockdial", "listen", "127.0.0.1:0"]);
        assert!(client_config(&args).is_err());
    }
}
