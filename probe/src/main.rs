mod args;
mod report;

use args::{describe_tls, ConnectArgs};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use transport::prelude::*;

#[derive(Parser)]
#[command(name = "probe")]
#[command(about = "Connect to an AMQP broker and inspect the frames it sends")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, send the protocol header and print the frames that come back
    Connect(ConnectArgs),
    /// Show how an address splits into host and port
    ParseAddress {
        /// Address to parse
        address: String,
        /// Port used when the address names none
        #[arg(long, default_value_t = AMQP_PORT)]
        default_port: u16,
    },
    /// Load and validate a TOML transport config
    CheckConfig {
        /// Path to the config file
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Connect(args) => {
            connect(&args).await?;
        }
        Commands::ParseAddress {
            address,
            default_port,
        } => {
            parse_address(&address, default_port)?;
        }
        Commands::CheckConfig { path } => {
            check_config(&path)?;
        }
    }

    Ok(())
}

async fn connect(args: &ConnectArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.to_config()?;
    info!(
        "Probing {} (tls: {})",
        config.host,
        describe_tls(config.tls.as_ref())
    );

    let mut transport = create_transport(config)?;
    if let Err(e) = transport.connect().await {
        error!("Connect failed: {}", e);
        return Err(e.into());
    }

    match transport.peer() {
        Some(peer) => println!("Connected to {} over {}", peer, transport.transport_name()),
        None => println!("Connected over {}", transport.transport_name()),
    }

    let mut result = Ok(());
    for index in 1..=args.frames {
        match transport.read_frame().await {
            Ok(frame) => println!("{}", report::describe_frame(index, &frame)),
            Err(e) if e.is_timeout() => {
                println!("No frame within the timeout after {} frame(s)", index - 1);
                break;
            }
            Err(e) => {
                error!("Read failed: {}", e);
                result = Err(e);
                break;
            }
        }
    }

    transport.close().await?;
    println!("Connection closed");
    result?;
    Ok(())
}

fn parse_address(address: &str, default_port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let (host, port) = to_host_port(address, default_port)?;
    println!("host: {}", host);
    println!("port: {}", port);
    Ok(())
}

fn check_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = TransportConfig::from_file(path)?;
    println!("{} is valid", path.display());
    for line in report::describe_config(&config) {
        println!("  {}", line);
    }
    Ok(())
}
