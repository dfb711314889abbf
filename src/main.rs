//! rondo daemon: join (or found) a ring and serve it forever.
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::filter::LevelFilter;

use rondo::config::Config;
use rondo::dht::Stabilizer;
use rondo::logging;
use rondo::logging::LogLevel;
use rondo::node::Node;
use rondo::rpc;

#[derive(Parser, Debug)]
#[command(name = "rondo", version, about = "Chord ring membership and routing daemon")]
struct Args {
    /// YAML config file. Flags below override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind and advertise.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind and advertise.
    #[arg(long)]
    port: Option<u16>,

    /// Bootstrap peer as host:port. Omit to found a new ring.
    #[arg(long)]
    known: Option<String>,

    /// Identifier bit length m; must match across the ring.
    #[arg(long)]
    hash_bits: Option<u32>,

    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::read_fs(path)?,
        None => Config::new("", 0),
    };
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(known) = &args.known {
        let (host, port) = known
            .rsplit_once(':')
            .ok_or_else(|| anyhow::anyhow!("--known expects host:port, got {known}"))?;
        config.known_host = Some(host.to_owned());
        config.known_port = Some(port.parse()?);
    }
    if let Some(bits) = args.hash_bits {
        config.hash_bits = bits;
    }

    let level = if config.debug {
        LevelFilter::DEBUG
    } else {
        args.log_level.into()
    };
    logging::init(level);

    let node = Arc::new(Node::new(&config)?);
    let (addr, server) =
        rpc::server::spawn(Arc::clone(&node), (config.host.as_str(), config.port)).await?;
    tracing::info!(%addr, id = %node.id(), "ring rpc listening");

    node.join_cluster().await?;
    Stabilizer::new(Arc::clone(&node), config.intervals()).start();

    server.await?;
    Ok(())
}
