//! relaynet CLI
//!
//! Operator tooling for the relaynet backend: key generation, configuration
//! checks, packet inspection and an in-process fleet simulation.

mod config;

use clap::builder::RangedU64ValueParser;
use clap::{Parser, Subcommand, ValueEnum};
use rand::Rng;
use relaynet_backend::{
    BackendContext, BackendKeys, Datacenter, HandlerError, InMemoryStore, InMemoryStorer, Relay,
    Seller, relay_init, relay_update,
};
use relaynet_core::packets::server::packet_type;
use relaynet_core::{
    INIT_REQUEST_MAGIC, MAX_RELAYS, Packet, RelayInitRequest, RelayInitResponse, RelayPingStats,
    RelayPingTarget, RelayUpdateRequest, RelayUpdateResponse, ServerInitRequest,
    ServerInitResponse, ServerUpdate, SessionResponse, SessionUpdate, TrafficStats,
};
use relaynet_crypto::sealed_box::{Nonce, generate_token, seal_token};
use relaynet_crypto::signatures::SigningKey;
use relaynet_crypto::x25519::PrivateKey;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;

use config::Config;

/// relaynet - relay overlay control plane
#[derive(Parser)]
#[command(name = "relaynet")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate backend key material
    Keygen {
        /// Write the keys into this config file instead of printing them
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate the configuration and seed file
    CheckConfig,

    /// Decode a packet and print its fields
    Decode {
        /// Packet kind
        #[arg(value_enum)]
        kind: PacketKind,

        /// Packet bytes as hex
        #[arg(conflicts_with = "file")]
        hex: Option<String>,

        /// Read packet bytes from a file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Body is JSON rather than binary (relay packets only)
        #[arg(long)]
        json: bool,
    },

    /// Run an in-process relay fleet against the backend
    Simulate {
        /// Number of relays, at most one full fleet
        #[arg(
            short,
            long,
            default_value_t = 8,
            value_parser = RangedU64ValueParser::<usize>::new().range(1..=MAX_RELAYS as u64)
        )]
        relays: usize,

        /// Update rounds after init
        #[arg(short = 'n', long, default_value_t = 3)]
        rounds: u32,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PacketKind {
    /// Relay init request
    RelayInit,
    /// Relay init response
    RelayInitResponse,
    /// Relay update request
    RelayUpdate,
    /// Relay update response
    RelayUpdateResponse,
    /// Server datagram, typed by its first byte
    Server,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load_or_default(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(if cli.verbose {
            "debug"
        } else {
            config.logging.level.as_str()
        })
        .init();

    match cli.command {
        Commands::Keygen { output } => generate_keys(config, output),
        Commands::CheckConfig => check_config(&config),
        Commands::Decode {
            kind,
            hex,
            file,
            json,
        } => decode_packet(kind, hex, file, json),
        Commands::Simulate { relays, rounds } => {
            config.validate()?;
            simulate(&config, relays, rounds).await
        }
    }
}

/// Generate backend keys, printing them or saving them into a config file
fn generate_keys(mut config: Config, output: Option<PathBuf>) -> anyhow::Result<()> {
    let mut rng = rand_core::OsRng;
    let relay_key = PrivateKey::generate(&mut rng);
    let signing_key = SigningKey::generate(&mut rng);

    println!(
        "Relay init public key (give to relays): {}",
        hex::encode(relay_key.public_key().to_bytes())
    );
    println!(
        "Response verifying key (give to game servers): {}",
        hex::encode(signing_key.verifying_key().to_bytes())
    );

    config.keys.relay_private_key = Some(hex::encode(relay_key.to_bytes()));
    config.keys.signing_key = Some(hex::encode(signing_key.to_bytes()));

    if let Some(path) = output {
        config.save(&path)?;
        println!("\nKeys saved to: {}", path.display());
        println!("\n⚠️  Keep this file secure! It contains private keys.");
    } else {
        println!("\n[keys]");
        if let Some(key) = &config.keys.relay_private_key {
            println!("relay_private_key = \"{key}\"");
        }
        if let Some(key) = &config.keys.signing_key {
            println!("signing_key = \"{key}\"");
        }
        println!("\n⚠️  Private keys not saved (use --output to save)");
    }

    Ok(())
}

/// Validate configuration and print a summary
fn check_config(config: &Config) -> anyhow::Result<()> {
    config.validate()?;
    let backend = config.backend_config()?;

    println!("Configuration OK");
    println!("  Relay TTL: {:?}", backend.relay_ttl);
    println!("  Server TTL: {:?}", backend.server_ttl);
    println!("  Session TTL: {:?}", backend.session_ttl);
    println!("  Store timeout: {:?}", backend.store_timeout);
    println!("  Minimum SDK: {}", backend.sdk_version_min);

    match config.backend_keys()? {
        Some(keys) => {
            println!(
                "  Relay init key: {}",
                hex::encode(keys.relay_public().to_bytes())
            );
            println!("  Signing key: {}", hex::encode(keys.signing_public()));
        }
        None => println!("  Keys: not configured"),
    }

    if let Some(seed) = &config.directory.seed_file {
        let storer = InMemoryStorer::from_json(&std::fs::read(seed)?)?;
        println!("  Seed: {} ({} relays)", seed.display(), storer.relay_count());
    }

    Ok(())
}

/// Decode one packet and print it
fn decode_packet(
    kind: PacketKind,
    hex_input: Option<String>,
    file: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    let data = match (hex_input, file) {
        (Some(text), None) => hex::decode(text.trim())?,
        (None, Some(path)) => std::fs::read(path)?,
        _ => anyhow::bail!("provide packet bytes as hex or with --file"),
    };

    match (kind, json) {
        (PacketKind::RelayInit, false) => println!("{:#?}", RelayInitRequest::decode(&data)?),
        (PacketKind::RelayInit, true) => println!("{:#?}", RelayInitRequest::from_json(&data)?),
        (PacketKind::RelayInitResponse, false) => {
            println!("{:#?}", RelayInitResponse::decode(&data)?)
        }
        (PacketKind::RelayInitResponse, true) => {
            println!("{:#?}", RelayInitResponse::from_json(&data)?)
        }
        (PacketKind::RelayUpdate, false) => println!("{:#?}", RelayUpdateRequest::decode(&data)?),
        (PacketKind::RelayUpdate, true) => {
            println!("{:#?}", RelayUpdateRequest::from_json(&data)?)
        }
        (PacketKind::RelayUpdateResponse, false) => {
            println!("{:#?}", RelayUpdateResponse::decode(&data)?)
        }
        (PacketKind::RelayUpdateResponse, true) => {
            println!("{:#?}", RelayUpdateResponse::from_json(&data)?)
        }
        (PacketKind::Server, false) => decode_server_datagram(&data)?,
        (PacketKind::Server, true) => anyhow::bail!("server datagrams are binary only"),
    }

    Ok(())
}

fn decode_server_datagram(data: &[u8]) -> anyhow::Result<()> {
    let Some((&kind, body)) = data.split_first() else {
        anyhow::bail!("empty datagram");
    };
    match kind {
        packet_type::SERVER_UPDATE => println!("{:#?}", ServerUpdate::decode(body)?),
        packet_type::SESSION_UPDATE => println!("{:#?}", SessionUpdate::decode(body)?),
        packet_type::SESSION_RESPONSE => println!("{:#?}", SessionResponse::decode(body)?),
        packet_type::SERVER_INIT_REQUEST => println!("{:#?}", ServerInitRequest::decode(body)?),
        packet_type::SERVER_INIT_RESPONSE => println!("{:#?}", ServerInitResponse::decode(body)?),
        other => anyhow::bail!("unknown packet type {other}"),
    }
    Ok(())
}

/// A simulated relay's key and public address
struct SimRelay {
    key: PrivateKey,
    address: std::net::SocketAddr,
}

const SIM_DATACENTERS: [(&str, f64, f64); 4] = [
    ("sim.frankfurt", 50.11, 8.68),
    ("sim.virginia", 38.95, -77.45),
    ("sim.saopaulo", -23.55, -46.63),
    ("sim.tokyo", 35.68, 139.69),
];

/// Run a fleet of relays through init and update rounds
async fn simulate(config: &Config, relay_count: usize, rounds: u32) -> anyhow::Result<()> {
    if relay_count == 0 || relay_count > MAX_RELAYS {
        anyhow::bail!("relay count must be between 1 and {MAX_RELAYS}");
    }

    let keys = match config.backend_keys()? {
        Some(keys) => keys,
        None => {
            tracing::warn!("No backend keys configured, using ephemeral keys");
            BackendKeys::generate(&mut rand_core::OsRng)
        }
    };

    let storer = match &config.directory.seed_file {
        Some(seed) => InMemoryStorer::from_json(&std::fs::read(seed)?)?,
        None => InMemoryStorer::new(),
    };
    let storer = Arc::new(storer);
    let store = Arc::new(InMemoryStore::new());

    let fleet: Arc<Vec<SimRelay>> = Arc::new(
        (0..relay_count)
            .map(|i| -> anyhow::Result<SimRelay> {
                let key = PrivateKey::generate(&mut rand_core::OsRng);
                let address = format!("10.{}.{}.1:40000", i / 256, i % 256).parse()?;
                let (name, lat, lon) = SIM_DATACENTERS[i % SIM_DATACENTERS.len()];
                let mut relay = Relay::new(
                    &format!("sim.relay.{i}"),
                    address,
                    key.public_key().to_bytes(),
                    Datacenter::new(name, lat, lon),
                    Seller {
                        id: "sim".into(),
                        name: "Simulated".into(),
                        egress_price_cents: 0,
                    },
                );
                relay.max_sessions = 1000;
                storer.add_relay(relay);
                Ok(SimRelay { key, address })
            })
            .collect::<anyhow::Result<_>>()?,
    );

    let ctx = BackendContext::new(storer.clone(), store.clone(), keys, config.backend_config()?);
    let relay_public = ctx.keys.relay_public();

    tracing::info!("Simulating {} relays for {} rounds", relay_count, rounds);

    let mut tasks = JoinSet::new();
    for index in 0..fleet.len() {
        let ctx = ctx.clone();
        let fleet = fleet.clone();
        tasks.spawn(async move {
            let relay = &fleet[index];
            let nonce = Nonce::generate(&mut rand_core::OsRng);
            let token = generate_token(&mut rand_core::OsRng);
            let encrypted_token = seal_token(&token, &nonce, &relay.key, &relay_public)?;
            let request = RelayInitRequest {
                magic: INIT_REQUEST_MAGIC,
                version: 0,
                nonce: *nonce.as_bytes(),
                address: relay.address,
                encrypted_token,
            };
            relay_init(&ctx, None, &request.encode()?).await?;
            Ok::<_, anyhow::Error>(())
        });
    }
    let (ok, failed) = drain(&mut tasks).await;
    println!("init: {ok} accepted, {failed} rejected");

    let mut peers: Vec<Vec<RelayPingTarget>> = vec![Vec::new(); fleet.len()];
    for round in 1..=rounds {
        let mut tasks = JoinSet::new();
        for (index, targets) in peers.iter().enumerate() {
            let ctx = ctx.clone();
            let fleet = fleet.clone();
            let request = update_request(&fleet[index], targets);
            tasks.spawn(async move {
                let response = relay_update(&ctx, None, &request.encode()?).await?;
                let decoded = RelayUpdateResponse::decode(&response.body)?;
                Ok::<_, anyhow::Error>((index, decoded.relays_to_ping))
            });
        }

        let mut accepted = 0usize;
        let mut rejected = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined? {
                Ok((index, targets)) => {
                    peers[index] = targets;
                    accepted += 1;
                }
                Err(e) => {
                    if let Some(handler) = e.downcast_ref::<HandlerError>() {
                        tracing::warn!("update rejected ({}): {}", handler.status().code(), handler);
                    }
                    rejected += 1;
                }
            }
        }

        let purged = store.purge_expired();
        let mean_peers = peers.iter().map(Vec::len).sum::<usize>() as f64 / fleet.len() as f64;
        println!(
            "round {round}: {accepted} accepted, {rejected} rejected, {mean_peers:.1} peers per relay, {purged} purged"
        );
    }

    let ids: Vec<u64> = ctx
        .directory
        .live_relays()
        .await?
        .iter()
        .map(|relay| relay.id)
        .collect();
    let costs = ctx
        .stats
        .costs(&ids, ctx.config.max_jitter, ctx.config.max_packet_loss);
    let routable = costs.iter().filter(|c| **c >= 0).count();
    println!(
        "cost matrix: {} relays, {} of {} pairs routable",
        ids.len(),
        routable,
        costs.len()
    );

    Ok(())
}

async fn drain(tasks: &mut JoinSet<anyhow::Result<()>>) -> (usize, usize) {
    let mut ok = 0;
    let mut failed = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => ok += 1,
            Ok(Err(e)) => {
                tracing::warn!("init failed: {}", e);
                failed += 1;
            }
            Err(e) => {
                tracing::error!("init task panicked: {}", e);
                failed += 1;
            }
        }
    }
    (ok, failed)
}

/// Update request reporting synthetic measurements for every assigned peer
fn update_request(relay: &SimRelay, targets: &[RelayPingTarget]) -> RelayUpdateRequest {
    let mut rng = rand::thread_rng();
    let ping_stats = targets
        .iter()
        .map(|target| RelayPingStats {
            relay_id: target.id,
            rtt: rng.gen_range(5.0..150.0),
            jitter: rng.gen_range(0.0..12.0),
            packet_loss: if rng.gen_bool(0.9) { 0.0 } else { rng.gen_range(0.0..5.0) },
        })
        .collect();
    let traffic_stats = TrafficStats {
        session_count: rng.gen_range(0..200),
        ..TrafficStats::default()
    };

    RelayUpdateRequest {
        version: 1,
        address: relay.address,
        token: relay.key.public_key().to_bytes(),
        ping_stats,
        traffic_stats,
        shutting_down: false,
        cpu_usage: rng.gen_range(1.0..90.0),
        mem_usage: rng.gen_range(1.0..90.0),
        relay_version: env!("CARGO_PKG_VERSION").to_string(),
    }
}
