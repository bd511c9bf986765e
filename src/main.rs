//! `ppc-node` — command-line driver for the PPC engine.
//!
//! This binary is a local two-party demo harness, not a network daemon: the
//! crate defines the `Transport` seam (`ppc_core::transport`) but ships only
//! an in-memory implementation, so `ppc-node` runs both parties of whichever
//! protocol is requested in-process over `InMemoryTransport` and prints the
//! result. A real deployment plugs its own `Transport` in where this binary
//! plugs in the in-memory one.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use ppc_core::config::{Cm2020Params, EngineConfig};
use ppc_core::crypto::ecc::CurveType;
use ppc_core::crypto::hash::HashType;
use ppc_core::protocol::cm2020;
use ppc_core::protocol::dispatcher::{Dispatcher, DispatcherTransport};
use ppc_core::protocol::ecdh_psi::{self, EcdhPsiParams};
use ppc_core::protocol::framing::{AlgorithmId, TaskType};
use ppc_core::protocol::ot_pir;
use ppc_core::protocol::task::{PartyRole, ResourceDescriptor, Task};
use ppc_core::transport::{InMemoryTransport, Transport};

#[derive(Parser)]
#[command(name = "ppc-node", version, about = "Privacy-preserving computation node")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Curve for EC-based primitives.
    #[arg(long, value_enum, default_value_t = CurveArg::P256, global = true)]
    curve: CurveArg,

    /// Hash function for set-item digests.
    #[arg(long, value_enum, default_value_t = HashArg::Sha256, global = true)]
    hash: HashArg,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CurveArg {
    Ed25519,
    Sm2,
    Secp256k1,
    P256,
    X25519Batched,
}

impl From<CurveArg> for CurveType {
    fn from(a: CurveArg) -> Self {
        match a {
            CurveArg::Ed25519 => CurveType::Ed25519,
            CurveArg::Sm2 => CurveType::Sm2,
            CurveArg::Secp256k1 => CurveType::Secp256k1,
            CurveArg::P256 => CurveType::P256,
            CurveArg::X25519Batched => CurveType::X25519Batched,
        }
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum HashArg {
    Sha256,
    Sha512,
    Sm3,
    Md5,
}

impl From<HashArg> for HashType {
    fn from(a: HashArg) -> Self {
        match a {
            HashArg::Sha256 => HashType::Sha256,
            HashArg::Sha512 => HashType::Sha512,
            HashArg::Sm3 => HashType::Sm3,
            HashArg::Md5 => HashType::Md5,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run ECDH-PSI between two newline-delimited item files.
    EcdhPsi {
        /// Client's set, one item per line.
        client_items: PathBuf,
        /// Server's set, one item per line.
        server_items: PathBuf,
        /// Whether the server streams the intersection back to the client.
        #[arg(long, default_value_t = true)]
        sync_results_back: bool,
    },
    /// Run CM2020 OT-extension PSI between two newline-delimited item files.
    Cm2020Psi {
        receiver_items: PathBuf,
        sender_items: PathBuf,
        #[arg(long, default_value_t = 512)]
        bucket_number: u32,
        /// Synchronous, backpressured matrix sends instead of streaming
        /// ahead unacknowledged (§5).
        #[arg(long, default_value_t = false)]
        low_bandwidth: bool,
        /// Whether the receiver streams the intersection indices back to
        /// the sender once PSI finish completes.
        #[arg(long, default_value_t = true)]
        sync_results_back: bool,
    },
    /// Run OT-based PIR: look up `search_id` in `candidate_file`'s `id,record` rows.
    OtPir {
        candidate_file: PathBuf,
        search_id: String,
        #[arg(long, default_value_t = 6)]
        prefix_len: usize,
    },
}

fn read_lines(path: &PathBuf) -> std::io::Result<Vec<Vec<u8>>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .filter(|l| !l.is_empty())
        .map(|l| l.as_bytes().to_vec())
        .collect())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ppc_core=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    let mut config = EngineConfig::default();
    config.curve = args.curve.into();
    config.hash = args.hash.into();
    if let Err(e) = config.validate() {
        error!("invalid engine config: {e}");
        return;
    }

    let result = match args.command {
        Command::EcdhPsi {
            client_items,
            server_items,
            sync_results_back,
        } => run_ecdh_psi(&config, &client_items, &server_items, sync_results_back).await,
        Command::Cm2020Psi {
            receiver_items,
            sender_items,
            bucket_number,
            low_bandwidth,
            sync_results_back,
        } => {
            run_cm2020_psi(
                &config,
                &receiver_items,
                &sender_items,
                bucket_number,
                low_bandwidth,
                sync_results_back,
            )
            .await
        }
        Command::OtPir {
            candidate_file,
            search_id,
            prefix_len,
        } => run_ot_pir(&config, &candidate_file, &search_id, prefix_len).await,
    };

    if let Err(e) = result {
        error!("task failed: {e}");
        std::process::exit(1);
    }
}

async fn run_ecdh_psi(
    config: &EngineConfig,
    client_items: &PathBuf,
    server_items: &PathBuf,
    sync_results_back: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let x = read_lines(client_items)?;
    let y = read_lines(server_items)?;
    info!("ecdh-psi: client has {} items, server has {} items", x.len(), y.len());

    let raw = Arc::new(InMemoryTransport::new());
    raw.register("server", "demo-ecdh-psi");
    raw.register("client", "demo-ecdh-psi");
    let raw: Arc<dyn Transport> = raw;

    let task_id = "demo-ecdh-psi";
    let client_dispatcher = Dispatcher::new(config.clone());
    let server_dispatcher = Dispatcher::new(config.clone());
    let (client_transport, _client_state) = DispatcherTransport::submit(
        client_dispatcher,
        Arc::clone(&raw),
        "client",
        Task::new(
            task_id,
            AlgorithmId::EcdhPsi,
            TaskType::Psi,
            PartyRole::Client,
            "server",
            ResourceDescriptor::InMemory,
            ResourceDescriptor::InMemory,
        ),
    )
    .await?;
    let (server_transport, _server_state) = DispatcherTransport::submit(
        server_dispatcher,
        Arc::clone(&raw),
        "server",
        Task::new(
            task_id,
            AlgorithmId::EcdhPsi,
            TaskType::Psi,
            PartyRole::Server,
            "client",
            ResourceDescriptor::InMemory,
            ResourceDescriptor::InMemory,
        ),
    )
    .await?;

    let params = EcdhPsiParams {
        curve: config.curve,
        hash: config.hash,
        sync_results_back,
        ..EcdhPsiParams::default()
    };

    let (client_res, server_res) = tokio::join!(
        ecdh_psi::run_client(client_transport, task_id, "server", "client", params, &x),
        ecdh_psi::run_server(server_transport, task_id, "client", "server", params, &y),
    );
    server_res?;
    let intersection = client_res?;
    info!("ecdh-psi: intersection size {}", intersection.len());
    for item in &intersection {
        info!("  {}", String::from_utf8_lossy(item));
    }
    Ok(())
}

async fn run_cm2020_psi(
    config: &EngineConfig,
    receiver_items: &PathBuf,
    sender_items: &PathBuf,
    bucket_number: u32,
    low_bandwidth: bool,
    sync_results_back: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let receiver_set = read_lines(receiver_items)?;
    let sender_set = read_lines(sender_items)?;
    info!(
        "cm2020-psi: receiver has {} items, sender has {} items",
        receiver_set.len(),
        sender_set.len()
    );

    let raw = Arc::new(InMemoryTransport::new());
    raw.register("sender", "demo-cm2020-psi");
    raw.register("receiver", "demo-cm2020-psi");
    let raw: Arc<dyn Transport> = raw;

    let task_id = "demo-cm2020-psi";
    let receiver_dispatcher = Dispatcher::new(config.clone());
    let sender_dispatcher = Dispatcher::new(config.clone());
    let mut receiver_task = Task::new(
        task_id,
        AlgorithmId::Cm2020Psi,
        TaskType::Psi,
        PartyRole::Server,
        "sender",
        ResourceDescriptor::InMemory,
        ResourceDescriptor::InMemory,
    );
    receiver_task.low_bandwidth = low_bandwidth;
    receiver_task.sync_results_back = sync_results_back;
    let mut sender_task = Task::new(
        task_id,
        AlgorithmId::Cm2020Psi,
        TaskType::Psi,
        PartyRole::Client,
        "receiver",
        ResourceDescriptor::InMemory,
        ResourceDescriptor::InMemory,
    );
    sender_task.low_bandwidth = low_bandwidth;
    sender_task.sync_results_back = sync_results_back;

    let (receiver_transport, _receiver_state) = DispatcherTransport::submit(
        receiver_dispatcher,
        Arc::clone(&raw),
        "receiver",
        receiver_task,
    )
    .await?;
    let (sender_transport, _sender_state) =
        DispatcherTransport::submit(sender_dispatcher, Arc::clone(&raw), "sender", sender_task)
            .await?;

    let params = Cm2020Params {
        bucket_number,
        ..config.cm2020
    };
    let max_input_size = receiver_set.len().max(sender_set.len()) as u64;

    let (receiver_res, sender_res) = tokio::join!(
        cm2020::run_receiver(
            receiver_transport,
            task_id,
            "sender",
            "receiver",
            config.curve,
            config.hash,
            params,
            &receiver_set,
            max_input_size,
            low_bandwidth,
            sync_results_back,
        ),
        cm2020::run_sender(
            sender_transport,
            task_id,
            "receiver",
            "sender",
            config.curve,
            config.hash,
            &sender_set,
        ),
    );
    let matched_indices = receiver_res?;
    let _sender_matched = sender_res?;
    info!("cm2020-psi: matched {} receiver-side indices", matched_indices.len());
    for idx in &matched_indices {
        info!("  {}", String::from_utf8_lossy(&receiver_set[*idx as usize]));
    }
    Ok(())
}

async fn run_ot_pir(
    config: &EngineConfig,
    candidate_file: &PathBuf,
    search_id: &str,
    prefix_len: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("ot-pir: querying {:?} for {search_id:?}", candidate_file);

    let raw = Arc::new(InMemoryTransport::new());
    raw.register("server", "demo-ot-pir");
    raw.register("client", "demo-ot-pir");
    let raw: Arc<dyn Transport> = raw;

    let task_id = "demo-ot-pir";
    let client_dispatcher = Dispatcher::new(config.clone());
    let server_dispatcher = Dispatcher::new(config.clone());
    let (client_transport, _client_state) = DispatcherTransport::submit(
        client_dispatcher,
        Arc::clone(&raw),
        "client",
        Task::new(
            task_id,
            AlgorithmId::OtPir,
            TaskType::Pir,
            PartyRole::Client,
            "server",
            ResourceDescriptor::InMemory,
            ResourceDescriptor::InMemory,
        ),
    )
    .await?;
    let (server_transport, _server_state) = DispatcherTransport::submit(
        server_dispatcher,
        Arc::clone(&raw),
        "server",
        Task::new(
            task_id,
            AlgorithmId::OtPir,
            TaskType::Pir,
            PartyRole::Server,
            "client",
            ResourceDescriptor::InMemory,
            ResourceDescriptor::InMemory,
        ),
    )
    .await?;

    let path = candidate_file.to_string_lossy().into_owned();
    let (client_res, server_res) = tokio::join!(
        ot_pir::run_client(
            client_transport,
            task_id,
            "server",
            "client",
            config.curve,
            config.hash,
            search_id.as_bytes(),
            prefix_len,
        ),
        ot_pir::run_server(
            server_transport,
            task_id,
            "client",
            "server",
            config.curve,
            config.hash,
            &path
        ),
    );
    server_res?;
    match client_res? {
        Some(record) => info!("ot-pir: found record {:?}", String::from_utf8_lossy(&record)),
        None => info!("ot-pir: no matching record"),
    }
    Ok(())
}
