//! The `breakwater` command line: `serve` runs a single HTTP/1.x listener,
//! `proxy` runs the forwarding proxy, `cluster` re-execs this binary as N
//! worker processes behind a [`breakwater_core::cluster::Master`].
//!
//! Options:
//! - `--bind` - address to listen on (`serve`/`proxy`)
//! - `--workers` - worker process count (`cluster`)
//! - `--restart` - respawn crashed workers (`cluster`)

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use breakwater_core::cluster::{self, ClusterConfig, IpcMode, Master, ProcessEvent, WorkerIo};
use breakwater_core::endpoint::{Endpoint, EndpointConfig};
use breakwater_core::http1::message::{HttpMessage, Role};
use breakwater_core::http1::parser::Parser as HttpParser;
use breakwater_core::http1::serializer;
use breakwater_core::proxy::{self, AuthOutcome, AuthType, ConnectionPolicy, ProxyConfig, RequestAction};

#[derive(Parser)]
#[command(name = "breakwater", version, about = "Reactor-based HTTP/WebSocket/SOCKS5 proxy engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (debug instead of info).
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single HTTP/1.x listener.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: SocketAddr,

        /// Set by the cluster master when re-exec'ing a worker; not meant
        /// to be passed by hand.
        #[arg(long, hide = true)]
        cluster_worker: Option<usize>,
    },
    /// Run the forwarding proxy.
    Proxy {
        #[arg(long, default_value = "0.0.0.0:8888")]
        bind: SocketAddr,

        /// Disable CONNECT tunneling; plain requests are still forwarded.
        #[arg(long)]
        no_connect: bool,

        #[arg(long, value_enum, default_value = "none")]
        auth: CliAuthType,

        #[arg(long)]
        max_requests: Option<u32>,

        #[arg(long)]
        alive: bool,

        #[arg(long, hide = true)]
        cluster_worker: Option<usize>,
    },
    /// Supervise a pool of worker processes running `serve` or `proxy`.
    Cluster {
        #[arg(long, default_value_t = 4)]
        workers: usize,

        #[arg(long)]
        restart: bool,

        /// The subcommand (with its own flags) each worker replays, e.g.
        /// `serve --bind 0.0.0.0:8080`.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        worker_args: Vec<String>,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum CliAuthType {
    None,
    Basic,
    Digest,
}

impl From<CliAuthType> for AuthType {
    fn from(value: CliAuthType) -> Self {
        match value {
            CliAuthType::None => AuthType::None,
            CliAuthType::Basic => AuthType::Basic,
            CliAuthType::Digest => AuthType::Digest,
        }
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("breakwater=debug,info")
        } else {
            EnvFilter::new("breakwater=info,warn")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Serve { bind, cluster_worker } => run_serve(bind, cluster_worker).await,
        Commands::Proxy {
            bind,
            no_connect,
            auth,
            max_requests,
            alive,
            cluster_worker,
        } => run_proxy(bind, !no_connect, auth.into(), max_requests, alive, cluster_worker).await,
        Commands::Cluster { workers, restart, worker_args } => run_cluster(workers, restart, worker_args).await,
    };

    if let Err(err) = result {
        error!(error = %err, "fatal error");
        std::process::exit(1);
    }
}

/// If this process was re-exec'd as a cluster worker, drive its IPC loop
/// alongside the listener so the master can ping it and request a quit.
async fn spawn_worker_ipc_if_needed(cluster_worker: Option<usize>) {
    if let Some(worker_id) = cluster_worker {
        info!(worker_id, "starting as cluster worker");
        tokio::task::spawn_local(async move {
            let mut io = WorkerIo::new(IpcMode::Async);
            let _ = io
                .run(|message| async move {
                    info!(pid = message.pid, quit = message.quit, bytes = message.payload.len(), "ipc message from master");
                })
                .await;
        });
    }
}

async fn run_serve(bind: SocketAddr, cluster_worker: Option<usize>) -> Result<(), std::io::Error> {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async move {
            spawn_worker_ipc_if_needed(cluster_worker).await;
            let listener = TcpListener::bind(bind).await?;
            info!(%bind, "listening (HTTP/1.x)");
            loop {
                let (stream, peer) = listener.accept().await?;
                tokio::task::spawn_local(async move {
                    if let Err(err) = serve_one(stream, peer).await {
                        warn!(%peer, error = %err, "connection ended with an error");
                    }
                });
            }
        })
        .await
}

async fn serve_one(mut stream: tokio::net::TcpStream, peer: SocketAddr) -> Result<(), std::io::Error> {
    let mut endpoint = Endpoint::new(EndpointConfig::default());
    let mut parser = HttpParser::new();
    let mut msg = HttpMessage::new(Role::Request);
    let mut buf = [0u8; 8192];

    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        parser
            .feed(&mut msg, &buf[..n])
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

        if msg.is_terminal() {
            let request_id = endpoint.begin_request(0, &msg.method, &msg.url);
            info!(%peer, method = %msg.method, url = %msg.url, "request");

            let mut response = HttpMessage::new(Role::Response);
            response.version = msg.version;
            response.status = 200;
            response.reason = "OK".to_string();
            response.headers.set("Content-Length", "2");
            response.body = b"ok".to_vec();

            endpoint.on_response(0, request_id, response.status, &response.reason, None);
            stream.write_all(&serializer::serialize(&response)).await?;

            let keep_alive = msg
                .headers
                .get("Connection")
                .map(|v| !v.eq_ignore_ascii_case("close"))
                .unwrap_or(msg.version >= (1, 1));
            msg.reset();
            if !keep_alive {
                return Ok(());
            }
        }
    }
}

async fn run_proxy(
    bind: SocketAddr,
    connect_enabled: bool,
    auth_type: AuthType,
    max_requests: Option<u32>,
    alive: bool,
    cluster_worker: Option<usize>,
) -> Result<(), std::io::Error> {
    let config = ProxyConfig {
        connect_enabled,
        auth_type,
        digest_realm: "breakwater".to_string(),
        digest_nonce: "static-nonce".to_string(),
        digest_opaque: "static-opaque".to_string(),
        max_requests,
        alive,
        compressor: None,
        agent_os: std::env::consts::OS.to_string(),
        agent_name: "breakwater".to_string(),
        agent_id: "bw".to_string(),
        agent_version: env!("CARGO_PKG_VERSION").to_string(),
        self_host: bind.ip().to_string(),
        self_port: bind.port(),
    };

    let local = tokio::task::LocalSet::new();
    local
        .run_until(async move {
            spawn_worker_ipc_if_needed(cluster_worker).await;
            let listener = TcpListener::bind(bind).await?;
            info!(%bind, "listening (proxy)");
            loop {
                let (stream, peer) = listener.accept().await?;
                let config = config.clone();
                tokio::task::spawn_local(async move {
                    if let Err(err) = proxy_one(stream, peer, config).await {
                        warn!(%peer, error = %err, "proxy connection ended with an error");
                    }
                });
            }
        })
        .await
}

async fn proxy_one(mut stream: tokio::net::TcpStream, peer: SocketAddr, config: ProxyConfig) -> Result<(), std::io::Error> {
    let mut parser = HttpParser::new();
    let mut msg = HttpMessage::new(Role::Request);
    let mut buf = [0u8; 8192];
    let mut policy = ConnectionPolicy::default();

    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        parser
            .feed(&mut msg, &buf[..n])
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

        if !msg.is_terminal() {
            continue;
        }

        match check_auth(&msg, &config) {
            AuthOutcome::Challenge(challenge) => {
                let response = challenge_response(msg.version, &challenge);
                stream.write_all(&serializer::serialize(&response)).await?;
                msg.reset();
                continue;
            }
            AuthOutcome::Authenticated | AuthOutcome::NotRequired => {}
        }

        match proxy::classify_request(&msg.method, &msg.url, &config) {
            RequestAction::Tunnel { target } => {
                info!(%peer, %target, "CONNECT tunnel requested");
                let mut response = HttpMessage::new(Role::Response);
                response.version = msg.version;
                response.status = 200;
                response.reason = "Connection Established".to_string();
                stream.write_all(&serializer::serialize(&response)).await?;
                bridge_tunnel(&mut stream, &target).await?;
                return Ok(());
            }
            RequestAction::ConnectDisabled => {
                let mut response = HttpMessage::new(Role::Response);
                response.version = msg.version;
                response.status = 403;
                response.reason = "Forbidden".to_string();
                stream.write_all(&serializer::serialize(&response)).await?;
            }
            RequestAction::Forward => {
                proxy::rewrite_request(&mut msg, &config)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
                info!(%peer, url = %msg.url, "forwarded request (upstream dial not wired in this entry point)");
                let mut response = HttpMessage::new(Role::Response);
                response.version = msg.version;
                response.status = 502;
                response.reason = "Bad Gateway".to_string();
                stream.write_all(&serializer::serialize(&response)).await?;
            }
        }

        policy.record_response();
        msg.reset();
        if policy.should_close_after_response(&config) {
            return Ok(());
        }
    }
}

fn check_auth(msg: &HttpMessage, config: &ProxyConfig) -> AuthOutcome {
    proxy::check_proxy_auth(msg.headers.get("Proxy-Authorization"), config)
}

fn challenge_response(version: (u8, u8), challenge: &str) -> HttpMessage {
    let mut response = HttpMessage::new(Role::Response);
    response.version = version;
    response.status = 407;
    response.reason = "Proxy Authentication Required".to_string();
    response.headers.set("Proxy-Authenticate", challenge);
    response.headers.set("Content-Length", "0");
    response
}

async fn bridge_tunnel(client: &mut tokio::net::TcpStream, target: &str) -> Result<(), std::io::Error> {
    let mut upstream = tokio::net::TcpStream::connect(target).await?;
    tokio::io::copy_bidirectional(client, &mut upstream).await?;
    Ok(())
}

async fn run_cluster(workers: usize, restart: bool, worker_args: Vec<String>) -> Result<(), std::io::Error> {
    let program: PathBuf = std::env::current_exe()?;
    let config = ClusterConfig {
        worker_count: workers,
        restart,
        program,
        args: worker_args,
    };
    let mut master = Master::new(config);
    master.spawn_all(|event| match event {
        ProcessEvent::Start { worker_id, pid } => info!(worker_id, pid, "worker started"),
        ProcessEvent::Stop { worker_id, pid } => info!(worker_id, pid, "worker stopped"),
    })?;

    loop {
        match master.handle_next_exit(|event| match event {
            ProcessEvent::Start { worker_id, pid } => info!(worker_id, pid, "worker restarted"),
            ProcessEvent::Stop { worker_id, pid } => info!(worker_id, pid, "worker exited"),
        }).await? {
            Some(cluster::ExitDecision::MasterShouldExit) => return Ok(()),
            Some(cluster::ExitDecision::CrashLoop) => {
                error!("worker crash-looped below the restart threshold; master is exiting");
                return Ok(());
            }
            Some(_) | None => {}
        }
    }
}
