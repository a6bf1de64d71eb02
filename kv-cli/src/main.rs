use std::env;
use std::panic;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use tokio_util::sync::CancellationToken;

use kvcli::client;
use kvcli::server::config::ConfigLoad;
use kvcli::server::{engine, http, tcp};
use kvcli::trace;

#[derive(Debug, Parser)]
#[command(version, author, about = "A transactional key-value store CLI")]
pub struct Args {
    /// Configuration file path.
    #[clap(short = 'c', long = "config", default_value = "config/kvdb.yaml")]
    config: String,

    #[clap(short = 'l', long)]
    log_level: Option<String>,

    #[clap(short, long)]
    debug: bool,

    #[clap(subcommand)]
    cmd: Option<Cmd>,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Start the TCP and (unless --no-http) HTTP listeners.
    Serve {
        /// TCP bind address for the line protocol.
        #[clap(long)]
        tcp_addr: Option<String>,

        /// HTTP bind address for the key/value REST interface.
        #[clap(long)]
        http_addr: Option<String>,

        /// Disable the HTTP listener.
        #[clap(long)]
        no_http: bool,

        /// Replay this WAL file into the initial store at startup.
        #[clap(long)]
        wal_in: Option<PathBuf>,

        /// Append subsequent mutations to this WAL file.
        #[clap(long)]
        wal_out: Option<PathBuf>,
    },

    /// Connect to a running `serve` instance and open an interactive shell.
    Client {
        /// TCP address of the server to connect to.
        #[clap(long, default_value = "127.0.0.1:8888")]
        addr: String,

        /// Run a single query non-interactively instead of opening the REPL.
        #[clap(long)]
        query: Option<String>,
    },
}

#[tokio::main]
pub async fn main() -> Result<()> {
    setup_panic_hooks();

    eprintln!();
    eprintln!("██  ██  █        █");
    eprintln!("██ ██   ██      ██");
    eprintln!("███      ██    ██");
    eprintln!("██ ██     ██  ██");
    eprintln!("██  ██     ████  KV Storage CLI");
    eprintln!();

    let args = Args::parse();
    if args.debug {
        println!("{:?}", args);
    }

    let cfg = ConfigLoad::new(&args.config).unwrap_or_default();
    let log_level = args.log_level.clone().unwrap_or_else(|| cfg.log_level().to_string());
    let _guards = trace::init_logging(&cfg.log_dir(), &log_level).await?;
    info!("kvcli starting with config: {:?}", &cfg);

    match args.cmd {
        Some(Cmd::Serve { tcp_addr, http_addr, no_http, wal_in, wal_out }) => {
            let tcp_addr = tcp_addr.unwrap_or_else(|| cfg.tcp_addr().to_string());
            let http_addr = http_addr.unwrap_or_else(|| cfg.http_addr().to_string());
            let http_enabled = cfg.http_enabled() && !no_http;
            let wal_in = wal_in.or_else(|| cfg.wal_in.clone());
            let wal_out = wal_out.or_else(|| cfg.wal_out.clone());
            run_serve(&tcp_addr, &http_addr, http_enabled, wal_in, wal_out).await
        }
        Some(Cmd::Client { addr, query: Some(query) }) => client::run_one_shot(&addr, &query),
        Some(Cmd::Client { addr, query: None }) => {
            let running = install_ctrlc_atomic();
            client::run_repl(&addr, cfg.prompt(), running)
        }
        None => {
            let running = install_ctrlc_atomic();
            client::run_repl(cfg.tcp_addr(), cfg.prompt(), running)
        }
    }
}

/// Runs the TCP and (optionally) HTTP listeners until SIGINT/SIGTERM,
/// cancelling every in-flight session so pending transactions roll back
/// before the process exits with status 0.
async fn run_serve(
    tcp_addr: &str,
    http_addr: &str,
    http_enabled: bool,
    wal_in: Option<PathBuf>,
    wal_out: Option<PathBuf>,
) -> Result<()> {
    let transactor = engine::build(wal_in.as_deref(), wal_out.as_deref())?;
    let shutdown = CancellationToken::new();

    let ctrlc_shutdown = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("received shutdown signal");
        ctrlc_shutdown.cancel();
    })?;

    println!("listening on {} (tcp){}", tcp_addr, if http_enabled {
        format!(", {} (http)", http_addr)
    } else {
        String::new()
    });

    if http_enabled {
        let tcp_transactor = transactor.clone();
        let tcp_shutdown = shutdown.clone();
        let http_transactor = transactor.clone();
        let http_shutdown = shutdown.clone();
        tokio::try_join!(
            async move { tcp::serve(tcp_addr, tcp_transactor, tcp_shutdown).await.map_err(anyhow::Error::from) },
            async move { http::serve(http_addr, http_transactor, http_shutdown).await.map_err(anyhow::Error::from) },
        )?;
    } else {
        tcp::serve(tcp_addr, transactor, shutdown).await?;
    }

    Ok(())
}

fn install_ctrlc_atomic() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    let _ = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    });
    running
}

fn setup_panic_hooks() {
    let meta = human_panic::Metadata {
        version: env!("CARGO_PKG_VERSION").into(),
        name: env!("CARGO_PKG_NAME").into(),
        authors: env!("CARGO_PKG_AUTHORS").replace(':', ", ").into(),
        homepage: env!("CARGO_PKG_HOMEPAGE").into(),
    };

    let default_hook = panic::take_hook();

    if env::var("RUST_BACKTRACE").is_err() {
        panic::set_hook(Box::new(move |info: &panic::PanicInfo| {
            default_hook(info);
            let file_path = human_panic::handle_dump(&meta, info);
            human_panic::print_msg(file_path, &meta)
                .expect("human-panic: printing error message to console failed");
        }));
    }
}
