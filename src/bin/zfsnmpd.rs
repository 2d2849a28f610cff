//! zfsnmpd - ZFS telemetry agent.
//!
//! Samples pool, dataset, ARC and ZIL statistics and serves them to snmpd
//! as the FREENAS-MIB subtree over the `pass_persist` protocol.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

use zfsnmp::agent::PassPersistServer;
use zfsnmp::collector::{DEFAULT_KSTAT_PATH, RealCommand, RealFs, ZfsCollector};
use zfsnmp::mib::{FreenasMib, Mib, format_oid, parse_oid};
use zfsnmp::publisher::Publisher;
use zfsnmp::sampler::{DEFAULT_ZILSTAT_PATH, PoolIoSampler, PoolIoStore, ZilstatReaders, sample_once};

/// ZFS telemetry agent for net-snmp.
#[derive(Parser)]
#[command(name = "zfsnmpd", about = "ZFS telemetry agent for net-snmp pass_persist", version)]
struct Args {
    /// Publish interval in seconds.
    #[arg(short, long, default_value = "1")]
    interval: u64,

    /// Pool I/O sampling interval in seconds.
    #[arg(long, default_value = "1")]
    sample_interval: u64,

    /// Path to the ZFS kstat directory.
    #[arg(long, default_value = DEFAULT_KSTAT_PATH)]
    kstat_path: String,

    /// `zpool` executable.
    #[arg(long, default_value = "zpool")]
    zpool: String,

    /// `zfs` executable.
    #[arg(long, default_value = "zfs")]
    zfs: String,

    /// `zilstat` executable.
    #[arg(long, default_value = DEFAULT_ZILSTAT_PATH)]
    zilstat: String,

    /// Do not start zilstat; ZIL operation counts stay at zero.
    #[arg(long)]
    no_zilstat: bool,

    /// Base OID of the FREENAS-MIB subtree.
    #[arg(long, default_value = ".1.3.6.1.4.1.50536")]
    base_oid: String,

    /// How long to wait for requests between publish checks, in milliseconds.
    #[arg(long, default_value = "100")]
    poll_ms: u64,

    /// Publish once, print every object in walk order and exit.
    #[arg(long)]
    dump: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber on stderr; stdout carries the protocol.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["zfsnmpd", "zfsnmp"] {
        if let Ok(directive) = format!("{}={}", target, level).parse::<Directive>() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Clears `running` on SIGINT, SIGTERM or SIGHUP.
fn install_shutdown_handler(running: Arc<AtomicBool>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    })
}

/// Prints `<oid> = <type>: <value>` for every object.
fn dump(mib: &Mib, out: &mut impl Write) -> io::Result<()> {
    for (oid, value) in mib.walk() {
        writeln!(out, "{} = {}: {}", format_oid(oid), value.value_type(), value)?;
    }
    out.flush()
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    info!("zfsnmpd {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: interval={}s, sample_interval={}s, kstat={}, base_oid={}",
        args.interval, args.sample_interval, args.kstat_path, args.base_oid
    );

    let base = match parse_oid(&args.base_oid) {
        Ok(base) => base,
        Err(e) => {
            error!("Invalid --base-oid: {}", e);
            return ExitCode::from(2);
        }
    };
    let mib = match FreenasMib::new(&base) {
        Ok(mib) => mib,
        Err(e) => {
            error!("Failed to build MIB: {}", e);
            return ExitCode::FAILURE;
        }
    };
    debug!("MIB rooted at {}", format_oid(mib.zfs_oid()));

    let collector = ZfsCollector::new(RealFs::new(), RealCommand::new(), &args.kstat_path)
        .with_binaries(&args.zpool, &args.zfs);
    let interval = Duration::from_secs(args.interval.max(1));

    if args.dump {
        let store = Arc::new(PoolIoStore::new());
        if let Err(e) = sample_once(&collector, &store) {
            warn!("Pool I/O sample failed: {}", e);
        }
        let mut publisher =
            Publisher::new(collector, store, ZilstatReaders::disabled(), mib, interval);
        if let Err(e) = publisher.publish_cycle() {
            error!("Publish failed: {}", e);
            return ExitCode::FAILURE;
        }
        return match dump(publisher.mib().mib(), &mut io::stdout().lock()) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("Failed to write dump: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let sample_interval = Duration::from_secs(args.sample_interval.max(1));
    let mut sampler = match PoolIoSampler::spawn(collector.clone(), sample_interval) {
        Ok(sampler) => sampler,
        Err(e) => {
            error!("Failed to start pool I/O sampler: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let zilstat = if args.no_zilstat {
        info!("zilstat disabled");
        ZilstatReaders::disabled()
    } else {
        ZilstatReaders::spawn(&args.zilstat)
    };

    let mut publisher = Publisher::new(collector, sampler.store(), zilstat, mib, interval);

    let mut server = match PassPersistServer::stdio() {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start pass_persist reader: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    if let Err(e) = install_shutdown_handler(running.clone()) {
        warn!("Failed to set signal handler: {}", e);
    }

    let poll = Duration::from_millis(args.poll_ms.max(1));
    let result = publisher.run(&mut server, &running, poll);

    info!("Shutting down...");
    publisher.shutdown();
    sampler.stop();

    match result {
        Ok(()) => {
            info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Publish loop failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
