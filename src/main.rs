use clap::Parser;
use lansentry::cli::Cli;
use lansentry::engine::config::Thresholds;
use lansentry::engine::event::PacketEvent;
use lansentry::engine::snapshot::SnapshotHandle;
use lansentry::engine::{Engine, EngineConfig};
use lansentry::logger::{Event, Logger};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Set by the Ctrl+C handler; the ingest loop exits on the next event.
type ShutdownFlag = Arc<AtomicBool>;

fn main() {
    let cli = Cli::parse();

    let shutdown: ShutdownFlag = Arc::new(AtomicBool::new(false));
    let session_start = Instant::now();

    let logger = Arc::new(
        Logger::new(cli.json, cli.log_file.as_deref())
            .expect("Failed to open log file"),
    );

    register_shutdown_handler(Arc::clone(&shutdown));

    logger.log(&Event::Info { message: "lansentry started, monitoring network traffic" });

    let cfg = EngineConfig {
        thresholds:     build_thresholds(&cli),
        cache_path:     Some(PathBuf::from(&cli.vendor_cache)),
        model_path:     Some(PathBuf::from(&cli.model)),
        alert_log_path: cli.alert_log.clone(),
        offline:        cli.offline,
    };

    let mut engine = match Engine::new(cfg, Arc::clone(&logger)) {
        Ok(engine) => engine,
        Err(e) => {
            logger.log(&Event::Info { message: &format!("startup failed: {}", e) });
            std::process::exit(1);
        }
    };

    // ── Dashboard reader ──────────────────────────────────────────────────────
    // Renders from the published snapshot on its own schedule; it never
    // touches engine state and never blocks ingestion.
    let dashboard_handle = (cli.dashboard_interval > 0).then(|| {
        spawn_dashboard(
            engine.snapshot_handle(),
            cli.dashboard_interval,
            cli.top_n,
            Arc::clone(&shutdown),
        )
    });

    // ── Ingestion ─────────────────────────────────────────────────────────────
    // One ordered stream of NDJSON packet events; a malformed line is dropped
    // and counted, never fatal.
    let reader: Box<dyn BufRead> = match &cli.read {
        Some(path) => match File::open(path) {
            Ok(f) => Box::new(BufReader::new(f)),
            Err(e) => {
                logger.log(&Event::Info {
                    message: &format!("cannot open event file '{}': {}", path, e),
                });
                std::process::exit(1);
            }
        },
        None => Box::new(BufReader::new(io::stdin())),
    };

    let mut dropped: u64 = 0;
    for line in reader.lines() {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<PacketEvent>(&line) {
            Ok(event) => engine.process_event(event),
            Err(_) => dropped += 1,
        }
    }

    // ── Shutdown ──────────────────────────────────────────────────────────────
    shutdown.store(true, Ordering::SeqCst);
    if let Some(handle) = dashboard_handle {
        let _ = handle.join();
    }

    let totals = engine.finish(Path::new(&cli.devices_out), Path::new(&cli.profiles_out));

    logger.log(&Event::SessionSummary {
        duration_secs:   session_start.elapsed().as_secs(),
        packets_total:   totals.packets,
        unique_ips:      totals.unique_ips,
        alerts_emitted:  totals.alerts,
        flagged_devices: totals.flagged,
        dropped_events:  dropped,
    });
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Registers a signal handler for graceful shutdown on Ctrl+C.
fn register_shutdown_handler(shutdown: ShutdownFlag) {
    ctrlc::set_handler(move || {
        println!("\n[!] Ctrl+C received, shutting down...");
        shutdown.store(true, Ordering::SeqCst);
    })
    .expect("Failed to register Ctrl+C handler");
}

/// Builds detection settings from command-line arguments.
fn build_thresholds(cli: &Cli) -> Thresholds {
    Thresholds {
        port_scan:    cli.port_scan_threshold,
        syn_flood:    cli.syn_flood_threshold,
        icmp_flood:   cli.icmp_flood_threshold,
        window:       Duration::from_secs(cli.window_secs),
        warmup:       cli.warmup,
        ml_threshold: cli.ml_threshold,
        top_n:        cli.top_n,
    }
}

/// Spawns the CLI dashboard thread.
///
/// Re-renders totals and top talkers from the latest published snapshot at a
/// fixed cadence, sleeping in 1-second increments so the shutdown flag is
/// noticed promptly.
fn spawn_dashboard(
    snapshot: Arc<SnapshotHandle>,
    interval: u64,
    top_n: usize,
    shutdown: ShutdownFlag,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let sleep_dur = Duration::from_secs(interval);
        loop {
            let mut slept = Duration::ZERO;
            while slept < sleep_dur {
                if shutdown.load(Ordering::Relaxed) {
                    return;
                }
                thread::sleep(Duration::from_secs(1));
                slept += Duration::from_secs(1);
            }
            render_dashboard(&snapshot, top_n);
        }
    })
}

/// Prints one dashboard frame from the current snapshot.
fn render_dashboard(snapshot: &SnapshotHandle, top_n: usize) {
    let snap = snapshot.read();

    println!("{}", "=".repeat(60));
    println!("                 LANSENTRY DASHBOARD");
    println!("{}", "=".repeat(60));
    println!("Packets captured : {}", snap.packets);
    println!("Unique IPs       : {}", snap.unique_ips);
    println!("Alerts raised    : {}\n", snap.alerts);

    println!("Top Talkers:");
    for (ip, count) in snap.top_ips.iter().take(top_n) {
        let (flag, name) = match snap.devices.get(ip) {
            Some(d) if d.is_flagged => ("🚩", d.device_name.as_str()),
            Some(d) => ("  ", d.device_name.as_str()),
            None => ("  ", "Unknown"),
        };
        println!("  {} {:<15} | {:<30} | {} packets", flag, ip, name, count);
    }

    println!("\nStatus: RUNNING");
    println!("{}", "=".repeat(60));
}
