use clap::Parser;

/// lansentry: per-host intrusion detection and device profiling engine.
///
/// Consumes decoded packet events (NDJSON, one event per line) from stdin
/// or a replay file, classifies traffic per source host, raises alerts for
/// scan/flood patterns and statistical anomalies, and builds device identity
/// profiles from observed DNS queries.
#[derive(Parser, Debug, Clone)]
#[command(
    name    = "lansentry",
    version = "0.2.0",
    about   = "Per-host intrusion detection and device profiling engine",
    long_about = None,
)]
pub struct Cli {
    // ── Input ────────────────────────────────────────────────────────────────

    /// Read packet events from this NDJSON file instead of stdin.
    ///
    /// Each line is one decoded packet event. Lines that fail to parse are
    /// dropped and counted; a bad line never stops ingestion.
    #[arg(short = 'r', long = "read", value_name = "FILE")]
    pub read: Option<String>,

    // ── Logging ──────────────────────────────────────────────────────────────

    /// Write log output to this file in addition to stdout.
    #[arg(short = 'o', long = "log-file", value_name = "PATH")]
    pub log_file: Option<String>,

    /// Emit log entries as newline-delimited JSON (NDJSON).
    #[arg(short = 'j', long = "json")]
    pub json: bool,

    /// Append-only alert sink, one JSON record per alert.
    #[arg(long = "alert-log", value_name = "PATH", default_value = "alerts.json")]
    pub alert_log: String,

    // ── Persistence ──────────────────────────────────────────────────────────

    /// Persistent MAC-to-vendor cache, loaded at startup and updated after
    /// each new successful resolution.
    #[arg(long = "vendor-cache", value_name = "PATH", default_value = "mac_cache.json")]
    pub vendor_cache: String,

    /// Persisted anomaly model. Loaded at startup if present (skipping the
    /// warm-up phase); written once, at the training transition.
    #[arg(long = "model", value_name = "PATH", default_value = "ml_model.json")]
    pub model: String,

    /// Device registry export written on shutdown.
    #[arg(long = "devices-out", value_name = "PATH", default_value = "devices.json")]
    pub devices_out: String,

    /// DNS fingerprint profile export written on shutdown.
    #[arg(long = "profiles-out", value_name = "PATH", default_value = "dns_profiles.json")]
    pub profiles_out: String,

    /// Disable the vendor API and reverse-DNS lookups entirely.
    ///
    /// Every unseen MAC resolves to "Unknown". Useful for offline replay
    /// and deterministic testing.
    #[arg(long = "offline")]
    pub offline: bool,

    // ── Detection thresholds (override engine::config defaults) ─────────────

    /// Distinct destination ports from one source before a port scan alert fires.
    #[arg(long = "port-scan-threshold", value_name = "N", default_value_t = 20)]
    pub port_scan_threshold: usize,

    /// SYN packets within the time window before a SYN flood alert fires.
    #[arg(long = "syn-flood-threshold", value_name = "N", default_value_t = 15)]
    pub syn_flood_threshold: usize,

    /// ICMP packets within the time window before an ICMP flood alert fires.
    #[arg(long = "icmp-flood-threshold", value_name = "N", default_value_t = 10)]
    pub icmp_flood_threshold: usize,

    /// Sliding window (in seconds) for the flood detectors.
    #[arg(long = "window-secs", value_name = "SECS", default_value_t = 10)]
    pub window_secs: u64,

    /// Feature vectors collected before the anomaly model is fit.
    #[arg(long = "warmup", value_name = "N", default_value_t = 50)]
    pub warmup: usize,

    /// Anomaly decision threshold; scores strictly below it fire an alert.
    #[arg(long = "ml-threshold", value_name = "SCORE", default_value_t = -0.5, allow_hyphen_values = true)]
    pub ml_threshold: f64,

    // ── Presentation ─────────────────────────────────────────────────────────

    /// Number of top talkers carried in the stats snapshot and dashboard.
    #[arg(long = "top-n", value_name = "N", default_value_t = 5)]
    pub top_n: usize,

    /// Seconds between CLI dashboard refreshes. 0 disables the dashboard.
    #[arg(long = "dashboard-interval", value_name = "SECS", default_value_t = 0)]
    pub dashboard_interval: u64,
}
