use std::time::Duration;

/// Distinct destination ports from one source before the port scan rule fires.
///
/// The port set is never trimmed, so once a source crosses this line the rule
/// reports fired on every subsequent check for the life of the process.
pub const PORT_SCAN_THRESHOLD: usize = 20;

/// SYN packets retained within [`TIME_WINDOW`] before the SYN flood rule fires.
pub const SYN_FLOOD_THRESHOLD: usize = 15;

/// ICMP packets retained within [`TIME_WINDOW`] before the ICMP flood rule fires.
pub const ICMP_FLOOD_THRESHOLD: usize = 10;

/// Sliding window for the flood detectors.
///
/// Entries older than this are dropped from the per-source timestamp queues
/// on every check, so flood firing is transient: it stops once old events age
/// out and no new ones arrive.
pub const TIME_WINDOW: Duration = Duration::from_secs(10);

/// Feature vectors buffered before the anomaly model is fit.
///
/// Until the buffer reaches this capacity the scorer returns no verdict.
pub const WARMUP_CAPACITY: usize = 50;

/// Anomaly decision threshold. Scores strictly below it count as anomalous.
pub const ML_THRESHOLD: f64 = -0.5;

/// Anomaly scores retained in the stats snapshot for the dashboard graph.
pub const SCORE_HISTORY: usize = 100;

/// Alerts retained in the in-memory history carried by the stats snapshot.
/// The durable alert sink is unbounded; this bound only affects presentation.
pub const RECENT_ALERTS: usize = 50;

/// Timeout for one external vendor API call. Failures are cached as
/// "Unknown" and never retried.
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

/// Runtime-tunable detection settings, populated from CLI arguments.
#[derive(Debug, Clone)]
pub struct Thresholds {
    pub port_scan:    usize,
    pub syn_flood:    usize,
    pub icmp_flood:   usize,
    pub window:       Duration,
    pub warmup:       usize,
    pub ml_threshold: f64,
    pub top_n:        usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            port_scan:    PORT_SCAN_THRESHOLD,
            syn_flood:    SYN_FLOOD_THRESHOLD,
            icmp_flood:   ICMP_FLOOD_THRESHOLD,
            window:       TIME_WINDOW,
            warmup:       WARMUP_CAPACITY,
            ml_threshold: ML_THRESHOLD,
            top_n:        5,
        }
    }
}
