//! Rate-window threshold detectors.
//!
//! Three independent per-source detectors:
//! - **Port scan**: unbounded set of distinct destination ports. The set is
//!   never cleared, so firing is monotonic for the life of the process.
//!   See DESIGN.md for the review flag on legitimate many-port hosts.
//! - **SYN flood / ICMP flood**: timestamp queues trimmed to the configured
//!   window on every check. Firing is transient and fluctuates as entries
//!   age out.
//!
//! Each check is a pure function of (current state, new event, now); the only
//! side effect is the state store itself.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

/// Per-source detection state for all three rules.
pub struct RuleEngine {
    port_scan_threshold:  usize,
    syn_flood_threshold:  usize,
    icmp_flood_threshold: usize,
    window:               Duration,

    port_scan:  HashMap<String, HashSet<u16>>,
    syn_flood:  HashMap<String, VecDeque<Instant>>,
    icmp_flood: HashMap<String, VecDeque<Instant>>,
}

impl RuleEngine {
    pub fn new(
        port_scan_threshold: usize,
        syn_flood_threshold: usize,
        icmp_flood_threshold: usize,
        window: Duration,
    ) -> Self {
        Self {
            port_scan_threshold,
            syn_flood_threshold,
            icmp_flood_threshold,
            window,
            port_scan: HashMap::new(),
            syn_flood: HashMap::new(),
            icmp_flood: HashMap::new(),
        }
    }

    /// Records a destination port for `src` and reports whether the distinct
    /// port count has reached the scan threshold.
    pub fn check_port_scan(&mut self, src: &str, dst_port: u16) -> bool {
        let ports = self.port_scan.entry(src.to_string()).or_default();
        ports.insert(dst_port);
        ports.len() >= self.port_scan_threshold
    }

    /// Records a SYN observation at `now` and reports whether the in-window
    /// SYN count has reached the flood threshold.
    pub fn check_syn_flood(&mut self, src: &str, now: Instant) -> bool {
        let queue = self.syn_flood.entry(src.to_string()).or_default();
        Self::check_window(queue, now, self.window, self.syn_flood_threshold)
    }

    /// Records an ICMP observation at `now` and reports whether the in-window
    /// count has reached the flood threshold.
    pub fn check_icmp_flood(&mut self, src: &str, now: Instant) -> bool {
        let queue = self.icmp_flood.entry(src.to_string()).or_default();
        Self::check_window(queue, now, self.window, self.icmp_flood_threshold)
    }

    /// Appends `now`, evicts entries older than `window`, and compares the
    /// retained count against `threshold`.
    fn check_window(
        queue: &mut VecDeque<Instant>,
        now: Instant,
        window: Duration,
        threshold: usize,
    ) -> bool {
        queue.push_back(now);
        // Timestamps arrive in order, so eviction only needs to inspect the front.
        while let Some(t) = queue.front() {
            if now.saturating_duration_since(*t) > window {
                queue.pop_front();
            } else {
                break;
            }
        }
        queue.len() >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> RuleEngine {
        RuleEngine::new(20, 15, 10, Duration::from_secs(10))
    }

    #[test]
    fn port_scan_fires_at_threshold() {
        let mut rules = engine();
        for port in 0..19u16 {
            assert!(!rules.check_port_scan("10.0.0.9", port));
        }
        assert!(rules.check_port_scan("10.0.0.9", 19));
    }

    #[test]
    fn port_scan_firing_is_monotonic() {
        let mut rules = engine();
        for port in 0..20u16 {
            rules.check_port_scan("10.0.0.9", port);
        }
        // Repeating an already-seen port still fires: the set never shrinks.
        assert!(rules.check_port_scan("10.0.0.9", 3));
        assert!(rules.check_port_scan("10.0.0.9", 3));
    }

    #[test]
    fn port_scan_state_is_per_source() {
        let mut rules = engine();
        for port in 0..20u16 {
            rules.check_port_scan("10.0.0.9", port);
        }
        assert!(!rules.check_port_scan("10.0.0.10", 80));
    }

    #[test]
    fn syn_flood_fires_within_window() {
        let mut rules = engine();
        let base = Instant::now();
        for i in 0..14 {
            assert!(
                !rules.check_syn_flood("10.0.0.9", base + Duration::from_millis(i * 100)),
                "must not fire before threshold"
            );
        }
        assert!(rules.check_syn_flood("10.0.0.9", base + Duration::from_millis(1400)));
    }

    #[test]
    fn syn_flood_never_fires_when_events_spaced_beyond_window() {
        let mut rules = engine();
        let base = Instant::now();
        // 30 events, each 11s apart: the queue never holds more than one entry.
        for i in 0..30 {
            assert!(!rules.check_syn_flood("10.0.0.9", base + Duration::from_secs(i * 11)));
        }
    }

    #[test]
    fn syn_flood_stops_firing_after_age_out() {
        let mut rules = engine();
        let base = Instant::now();
        for i in 0..15 {
            rules.check_syn_flood("10.0.0.9", base + Duration::from_millis(i * 10));
        }
        // A lone event long after the burst: everything else has aged out.
        assert!(!rules.check_syn_flood("10.0.0.9", base + Duration::from_secs(60)));
    }

    #[test]
    fn icmp_flood_fires_at_lower_threshold() {
        let mut rules = engine();
        let base = Instant::now();
        for i in 0..9 {
            assert!(!rules.check_icmp_flood("10.0.0.2", base + Duration::from_millis(i * 50)));
        }
        assert!(rules.check_icmp_flood("10.0.0.2", base + Duration::from_millis(450)));
    }

    #[test]
    fn fifteen_syns_to_fifteen_ports_fires_only_syn_flood() {
        let mut rules = engine();
        let base = Instant::now();
        let mut scan_fired = false;
        let mut syn_fired = false;
        for i in 0..15u16 {
            let now = base + Duration::from_millis(u64::from(i) * 100);
            scan_fired |= rules.check_port_scan("10.0.0.9", 1000 + i);
            syn_fired |= rules.check_syn_flood("10.0.0.9", now);
        }
        assert!(!scan_fired, "15 distinct ports is below the 20-port scan threshold");
        assert!(syn_fired, "15 in-window SYNs meets the flood threshold");
    }
}
