//! Read-optimized stats snapshot and its single-writer handoff.
//!
//! The engine rebuilds a complete [`StatsSnapshot`] after every packet event
//! and publishes it through [`SnapshotHandle`]. Readers (the CLI dashboard,
//! any future presentation layer) grab an `Arc` clone of the current
//! snapshot: the handle's mutex is scoped to the pointer swap only, never
//! held across computation, so readers can never observe a half-updated
//! device record or block ingestion.

use crate::engine::devices::Device;
use crate::engine::event::Alert;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Point-in-time view of everything the presentation layer needs.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    /// Total packets attributed to registered devices.
    pub packets: u64,
    /// Count of unique source IPs with a device record.
    pub unique_ips: usize,
    /// Alerts raised since startup.
    pub alerts: u64,
    /// Top talkers as (ip, packet_count), descending.
    pub top_ips: Vec<(String, u64)>,
    /// Full device map at publish time.
    pub devices: HashMap<String, Device>,
    /// Most recent alerts, oldest first, bounded by config::RECENT_ALERTS.
    pub recent_alerts: Vec<Alert>,
    /// Most recent anomaly scores, bounded by config::SCORE_HISTORY.
    pub ml_scores: Vec<f64>,
    /// The scorer's decision threshold, for rendering the score graph.
    pub ml_threshold: f64,
}

impl StatsSnapshot {
    pub fn empty(ml_threshold: f64) -> Self {
        Self {
            packets: 0,
            unique_ips: 0,
            alerts: 0,
            top_ips: Vec::new(),
            devices: HashMap::new(),
            recent_alerts: Vec::new(),
            ml_scores: Vec::new(),
            ml_threshold,
        }
    }
}

/// Single-writer / multiple-reader snapshot handoff.
pub struct SnapshotHandle {
    current: Mutex<Arc<StatsSnapshot>>,
}

impl SnapshotHandle {
    pub fn new(initial: StatsSnapshot) -> Self {
        Self { current: Mutex::new(Arc::new(initial)) }
    }

    /// Swaps in a freshly built snapshot. Writer side only.
    pub fn publish(&self, snapshot: StatsSnapshot) {
        let fresh = Arc::new(snapshot);
        if let Ok(mut current) = self.current.lock() {
            *current = fresh;
        }
    }

    /// Returns the current snapshot. The clone is an `Arc` bump; the data
    /// itself is immutable once published.
    pub fn read(&self) -> Arc<StatsSnapshot> {
        self.current
            .lock()
            .map(|current| Arc::clone(&current))
            .unwrap_or_else(|poisoned| Arc::clone(&poisoned.into_inner()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;
    use std::thread;

    #[test]
    fn readers_see_published_snapshots() {
        let handle = SnapshotHandle::new(StatsSnapshot::empty(-0.5));
        assert_eq!(handle.read().packets, 0);

        let mut next = StatsSnapshot::empty(-0.5);
        next.packets = 42;
        next.alerts = 3;
        handle.publish(next);

        let snap = handle.read();
        assert_eq!(snap.packets, 42);
        assert_eq!(snap.alerts, 3);
    }

    #[test]
    fn old_readers_keep_their_snapshot_across_publishes() {
        let handle = SnapshotHandle::new(StatsSnapshot::empty(-0.5));
        let old = handle.read();

        let mut next = StatsSnapshot::empty(-0.5);
        next.packets = 7;
        handle.publish(next);

        assert_eq!(old.packets, 0, "published swap must not mutate held snapshots");
        assert_eq!(handle.read().packets, 7);
    }

    #[test]
    fn concurrent_reads_during_publishes() {
        let handle = StdArc::new(SnapshotHandle::new(StatsSnapshot::empty(-0.5)));

        let reader = {
            let handle = StdArc::clone(&handle);
            thread::spawn(move || {
                for _ in 0..1000 {
                    let snap = handle.read();
                    // Totals are internally consistent in every snapshot.
                    assert_eq!(snap.unique_ips, snap.top_ips.len());
                }
            })
        };

        for i in 0..1000u64 {
            let mut snap = StatsSnapshot::empty(-0.5);
            snap.packets = i;
            snap.unique_ips = 1;
            snap.top_ips = vec![("10.0.0.1".to_string(), i)];
            handle.publish(snap);
        }

        reader.join().unwrap();
    }
}
