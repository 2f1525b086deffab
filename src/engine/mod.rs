//! Packet-driven detection and profiling engine.
//!
//! The engine owns every piece of mutable detection state (device registry,
//! DNS profiler, rule state, feature counters, anomaly model) and is driven
//! by a single ordered stream of decoded packet events. Readers never touch
//! that state directly: after each event the engine rebuilds and publishes an
//! immutable stats snapshot through [`snapshot::SnapshotHandle`].
//!
//! The only network I/O (vendor API, reverse DNS) lives on the resolution
//! worker spawned at construction; the packet path just exchanges messages
//! with it over mpsc channels and never blocks.

pub mod anomaly;
pub mod config;
pub mod devices;
pub mod event;
pub mod fingerprint;
pub mod rules;
pub mod snapshot;
pub mod vendor;

use crate::error::{Result, SentryError};
use crate::logger::{AlertLog, Event, SharedLogger};
use anomaly::{AnomalyDetector, FeatureTracker};
use chrono::Local;
use config::{Thresholds, RECENT_ALERTS, SCORE_HISTORY};
use devices::DeviceRegistry;
use event::{Alert, PacketEvent, Severity, TransportKind};
use fingerprint::DnsProfiler;
use rules::RuleEngine;
use snapshot::{SnapshotHandle, StatsSnapshot};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use vendor::{
    MacVendorsApi, OfflineApi, ResolveRequest, SystemHostNames, VendorResolver, VendorUpdate,
};

/// Construction parameters bundled from `main`.
pub struct EngineConfig {
    pub thresholds:     Thresholds,
    /// Persistent MAC-to-vendor cache. `None` keeps the cache in memory only.
    pub cache_path:     Option<PathBuf>,
    /// Persisted anomaly model blob.
    pub model_path:     Option<PathBuf>,
    /// Append-only alert sink.
    pub alert_log_path: String,
    /// Disable all external lookups.
    pub offline:        bool,
}

/// Totals reported to `main` for the shutdown summary.
pub struct SessionTotals {
    pub packets:    u64,
    pub unique_ips: usize,
    pub alerts:     u64,
    pub flagged:    usize,
}

pub struct Engine {
    registry: DeviceRegistry,
    profiler: DnsProfiler,
    rules:    RuleEngine,
    features: FeatureTracker,
    detector: AnomalyDetector,

    snapshot:  Arc<SnapshotHandle>,
    logger:    SharedLogger,
    alert_log: AlertLog,

    vendor_tx:     Option<Sender<ResolveRequest>>,
    vendor_rx:     Receiver<VendorUpdate>,
    vendor_handle: Option<thread::JoinHandle<()>>,
    /// IPs with a resolution request in flight, so each device asks once.
    pending: HashSet<String>,

    alert_count:   u64,
    recent_alerts: VecDeque<Alert>,
    ml_scores:     VecDeque<f64>,
    top_n:         usize,
}

impl Engine {
    /// Creates the engine with production lookup backends (or offline stubs).
    pub fn new(cfg: EngineConfig, logger: SharedLogger) -> Result<Self> {
        let resolver = if cfg.offline {
            VendorResolver::new(cfg.cache_path.clone(), Box::new(OfflineApi), Box::new(OfflineApi))
        } else {
            VendorResolver::new(
                cfg.cache_path.clone(),
                Box::new(MacVendorsApi::new()?),
                Box::new(SystemHostNames),
            )
        };
        Self::with_resolver(cfg, logger, resolver)
    }

    /// Creates the engine around an explicit resolver. Tests use this to
    /// substitute recording mocks for the lookup backends.
    pub fn with_resolver(
        cfg: EngineConfig,
        logger: SharedLogger,
        resolver: VendorResolver,
    ) -> Result<Self> {
        let t = &cfg.thresholds;

        let mut detector = AnomalyDetector::new(t.warmup, t.ml_threshold, cfg.model_path.clone());
        match detector.load() {
            Ok(true) => {
                let path = cfg
                    .model_path
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                logger.log(&Event::ModelLoaded { path: &path });
            }
            Ok(false) => {}
            Err(e) => logger.log(&Event::Info {
                message: &format!("model load failed, starting untrained: {}", e),
            }),
        }

        let alert_log = AlertLog::open(&cfg.alert_log_path)?;

        let (request_tx, request_rx) = mpsc::channel();
        let (update_tx, update_rx) = mpsc::channel();
        let vendor_handle =
            vendor::spawn_worker(resolver, request_rx, update_tx, Arc::clone(&logger));

        let ml_threshold = t.ml_threshold;
        Ok(Self {
            registry: DeviceRegistry::new(),
            profiler: DnsProfiler::new(),
            rules: RuleEngine::new(t.port_scan, t.syn_flood, t.icmp_flood, t.window),
            features: FeatureTracker::new(),
            detector,
            snapshot: Arc::new(SnapshotHandle::new(StatsSnapshot::empty(ml_threshold))),
            logger,
            alert_log,
            vendor_tx: Some(request_tx),
            vendor_rx: update_rx,
            vendor_handle: Some(vendor_handle),
            pending: HashSet::new(),
            alert_count: 0,
            recent_alerts: VecDeque::new(),
            ml_scores: VecDeque::new(),
            top_n: cfg.thresholds.top_n,
        })
    }

    /// Handle the dashboard (or any other reader) polls for snapshots.
    pub fn snapshot_handle(&self) -> Arc<SnapshotHandle> {
        Arc::clone(&self.snapshot)
    }

    /// Processes one decoded packet event through the full pipeline.
    pub fn process_event(&mut self, event: PacketEvent) {
        self.process_at(event, Instant::now());
    }

    fn process_at(&mut self, event: PacketEvent, now: Instant) {
        self.drain_vendor_updates();

        let src = event.src_ip.clone();

        // ── Fingerprinting ───────────────────────────────────────────────────
        if let Some(query) = &event.name_query {
            if !query.name.is_empty() {
                self.profiler.observe(&src, &query.name);
            }
        }

        // ── Device registry ──────────────────────────────────────────────────
        let outcome = self.registry.touch(&src, event.src_mac.as_deref());
        if outcome.created {
            if let (Some(mac), Some(tx)) = (&event.src_mac, &self.vendor_tx) {
                if self.pending.insert(src.clone()) {
                    let _ = tx.send(ResolveRequest { ip: src.clone(), mac: mac.clone() });
                }
            }
        }

        // Adopt the fingerprint classification while the device's own
        // identity is still the Unknown placeholder.
        if let Some(profile) = self.profiler.profile(&src) {
            if profile.device_type != "Unknown" {
                let name = profile.device_name.clone();
                let device_type = profile.device_type.clone();
                self.registry.adopt_fingerprint(&src, &name, &device_type);
            }
        }

        // ── Rate-window rules ────────────────────────────────────────────────
        match event.transport.kind {
            TransportKind::Tcp => {
                if let Some(port) = event.transport.dst_port {
                    if self.rules.check_port_scan(&src, port) {
                        self.raise_alert(
                            &src,
                            "Port Scan Detected",
                            "Multiple ports accessed".to_string(),
                            Severity::Low,
                        );
                    }
                }
                if event.transport.syn && self.rules.check_syn_flood(&src, now) {
                    self.raise_alert(
                        &src,
                        "SYN Flood Detected",
                        "Excessive SYN packets".to_string(),
                        Severity::Low,
                    );
                }
            }
            TransportKind::Icmp => {
                if self.rules.check_icmp_flood(&src, now) {
                    self.raise_alert(
                        &src,
                        "ICMP Flood Detected",
                        "Too many ICMP packets".to_string(),
                        Severity::Low,
                    );
                }
            }
            TransportKind::Udp | TransportKind::Other => {}
        }

        // ── Anomaly scoring ──────────────────────────────────────────────────
        let features = self.features.extract(&src, &event, now);

        if self.detector.observe(features.clone()) {
            self.logger.log(&Event::ModelTrained { samples: self.detector.training_samples() });
            if let Err(e) = self.detector.persist() {
                self.logger.log(&Event::Info {
                    message: &format!("model persist failed: {}", e),
                });
            }
        }

        if let Some((fired, score)) = self.detector.predict(&features) {
            self.ml_scores.push_back(score);
            while self.ml_scores.len() > SCORE_HISTORY {
                self.ml_scores.pop_front();
            }
            if fired {
                let severity = self.detector.severity(score);
                self.raise_alert(
                    &src,
                    "ML Anomaly Detected",
                    format!("Score: {:.4}", score),
                    severity,
                );
            }
        }

        self.publish_snapshot();
    }

    /// Applies completed vendor resolutions without blocking.
    fn drain_vendor_updates(&mut self) {
        while let Ok(update) = self.vendor_rx.try_recv() {
            self.pending.remove(&update.ip);
            let name = update.info.nickname.clone();
            let device_type = update.info.device_type.clone();
            self.registry.apply_vendor(&update.ip, update.info);
            self.logger.log(&Event::NewDevice {
                ip: &update.ip,
                name: &name,
                device_type: &device_type,
            });
        }
    }

    /// Emits one alert: counter, structured log, device flag, durable sink,
    /// bounded in-memory history.
    fn raise_alert(
        &mut self,
        src: &str,
        attack_type: &str,
        description: String,
        severity: Severity,
    ) {
        self.alert_count += 1;

        let device_name = self
            .registry
            .get(src)
            .map(|d| d.device_name.clone())
            .unwrap_or_else(|| "Unknown".to_string());

        let severity_label = severity.to_string();
        self.logger.log(&Event::Alert {
            src,
            attack_type,
            description: &description,
            severity: &severity_label,
            device: &device_name,
        });

        if attack_type.contains("Detected") {
            let reason = format!("{}: {}", attack_type, severity_label);
            if self.registry.flag(src, &reason) {
                self.logger.log(&Event::DeviceFlagged { ip: src, reason: &reason });
            }
        }

        let alert = Alert {
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            src_ip: src.to_string(),
            device_name,
            attack_type: attack_type.to_string(),
            description,
            severity,
        };

        if let Err(e) = self.alert_log.append(&alert) {
            self.logger.log(&Event::Info {
                message: &format!("alert sink write failed: {}", e),
            });
        }

        self.recent_alerts.push_back(alert);
        while self.recent_alerts.len() > RECENT_ALERTS {
            self.recent_alerts.pop_front();
        }
    }

    /// Rebuilds the full snapshot and swaps it in for readers.
    fn publish_snapshot(&self) {
        let snapshot = StatsSnapshot {
            packets: self.registry.total_packets(),
            unique_ips: self.registry.online_count(),
            alerts: self.alert_count,
            top_ips: self.registry.top_ips(self.top_n),
            devices: self.registry.devices_map().clone(),
            recent_alerts: self.recent_alerts.iter().cloned().collect(),
            ml_scores: self.ml_scores.iter().copied().collect(),
            ml_threshold: self.detector.threshold(),
        };
        self.snapshot.publish(snapshot);
    }

    /// Drains the resolution worker, publishes a final snapshot, writes the
    /// device and profile exports, and returns the session totals.
    ///
    /// Export failures are logged for the operator; they never panic or abort
    /// the remaining shutdown steps.
    pub fn finish(mut self, devices_out: &Path, profiles_out: &Path) -> SessionTotals {
        // Closing the request channel lets the worker run out and exit.
        drop(self.vendor_tx.take());
        if let Some(handle) = self.vendor_handle.take() {
            if handle.join().is_err() {
                self.logger.log(&Event::Info {
                    message: &SentryError::WorkerPanic.to_string(),
                });
            }
        }
        while let Ok(update) = self.vendor_rx.try_recv() {
            self.registry.apply_vendor(&update.ip, update.info);
        }

        self.publish_snapshot();

        if let Err(e) = self.registry.export(devices_out) {
            self.logger.log(&Event::Info {
                message: &format!("device export failed: {}", e),
            });
        }
        if let Err(e) = self.profiler.export(profiles_out) {
            self.logger.log(&Event::Info {
                message: &format!("profile export failed: {}", e),
            });
        }
        self.profiler.log_summary(&self.logger);

        SessionTotals {
            packets: self.registry.total_packets(),
            unique_ips: self.registry.online_count(),
            alerts: self.alert_count,
            flagged: self.registry.flagged().len(),
        }
    }
}
