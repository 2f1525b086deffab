//! Statistical anomaly scoring with a warm-up/training lifecycle.
//!
//! [`FeatureTracker`] maintains cumulative per-source activity counters and
//! turns each packet into a fixed-length feature vector. [`AnomalyDetector`]
//! buffers vectors until the warm-up capacity is reached, fits its scoring
//! model exactly once on the buffered batch, persists the fitted model, and
//! from then on produces a decision score per vector. The lifecycle is
//! one-way: `Untrained -> Trained`, never refit in-process. Loading a
//! persisted model at startup bypasses warm-up entirely.
//!
//! The scoring algorithm sits behind the small fit/score surface of
//! [`GaussianScorer`]; the detector only depends on the train/predict/
//! threshold contract, not on how the score is computed.

use crate::engine::event::{PacketEvent, Severity, TransportKind};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

/// Cumulative activity for one source. Counters grow for the life of the
/// process; they are deliberately not windowed or reset.
struct IpActivity {
    packet_count: u64,
    ports:        HashSet<u16>,
    icmp:         u64,
    start:        Instant,
}

/// Per-source feature extraction state.
pub struct FeatureTracker {
    activity: HashMap<String, IpActivity>,
}

impl FeatureTracker {
    pub fn new() -> Self {
        Self { activity: HashMap::new() }
    }

    /// Updates the source's counters from `event` and returns the feature
    /// vector `[packet_count, distinct_ports, icmp_count, elapsed_secs]`.
    pub fn extract(&mut self, src: &str, event: &PacketEvent, now: Instant) -> Vec<f64> {
        let record = self.activity.entry(src.to_string()).or_insert_with(|| IpActivity {
            packet_count: 0,
            ports: HashSet::new(),
            icmp: 0,
            start: now,
        });

        record.packet_count += 1;

        if event.transport.kind == TransportKind::Tcp {
            if let Some(port) = event.transport.dst_port {
                record.ports.insert(port);
            }
        }
        if event.transport.kind == TransportKind::Icmp {
            record.icmp += 1;
        }

        let elapsed = now.saturating_duration_since(record.start).as_secs_f64();

        vec![
            record.packet_count as f64,
            record.ports.len() as f64,
            record.icmp as f64,
            elapsed,
        ]
    }
}

// ── Scoring model ────────────────────────────────────────────────────────────

/// Floor applied to per-feature standard deviations so a constant training
/// feature does not blow up the z-score.
const STD_FLOOR: f64 = 1e-3;

/// Divisor mapping the mean absolute z-score onto the decision scale, chosen
/// so nominal traffic scores near +0.5 and clear outliers fall below -0.5.
const Z_SCALE: f64 = 4.0;

/// Per-feature Gaussian scorer.
///
/// `fit` estimates mean and standard deviation for each feature column of the
/// warm-up batch. `decision_function` maps the mean absolute z-score of a
/// vector onto a scale where higher means more normal: a vector matching the
/// training means scores +0.5, and the score drops below zero as the vector
/// moves away from the training distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianScorer {
    means: Vec<f64>,
    stds:  Vec<f64>,
}

impl GaussianScorer {
    /// Fits the scorer on a batch of feature vectors. All vectors must share
    /// the same length; the batch must be non-empty.
    pub fn fit(samples: &[Vec<f64>]) -> Self {
        let dims = samples.first().map(Vec::len).unwrap_or(0);
        let n = samples.len() as f64;

        let mut means = vec![0.0; dims];
        for sample in samples {
            for (m, x) in means.iter_mut().zip(sample) {
                *m += x;
            }
        }
        for m in &mut means {
            *m /= n;
        }

        let mut stds = vec![0.0; dims];
        for sample in samples {
            for ((s, x), m) in stds.iter_mut().zip(sample).zip(&means) {
                *s += (x - m) * (x - m);
            }
        }
        for s in &mut stds {
            *s = (*s / n).sqrt().max(STD_FLOOR);
        }

        Self { means, stds }
    }

    /// Decision score for one vector. Higher is more normal.
    pub fn decision_function(&self, features: &[f64]) -> f64 {
        if self.means.is_empty() {
            return 0.0;
        }
        let total: f64 = features
            .iter()
            .zip(&self.means)
            .zip(&self.stds)
            .map(|((x, m), s)| ((x - m) / s).abs())
            .sum();
        let mean_z = total / self.means.len() as f64;
        0.5 - mean_z / Z_SCALE
    }
}

// ── Detector ─────────────────────────────────────────────────────────────────

/// Anomaly detector with warm-up buffering and one-shot training.
pub struct AnomalyDetector {
    model:      Option<GaussianScorer>,
    buffer:     Vec<Vec<f64>>,
    warmup:     usize,
    threshold:  f64,
    model_path: Option<PathBuf>,
}

impl AnomalyDetector {
    pub fn new(warmup: usize, threshold: f64, model_path: Option<PathBuf>) -> Self {
        Self {
            model: None,
            buffer: Vec::with_capacity(warmup),
            warmup,
            threshold,
            model_path,
        }
    }

    /// Attempts to restore a persisted model. Returns `true` when a model was
    /// loaded, in which case the detector starts `Trained` and the warm-up
    /// buffer goes unused. A missing file is not an error.
    pub fn load(&mut self) -> Result<bool> {
        let Some(path) = &self.model_path else { return Ok(false) };
        if !path.exists() {
            return Ok(false);
        }
        let blob = fs::read_to_string(path)?;
        self.model = Some(serde_json::from_str(&blob)?);
        Ok(true)
    }

    /// Buffers a feature vector during warm-up. Returns `true` exactly once,
    /// on the observation that fills the buffer and triggers training.
    /// A no-op once trained.
    pub fn observe(&mut self, features: Vec<f64>) -> bool {
        if self.trained() {
            return false;
        }
        self.buffer.push(features);
        if self.buffer.len() >= self.warmup {
            self.model = Some(GaussianScorer::fit(&self.buffer));
            return true;
        }
        false
    }

    /// Writes the fitted model blob to disk. Called once, after the training
    /// transition; a failure here is surfaced to the operator but must not
    /// stop packet processing.
    pub fn persist(&self) -> Result<()> {
        if let (Some(model), Some(path)) = (&self.model, &self.model_path) {
            fs::write(path, serde_json::to_string_pretty(model)?)?;
        }
        Ok(())
    }

    /// Scores a vector. `None` while untrained; otherwise `(fired, score)`
    /// where `fired` means the score fell strictly below the threshold.
    pub fn predict(&self, features: &[f64]) -> Option<(bool, f64)> {
        let model = self.model.as_ref()?;
        let score = model.decision_function(features);
        Some((score < self.threshold, score))
    }

    /// Buckets a score by its distance below the decision threshold.
    pub fn severity(&self, score: f64) -> Severity {
        if score < -1.0 {
            Severity::High
        } else if score < -0.7 {
            Severity::Medium
        } else if score < self.threshold {
            Severity::Low
        } else {
            Severity::Normal
        }
    }

    pub fn trained(&self) -> bool {
        self.model.is_some()
    }

    /// Number of warm-up vectors collected so far.
    pub fn training_samples(&self) -> usize {
        self.buffer.len()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}
