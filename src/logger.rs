//! Structured logging for lansentry.
//!
//! Provides a [`Logger`] that writes events to stdout and optionally to a log
//! file. Output can be formatted as human-readable plain text or as
//! newline-delimited JSON (NDJSON), making it easy to ingest into log
//! shippers and SIEM platforms.
//!
//! The append-only alert sink ([`AlertLog`]) is separate from the general
//! logger: it receives exactly one durable record per raised alert and is
//! never rewritten or truncated.

use crate::engine::event::Alert;
use chrono::Local;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::sync::{Arc, Mutex};

// ── Event types ──────────────────────────────────────────────────────────────

/// All distinct event kinds that lansentry can emit.
///
/// Each variant carries exactly the fields needed to describe that event.
/// The `#[serde(tag = "event")]` attribute ensures JSON output includes an
/// `"event"` key so consumers can filter by type without inspecting structure.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event<'a> {
    /// Informational startup / status message.
    Info { message: &'a str },

    /// A previously unseen source created a device record.
    NewDevice {
        ip:          &'a str,
        name:        &'a str,
        device_type: &'a str,
    },

    /// A device was marked suspicious after a detector fired.
    DeviceFlagged { ip: &'a str, reason: &'a str },

    /// A detector fired against a source host.
    Alert {
        src:         &'a str,
        attack_type: &'a str,
        description: &'a str,
        severity:    &'a str,
        device:      &'a str,
    },

    /// The anomaly model finished its warm-up phase and was fit.
    ModelTrained { samples: usize },

    /// A persisted anomaly model was restored at startup.
    ModelLoaded { path: &'a str },

    /// Session summary emitted on graceful shutdown.
    SessionSummary {
        duration_secs:   u64,
        packets_total:   u64,
        unique_ips:      usize,
        alerts_emitted:  u64,
        flagged_devices: usize,
        dropped_events:  u64,
    },
}

// ── Logger ───────────────────────────────────────────────────────────────────

/// Shared, thread-safe structured logger.
///
/// Constructed once in `main` and passed as an `Arc<Logger>` to every module
/// that needs to emit events. The internal `Mutex` serialises writes so that
/// output lines are never interleaved across threads.
pub struct Logger {
    /// Whether to format events as NDJSON instead of plain text.
    json: bool,
    /// Optional buffered file writer. `None` when `--log-file` was not given.
    file: Option<Mutex<BufWriter<std::fs::File>>>,
}

/// Type alias used throughout the codebase for convenience.
pub type SharedLogger = Arc<Logger>;

impl Logger {
    /// Creates a new logger.
    ///
    /// # Arguments
    /// * `json`     - Emit NDJSON instead of plain text when `true`.
    /// * `log_path` - If `Some`, open (or create) this file for appended writes.
    ///
    /// # Errors
    /// Returns an `io::Error` if the log file cannot be opened or created.
    pub fn new(json: bool, log_path: Option<&str>) -> io::Result<Self> {
        let file = match log_path {
            Some(path) => {
                let f = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                Some(Mutex::new(BufWriter::new(f)))
            }
            None => None,
        };

        Ok(Self { json, file })
    }

    /// Logs a single [`Event`], writing to stdout and optionally to the log file.
    ///
    /// Plain-text output is prefixed with a timestamp and the event tag.
    /// NDJSON output is a single JSON object per line with a `"timestamp"` field
    /// injected alongside the event fields.
    pub fn log(&self, event: &Event) {
        let timestamp = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string();

        let line = if self.json {
            // Serialise the event to a JSON Value so we can inject the timestamp.
            let mut val = serde_json::to_value(event).unwrap_or_default();
            if let Some(obj) = val.as_object_mut() {
                obj.insert(
                    "timestamp".to_string(),
                    serde_json::Value::String(timestamp.clone()),
                );
            }
            serde_json::to_string(&val).unwrap_or_default()
        } else {
            // Plain-text: "[TIMESTAMP] [TAG] human-readable description"
            format!("[{}] {}", timestamp, self.plain_text(event))
        };

        // Always write to stdout.
        println!("{}", line);

        // If a log file was configured, also write there.
        if let Some(mutex) = &self.file {
            if let Ok(mut writer) = mutex.lock() {
                let _ = writeln!(writer, "{}", line);
                let _ = writer.flush();
            }
        }
    }

    /// Formats an [`Event`] as a human-readable plain-text string (no timestamp).
    fn plain_text(&self, event: &Event) -> String {
        match event {
            Event::Info { message } =>
                format!("[INFO] {}", message),

            Event::NewDevice { ip, name, device_type } =>
                format!("[NEW DEVICE] {} | {} | Type: {}", ip, name, device_type),

            Event::DeviceFlagged { ip, reason } =>
                format!("[FLAGGED] {} - {}", ip, reason),

            Event::Alert { src, attack_type, description, severity, device } =>
                format!(
                    "[ALERT] {} | {} | {} | SEVERITY: {} | DEVICE: {}",
                    src, attack_type, description, severity, device
                ),

            Event::ModelTrained { samples } =>
                format!("[ML] model trained on {} samples of normal traffic", samples),

            Event::ModelLoaded { path } =>
                format!("[ML] model loaded from {}", path),

            Event::SessionSummary {
                duration_secs,
                packets_total,
                unique_ips,
                alerts_emitted,
                flagged_devices,
                dropped_events,
            } => format!(
                "[SUMMARY] duration={}s packets={} hosts={} alerts={} flagged={} dropped={}",
                duration_secs, packets_total, unique_ips, alerts_emitted,
                flagged_devices, dropped_events
            ),
        }
    }
}

// ── Alert sink ───────────────────────────────────────────────────────────────

/// Durable record written to the alert sink, one line per alert.
#[derive(Debug, Serialize)]
struct AlertRecord<'a> {
    timestamp:   &'a str,
    source_ip:   &'a str,
    attack_type: &'a str,
    description: &'a str,
}

/// Append-only alert log. One JSON object per line; existing records are
/// never mutated or deleted.
pub struct AlertLog {
    writer: BufWriter<std::fs::File>,
}

impl AlertLog {
    /// Opens (or creates) the alert log for appended writes.
    pub fn open(path: &str) -> io::Result<Self> {
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { writer: BufWriter::new(f) })
    }

    /// Appends one alert record and flushes it to disk.
    pub fn append(&mut self, alert: &Alert) -> io::Result<()> {
        let record = AlertRecord {
            timestamp:   &alert.timestamp,
            source_ip:   &alert.src_ip,
            attack_type: &alert.attack_type,
            description: &alert.description,
        };
        let line = serde_json::to_string(&record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()
    }
}
