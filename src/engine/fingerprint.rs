//! Device fingerprinting from observed DNS queries.
//!
//! Every query appends to an unbounded per-source history, and classification
//! rescans the whole history against the ordered fingerprint table (a type
//! qualifies with at least 2 matching domain substrings, first qualifying
//! type wins). Rescanning from scratch is O(history) per query and means a
//! later update can land on a weaker match: last write wins, classification
//! is not monotonic. Both are deliberate; see DESIGN.md.

use crate::error::Result;
use crate::logger::{Event, SharedLogger};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Domain-substring table for fingerprint classification, in priority order.
/// First type with >= 2 matches wins.
const FINGERPRINTS: &[(&str, &[&str])] = &[
    ("Apple",         &["api.apple.com", "icloud.com", "mzstatic.com", "push.apple.com"]),
    ("Google Pixel",  &["google.com", "android.com", "gstatic.com"]),
    ("Samsung",       &["samsung.com", "samsungapps.com"]),
    ("Amazon Alexa",  &["amazon.com", "alexa.com", "alexa-device-setup.com"]),
    ("Chromecast",    &["google.com", "gstatic.com", "youtube.com"]),
    ("Roku",          &["roku.com", "rokudev.com"]),
    ("Smart TV",      &["samsung.com", "lg.com", "sony.com", "netflix.com"]),
    ("Windows PC",    &["microsoft.com", "windows.com", "xbox.com"]),
    ("MacOS",         &["apple.com", "icloud.com", "macdownload.apple.com"]),
    ("Linux",         &["ubuntu.com", "debian.org", "github.com"]),
    ("Android Phone", &["google.com", "android.com", "gms.googleapis.com"]),
    ("IoT Device",    &["amazon.com", "google.com", "home-automation.com"]),
    ("Router",        &["router-login.com", "routerlogin.net", "myrouter.local"]),
];

/// Infrastructure-style name fragments that disqualify a hostname candidate.
const HOSTNAME_DENYLIST: &[&str] = &["api", "cdn", "analytics", "tracking", "ads", "beacon"];

/// Per-source profile built from DNS queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub ip: String,
    #[serde(default)]
    pub mac: Option<String>,
    pub device_name: String,
    pub device_type: String,
    /// Full query history, append-only and unbounded in memory.
    pub queries: Vec<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Exported view of a profile: total count plus a sample of recent queries.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub ip: String,
    pub mac: Option<String>,
    pub device_name: String,
    pub device_type: String,
    pub total_queries: usize,
    pub queries_sample: Vec<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// On-disk export envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileExport {
    pub timestamp: DateTime<Utc>,
    pub total_devices: usize,
    pub devices: Vec<ProfileRecord>,
}

/// Builds per-source identity profiles from name-resolution queries.
pub struct DnsProfiler {
    profiles: HashMap<String, DeviceProfile>,
    /// Reverse index from an extracted device hostname to its source IP.
    hostname_index: HashMap<String, String>,
}

impl DnsProfiler {
    pub fn new() -> Self {
        Self {
            profiles: HashMap::new(),
            hostname_index: HashMap::new(),
        }
    }

    /// Records one observed query for `ip`, reclassifies the profile from its
    /// full history, and attempts hostname extraction from the current query.
    pub fn observe(&mut self, ip: &str, queried_name: &str) {
        let now = Utc::now();
        let profile = self.profiles.entry(ip.to_string()).or_insert_with(|| DeviceProfile {
            ip: ip.to_string(),
            mac: None,
            device_name: "Unknown".to_string(),
            device_type: "Unknown".to_string(),
            queries: Vec::new(),
            first_seen: now,
            last_seen: now,
        });

        profile.queries.push(queried_name.to_string());
        profile.last_seen = now;

        if let Some(device_type) = fingerprint(&profile.queries) {
            profile.device_type = device_type.to_string();
            profile.device_name = format!("🔍 {}", device_type);
        }

        if let Some(candidate) = extract_hostname(queried_name) {
            if !profile.device_name.contains(&candidate) && is_device_hostname(&candidate) {
                profile.device_name = format!("📱 {}", candidate);
                self.hostname_index.insert(candidate, ip.to_string());
            }
        }
    }

    pub fn profile(&self, ip: &str) -> Option<&DeviceProfile> {
        self.profiles.get(ip)
    }

    /// Source IP previously associated with an extracted device hostname.
    pub fn device_for_hostname(&self, hostname: &str) -> Option<&str> {
        self.hostname_index.get(hostname).map(String::as_str)
    }

    /// Writes all profiles as a JSON export with a 10-query recent sample.
    pub fn export(&self, path: &Path) -> Result<()> {
        let devices = self
            .profiles
            .values()
            .map(|p| ProfileRecord {
                ip: p.ip.clone(),
                mac: p.mac.clone(),
                device_name: p.device_name.clone(),
                device_type: p.device_type.clone(),
                total_queries: p.queries.len(),
                queries_sample: p.queries.iter().rev().take(10).rev().cloned().collect(),
                first_seen: p.first_seen,
                last_seen: p.last_seen,
            })
            .collect::<Vec<_>>();

        let export = ProfileExport {
            timestamp: Utc::now(),
            total_devices: devices.len(),
            devices,
        };
        fs::write(path, serde_json::to_string_pretty(&export)?)?;
        Ok(())
    }

    /// Logs a shutdown summary of the busiest profiles.
    pub fn log_summary(&self, logger: &SharedLogger) {
        let mut profiles: Vec<&DeviceProfile> = self.profiles.values().collect();
        profiles.sort_by(|a, b| b.queries.len().cmp(&a.queries.len()));

        for profile in profiles.iter().take(10) {
            let mut counts: HashMap<&str, usize> = HashMap::new();
            for query in &profile.queries {
                *counts.entry(query.as_str()).or_default() += 1;
            }
            let mut ranked: Vec<(&str, usize)> = counts.iter().map(|(q, c)| (*q, *c)).collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1));
            let top = ranked
                .iter()
                .take(3)
                .map(|(q, c)| format!("{} x{}", q, c))
                .collect::<Vec<_>>()
                .join(", ");

            logger.log(&Event::Info {
                message: &format!(
                    "profile {} | {} | type {} | {} queries ({} unique domains) | top: {}",
                    profile.ip,
                    profile.device_name,
                    profile.device_type,
                    profile.queries.len(),
                    counts.len(),
                    top
                ),
            });
        }
    }
}

/// Classifies a query history. The lowercased concatenation of every query is
/// matched against each table entry; a type needs at least 2 distinct
/// substring hits, and the first qualifying entry wins.
fn fingerprint(queries: &[String]) -> Option<&'static str> {
    let haystack = queries.join(" ").to_lowercase();
    for (device_type, patterns) in FINGERPRINTS {
        let matches = patterns.iter().filter(|p| haystack.contains(*p)).count();
        if matches >= 2 {
            return Some(device_type);
        }
    }
    None
}

/// Extracts a plausible device hostname from one queried name.
///
/// `.local` names yield their leading label directly; otherwise the leading
/// label must be short and pass [`is_device_hostname`].
fn extract_hostname(domain: &str) -> Option<String> {
    let parts: Vec<&str> = domain.split('.').collect();
    if parts.len() < 2 {
        return None;
    }

    // The length gate applies to the candidate label, not the whole domain:
    // a short hostname inside a long FQDN is still a valid extraction.
    let leading = parts[0];
    if leading.len() >= 50 {
        return None;
    }

    if parts[parts.len() - 1] == "local" {
        return Some(leading.to_string());
    }

    if leading.len() < 20
        && !leading.starts_with("api")
        && !leading.starts_with("cdn")
        && is_device_hostname(leading)
    {
        return Some(leading.to_string());
    }

    None
}

/// A device hostname is 3-30 characters of alphanumerics and hyphens, with
/// no infrastructure-style fragments.
fn is_device_hostname(name: &str) -> bool {
    let lower = name.to_lowercase();
    if HOSTNAME_DENYLIST.iter().any(|frag| lower.contains(frag)) {
        return false;
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return false;
    }
    (3..=30).contains(&name.len())
}
