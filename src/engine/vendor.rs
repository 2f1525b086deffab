//! Hardware-address vendor resolution and device-type classification.
//!
//! Resolution order: format validation (malformed addresses short-circuit to
//! the `"Invalid"` sentinel with no external call), then the persistent cache,
//! then a single bounded HTTP lookup whose failure is cached as `"Unknown"`
//! and never retried. Device type and nickname are derived from the vendor
//! string via ordered keyword tables; table order is the tie-break rule, so
//! the first matching entry wins.
//!
//! The external calls (vendor API, reverse DNS) are the only network I/O in
//! the engine. They run on the dedicated worker spawned by [`spawn_worker`],
//! fed over an mpsc channel, so the ingestion path never blocks on them.

use crate::engine::config::LOOKUP_TIMEOUT;
use crate::error::{Result, SentryError};
use crate::logger::{Event, SharedLogger};
use std::collections::HashMap;
use std::fs;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, Sender};
use std::thread;

// ── Classification tables ────────────────────────────────────────────────────

/// Vendor-substring table for device-type detection, in priority order.
/// First matching type wins; several vendors appear under more than one type
/// (e.g. "asus" is both Router and PC), which is exactly why order matters.
const DEVICE_TYPE_PATTERNS: &[(&str, &[&str])] = &[
    ("Router",  &["sagecom", "tp-link", "d-link", "netgear", "asus", "cisco", "ubiquiti", "mikrotik"]),
    ("Phone",   &["apple", "samsung", "motorola", "nokia", "oppo", "vivo", "xiaomi", "huawei", "oneplus", "sony", "htc"]),
    ("TV",      &["lg electronics", "samsung", "sony", "philips", "sharp", "panasonic", "roku"]),
    ("PC",      &["intel", "amd", "dell", "hp", "lenovo", "asus", "msi"]),
    ("IoT",     &["amazon", "google", "philips", "nest", "echo", "smartthings", "wyze"]),
    ("Printer", &["hp", "canon", "epson", "xerox", "brother", "ricoh"]),
    ("Gaming",  &["nvidia", "playstation", "xbox", "nintendo"]),
];

/// Per-type nickname markers.
const TYPE_MARKERS: &[(&str, &str)] = &[
    ("Router",  "🌐"),
    ("Phone",   "📱"),
    ("TV",      "📺"),
    ("PC",      "💻"),
    ("IoT",     "🏠"),
    ("Printer", "🖨️"),
    ("Gaming",  "🎮"),
];

/// Canonical vendor labels, matched as substrings in order.
const VENDOR_ALIASES: &[(&str, &str)] = &[
    ("apple",          "🍎 Apple"),
    ("samsung",        "Samsung"),
    ("motorola",       "Motorola"),
    ("lg electronics", "LG"),
    ("sony",           "Sony"),
    ("google",         "Google"),
    ("tp-link",        "TP-Link"),
    ("netgear",        "Netgear"),
    ("asus",           "ASUS"),
    ("dell",           "Dell"),
    ("hp",             "HP"),
    ("canon",          "Canon"),
    ("epson",          "Epson"),
    ("amazon",         "Amazon"),
    ("philips",        "Philips"),
    ("intel",          "Intel"),
    ("nvidia",         "NVIDIA"),
    ("sagecom",        "Sagecom"),
];

// ── External lookup traits ───────────────────────────────────────────────────

/// Vendor lookup service boundary. The production implementation calls the
/// macvendors HTTP API; tests substitute a recording mock.
pub trait VendorApi: Send {
    fn vendor_for(&self, mac: &str) -> Result<String>;
}

/// Reverse-name lookup boundary. `None` covers both "no record" and failure;
/// either way the resolver caches the negative and never retries.
pub trait HostNames: Send {
    fn hostname_for(&self, ip: &str) -> Option<String>;
}

/// Production vendor API client with a bounded request timeout.
pub struct MacVendorsApi {
    client: reqwest::blocking::Client,
}

impl MacVendorsApi {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(LOOKUP_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

impl VendorApi for MacVendorsApi {
    fn vendor_for(&self, mac: &str) -> Result<String> {
        let url = format!("https://api.macvendors.com/{}", mac);
        let response = self.client.get(&url).send()?;
        if !response.status().is_success() {
            return Err(SentryError::Lookup(format!(
                "vendor API returned {} for {}",
                response.status(),
                mac
            )));
        }
        Ok(response.text()?)
    }
}

/// System reverse-DNS resolver.
pub struct SystemHostNames;

impl HostNames for SystemHostNames {
    fn hostname_for(&self, ip: &str) -> Option<String> {
        let addr: IpAddr = ip.parse().ok()?;
        dns_lookup::lookup_addr(&addr).ok()
    }
}

/// Offline stand-ins: every lookup fails fast, so unseen MACs cache as
/// "Unknown" and no network traffic is generated.
pub struct OfflineApi;

impl VendorApi for OfflineApi {
    fn vendor_for(&self, mac: &str) -> Result<String> {
        Err(SentryError::Lookup(format!("offline mode, no lookup for {}", mac)))
    }
}

impl HostNames for OfflineApi {
    fn hostname_for(&self, _ip: &str) -> Option<String> {
        None
    }
}

// ── Resolver ─────────────────────────────────────────────────────────────────

/// Fully resolved identity for one hardware address.
#[derive(Debug, Clone)]
pub struct VendorInfo {
    pub mac:         String,
    pub vendor:      String,
    pub device_type: String,
    pub nickname:    String,
    /// Last 3 bytes of the MAC, kept as a short identification suffix.
    pub last_bytes:  String,
}

/// Vendor resolver with a persistent cache and an independent reverse-name
/// cache (negative results included).
pub struct VendorResolver {
    cache:      HashMap<String, String>,
    cache_path: Option<PathBuf>,
    dirty:      bool,
    rdns_cache: HashMap<String, Option<String>>,
    api:        Box<dyn VendorApi>,
    rdns:       Box<dyn HostNames>,
}

impl VendorResolver {
    /// Creates a resolver, loading the persisted cache if present. An
    /// unreadable cache file degrades to an empty cache rather than failing.
    pub fn new(
        cache_path: Option<PathBuf>,
        api: Box<dyn VendorApi>,
        rdns: Box<dyn HostNames>,
    ) -> Self {
        let cache = cache_path
            .as_ref()
            .and_then(|p| fs::read_to_string(p).ok())
            .and_then(|data| serde_json::from_str(&data).ok())
            .unwrap_or_default();

        Self {
            cache,
            cache_path,
            dirty: false,
            rdns_cache: HashMap::new(),
            api,
            rdns,
        }
    }

    /// Complete lookup: vendor, device type, nickname, identification suffix,
    /// and (when an IP is supplied) reverse-name override of the nickname.
    pub fn resolve(&mut self, mac: &str, ip: Option<&str>) -> VendorInfo {
        let mac = mac.trim().to_uppercase();

        let vendor = self.lookup_vendor(&mac);
        let device_type = detect_device_type(&vendor);
        let mut nickname = nickname_for(&vendor, device_type);
        let last_bytes = last_three_bytes(&mac);

        if let Some(ip) = ip {
            if let Some(hostname) = self.reverse_lookup(ip) {
                nickname = format!("🌐 {}", hostname);
            }
        }

        VendorInfo {
            mac,
            vendor,
            device_type: device_type.to_string(),
            nickname,
            last_bytes,
        }
    }

    /// Vendor string for an uppercased MAC. Malformed addresses return
    /// `"Invalid"` before any external call; cache hits return immediately;
    /// a miss performs exactly one external lookup and caches the outcome,
    /// failure and success alike.
    fn lookup_vendor(&mut self, mac: &str) -> String {
        if mac.is_empty() || mac == "00:00:00:00:00:00" {
            return "Unknown".to_string();
        }
        if !is_valid_mac(mac) {
            return "Invalid".to_string();
        }
        if let Some(vendor) = self.cache.get(mac) {
            return vendor.clone();
        }

        let vendor = match self.api.vendor_for(mac) {
            // Very short bodies are error pages, not vendor names.
            Ok(body) if body.trim().len() > 2 => body.trim().to_string(),
            _ => "Unknown".to_string(),
        };

        self.cache.insert(mac.to_string(), vendor.clone());
        self.dirty = true;
        vendor
    }

    /// Reverse-name lookup with negative caching: one attempt per IP, ever.
    fn reverse_lookup(&mut self, ip: &str) -> Option<String> {
        if let Some(cached) = self.rdns_cache.get(ip) {
            return cached.clone();
        }
        let result = self.rdns.hostname_for(ip).filter(|h| !h.is_empty());
        self.rdns_cache.insert(ip.to_string(), result.clone());
        result
    }

    /// Writes the vendor cache to disk if it changed since the last save.
    pub fn persist(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(path) = &self.cache_path {
            fs::write(path, serde_json::to_string_pretty(&self.cache)?)?;
        }
        self.dirty = false;
        Ok(())
    }
}

/// A hardware address is valid iff it decomposes into exactly 6
/// colon-separated 2-hex-digit groups.
pub fn is_valid_mac(mac: &str) -> bool {
    let parts: Vec<&str> = mac.split(':').collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
}

/// First device type whose keyword table matches the vendor string.
fn detect_device_type(vendor: &str) -> &'static str {
    let vendor_lower = vendor.to_lowercase();
    for (device_type, keywords) in DEVICE_TYPE_PATTERNS {
        if keywords.iter().any(|k| vendor_lower.contains(k)) {
            return device_type;
        }
    }
    "Unknown"
}

/// Friendly nickname: type marker plus canonical vendor label (or the raw
/// vendor string when no alias matches).
fn nickname_for(vendor: &str, device_type: &str) -> String {
    let vendor_lower = vendor.to_lowercase();
    let marker = TYPE_MARKERS
        .iter()
        .find(|(t, _)| *t == device_type)
        .map(|(_, m)| *m)
        .unwrap_or("❓");

    for (key, label) in VENDOR_ALIASES {
        if vendor_lower.contains(key) {
            return format!("{} {} ({})", marker, label, device_type);
        }
    }
    format!("{} {} ({})", marker, vendor, device_type)
}

/// Last 3 bytes of the MAC ("XX:XX:XX"), used as an identification suffix.
///
/// Counts characters, not bytes: the MAC comes straight from the decoder and
/// may be arbitrary garbage, which must degrade, never panic.
pub fn last_three_bytes(mac: &str) -> String {
    let len = mac.chars().count();
    if len < 17 {
        return "N/A".to_string();
    }
    mac.chars().skip(len - 8).collect()
}

// ── Background worker ────────────────────────────────────────────────────────

/// Resolution request from the engine.
pub struct ResolveRequest {
    pub ip:  String,
    pub mac: String,
}

/// Completed resolution handed back to the engine.
pub struct VendorUpdate {
    pub ip:   String,
    pub info: VendorInfo,
}

/// Spawns the vendor resolution worker.
///
/// The worker drains requests until the engine drops its sender, persisting
/// the cache after each request that changed it. Persistence failures are
/// logged and do not stop the worker.
pub fn spawn_worker(
    mut resolver: VendorResolver,
    requests: Receiver<ResolveRequest>,
    updates: Sender<VendorUpdate>,
    logger: SharedLogger,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for request in requests {
            let info = resolver.resolve(&request.mac, Some(&request.ip));
            if let Err(e) = resolver.persist() {
                logger.log(&Event::Info {
                    message: &format!("vendor cache write failed: {}", e),
                });
            }
            // The engine hanging up mid-flight just means shutdown started.
            if updates.send(VendorUpdate { ip: request.ip, info }).is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Counts external calls and answers from a fixed table.
    struct MockApi {
        calls:   Arc<AtomicUsize>,
        answers: HashMap<String, String>,
    }

    impl VendorApi for MockApi {
        fn vendor_for(&self, mac: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answers
                .get(mac)
                .cloned()
                .ok_or_else(|| SentryError::Lookup("no such vendor".into()))
        }
    }

    struct NoNames;
    impl HostNames for NoNames {
        fn hostname_for(&self, _ip: &str) -> Option<String> {
            None
        }
    }

    fn resolver_with(
        answers: &[(&str, &str)],
    ) -> (VendorResolver, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let api = MockApi {
            calls: Arc::clone(&calls),
            answers: answers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        (
            VendorResolver::new(None, Box::new(api), Box::new(NoNames)),
            calls,
        )
    }

    #[test]
    fn malformed_mac_is_invalid_without_external_call() {
        let (mut resolver, calls) = resolver_with(&[]);
        for bad in ["aa:bb:cc", "AA:BB:CC:DD:EE:GG", "AABBCCDDEEFF", "AA:BB:CC:DD:EE:F", "AA-BB-CC-DD-EE-FF"] {
            let info = resolver.resolve(bad, None);
            assert_eq!(info.vendor, "Invalid", "{bad} must be rejected");
            assert_eq!(info.device_type, "Unknown");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn all_zero_mac_is_unknown_without_external_call() {
        let (mut resolver, calls) = resolver_with(&[]);
        let info = resolver.resolve("00:00:00:00:00:00", None);
        assert_eq!(info.vendor, "Unknown");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cache_serves_second_resolution() {
        let (mut resolver, calls) =
            resolver_with(&[("AA:BB:CC:DD:EE:FF", "Apple, Inc.")]);
        let first = resolver.resolve("aa:bb:cc:dd:ee:ff", None);
        let second = resolver.resolve("AA:BB:CC:DD:EE:FF", None);
        assert_eq!(first.vendor, "Apple, Inc.");
        assert_eq!(second.vendor, "Apple, Inc.");
        assert_eq!(calls.load(Ordering::SeqCst), 1, "second hit must come from cache");
    }

    #[test]
    fn failed_lookup_caches_unknown_and_never_retries() {
        let (mut resolver, calls) = resolver_with(&[]);
        assert_eq!(resolver.resolve("AA:BB:CC:DD:EE:01", None).vendor, "Unknown");
        assert_eq!(resolver.resolve("AA:BB:CC:DD:EE:01", None).vendor, "Unknown");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn short_response_body_counts_as_unknown() {
        let (mut resolver, _) = resolver_with(&[("AA:BB:CC:DD:EE:02", "x")]);
        assert_eq!(resolver.resolve("AA:BB:CC:DD:EE:02", None).vendor, "Unknown");
    }

    #[test]
    fn device_type_table_order_breaks_ties() {
        // "asus" appears under Router (first) and PC (later): Router wins.
        assert_eq!(detect_device_type("ASUSTek COMPUTER INC."), "Router");
        // "sony" appears under Phone before TV.
        assert_eq!(detect_device_type("Sony Corporation"), "Phone");
        assert_eq!(detect_device_type("Espressif Inc."), "Unknown");
    }

    #[test]
    fn suffix_takes_characters_not_bytes() {
        assert_eq!(last_three_bytes("AA:BB:CC:DD:EE:FF"), "DD:EE:FF");
        assert_eq!(last_three_bytes("AA:BB:CC"), "N/A");
        // Multibyte garbage from the decoder degrades instead of panicking.
        assert_eq!(last_three_bytes("0123456789é0123456"), "é0123456");
    }

    #[test]
    fn nickname_uses_alias_and_marker() {
        let (mut resolver, _) =
            resolver_with(&[("AA:BB:CC:DD:EE:03", "Apple, Inc.")]);
        let info = resolver.resolve("AA:BB:CC:DD:EE:03", None);
        assert_eq!(info.device_type, "Phone");
        assert_eq!(info.nickname, "📱 🍎 Apple (Phone)");
        assert_eq!(info.last_bytes, "DD:EE:03");
    }

    #[test]
    fn reverse_lookup_overrides_nickname_and_caches_negatives() {
        struct OneName {
            calls: Arc<AtomicUsize>,
        }
        impl HostNames for OneName {
            fn hostname_for(&self, ip: &str) -> Option<String> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                (ip == "10.0.0.5").then(|| "living-room-tv".to_string())
            }
        }

        let rdns_calls = Arc::new(AtomicUsize::new(0));
        let api = MockApi { calls: Arc::new(AtomicUsize::new(0)), answers: HashMap::new() };
        let mut resolver = VendorResolver::new(
            None,
            Box::new(api),
            Box::new(OneName { calls: Arc::clone(&rdns_calls) }),
        );

        let info = resolver.resolve("AA:BB:CC:DD:EE:04", Some("10.0.0.5"));
        assert_eq!(info.nickname, "🌐 living-room-tv");

        // Negative result is cached: only one attempt for 10.0.0.6.
        resolver.resolve("AA:BB:CC:DD:EE:05", Some("10.0.0.6"));
        resolver.resolve("AA:BB:CC:DD:EE:06", Some("10.0.0.6"));
        assert_eq!(rdns_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cache_persists_across_resolver_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mac_cache.json");

        let calls = Arc::new(AtomicUsize::new(0));
        let api = MockApi {
            calls: Arc::clone(&calls),
            answers: [("AA:BB:CC:DD:EE:FF".to_string(), "Netgear".to_string())]
                .into_iter()
                .collect(),
        };
        let mut resolver =
            VendorResolver::new(Some(path.clone()), Box::new(api), Box::new(NoNames));
        resolver.resolve("AA:BB:CC:DD:EE:FF", None);
        resolver.persist().unwrap();

        // A fresh resolver with an always-failing API still answers from disk.
        let (fresh_api, fresh_calls) = {
            let c = Arc::new(AtomicUsize::new(0));
            (MockApi { calls: Arc::clone(&c), answers: HashMap::new() }, c)
        };
        let mut restored =
            VendorResolver::new(Some(path), Box::new(fresh_api), Box::new(NoNames));
        let info = restored.resolve("AA:BB:CC:DD:EE:FF", None);
        assert_eq!(info.vendor, "Netgear");
        assert_eq!(info.device_type, "Router");
        assert_eq!(fresh_calls.load(Ordering::SeqCst), 0);
    }
}
