//! Canonical per-IP device registry.
//!
//! One [`Device`] per source IP, created on the first packet that carries a
//! resolvable hardware address and mutated on every subsequent packet from
//! that IP. The registry is the single owner of device state: the engine
//! drives every mutation, and readers only ever see devices through the
//! published stats snapshot.

use crate::engine::vendor::{last_three_bytes, VendorInfo};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// A device observed on the network, keyed by IP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub ip: String,
    pub mac: String,
    pub device_name: String,
    pub vendor: String,
    pub device_type: String,
    /// Identification suffix: last 3 bytes of the MAC.
    pub last_bytes: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub packet_count: u64,
    pub is_flagged: bool,
    #[serde(default)]
    pub flag_reason: Option<String>,
}

/// On-disk export envelope. Round-trips through serde exactly.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeviceExport {
    pub timestamp: DateTime<Utc>,
    pub total_devices: usize,
    pub devices: HashMap<String, Device>,
}

/// Outcome of a registry touch, so the engine can log creations and request
/// vendor resolution exactly once per device.
pub struct TouchOutcome {
    pub created: bool,
}

pub struct DeviceRegistry {
    devices: HashMap<String, Device>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self { devices: HashMap::new() }
    }

    /// Registers a packet from `ip`. The first packet carrying a MAC creates
    /// the device with placeholder identity (the vendor worker fills it in
    /// later); every subsequent packet bumps the counter and `last_seen`.
    /// Packets without a MAC for an unknown IP create nothing.
    pub fn touch(&mut self, ip: &str, mac: Option<&str>) -> TouchOutcome {
        let now = Utc::now();

        if let Some(device) = self.devices.get_mut(ip) {
            device.last_seen = now;
            device.packet_count += 1;
            return TouchOutcome { created: false };
        }

        let Some(mac) = mac else {
            return TouchOutcome { created: false };
        };

        let mac = mac.trim().to_uppercase();
        let device = Device {
            ip: ip.to_string(),
            last_bytes: last_three_bytes(&mac),
            mac,
            device_name: "❓ Unknown (Unknown)".to_string(),
            vendor: "Unknown".to_string(),
            device_type: "Unknown".to_string(),
            first_seen: now,
            last_seen: now,
            packet_count: 1,
            is_flagged: false,
            flag_reason: None,
        };
        self.devices.insert(ip.to_string(), device);
        TouchOutcome { created: true }
    }

    /// Installs the vendor worker's resolution for `ip`.
    ///
    /// Identity fields always update; the display name is only replaced while
    /// it still reads as Unknown, so a fingerprint-derived name that arrived
    /// first is not clobbered.
    pub fn apply_vendor(&mut self, ip: &str, info: VendorInfo) {
        if let Some(device) = self.devices.get_mut(ip) {
            device.vendor = info.vendor;
            device.device_type = info.device_type;
            device.last_bytes = info.last_bytes;
            device.mac = info.mac;
            if device.device_name.contains("Unknown") {
                device.device_name = info.nickname;
            }
        }
    }

    /// Adopts a fingerprint classification while the device's own name still
    /// reads as Unknown. One-directional: a vendor-resolved name never gets
    /// overwritten here.
    pub fn adopt_fingerprint(&mut self, ip: &str, name: &str, device_type: &str) {
        if let Some(device) = self.devices.get_mut(ip) {
            if device.device_name.contains("Unknown") {
                device.device_name = name.to_string();
                device.device_type = device_type.to_string();
            }
        }
    }

    /// Marks a device suspicious. Idempotent; a later call overwrites the
    /// reason. Returns whether a device existed to flag.
    pub fn flag(&mut self, ip: &str, reason: &str) -> bool {
        match self.devices.get_mut(ip) {
            Some(device) => {
                device.is_flagged = true;
                device.flag_reason = Some(reason.to_string());
                true
            }
            None => false,
        }
    }

    pub fn unflag(&mut self, ip: &str) {
        if let Some(device) = self.devices.get_mut(ip) {
            device.is_flagged = false;
            device.flag_reason = None;
        }
    }

    pub fn get(&self, ip: &str) -> Option<&Device> {
        self.devices.get(ip)
    }

    /// Top `count` devices by packet count, descending.
    pub fn top_talkers(&self, count: usize) -> Vec<&Device> {
        let mut all: Vec<&Device> = self.devices.values().collect();
        all.sort_by(|a, b| b.packet_count.cmp(&a.packet_count));
        all.truncate(count);
        all
    }

    /// Top `count` (ip, packet_count) pairs, descending.
    pub fn top_ips(&self, count: usize) -> Vec<(String, u64)> {
        self.top_talkers(count)
            .into_iter()
            .map(|d| (d.ip.clone(), d.packet_count))
            .collect()
    }

    pub fn flagged(&self) -> Vec<&Device> {
        self.devices.values().filter(|d| d.is_flagged).collect()
    }

    pub fn online_count(&self) -> usize {
        self.devices.len()
    }

    pub fn total_packets(&self) -> u64 {
        self.devices.values().map(|d| d.packet_count).sum()
    }

    pub fn devices_map(&self) -> &HashMap<String, Device> {
        &self.devices
    }

    /// Writes the full registry as a JSON export.
    pub fn export(&self, path: &Path) -> Result<()> {
        let export = DeviceExport {
            timestamp: Utc::now(),
            total_devices: self.devices.len(),
            devices: self.devices.clone(),
        };
        fs::write(path, serde_json::to_string_pretty(&export)?)?;
        Ok(())
    }
}

impl DeviceExport {
    /// Reads a previously written export.
    pub fn load(path: &Path) -> Result<Self> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAC: &str = "AA:BB:CC:DD:EE:FF";

    fn vendor_info() -> VendorInfo {
        VendorInfo {
            mac: MAC.to_string(),
            vendor: "Netgear".to_string(),
            device_type: "Router".to_string(),
            nickname: "🌐 Netgear (Router)".to_string(),
            last_bytes: "DD:EE:FF".to_string(),
        }
    }

    #[test]
    fn n_packets_count_n_and_timestamps_are_ordered() {
        let mut registry = DeviceRegistry::new();
        for _ in 0..37 {
            registry.touch("10.0.0.5", Some(MAC));
        }
        let device = registry.get("10.0.0.5").unwrap();
        assert_eq!(device.packet_count, 37);
        assert!(device.first_seen <= device.last_seen);
    }

    #[test]
    fn no_mac_means_no_device() {
        let mut registry = DeviceRegistry::new();
        let outcome = registry.touch("10.0.0.5", None);
        assert!(!outcome.created);
        assert!(registry.get("10.0.0.5").is_none());

        // But once created, later MAC-less packets still count.
        registry.touch("10.0.0.5", Some(MAC));
        registry.touch("10.0.0.5", None);
        assert_eq!(registry.get("10.0.0.5").unwrap().packet_count, 2);
    }

    #[test]
    fn garbage_mac_from_the_decoder_never_panics() {
        let mut registry = DeviceRegistry::new();
        registry.touch("10.0.0.5", Some("0123456789é0123456"));
        let device = registry.get("10.0.0.5").unwrap();
        assert_eq!(device.last_bytes, "É0123456");
    }

    #[test]
    fn vendor_application_fills_placeholder() {
        let mut registry = DeviceRegistry::new();
        registry.touch("10.0.0.5", Some(MAC));
        registry.apply_vendor("10.0.0.5", vendor_info());
        let device = registry.get("10.0.0.5").unwrap();
        assert_eq!(device.vendor, "Netgear");
        assert_eq!(device.device_type, "Router");
        assert_eq!(device.device_name, "🌐 Netgear (Router)");
    }

    #[test]
    fn vendor_result_does_not_clobber_fingerprint_name() {
        let mut registry = DeviceRegistry::new();
        registry.touch("10.0.0.5", Some(MAC));
        registry.adopt_fingerprint("10.0.0.5", "📱 my-laptop", "Apple");
        registry.apply_vendor("10.0.0.5", vendor_info());
        let device = registry.get("10.0.0.5").unwrap();
        assert_eq!(device.device_name, "📱 my-laptop", "fingerprint name survives");
        assert_eq!(device.vendor, "Netgear", "identity fields still update");
    }

    #[test]
    fn fingerprint_adoption_is_one_directional() {
        let mut registry = DeviceRegistry::new();
        registry.touch("10.0.0.5", Some(MAC));
        registry.apply_vendor("10.0.0.5", vendor_info());
        registry.adopt_fingerprint("10.0.0.5", "🔍 Chromecast", "Chromecast");
        let device = registry.get("10.0.0.5").unwrap();
        assert_eq!(device.device_name, "🌐 Netgear (Router)");
        assert_eq!(device.device_type, "Router");
    }

    #[test]
    fn flag_is_idempotent_and_overwrites_reason() {
        let mut registry = DeviceRegistry::new();
        registry.touch("10.0.0.5", Some(MAC));
        assert!(registry.flag("10.0.0.5", "Port Scan Detected: LOW"));
        assert!(registry.flag("10.0.0.5", "SYN Flood Detected: LOW"));
        let device = registry.get("10.0.0.5").unwrap();
        assert!(device.is_flagged);
        assert_eq!(device.flag_reason.as_deref(), Some("SYN Flood Detected: LOW"));

        registry.unflag("10.0.0.5");
        registry.unflag("10.0.0.5");
        let device = registry.get("10.0.0.5").unwrap();
        assert!(!device.is_flagged);
        assert!(device.flag_reason.is_none());

        assert!(!registry.flag("10.0.0.99", "nothing there"));
    }

    #[test]
    fn top_talkers_sorted_by_packet_count() {
        let mut registry = DeviceRegistry::new();
        for (ip, packets) in [("10.0.0.1", 3u64), ("10.0.0.2", 9), ("10.0.0.3", 6)] {
            for _ in 0..packets {
                registry.touch(ip, Some(MAC));
            }
        }
        let top = registry.top_ips(2);
        assert_eq!(top, vec![("10.0.0.2".to_string(), 9), ("10.0.0.3".to_string(), 6)]);
        assert_eq!(registry.total_packets(), 18);
        assert_eq!(registry.online_count(), 3);
    }

    #[test]
    fn export_round_trips_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");

        let mut registry = DeviceRegistry::new();
        registry.touch("10.0.0.5", Some(MAC));
        registry.touch("10.0.0.5", None);
        registry.apply_vendor("10.0.0.5", vendor_info());
        registry.flag("10.0.0.5", "ICMP Flood Detected: LOW");
        registry.touch("10.0.0.6", Some("11:22:33:44:55:66"));

        registry.export(&path).unwrap();
        let restored = DeviceExport::load(&path).unwrap();

        assert_eq!(restored.total_devices, 2);
        assert_eq!(restored.devices.len(), 2);
        for (ip, device) in registry.devices_map() {
            assert_eq!(restored.devices.get(ip), Some(device), "field mismatch for {ip}");
        }
    }
}
