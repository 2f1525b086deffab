use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport-layer protocol of a decoded packet event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Tcp,
    Udp,
    Icmp,
    Other,
}

/// Transport header fields relevant to detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transport {
    pub kind: TransportKind,

    /// Destination port, when the transport carries one.
    #[serde(default)]
    pub dst_port: Option<u16>,

    /// Whether the packet carried a bare SYN (connection initiation).
    #[serde(default)]
    pub syn: bool,
}

/// A DNS query observed inside the packet, if the decoder found one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameQuery {
    pub name: String,

    /// Query record type as reported by the decoder (A, AAAA, PTR, ...).
    #[serde(default)]
    pub query_type: String,
}

/// One decoded packet event, as handed over by the capture/decode collaborator.
///
/// This is the engine's entire inbound surface: raw capture and protocol
/// decoding happen upstream, and anything the decoder could not parse simply
/// never reaches us.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketEvent {
    pub src_ip: String,

    /// Source hardware address, when the link layer exposed one.
    #[serde(default)]
    pub src_mac: Option<String>,

    pub transport: Transport,

    #[serde(default)]
    pub name_query: Option<NameQuery>,
}

/// Coarse qualitative bucket derived from an anomaly score's distance below
/// the decision threshold. Rule-based detectors always report `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Normal,
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Normal => "NORMAL",
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        };
        f.write_str(s)
    }
}

/// Immutable record of a fired detector.
///
/// Appended to the bounded in-memory history (for the stats snapshot) and to
/// the durable alert sink. Never mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Human-readable local timestamp ("%Y-%m-%d %H:%M:%S").
    pub timestamp: String,
    pub src_ip: String,
    pub device_name: String,
    pub attack_type: String,
    pub description: String,
    pub severity: Severity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_parses_from_ndjson_line() {
        let line = r#"{"src_ip":"10.0.0.5","src_mac":"AA:BB:CC:11:22:33","transport":{"kind":"tcp","dst_port":443,"syn":true},"name_query":{"name":"myphone.local","query_type":"A"}}"#;
        let ev: PacketEvent = serde_json::from_str(line).unwrap();
        assert_eq!(ev.src_ip, "10.0.0.5");
        assert_eq!(ev.transport.kind, TransportKind::Tcp);
        assert_eq!(ev.transport.dst_port, Some(443));
        assert!(ev.transport.syn);
        assert_eq!(ev.name_query.unwrap().name, "myphone.local");
    }

    #[test]
    fn optional_fields_default() {
        let line = r#"{"src_ip":"10.0.0.7","transport":{"kind":"icmp"}}"#;
        let ev: PacketEvent = serde_json::from_str(line).unwrap();
        assert!(ev.src_mac.is_none());
        assert!(ev.name_query.is_none());
        assert_eq!(ev.transport.dst_port, None);
        assert!(!ev.transport.syn);
    }

    #[test]
    fn malformed_line_is_rejected() {
        assert!(serde_json::from_str::<PacketEvent>("{not json").is_err());
        // A missing transport is a decode anomaly, not a default.
        assert!(serde_json::from_str::<PacketEvent>(r#"{"src_ip":"10.0.0.1"}"#).is_err());
    }

    #[test]
    fn severity_displays_upper_case() {
        assert_eq!(Severity::High.to_string(), "HIGH");
        assert_eq!(Severity::Normal.to_string(), "NORMAL");
    }
}
