//! Packet filtering for the packet sentry.

use crate::models::{FilterSpec, NormalizedPacket};

/// Returns `true` when the packet satisfies every constraint in `spec`.
///
/// Absent constraints accept anything. Present ones require exact,
/// case-sensitive equality.
pub fn accepts(packet: &NormalizedPacket, spec: &FilterSpec) -> bool {
    matches(spec.protocol.as_deref(), &packet.protocol)
        && matches(spec.source_ip.as_deref(), &packet.source_ip)
        && matches(spec.destination_ip.as_deref(), &packet.destination_ip)
}

fn matches(constraint: Option<&str>, value: &str) -> bool {
    constraint.map_or(true, |expected| expected == value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn packet(protocol: &str) -> NormalizedPacket {
        NormalizedPacket {
            timestamp: Utc::now(),
            source_ip: "192.168.1.1".to_string(),
            destination_ip: "192.168.1.2".to_string(),
            protocol: protocol.to_string(),
            length: 100,
            info: "Test packet".to_string(),
            source_port: None,
            destination_port: None,
        }
    }

    #[test]
    fn test_empty_spec_accepts_everything() {
        let spec = FilterSpec::default();
        for protocol in ["TCP", "UDP", "HTTP", ""] {
            assert!(accepts(&packet(protocol), &spec));
        }
    }

    #[test]
    fn test_apply_filters() {
        let mut spec = FilterSpec {
            protocol: Some("TCP".to_string()),
            source_ip: Some("192.168.1.1".to_string()),
            destination_ip: Some("192.168.1.2".to_string()),
        };

        let mut pkt = packet("TCP");
        assert!(accepts(&pkt, &spec));

        // Non-matching protocol
        pkt.protocol = "UDP".to_string();
        assert!(!accepts(&pkt, &spec));

        // Without the protocol constraint the same packet passes
        spec.protocol = None;
        assert!(accepts(&pkt, &spec));
    }

    #[test]
    fn test_protocol_constraint_rejects_other_protocols() {
        let spec = FilterSpec {
            protocol: Some("TCP".to_string()),
            ..FilterSpec::default()
        };
        assert!(!accepts(&packet("tcp"), &spec));
        assert!(!accepts(&packet("HTTP"), &spec));
    }

    #[test]
    fn test_address_constraints() {
        let spec = FilterSpec {
            destination_ip: Some("10.0.0.1".to_string()),
            ..FilterSpec::default()
        };
        assert!(!accepts(&packet("TCP"), &spec));

        let spec = FilterSpec {
            source_ip: Some("192.168.1.1".to_string()),
            ..FilterSpec::default()
        };
        assert!(accepts(&packet("TCP"), &spec));
    }
}
