//! JSON Lines encoding of [`FlowRecord`]s used by the stdin/stdout segments.
//!
//! Field names follow the camelCase record schema, addresses are rendered as
//! text and enumerations as their numeric values. One record is one line.

use crate::{types::FlowRecord, Result};

/// Encode a record as a single JSON line, without the trailing newline.
pub fn encode(record: &FlowRecord) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(record)?)
}

/// Decode one line back into a record. Surrounding whitespace, including a
/// trailing `\r\n`, is ignored; fields absent from the line take their zero value.
pub fn decode(line: &[u8]) -> Result<FlowRecord> {
    Ok(serde_json::from_slice(line.trim_ascii())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FlowDirection, RemoteSide};
    use pretty_assertions::assert_eq;

    fn full_record() -> FlowRecord {
        FlowRecord {
            flow_start_time: 1_700_000_000,
            flow_end_time: 1_700_000_042,
            src_addr: "2001:db8::1".parse().unwrap(),
            dst_addr: "2001:db8:ffff::2".parse().unwrap(),
            sampler_addr: "fe80::abcd".parse().unwrap(),
            src_port: 443,
            dst_port: 51234,
            protocol: 6,
            byte_count: 1_500_000,
            packet_count: 1_000,
            src_interface_description: "uplink-1".to_string(),
            dst_interface_description: "customer-7".to_string(),
            flow_direction: FlowDirection::Egress,
            remote_side: RemoteSide::DestinationIsRemote,
            customer_id: 42,
        }
    }

    #[test]
    fn test_round_trip_preserves_every_field() {
        let record = full_record();
        let line = encode(&record).unwrap();
        assert!(!line.contains(&b'\n'));
        assert_eq!(decode(&line).unwrap(), record);
    }

    #[test]
    fn test_field_names_are_camel_case() {
        let line = String::from_utf8(encode(&full_record()).unwrap()).unwrap();
        assert!(line.contains("\"flowStartTime\":1700000000"));
        assert!(line.contains("\"srcAddr\":\"2001:db8::1\""));
        assert!(line.contains("\"remoteSide\":2"));
        assert!(line.contains("\"customerId\":42"));
    }

    #[test]
    fn test_unrecognized_direction_survives_round_trip() {
        let record = FlowRecord {
            flow_direction: FlowDirection::Other(9),
            ..full_record()
        };
        let decoded = decode(&encode(&record).unwrap()).unwrap();
        assert_eq!(decoded.flow_direction, FlowDirection::Other(9));
    }

    #[test]
    fn test_decode_defaults_missing_fields_and_trims() {
        let decoded = decode(b"{\"srcPort\":53,\"protocol\":17}\r\n").unwrap();
        assert_eq!(decoded.src_port, 53);
        assert_eq!(decoded.protocol, 17);
        assert_eq!(decoded.customer_id, 0);
        assert_eq!(decoded.remote_side, RemoteSide::Unknown);
    }

    #[test]
    fn test_decode_rejects_malformed_lines() {
        assert!(decode(b"not json at all").is_err());
        assert!(decode(b"{\"srcAddr\":\"300.1.1.1\"}").is_err());
        assert!(decode(b"{\"remoteSide\":5}").is_err());
    }
}
