//! Prints a one-line human readable summary of each passing record.

use super::stdout::{write_line, LineSink};
use super::{Segment, SegmentIo, SegmentRegistry};
use crate::protocols::protocol_name;
use crate::types::FlowRecord;
use async_trait::async_trait;
use chrono::DateTime;
use tokio::io::AsyncWrite;
use tracing::{error, warn};

const SI_PREFIXES: [&str; 7] = ["", "k", "M", "G", "T", "P", "E"];

/// Render `value` with an SI prefix, e.g. `12.5 Mbps`.
pub fn format_si(value: u64, unit: &str) -> String {
    let mut scaled = value as f64;
    let mut prefix = 0;
    while scaled >= 1000.0 && prefix < SI_PREFIXES.len() - 1 {
        scaled /= 1000.0;
        prefix += 1;
    }
    let number = format!("{:.2}", scaled);
    let number = number.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}{}", number, SI_PREFIXES[prefix], unit)
}

/// `HH:MM:SS: src:port -> dst:port [srcIf -> dstIf, @sampler], PROTO, Ns, rate bps, rate pps`
pub fn format_flow(record: &FlowRecord) -> String {
    let timestamp = i64::try_from(record.flow_end_time)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|time| time.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string());
    let protocol = match protocol_name(record.protocol) {
        Some(name) => name.to_string(),
        None => format!("UNKNOWN({})", record.protocol),
    };
    let duration = record.duration_secs();

    format!(
        "{}: {}:{} -> {}:{} [{} -> {}, @{}], {}, {}s, {}, {}",
        timestamp,
        record.src_addr,
        record.src_port,
        record.dst_addr,
        record.dst_port,
        record.src_interface_description,
        record.dst_interface_description,
        record.sampler_addr,
        protocol,
        duration,
        format_si(record.byte_count.saturating_mul(8) / duration, "bps"),
        format_si(record.packet_count / duration, "pps"),
    )
}

pub struct PrintFlowdump {
    sink: LineSink,
}

impl PrintFlowdump {
    pub fn new() -> Self {
        Self {
            sink: LineSink::Stdout,
        }
    }

    pub fn to_writer(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            sink: LineSink::Writer(Box::new(writer)),
        }
    }
}

impl Default for PrintFlowdump {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Segment for PrintFlowdump {
    fn name(&self) -> &str {
        "printflowdump"
    }

    async fn run(self: Box<Self>, mut io: SegmentIo) {
        io.log_started();
        let mut console = match self.sink.open().await {
            Ok(console) => Some(console),
            Err(e) => {
                error!("PrintFlowdump: could not open console: {}", e);
                None
            }
        };

        while let Some(record) = io.input.recv().await {
            if let Some(console) = console.as_mut() {
                if let Err(e) = write_line(console, format_flow(&record).as_bytes()).await {
                    warn!("PrintFlowdump: failed to print flow: {}", e);
                }
            }
            if io.output.forward(record).await.is_err() {
                break;
            }
        }
        io.log_stopped();
    }
}

pub fn register(registry: &mut SegmentRegistry) {
    registry.register("printflowdump", |_| Ok(PrintFlowdump::new()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segments::test_support::Harness;
    use crate::types::FlowDirection;

    fn sample() -> FlowRecord {
        FlowRecord {
            flow_start_time: 1_700_000_000,
            flow_end_time: 1_700_000_010,
            src_addr: "192.0.2.1".parse().unwrap(),
            dst_addr: "198.51.100.2".parse().unwrap(),
            sampler_addr: "203.0.113.254".parse().unwrap(),
            src_port: 51000,
            dst_port: 443,
            protocol: 6,
            byte_count: 12_500_000,
            packet_count: 10_000,
            src_interface_description: "uplink".to_string(),
            dst_interface_description: "office".to_string(),
            flow_direction: FlowDirection::Ingress,
            ..Default::default()
        }
    }

    #[test]
    fn test_format_si() {
        assert_eq!(format_si(0, "bps"), "0 bps");
        assert_eq!(format_si(999, "pps"), "999 pps");
        assert_eq!(format_si(1000, "pps"), "1 kpps");
        assert_eq!(format_si(1_500, "bps"), "1.5 kbps");
        assert_eq!(format_si(10_000_000, "bps"), "10 Mbps");
        assert_eq!(format_si(2_345_678_901, "bps"), "2.35 Gbps");
    }

    #[test]
    fn test_format_flow() {
        assert_eq!(
            format_flow(&sample()),
            "22:13:30: 192.0.2.1:51000 -> 198.51.100.2:443 [uplink -> office, @203.0.113.254], \
             TCP, 10s, 10 Mbps, 1 kpps"
        );
    }

    #[test]
    fn test_zero_duration_and_unknown_protocol() {
        let record = FlowRecord {
            flow_start_time: 1_700_000_010,
            protocol: 200,
            ..sample()
        };
        let line = format_flow(&record);
        assert!(line.contains("UNKNOWN(200), 1s, 100 Mbps, 10 kpps"), "{}", line);
    }

    #[tokio::test]
    async fn test_passes_records_through() {
        let segment = PrintFlowdump::to_writer(tokio::io::sink());
        let (emitted, forwarded, _) = Harness::new(1)
            .run(Box::new(segment), vec![sample(), sample()])
            .await;
        assert_eq!(emitted, vec![sample(), sample()]);
        assert_eq!(forwarded, 2);
    }
}
