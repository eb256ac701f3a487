use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

pub type CustomerId = u32;
pub type Timestamp = u64;

/// Direction of a flow relative to the interface of the sampler that observed it.
///
/// Exporters occasionally emit values outside the defined pair; those are kept
/// as `Other` so they survive a pass through the pipeline unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum FlowDirection {
    #[default]
    Ingress,
    Egress,
    Other(u32),
}

impl From<u32> for FlowDirection {
    fn from(value: u32) -> Self {
        match value {
            0 => FlowDirection::Ingress,
            1 => FlowDirection::Egress,
            other => FlowDirection::Other(other),
        }
    }
}

impl From<FlowDirection> for u32 {
    fn from(direction: FlowDirection) -> Self {
        match direction {
            FlowDirection::Ingress => 0,
            FlowDirection::Egress => 1,
            FlowDirection::Other(value) => value,
        }
    }
}

impl fmt::Display for FlowDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowDirection::Ingress => write!(f, "ingress"),
            FlowDirection::Egress => write!(f, "egress"),
            FlowDirection::Other(value) => write!(f, "unknown({})", value),
        }
    }
}

/// Which address of a flow belongs to the far end, as seen from the observation point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum RemoteSide {
    #[default]
    Unknown,
    SourceIsRemote,
    DestinationIsRemote,
}

impl TryFrom<u32> for RemoteSide {
    type Error = String;

    fn try_from(value: u32) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(RemoteSide::Unknown),
            1 => Ok(RemoteSide::SourceIsRemote),
            2 => Ok(RemoteSide::DestinationIsRemote),
            other => Err(format!("invalid remoteSide value {}", other)),
        }
    }
}

impl From<RemoteSide> for u32 {
    fn from(side: RemoteSide) -> Self {
        match side {
            RemoteSide::Unknown => 0,
            RemoteSide::SourceIsRemote => 1,
            RemoteSide::DestinationIsRemote => 2,
        }
    }
}

impl fmt::Display for RemoteSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteSide::Unknown => write!(f, "unknown"),
            RemoteSide::SourceIsRemote => write!(f, "source"),
            RemoteSide::DestinationIsRemote => write!(f, "destination"),
        }
    }
}

/// A single flow accounting record.
///
/// Records are moved from segment to segment; whichever segment currently holds
/// one may mutate its enrichment fields (`remote_side`, `customer_id`) in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlowRecord {
    pub flow_start_time: Timestamp,
    pub flow_end_time: Timestamp,
    pub src_addr: IpAddr,
    pub dst_addr: IpAddr,
    pub sampler_addr: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u32,
    pub byte_count: u64,
    pub packet_count: u64,
    pub src_interface_description: String,
    pub dst_interface_description: String,
    pub flow_direction: FlowDirection,
    pub remote_side: RemoteSide,
    /// `0` means no customer has been assigned.
    pub customer_id: CustomerId,
}

impl Default for FlowRecord {
    fn default() -> Self {
        Self {
            flow_start_time: 0,
            flow_end_time: 0,
            src_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            dst_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            sampler_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            src_port: 0,
            dst_port: 0,
            protocol: 0,
            byte_count: 0,
            packet_count: 0,
            src_interface_description: String::new(),
            dst_interface_description: String::new(),
            flow_direction: FlowDirection::default(),
            remote_side: RemoteSide::default(),
            customer_id: 0,
        }
    }
}

impl FlowRecord {
    /// The address on our side of the flow, i.e. the opposite of `remote_side`.
    pub fn local_addr(&self) -> Option<IpAddr> {
        match self.remote_side {
            RemoteSide::SourceIsRemote => Some(self.dst_addr),
            RemoteSide::DestinationIsRemote => Some(self.src_addr),
            RemoteSide::Unknown => None,
        }
    }

    /// Flow duration in seconds, never less than one.
    pub fn duration_secs(&self) -> u64 {
        self.flow_end_time
            .saturating_sub(self.flow_start_time)
            .max(1)
    }
}
