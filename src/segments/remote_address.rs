//! Tags each record with which of its addresses is the remote one.

use super::{Segment, SegmentIo, SegmentOptions, SegmentRegistry};
use crate::types::{FlowDirection, FlowRecord, RemoteSide};
use crate::{error::FlowPipeError, Result};
use async_trait::async_trait;
use std::str::FromStr;

/// Role of the interfaces the flows were sampled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowSource {
    /// Border interfaces: ingress traffic comes from the remote network.
    Border,
    /// User-facing interfaces: ingress traffic comes from our own users.
    User,
    /// Interfaces of both kinds; the remote side cannot be told.
    Mixed,
}

impl FromStr for FlowSource {
    type Err = FlowPipeError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "border" => Ok(FlowSource::Border),
            "user" => Ok(FlowSource::User),
            "mixed" => Ok(FlowSource::Mixed),
            other => Err(FlowPipeError::InvalidOption {
                segment: "remoteaddress".to_string(),
                option: "flowsrc".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

impl FlowSource {
    /// Derive the remote side for one record in place.
    ///
    /// Directions other than ingress/egress leave `remote_side` untouched in
    /// `border` and `user` mode.
    pub fn apply(self, record: &mut FlowRecord) {
        record.remote_side = match (self, record.flow_direction) {
            (FlowSource::Border, FlowDirection::Ingress) => RemoteSide::SourceIsRemote,
            (FlowSource::Border, FlowDirection::Egress) => RemoteSide::DestinationIsRemote,
            (FlowSource::User, FlowDirection::Ingress) => RemoteSide::DestinationIsRemote,
            (FlowSource::User, FlowDirection::Egress) => RemoteSide::SourceIsRemote,
            (FlowSource::Mixed, _) => RemoteSide::Unknown,
            (_, FlowDirection::Other(_)) => record.remote_side,
        };
    }
}

pub struct RemoteAddress {
    flow_source: FlowSource,
}

impl RemoteAddress {
    pub fn new(flow_source: FlowSource) -> Self {
        Self { flow_source }
    }

    pub fn from_options(options: &SegmentOptions) -> Result<Self> {
        let flow_source = options.require("remoteaddress", "flowsrc")?.parse()?;
        Ok(Self::new(flow_source))
    }
}

#[async_trait]
impl Segment for RemoteAddress {
    fn name(&self) -> &str {
        "remoteaddress"
    }

    async fn run(self: Box<Self>, mut io: SegmentIo) {
        io.log_started();
        while let Some(mut record) = io.input.recv().await {
            self.flow_source.apply(&mut record);
            if io.output.forward(record).await.is_err() {
                break;
            }
        }
        io.log_stopped();
    }
}

pub fn register(registry: &mut SegmentRegistry) {
    registry.register("remoteaddress", RemoteAddress::from_options);
}
