//! Forwards only the records matching a filter expression.

use super::{Segment, SegmentIo, SegmentOptions, SegmentRegistry};
use crate::filter::{self, Expression};
use crate::Result;
use async_trait::async_trait;
use tracing::{error, info};

pub struct FlowFilter {
    filter: String,
    expression: Expression,
}

impl FlowFilter {
    /// Compile `filter`; a syntax error prevents the segment from being built.
    pub fn new(filter: &str) -> Result<Self> {
        Ok(Self {
            filter: filter.to_string(),
            expression: filter::parse(filter)?,
        })
    }

    pub fn from_options(options: &SegmentOptions) -> Result<Self> {
        Self::new(options.require("flowfilter", "filter")?)
    }
}

#[async_trait]
impl Segment for FlowFilter {
    fn name(&self) -> &str {
        "flowfilter"
    }

    async fn run(self: Box<Self>, mut io: SegmentIo) {
        io.log_started();
        info!("FlowFilter: using filter expression: {}", self.filter);

        while let Some(record) = io.input.recv().await {
            match self.expression.evaluate(&record) {
                Ok(true) => {
                    if io.output.forward(record).await.is_err() {
                        break;
                    }
                }
                Ok(false) => io.output.discard(record),
                // TODO: make the action on evaluation errors configurable; records are dropped for now
                Err(e) => {
                    error!("FlowFilter: {}", e);
                    io.output.discard(record);
                }
            }
        }
        io.log_stopped();
    }
}

pub fn register(registry: &mut SegmentRegistry) {
    registry.register("flowfilter", FlowFilter::from_options);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlowPipeError;
    use crate::segments::test_support::Harness;
    use crate::types::FlowRecord;

    #[test]
    fn test_filter_is_compiled_at_construction() {
        assert!(matches!(
            FlowFilter::from_options(&SegmentOptions::new()),
            Err(FlowPipeError::MissingOption { .. })
        ));
        assert!(matches!(
            FlowFilter::from_options(&SegmentOptions::new().with("filter", "proto tcp and")),
            Err(FlowPipeError::FilterSyntax(_))
        ));
        assert!(FlowFilter::from_options(&SegmentOptions::new().with("filter", "proto tcp")).is_ok());
    }

    #[tokio::test]
    async fn test_forwards_matches_and_drops_the_rest() {
        let records: Vec<FlowRecord> = (0..20u16)
            .map(|i| FlowRecord {
                src_port: i,
                protocol: if i % 4 == 0 { 17 } else { 6 },
                ..Default::default()
            })
            .collect();

        let segment = FlowFilter::new("proto udp").unwrap();
        let (emitted, forwarded, dropped) = Harness::new(3).run(Box::new(segment), records).await;

        assert_eq!(forwarded, 5);
        assert_eq!(dropped, 15);
        let ports: Vec<u16> = emitted.iter().map(|r| r.src_port).collect();
        assert_eq!(ports, vec![0, 4, 8, 12, 16]);
    }

    #[tokio::test]
    async fn test_evaluation_errors_drop_the_record() {
        let good = FlowRecord {
            flow_start_time: 10,
            flow_end_time: 20,
            byte_count: 1000,
            ..Default::default()
        };
        let reversed = FlowRecord {
            flow_start_time: 20,
            flow_end_time: 10,
            byte_count: 1000,
            ..Default::default()
        };

        let segment = FlowFilter::new("bps > 0").unwrap();
        let (emitted, forwarded, dropped) = Harness::new(1)
            .run(Box::new(segment), vec![reversed, good.clone()])
            .await;

        assert_eq!(emitted, vec![good]);
        assert_eq!(forwarded, 1);
        assert_eq!(dropped, 1);
    }
}
