//! Wires segments into a chain of bounded queues and runs them concurrently.
//!
//! ```text
//! sender() ─▶ [head] ─▶ seg 0 ─▶ [q0] ─▶ seg 1 ─▶ … ─▶ seg n-1 ─▶ [tail] ─▶ take_output()/auto_drain()
//! ```
//!
//! Shutdown is driven by queue closure: once every sender of the head queue is
//! gone, the first segment drains its input, returns and thereby closes its
//! output, and so on down the chain. Sources fed from outside the process
//! additionally need [`Pipeline::stop`] before they let go of their output.

use crate::config::Config;
use crate::metrics::PipelineMetrics;
use crate::segments::{Outlet, RecordReceiver, RecordSender, Segment, SegmentIo, SegmentRegistry};
use crate::{error::FlowPipeError, Result};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Record counts of one segment after shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSummary {
    pub segment: String,
    pub forwarded: u64,
    pub dropped: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSummary {
    pub segments: Vec<SegmentSummary>,
    /// Records consumed by the drain task, if one was running.
    pub drained: u64,
}

pub struct Pipeline {
    labels: Vec<String>,
    pending: Vec<(Box<dyn Segment>, SegmentIo)>,
    running: Vec<JoinHandle<()>>,
    head: Option<RecordSender>,
    tail: Option<RecordReceiver>,
    drain: Option<JoinHandle<u64>>,
    stop: CancellationToken,
    metrics: Arc<PipelineMetrics>,
}

impl Pipeline {
    /// Connect `segments` in order through queues holding up to
    /// `queue_capacity` records each.
    pub fn new(segments: Vec<Box<dyn Segment>>, queue_capacity: usize) -> Result<Self> {
        if segments.is_empty() {
            return Err(FlowPipeError::InvalidConfig(
                "a pipeline needs at least one segment".to_string(),
            ));
        }
        if queue_capacity == 0 {
            return Err(FlowPipeError::InvalidConfig(
                "queue capacity must be greater than 0".to_string(),
            ));
        }

        let metrics = PipelineMetrics::new()?;
        let stop = CancellationToken::new();
        let (head, mut upstream) = mpsc::channel(queue_capacity);
        let mut labels = Vec::with_capacity(segments.len());
        let mut pending = Vec::with_capacity(segments.len());

        for (position, segment) in segments.into_iter().enumerate() {
            let label = format!("{}:{}", position, segment.name());
            let (sender, receiver) = mpsc::channel(queue_capacity);
            let outlet = Outlet::new(
                label.clone(),
                sender,
                metrics.records_forwarded.with_label_values(&[label.as_str()]),
                metrics.records_dropped.with_label_values(&[label.as_str()]),
            );
            let io = SegmentIo {
                input: std::mem::replace(&mut upstream, receiver),
                output: outlet,
                stop: stop.clone(),
            };
            labels.push(label);
            pending.push((segment, io));
        }

        Ok(Self {
            labels,
            pending,
            running: Vec::new(),
            head: Some(head),
            tail: Some(upstream),
            drain: None,
            stop,
            metrics,
        })
    }

    /// Build every configured segment through `registry`, then wire them up.
    /// Nothing is started if any segment fails to build.
    pub fn from_config(config: &Config, registry: &SegmentRegistry) -> Result<Self> {
        config.validate()?;
        let segments = config
            .segments
            .iter()
            .map(|spec| registry.build(&spec.name, &spec.options()))
            .collect::<Result<Vec<_>>>()?;
        Self::new(segments, config.pipeline.queue_capacity)
    }

    /// Spawn one task per segment.
    pub fn start(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Err(FlowPipeError::Pipeline("pipeline already started".to_string()));
        }
        for (segment, io) in self.pending.drain(..) {
            self.running.push(tokio::spawn(segment.run(io)));
        }
        info!(segments = self.running.len(), "pipeline started");
        Ok(())
    }

    /// Handle for injecting records in front of the first segment.
    pub fn sender(&self) -> Option<RecordSender> {
        self.head.clone()
    }

    /// Take the receiving end of the last segment's output.
    pub fn take_output(&mut self) -> Option<RecordReceiver> {
        self.tail.take()
    }

    /// Consume and discard whatever leaves the last segment.
    pub fn auto_drain(&mut self) {
        let Some(mut tail) = self.tail.take() else {
            return;
        };
        let drained = self.metrics.records_drained.clone();
        self.drain = Some(tokio::spawn(async move {
            let mut count: u64 = 0;
            while tail.recv().await.is_some() {
                count += 1;
                drained.inc();
            }
            count
        }));
    }

    /// Ask source segments to stop reading external input. Records already
    /// inside the pipeline are still processed; [`Pipeline::shutdown`] waits
    /// for them as usual.
    pub fn stop(&self) {
        info!("pipeline stop requested");
        self.stop.cancel();
    }

    /// Token cancelled by [`Pipeline::stop`], for stopping from another task.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Close the head queue and wait until every segment has finished.
    ///
    /// Clones handed out by [`Pipeline::sender`] keep the head queue open
    /// until they are dropped as well. An output nobody took is drained.
    pub async fn shutdown(mut self) -> Result<PipelineSummary> {
        if !self.pending.is_empty() {
            return Err(FlowPipeError::Pipeline(
                "pipeline was never started".to_string(),
            ));
        }

        self.head.take();
        if self.tail.is_some() {
            self.auto_drain();
        }

        let mut failure = None;
        let outcomes = join_all(std::mem::take(&mut self.running)).await;
        for (label, outcome) in self.labels.iter().zip(outcomes) {
            if let Err(e) = outcome {
                error!(segment = %label, "segment task failed: {}", e);
                failure.get_or_insert(FlowPipeError::SegmentFailed {
                    segment: label.clone(),
                    reason: e.to_string(),
                });
            }
        }

        let drained = match self.drain.take() {
            Some(handle) => handle.await.unwrap_or_else(|e| {
                error!("drain task failed: {}", e);
                0
            }),
            None => 0,
        };

        if let Some(failure) = failure {
            return Err(failure);
        }

        let segments: Vec<SegmentSummary> = std::mem::take(&mut self.labels)
            .into_iter()
            .map(|label| SegmentSummary {
                forwarded: self.metrics.forwarded(&label),
                dropped: self.metrics.dropped(&label),
                segment: label,
            })
            .collect();
        debug!(?segments, drained, "pipeline shut down");
        Ok(PipelineSummary { segments, drained })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segments::pass::Pass;
    use crate::types::FlowRecord;

    fn passes(count: usize) -> Vec<Box<dyn Segment>> {
        (0..count).map(|_| Box::new(Pass) as Box<dyn Segment>).collect()
    }

    #[test]
    fn test_rejects_empty_pipeline_and_zero_capacity() {
        assert!(matches!(
            Pipeline::new(vec![], 8),
            Err(FlowPipeError::InvalidConfig(_))
        ));
        assert!(matches!(
            Pipeline::new(passes(1), 0),
            Err(FlowPipeError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_ends_a_pipeline_with_an_open_source() {
        use crate::segments::stdin::StdIn;
        use std::time::Duration;

        let (reader, _writer) = tokio::io::duplex(64);
        let segments: Vec<Box<dyn Segment>> =
            vec![Box::new(StdIn::from_reader(reader)), Box::new(Pass)];
        let mut pipeline = Pipeline::new(segments, 2).unwrap();
        pipeline.start().unwrap();
        let input = pipeline.sender().unwrap();
        input.send(FlowRecord::default()).await.unwrap();
        drop(input);

        pipeline.stop();
        let summary = tokio::time::timeout(Duration::from_secs(5), pipeline.shutdown())
            .await
            .expect("pipeline kept running after stop")
            .unwrap();
        assert_eq!(summary.drained, 1);
        assert_eq!(summary.segments[0].forwarded, 1);
    }

    #[tokio::test]
    async fn test_long_chain_preserves_order() {
        let mut pipeline = Pipeline::new(passes(12), 1).unwrap();
        pipeline.start().unwrap();
        let input = pipeline.sender().unwrap();
        let mut output = pipeline.take_output().unwrap();

        let feeder = tokio::spawn(async move {
            for port in 0..500u16 {
                input
                    .send(FlowRecord {
                        src_port: port,
                        ..Default::default()
                    })
                    .await
                    .unwrap();
            }
        });

        let collector = tokio::spawn(async move {
            let mut ports = Vec::new();
            while let Some(record) = output.recv().await {
                ports.push(record.src_port);
            }
            ports
        });

        feeder.await.unwrap();
        let summary = pipeline.shutdown().await.unwrap();
        let ports = collector.await.unwrap();

        assert_eq!(ports, (0..500).collect::<Vec<u16>>());
        assert_eq!(summary.segments.len(), 12);
        assert!(summary.segments.iter().all(|s| s.forwarded == 500 && s.dropped == 0));
        assert_eq!(summary.segments[11].segment, "11:pass");
    }

    #[tokio::test]
    async fn test_auto_drain_counts_records() {
        let mut pipeline = Pipeline::new(passes(2), 4).unwrap();
        pipeline.start().unwrap();
        pipeline.auto_drain();
        let input = pipeline.sender().unwrap();
        for _ in 0..10 {
            input.send(FlowRecord::default()).await.unwrap();
        }
        drop(input);

        let metrics = pipeline.metrics();
        let summary = pipeline.shutdown().await.unwrap();
        assert_eq!(summary.drained, 10);
        assert_eq!(metrics.records_drained.get(), 10);
    }

    #[tokio::test]
    async fn test_start_twice_is_an_error() {
        let mut pipeline = Pipeline::new(passes(1), 1).unwrap();
        pipeline.start().unwrap();
        assert!(matches!(pipeline.start(), Err(FlowPipeError::Pipeline(_))));
        pipeline.auto_drain();
        pipeline.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_before_start_is_an_error() {
        let pipeline = Pipeline::new(passes(1), 1).unwrap();
        assert!(pipeline.shutdown().await.is_err());
    }
}
