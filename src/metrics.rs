use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Per-pipeline record counters, labelled by segment name.
pub struct PipelineMetrics {
    pub records_forwarded: IntCounterVec,
    pub records_dropped: IntCounterVec,
    pub records_drained: IntCounter,
    pub registry: Registry,
}

impl PipelineMetrics {
    pub fn new() -> crate::Result<Arc<Self>> {
        let registry = Registry::new();

        let records_forwarded = IntCounterVec::new(
            Opts::new(
                "flowpipe_segment_records_forwarded_total",
                "Records a segment passed on to its successor",
            ),
            &["segment"],
        )?;

        let records_dropped = IntCounterVec::new(
            Opts::new(
                "flowpipe_segment_records_dropped_total",
                "Records a segment discarded",
            ),
            &["segment"],
        )?;

        let records_drained = IntCounter::new(
            "flowpipe_pipeline_records_drained_total",
            "Records consumed from the end of the pipeline by the drain task",
        )?;

        registry.register(Box::new(records_forwarded.clone()))?;
        registry.register(Box::new(records_dropped.clone()))?;
        registry.register(Box::new(records_drained.clone()))?;

        Ok(Arc::new(Self {
            records_forwarded,
            records_dropped,
            records_drained,
            registry,
        }))
    }

    pub fn forwarded(&self, segment: &str) -> u64 {
        self.records_forwarded.with_label_values(&[segment]).get()
    }

    pub fn dropped(&self, segment: &str) -> u64 {
        self.records_dropped.with_label_values(&[segment]).get()
    }

    /// Render every registered metric in the Prometheus text exposition format.
    pub fn gather_text(&self) -> crate::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| crate::FlowPipeError::Pipeline(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_labelled_per_segment() {
        let metrics = PipelineMetrics::new().unwrap();
        metrics.records_forwarded.with_label_values(&["0:pass"]).inc_by(3);
        metrics.records_dropped.with_label_values(&["1:flowfilter"]).inc();

        assert_eq!(metrics.forwarded("0:pass"), 3);
        assert_eq!(metrics.dropped("1:flowfilter"), 1);
        assert_eq!(metrics.forwarded("1:flowfilter"), 0);

        let text = metrics.gather_text().unwrap();
        assert!(text.contains("flowpipe_segment_records_forwarded_total{segment=\"0:pass\"} 3"));
    }
}
