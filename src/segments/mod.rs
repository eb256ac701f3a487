//! Segments are the units of work of a pipeline.
//!
//! Each segment runs as its own task, receives records from the queue shared
//! with its predecessor and hands them on through the queue shared with its
//! successor. A segment terminates once its input is closed and drained; its
//! output is closed when the [`SegmentIo`] it owns is dropped, which cascades
//! the shutdown downstream.

pub mod addcid;
pub mod flowfilter;
pub mod pass;
pub mod printflowdump;
pub mod registry;
pub mod remote_address;
pub mod stdin;
pub mod stdout;

use crate::{error::FlowPipeError, types::FlowRecord, Result};
use async_trait::async_trait;
use prometheus::IntCounter;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use registry::{SegmentFactory, SegmentRegistry};

pub type RecordSender = mpsc::Sender<FlowRecord>;
pub type RecordReceiver = mpsc::Receiver<FlowRecord>;

/// A configured pipeline stage.
#[async_trait]
pub trait Segment: Send {
    /// Registry name of the segment type.
    fn name(&self) -> &str;

    /// Process records until `io.input` is closed and drained.
    async fn run(self: Box<Self>, io: SegmentIo);
}

/// Queue plumbing handed to a segment when the pipeline starts it.
pub struct SegmentIo {
    pub input: RecordReceiver,
    pub output: Outlet,
    /// Cancelled when the process is asked to stop. Segments reading from an
    /// external source stop reading; everything else keeps draining `input`.
    pub stop: CancellationToken,
}

/// Sending half of a segment's output queue, with per-segment accounting.
pub struct Outlet {
    segment: String,
    sender: RecordSender,
    forwarded: IntCounter,
    dropped: IntCounter,
}

impl Outlet {
    pub(crate) fn new(
        segment: String,
        sender: RecordSender,
        forwarded: IntCounter,
        dropped: IntCounter,
    ) -> Self {
        Self {
            segment,
            sender,
            forwarded,
            dropped,
        }
    }

    /// Label of the owning segment, `<position>:<name>`.
    pub fn segment(&self) -> &str {
        &self.segment
    }

    /// Hand a record to the next segment, waiting while its queue is full.
    ///
    /// A record the closed downstream no longer accepts is counted as dropped.
    pub async fn forward(&self, record: FlowRecord) -> Result<()> {
        if let Err(mpsc::error::SendError(record)) = self.sender.send(record).await {
            self.discard(record);
            return Err(FlowPipeError::DownstreamClosed);
        }
        self.forwarded.inc();
        Ok(())
    }

    /// Account for a record this segment decided not to forward.
    pub fn discard(&self, record: FlowRecord) {
        self.dropped.inc();
        drop(record);
    }
}

impl SegmentIo {
    pub(crate) fn log_started(&self) {
        info!(segment = %self.output.segment, "segment started");
    }

    pub(crate) fn log_stopped(&self) {
        debug!(
            segment = %self.output.segment,
            forwarded = self.output.forwarded.get(),
            dropped = self.output.dropped.get(),
            "segment stopped"
        );
    }
}

/// Flat, string keyed options a segment is constructed from.
///
/// Keys a segment does not recognize are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentOptions(HashMap<String, String>);

impl SegmentOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Fetch a mandatory, non-empty option.
    pub fn require(&self, segment: &str, key: &str) -> Result<&str> {
        match self.get(key) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(FlowPipeError::MissingOption {
                segment: segment.to_string(),
                option: key.to_string(),
            }),
        }
    }

    /// Boolean option with a fallback; unparseable values fall back as well.
    pub fn get_bool(&self, segment: &str, key: &str, default: bool) -> bool {
        let parsed = self.get(key).and_then(|value| match value {
            "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
            "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
            _ => None,
        });
        match parsed {
            Some(value) => value,
            None => {
                info!(segment, option = key, default, "option not set, using default");
                default
            }
        }
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get(key)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    }
}

impl From<HashMap<String, String>> for SegmentOptions {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SegmentOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_rejects_missing_and_empty() {
        let options = SegmentOptions::new().with("filename", "");
        assert!(matches!(
            options.require("addcid", "filename"),
            Err(FlowPipeError::MissingOption { .. })
        ));
        assert!(options.require("addcid", "filter").is_err());

        let options = SegmentOptions::new().with("filename", "prefixes.csv");
        assert_eq!(options.require("addcid", "filename").unwrap(), "prefixes.csv");
    }

    #[test]
    fn test_get_bool_accepts_go_spellings() {
        let options: SegmentOptions = [("a", "T"), ("b", "False"), ("c", "1"), ("d", "yes")]
            .into_iter()
            .collect();
        assert!(options.get_bool("x", "a", false));
        assert!(!options.get_bool("x", "b", true));
        assert!(options.get_bool("x", "c", false));
        assert!(!options.get_bool("x", "d", false));
        assert!(options.get_bool("x", "missing", true));
    }

    #[tokio::test]
    async fn test_outlet_reports_closed_downstream() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let forwarded = IntCounter::new("f", "f").unwrap();
        let dropped = IntCounter::new("d", "d").unwrap();
        let outlet = Outlet::new("0:test".to_string(), tx, forwarded.clone(), dropped.clone());
        assert!(matches!(
            outlet.forward(FlowRecord::default()).await,
            Err(FlowPipeError::DownstreamClosed)
        ));
        assert_eq!((forwarded.get(), dropped.get()), (0, 1));
    }
}
