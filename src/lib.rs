//! Concurrent NetFlow record pipelines built from named segments.
//!
//! A [`Pipeline`] connects [`Segment`]s through bounded queues and runs each
//! of them as its own task. Segments are looked up by name in a
//! [`SegmentRegistry`], so a whole pipeline can be described in a TOML
//! [`Config`].

pub mod codec;
pub mod config;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod pipeline;
pub mod protocols;
pub mod segments;
pub mod types;

pub use config::Config;
pub use error::{FlowPipeError, Result};
pub use pipeline::{Pipeline, PipelineSummary, SegmentSummary};
pub use segments::{Segment, SegmentIo, SegmentOptions, SegmentRegistry};
pub use types::{FlowDirection, FlowRecord, RemoteSide};
