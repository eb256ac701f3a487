use thiserror::Error;

pub type Result<T> = std::result::Result<T, FlowPipeError>;

#[derive(Error, Debug)]
pub enum FlowPipeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Configuration error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown segment: {0}")]
    UnknownSegment(String),

    #[error("Segment {segment} requires a '{option}' parameter")]
    MissingOption { segment: String, option: String },

    #[error("Segment {segment}: invalid value '{value}' for '{option}'")]
    InvalidOption {
        segment: String,
        option: String,
        value: String,
    },

    #[error("Syntax error in filter expression: {0}")]
    FilterSyntax(String),

    #[error("Semantic error in filter expression: {0}")]
    FilterEvaluation(String),

    #[error("Downstream segment closed its input")]
    DownstreamClosed,

    #[error("Segment {segment} failed: {reason}")]
    SegmentFailed { segment: String, reason: String },

    #[error("Pipeline error: {0}")]
    Pipeline(String),
}
