//! Egress adapter: writes every record as a JSON line and passes it on.

use super::{Segment, SegmentIo, SegmentOptions, SegmentRegistry};
use crate::codec;
use crate::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{error, warn};

pub(crate) type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Destination of line-oriented segment output.
pub(crate) enum LineSink {
    Stdout,
    File(PathBuf),
    Writer(BoxedWriter),
}

impl LineSink {
    pub(crate) async fn open(self) -> std::io::Result<BoxedWriter> {
        Ok(match self {
            LineSink::Stdout => Box::new(tokio::io::stdout()),
            LineSink::File(path) => Box::new(
                tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await?,
            ),
            LineSink::Writer(writer) => writer,
        })
    }
}

pub(crate) async fn write_line(writer: &mut BoxedWriter, line: &[u8]) -> std::io::Result<()> {
    writer.write_all(line).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

pub struct StdOut {
    sink: LineSink,
}

impl StdOut {
    /// Write to the process' standard output.
    pub fn new() -> Self {
        Self {
            sink: LineSink::Stdout,
        }
    }

    /// Append to `path`, creating it if needed.
    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        Self {
            sink: LineSink::File(path.into()),
        }
    }

    pub fn to_writer(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            sink: LineSink::Writer(Box::new(writer)),
        }
    }

    pub fn from_options(options: &SegmentOptions) -> Result<Self> {
        Ok(match options.get_path("filename") {
            Some(path) => Self::to_file(path),
            None => Self::new(),
        })
    }
}

impl Default for StdOut {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Segment for StdOut {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn run(self: Box<Self>, mut io: SegmentIo) {
        io.log_started();
        let mut writer = match self.sink.open().await {
            Ok(writer) => Some(writer),
            Err(e) => {
                error!("StdOut: could not open output, records are only passed on: {}", e);
                None
            }
        };

        while let Some(record) = io.input.recv().await {
            let line = match codec::encode(&record) {
                Ok(line) => line,
                Err(e) => {
                    warn!("StdOut: skipping a flow, failed to encode record: {}", e);
                    io.output.discard(record);
                    continue;
                }
            };
            if let Some(writer) = writer.as_mut() {
                if let Err(e) = write_line(writer, &line).await {
                    warn!("StdOut: failed to write record: {}", e);
                }
            }
            if io.output.forward(record).await.is_err() {
                break;
            }
        }

        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                warn!("StdOut: failed to close output: {}", e);
            }
        }
        io.log_stopped();
    }
}

pub fn register(registry: &mut SegmentRegistry) {
    registry.register("stdout", StdOut::from_options);
}
