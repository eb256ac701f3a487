//! Ingress adapter: merges records arriving from upstream with records
//! decoded from an external line-oriented source.

use super::{RecordSender, Segment, SegmentIo, SegmentOptions, SegmentRegistry};
use crate::codec;
use crate::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Records decoded ahead of the merge point.
const DECODED_QUEUE_CAPACITY: usize = 64;

enum LineSource {
    Stdin,
    File(PathBuf),
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

impl LineSource {
    async fn open(self) -> std::io::Result<Box<dyn AsyncRead + Send + Unpin>> {
        Ok(match self {
            LineSource::Stdin => Box::new(tokio::io::stdin()),
            LineSource::File(path) => Box::new(tokio::fs::File::open(path).await?),
            LineSource::Reader(reader) => reader,
        })
    }
}

pub struct StdIn {
    source: LineSource,
}

impl StdIn {
    /// Read from the process' standard input.
    pub fn new() -> Self {
        Self {
            source: LineSource::Stdin,
        }
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: LineSource::File(path.into()),
        }
    }

    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            source: LineSource::Reader(Box::new(reader)),
        }
    }

    pub fn from_options(options: &SegmentOptions) -> Result<Self> {
        Ok(match options.get_path("filename") {
            Some(path) => Self::from_file(path),
            None => Self::new(),
        })
    }
}

impl Default for StdIn {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode every line of `reader` and queue the records. Blank and malformed
/// lines are skipped; a read error ends the source.
async fn read_lines(reader: Box<dyn AsyncRead + Send + Unpin>, decoded: RecordSender) {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("StdIn: could not read line, closing input: {}", e);
                break;
            }
        }
        if line.trim_ascii().is_empty() {
            continue;
        }
        match codec::decode(&line) {
            Ok(record) => {
                if decoded.send(record).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!("StdIn: skipping a flow, failed to decode line: {}", e),
        }
    }
    debug!("StdIn: external input exhausted");
}

#[async_trait]
impl Segment for StdIn {
    fn name(&self) -> &str {
        "stdin"
    }

    async fn run(self: Box<Self>, mut io: SegmentIo) {
        io.log_started();
        let (decoded_tx, mut external) = mpsc::channel(DECODED_QUEUE_CAPACITY);
        let mut reader_task = match self.source.open().await {
            Ok(reader) => Some(tokio::spawn(read_lines(reader, decoded_tx))),
            Err(e) => {
                error!("StdIn: could not open input: {}", e);
                drop(decoded_tx);
                None
            }
        };

        // Either source may close first; the segment ends once both have.
        // A stop request ends the external source; records it already decoded
        // are still forwarded.
        let mut upstream_open = true;
        let mut external_open = true;
        while upstream_open || external_open {
            let record = tokio::select! {
                _ = io.stop.cancelled(), if reader_task.is_some() => {
                    debug!("StdIn: stop requested, closing external input");
                    if let Some(task) = reader_task.take() {
                        task.abort();
                    }
                    continue;
                }
                received = io.input.recv(), if upstream_open => match received {
                    Some(record) => record,
                    None => {
                        upstream_open = false;
                        continue;
                    }
                },
                decoded = external.recv(), if external_open => match decoded {
                    Some(record) => record,
                    None => {
                        external_open = false;
                        continue;
                    }
                },
            };
            if io.output.forward(record).await.is_err() {
                break;
            }
        }

        if let Some(task) = reader_task {
            task.abort();
        }
        io.log_stopped();
    }
}

pub fn register(registry: &mut SegmentRegistry) {
    registry.register("stdin", StdIn::from_options);
}
