//! Enriches passing records with a customer id found by matching the local
//! address of the flow against a prefix list.

pub mod trie;

use super::{Segment, SegmentIo, SegmentOptions, SegmentRegistry};
use crate::types::FlowRecord;
use crate::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

pub use trie::{PrefixParseError, PrefixTable, PrefixTrie};

pub struct AddCid {
    file_name: PathBuf,
    drop_unmatched: bool,
}

impl AddCid {
    pub fn new(file_name: impl Into<PathBuf>, drop_unmatched: bool) -> Self {
        Self {
            file_name: file_name.into(),
            drop_unmatched,
        }
    }

    pub fn from_options(options: &SegmentOptions) -> Result<Self> {
        let file_name = options.require("addcid", "filename")?;
        let drop_unmatched = options.get_bool("addcid", "dropunmatched", false);
        Ok(Self::new(file_name, drop_unmatched))
    }
}

/// Build a prefix table from `prefix,customer_id` lines.
///
/// Lines that cannot be used are logged and skipped; blank lines and lines
/// starting with `#` are ignored.
pub fn parse_prefix_list(text: &str) -> PrefixTable {
    let mut table = PrefixTable::new();
    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut columns = line.split(',').map(str::trim);
        let (prefix, cid) = match (columns.next(), columns.next()) {
            (Some(prefix), Some(cid)) => (prefix, cid),
            _ => {
                warn!(line = line_no, "AddCid: skipping prefix list line without a customer id");
                continue;
            }
        };

        let cid = match cid.parse::<i64>().map(u32::try_from) {
            Ok(Ok(cid)) => cid,
            _ => {
                warn!(line = line_no, value = cid, "AddCid: skipping non-integer customer id");
                continue;
            }
        };

        if let Err(e) = table.insert(prefix, cid) {
            warn!(line = line_no, "AddCid: skipping prefix list entry: {}", e);
        }
    }
    table
}

/// Read the prefix list at `path`. An unreadable file yields an empty table.
pub async fn read_prefix_list(path: &Path) -> PrefixTable {
    let table = match tokio::fs::read(path).await {
        Ok(bytes) => parse_prefix_list(&String::from_utf8_lossy(&bytes)),
        Err(e) => {
            error!(path = %path.display(), "AddCid: could not open prefix list: {}", e);
            PrefixTable::new()
        }
    };
    info!("AddCid: read prefix list with {} prefixes", table.len());
    table
}

/// Tag `record` with the customer id of its local address; a miss resets it
/// to `0`. Returns `false` if the record carries no remote side, so no local
/// address is known.
fn enrich(table: &PrefixTable, record: &mut FlowRecord) -> bool {
    let Some(local) = record.local_addr() else {
        return false;
    };
    record.customer_id = table.lookup(local).unwrap_or(0);
    true
}

#[async_trait]
impl Segment for AddCid {
    fn name(&self) -> &str {
        "addcid"
    }

    async fn run(self: Box<Self>, mut io: SegmentIo) {
        io.log_started();
        let table = read_prefix_list(&self.file_name).await;

        while let Some(mut record) = io.input.recv().await {
            if !enrich(&table, &mut record) && self.drop_unmatched {
                debug!("AddCid: dropping record without remote side");
                io.output.discard(record);
                continue;
            }
            if io.output.forward(record).await.is_err() {
                break;
            }
        }
        io.log_stopped();
    }
}

pub fn register(registry: &mut SegmentRegistry) {
    registry.register("addcid", AddCid::from_options);
}
