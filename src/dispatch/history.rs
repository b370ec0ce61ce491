//! Append-only command history, kept for diagnostics only.
//!
//! Nothing reads the history back to make decisions. The in-memory ring keeps
//! the most recent records; the optional JSON-lines file keeps everything.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{Error, Result};

use super::command::{CommandId, CommandRecord, Verification};

pub struct CommandHistory {
    records: VecDeque<CommandRecord>,
    capacity: usize,
    sink: Option<(PathBuf, File)>,
}

impl CommandHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity: capacity.max(1),
            sink: None,
        }
    }

    /// Also append finished records to `path` as JSON lines.
    pub fn with_file(capacity: usize, path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::io(path, e))?;
        Ok(Self {
            sink: Some((path.to_path_buf(), file)),
            ..Self::new(capacity)
        })
    }

    pub(crate) fn open(&mut self, record: CommandRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Settle a pending record and persist it.
    pub(crate) fn close(&mut self, id: CommandId, settle: impl FnOnce(&mut CommandRecord)) {
        let Some(record) = self.records.iter_mut().rev().find(|r| r.id == id) else {
            return;
        };
        debug_assert_eq!(record.verification, Verification::Pending);
        settle(record);

        if let Some((path, file)) = self.sink.as_mut() {
            let line = match serde_json::to_string(&*record) {
                Ok(l) => l,
                Err(e) => {
                    warn!(error = %e, "could not serialize command record");
                    return;
                }
            };
            // History is diagnostic; a full disk must not stop the pipeline.
            if let Err(e) = writeln!(file, "{line}") {
                warn!(path = %path.display(), error = %e, "could not append command history");
            }
        }
    }

    pub fn records(&self) -> impl Iterator<Item = &CommandRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&CommandRecord> {
        self.records.back()
    }
}
