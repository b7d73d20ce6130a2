// src/journal.rs

//! C9 Journal: persists the selected primary's identity across restarts
//! (§4.9). Written atomically via a temp-file-then-rename, the same
//! pattern the teacher's SPLDB saver uses for full snapshots.

use crate::error::MonitorError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// §6.3: opaque to callers, only these two fields are required.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JournalData {
    pub primary_server: Option<String>,
    pub primary_gtid_domain: Option<u32>,
}

pub struct Journal {
    path: PathBuf,
    last_written: Option<JournalData>,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_written: None,
        }
    }

    /// §4.9 pre-loop: read the previously stored pointer, if any. A
    /// missing or corrupt journal is not fatal — the monitor just starts
    /// without a restored primary.
    pub fn load(&mut self) -> JournalData {
        match fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str::<JournalData>(&contents) {
                Ok(data) => {
                    info!(path = %self.path.display(), "restored monitor journal");
                    self.last_written = Some(data.clone());
                    data
                }
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "journal present but unparsable, ignoring");
                    JournalData::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => JournalData::default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read journal, ignoring");
                JournalData::default()
            }
        }
    }

    pub fn is_dirty(&self, current: &JournalData) -> bool {
        self.last_written.as_ref() != Some(current)
    }

    /// §4.9 post-loop / on relevant changes: atomic temp-file + rename
    /// write, so a crash mid-write never leaves a half-written journal.
    pub fn save(&mut self, data: &JournalData) -> Result<(), MonitorError> {
        let tmp_path = tmp_path_for(&self.path);
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&tmp_path, &serialized)?;
        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            error!(path = %self.path.display(), error = %e, "failed to rename journal into place");
            return Err(MonitorError::Journal(format!(
                "failed to rename {} into {}: {e}",
                tmp_path.display(),
                self.path.display()
            )));
        }
        self.last_written = Some(data.clone());
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

impl PartialEq for JournalData {
    fn eq(&self, other: &Self) -> bool {
        self.primary_server == other.primary_server && self.primary_gtid_domain == other.primary_gtid_domain
    }
}
