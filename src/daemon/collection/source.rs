//! Scanner contract. The actual scanners (browser history reader, calendar sync,
//! git scanner) run outside this process; they hand signals over by appending
//! json lines to a spool file that [SpoolSource] drains.

use std::{
    io::Read,
    path::PathBuf,
    sync::Arc,
};

use anyhow::Result;
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A single raw activity signal, before project assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalEvent {
    DomainVisit {
        domain: Arc<str>,
    },
    CalendarEvent {
        title: Arc<str>,
        #[serde(default)]
        description: Arc<str>,
    },
    RepositoryActivity {
        /// `owner/repo` slug.
        repository: Arc<str>,
    },
}

/// Producer of signals for the collection loop.
#[cfg_attr(test, mockall::automock)]
pub trait SignalSource {
    /// Hands out the signals that accumulated since the previous poll.
    fn poll_signals(&mut self) -> Result<Vec<SignalEvent>>;
}

const QUEUE_FILE: &str = "queue.jsonl";

/// Drains the scanner spool. Scanners append one json [SignalEvent] per line while
/// holding an exclusive lock; polling takes the same lock, reads everything and
/// truncates, so each signal is observed exactly once.
pub struct SpoolSource {
    queue_path: PathBuf,
}

impl SpoolSource {
    pub fn new(signal_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&signal_dir)?;

        Ok(Self {
            queue_path: signal_dir.join(QUEUE_FILE),
        })
    }

    fn drain(file: &std::fs::File) -> Result<Vec<SignalEvent>> {
        let mut raw = String::new();
        let mut reader = file;
        reader.read_to_string(&mut raw)?;

        let mut signals = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<SignalEvent>(line) {
                Ok(signal) => signals.push(signal),
                // might happen when a scanner dies mid write
                Err(e) => warn!("Skipping illegal spool line {line}: {e}"),
            }
        }

        file.set_len(0)?;
        Ok(signals)
    }
}

impl SignalSource for SpoolSource {
    fn poll_signals(&mut self) -> Result<Vec<SignalEvent>> {
        let file = match std::fs::File::options()
            .read(true)
            .write(true)
            .open(&self.queue_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };

        file.lock_exclusive()?;
        let drained = Self::drain(&file);
        file.unlock()?;

        if let Ok(signals) = &drained {
            debug!("Drained {} signals from the spool", signals.len());
        }
        drained
    }
}
