//! Write-ahead log
//!
//! Every store mutation is wrapped in a transaction:
//!
//! ```text
//! BeginTx ─► AddParameter | AddDocument ─► CommitTx
//! ```
//!
//! Entries are length-prefixed bincode frames. Recovery replays committed
//! transactions only, so a crash between `BeginTx` and `CommitTx` leaves no
//! trace in the recovered state. A torn trailing frame is cut off during
//! replay so later appends start on a frame boundary.

use crate::DocumentRecord;
use paramxml_core::ParameterMapping;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const FRAME_HEADER_LEN: u64 = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalEntry {
    BeginTx { tx_id: u64, timestamp: i64 },
    AddParameter { tx_id: u64, mapping: ParameterMapping },
    AddDocument { tx_id: u64, record: DocumentRecord },
    CommitTx { tx_id: u64 },
}

impl WalEntry {
    pub fn tx_id(&self) -> u64 {
        match self {
            WalEntry::BeginTx { tx_id, .. }
            | WalEntry::AddParameter { tx_id, .. }
            | WalEntry::AddDocument { tx_id, .. }
            | WalEntry::CommitTx { tx_id } => *tx_id,
        }
    }
}

pub struct WriteAheadLog {
    file: Mutex<File>,
    path: PathBuf,
    sync_writes: bool,
}

impl WriteAheadLog {
    pub fn open(path: &Path, sync_writes: bool) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
            sync_writes,
        })
    }

    /// Append entries as one write, then sync. Returns bytes written.
    ///
    /// A failed write is cut back to the previous end of the log, so a
    /// partial frame never sits in front of later appends.
    pub fn append(&self, entries: &[WalEntry]) -> io::Result<u64> {
        let mut buf = Vec::new();
        for entry in entries {
            let data = bincode::serialize(entry)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            let len = u32::try_from(data.len())
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "wal entry too large"))?;
            buf.extend_from_slice(&len.to_le_bytes());
            buf.extend_from_slice(&data);
        }

        let mut file = self.file.lock();
        let start = file.metadata()?.len();
        let written = file.write_all(&buf).and_then(|()| {
            if self.sync_writes {
                file.sync_data()
            } else {
                Ok(())
            }
        });
        if let Err(err) = written {
            if let Err(cut) = file.set_len(start) {
                tracing::error!(
                    path = %self.path.display(),
                    error = %cut,
                    "failed to cut back partial wal append"
                );
            }
            return Err(err);
        }
        Ok(buf.len() as u64)
    }

    /// Feed every complete entry to `handler`, in file order. Returns the
    /// length of the valid prefix.
    ///
    /// A frame cut short by a crash ends the replay: it can only belong to a
    /// transaction whose commit marker never made it to disk. The torn bytes
    /// are truncated away.
    pub fn replay<F: FnMut(WalEntry) -> io::Result<()>>(&self, mut handler: F) -> io::Result<u64> {
        let mut file = self.file.lock();
        let file_len = file.metadata()?.len();
        file.seek(SeekFrom::Start(0))?;

        let mut offset = 0u64;
        while offset < file_len {
            if file_len - offset < FRAME_HEADER_LEN {
                break;
            }
            let mut len_bytes = [0u8; 4];
            file.read_exact(&mut len_bytes)?;
            let len = u64::from(u32::from_le_bytes(len_bytes));

            // Bounded by what is actually on disk, never by the header alone.
            if len > file_len - offset - FRAME_HEADER_LEN {
                break;
            }
            let mut data = vec![0u8; len as usize];
            file.read_exact(&mut data)?;

            let entry: WalEntry = bincode::deserialize(&data)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            handler(entry)?;
            offset += FRAME_HEADER_LEN + len;
        }

        if offset < file_len {
            tracing::warn!(
                path = %self.path.display(),
                valid = offset,
                dropped = file_len - offset,
                "truncating torn wal tail"
            );
            file.set_len(offset)?;
            file.sync_data()?;
        }
        Ok(offset)
    }

    /// Drop every entry; called after a checkpoint.
    pub fn truncate(&self) -> io::Result<()> {
        let mut file = self.file.lock();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        if self.sync_writes {
            file.sync_data()?;
        }
        Ok(())
    }
}
