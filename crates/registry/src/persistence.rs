//! Persistence layer for the registry journal
//!
//! Uses a sled embedded database as an append-only event journal. Every
//! mutating call is journaled so state can be reconstructed by replay
//! and audited offline.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use sled::Db;

use crate::event::RegistryEvent;

/// Metadata about the journal, saved on shutdown.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct JournalMetadata {
    /// Number of events appended so far.
    pub event_count: u64,
    /// Timestamp of the most recent event.
    pub last_event_ts: i64,
    /// Last save timestamp.
    pub last_save_ts: i64,
}

/// Append-only event journal backed by sled.
pub struct EventStore {
    db: Db,
    events: sled::Tree,
    metadata: sled::Tree,
    /// Next sequence number; keys are big-endian so sled iterates in order.
    next_seq: AtomicU64,
}

impl EventStore {
    /// Open or create a journal at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let db = sled::open(&path)?;
        let events = db.open_tree("events")?;
        let metadata = db.open_tree("metadata")?;

        let next_seq = match events.last()? {
            Some((key, _)) => {
                let arr: [u8; 8] = key
                    .as_ref()
                    .try_into()
                    .map_err(|_| anyhow::anyhow!("corrupt journal key"))?;
                u64::from_be_bytes(arr) + 1
            }
            None => 0,
        };

        tracing::info!(
            "Opened registry journal at {:?} ({} events)",
            path.as_ref(),
            next_seq
        );

        Ok(Self {
            db,
            events,
            metadata,
            next_seq: AtomicU64::new(next_seq),
        })
    }

    /// Append an event, returning its sequence number.
    pub fn append(&self, event: &RegistryEvent) -> anyhow::Result<u64> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.events.insert(seq.to_be_bytes(), event.to_bytes())?;
        Ok(seq)
    }

    /// All events in append order.
    pub fn events(&self) -> anyhow::Result<Vec<RegistryEvent>> {
        let mut out = Vec::new();
        for entry in self.events.iter() {
            let (_, value) = entry?;
            out.push(RegistryEvent::from_bytes(&value)?);
        }
        Ok(out)
    }

    pub fn len(&self) -> u64 {
        self.next_seq.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn save_metadata(&self, metadata: &JournalMetadata) -> anyhow::Result<()> {
        let bytes = bincode::serialize(metadata)?;
        self.metadata.insert("journal", bytes)?;
        Ok(())
    }

    pub fn load_metadata(&self) -> anyhow::Result<Option<JournalMetadata>> {
        match self.metadata.get("journal")? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> anyhow::Result<()> {
        self.db.flush()?;
        Ok(())
    }
}
