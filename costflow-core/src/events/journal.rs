//! Durable event journal
//!
//! Domain events are handed to a bounded channel and appended as JSON lines
//! by a dedicated writer thread, so publishing never blocks on disk I/O. A
//! full buffer drops the event and logs it at error level.

use super::{DomainEvent, EventSink};
use anyhow::{Context, Result};
use crossbeam::channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, SystemTime};
use tracing::{error, info};

const JOURNAL_BUFFER: usize = 4096;

/// One JSONL line of the event journal
#[derive(Debug, Serialize, Deserialize)]
pub struct JournalEntry {
    pub timestamp: u64,
    #[serde(flatten)]
    pub event: DomainEvent,
}

impl JournalEntry {
    pub fn new(event: DomainEvent) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_else(|_| Duration::from_secs(0))
            .as_millis() as u64;

        Self { timestamp, event }
    }
}

/// Append-only JSONL event sink written by a background thread
pub struct EventJournal {
    sender: Option<Sender<DomainEvent>>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl EventJournal {
    pub fn open(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open event journal {}", path.display()))?;

        let (sender, receiver) = bounded(JOURNAL_BUFFER);
        let handle = thread::Builder::new()
            .name("event-journal".into())
            .spawn(move || Self::writer_loop(file, receiver))
            .context("Failed to spawn event journal writer")?;

        Ok(Self {
            sender: Some(sender),
            thread_handle: Some(handle),
        })
    }

    fn writer_loop(file: File, receiver: Receiver<DomainEvent>) {
        let mut out = BufWriter::new(file);

        for event in receiver {
            let entry = JournalEntry::new(event);
            match serde_json::to_string(&entry) {
                Ok(json) => {
                    if let Err(e) = writeln!(out, "{}", json) {
                        error!("Failed to write to event journal: {}", e);
                    }
                }
                Err(e) => error!("Failed to serialize journal entry: {}", e),
            }
        }

        if let Err(e) = out.flush() {
            error!("Failed to flush event journal: {}", e);
        }
        info!("Event journal writer stopping");
    }
}

impl EventSink for EventJournal {
    fn publish(&self, event: DomainEvent) {
        if let Some(sender) = &self.sender {
            // Never stall recalculation on a slow disk
            if let Err(e) = sender.try_send(event) {
                error!("Event journal buffer full or disconnected, dropping event: {:?}", e);
            }
        }
    }
}

impl Drop for EventJournal {
    fn drop(&mut self) {
        // Sender must go first or the writer never sees the end of the stream
        let _ = self.sender.take();
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}
