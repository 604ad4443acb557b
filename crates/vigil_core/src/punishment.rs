//! # Punishment Sinks
//!
//! The detectors classify and report; what happens next belongs to the
//! host. Every sink invocation is fire-and-forget and must never block the
//! calling tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;

/// Receiver of escalated violations.
pub trait PunishmentSink: Send + Sync {
    /// Reports a suspect. Called at most once per escalation.
    fn flag_suspect(&self, subject: &str, reason: &str, severity: f64);
}

/// A flagged suspect.
#[derive(Clone, Debug, PartialEq)]
pub struct ViolationRecord {
    /// Display name of the subject.
    pub subject: String,
    /// Human-readable reason.
    pub reason: String,
    /// Severity at escalation time.
    pub severity: f64,
    /// Wall-clock time the record was taken.
    pub recorded_at: SystemTime,
}

/// In-memory sink that keeps every record.
#[derive(Debug, Default)]
pub struct PunishmentManager {
    records: Mutex<Vec<ViolationRecord>>,
}

impl PunishmentManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all records so far, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<ViolationRecord> {
        self.records.lock().clone()
    }

    /// Number of records so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns true if nothing has been flagged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Takes ownership of the records, leaving the manager empty.
    pub fn take_records(&self) -> Vec<ViolationRecord> {
        std::mem::take(&mut *self.records.lock())
    }
}

impl PunishmentSink for PunishmentManager {
    fn flag_suspect(&self, subject: &str, reason: &str, severity: f64) {
        self.records.lock().push(ViolationRecord {
            subject: subject.to_owned(),
            reason: reason.to_owned(),
            severity,
            recorded_at: SystemTime::now(),
        });
    }
}

/// Sink that forwards records over a bounded channel to a consumer thread.
///
/// Uses `try_send`: a full channel drops the record rather than stalling
/// the tick.
pub struct ChannelSink {
    sender: Sender<ViolationRecord>,
    dropped: AtomicU64,
}

impl ChannelSink {
    /// Creates a sink and the receiving end of its channel.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, Receiver<ViolationRecord>) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        (
            Self {
                sender,
                dropped: AtomicU64::new(0),
            },
            receiver,
        )
    }

    /// Records dropped because the channel was full or disconnected.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl PunishmentSink for ChannelSink {
    fn flag_suspect(&self, subject: &str, reason: &str, severity: f64) {
        let record = ViolationRecord {
            subject: subject.to_owned(),
            reason: reason.to_owned(),
            severity,
            recorded_at: SystemTime::now(),
        };
        match self.sender.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(record) | TrySendError::Disconnected(record)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "Punishment channel rejected record for {} ({})",
                    record.subject,
                    record.reason
                );
            }
        }
    }
}

/// Sink that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl PunishmentSink for NullSink {
    fn flag_suspect(&self, _subject: &str, _reason: &str, _severity: f64) {}
}
