//! Shared ingestion progress record.
//!
//! The pipeline is the only writer; HTTP handlers and tests read value-copy
//! snapshots. Counters only move forward during a run: `set_chunks_done`
//! clamps against regressions so concurrent batch completions can report in
//! any order.

use std::sync::RwLock;

use crate::models::{FileResult, IngestPhase, IngestStatus};

#[derive(Default)]
pub struct IngestTracker {
    inner: RwLock<IngestStatus>,
}

impl IngestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value copy of the current status.
    pub fn snapshot(&self) -> IngestStatus {
        self.inner.read().unwrap().clone()
    }

    pub fn phase(&self) -> IngestPhase {
        self.inner.read().unwrap().phase
    }

    /// Back to `idle` with all counters cleared.
    pub fn reset(&self) {
        *self.inner.write().unwrap() = IngestStatus::default();
    }

    /// Start a run: phase `processing`, counters zeroed, `files_total` set.
    pub fn begin(&self, files_total: usize) {
        let mut status = self.inner.write().unwrap();
        *status = IngestStatus {
            phase: IngestPhase::Processing,
            files_total,
            ..IngestStatus::default()
        };
    }

    /// Atomic busy check: begin a run only if none is in flight.
    pub fn try_begin(&self, files_total: usize) -> bool {
        let mut status = self.inner.write().unwrap();
        if status.phase == IngestPhase::Processing {
            return false;
        }
        *status = IngestStatus {
            phase: IngestPhase::Processing,
            files_total,
            ..IngestStatus::default()
        };
        true
    }

    pub fn set_phase(&self, phase: IngestPhase) {
        self.inner.write().unwrap().phase = phase;
    }

    pub fn fail(&self, message: impl Into<String>) {
        let mut status = self.inner.write().unwrap();
        status.phase = IngestPhase::Error;
        status.error = Some(message.into());
    }

    pub fn cancelled(&self) {
        let mut status = self.inner.write().unwrap();
        status.phase = IngestPhase::Cancelled;
        status.error = Some("Processing was cancelled".to_string());
    }

    pub fn incr_files_done(&self) {
        self.inner.write().unwrap().files_done += 1;
    }

    pub fn add_chunks_total(&self, count: usize) {
        self.inner.write().unwrap().chunks_total += count;
    }

    /// Monotonic: a stale writer can never move the counter backwards.
    pub fn set_chunks_done(&self, done: usize) {
        let mut status = self.inner.write().unwrap();
        status.chunks_done = status.chunks_done.max(done);
    }

    pub fn push_file_result(&self, result: FileResult) {
        self.inner.write().unwrap().file_results.push(result);
    }

    /// Terminal success: both counters pinned to the final chunk count.
    pub fn complete(&self, chunk_count: usize) {
        let mut status = self.inner.write().unwrap();
        status.phase = IngestPhase::Done;
        status.chunks_total = chunk_count;
        status.chunks_done = chunk_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileStatus;

    #[test]
    fn begin_resets_counters() {
        let tracker = IngestTracker::new();
        tracker.begin(3);
        tracker.incr_files_done();
        tracker.add_chunks_total(10);

        tracker.begin(5);
        let snap = tracker.snapshot();
        assert_eq!(snap.phase, IngestPhase::Processing);
        assert_eq!(snap.files_total, 5);
        assert_eq!(snap.files_done, 0);
        assert_eq!(snap.chunks_total, 0);
    }

    #[test]
    fn chunks_done_never_regresses() {
        let tracker = IngestTracker::new();
        tracker.begin(1);
        tracker.set_chunks_done(10);
        tracker.set_chunks_done(4);
        assert_eq!(tracker.snapshot().chunks_done, 10);
        tracker.set_chunks_done(12);
        assert_eq!(tracker.snapshot().chunks_done, 12);
    }

    #[test]
    fn complete_pins_counters() {
        let tracker = IngestTracker::new();
        tracker.begin(1);
        tracker.add_chunks_total(7);
        tracker.set_chunks_done(3);
        tracker.complete(7);

        let snap = tracker.snapshot();
        assert_eq!(snap.phase, IngestPhase::Done);
        assert_eq!(snap.chunks_total, 7);
        assert_eq!(snap.chunks_done, 7);
    }

    #[test]
    fn file_results_accumulate() {
        let tracker = IngestTracker::new();
        tracker.begin(2);
        tracker.push_file_result(FileResult {
            name: "a.pdf".to_string(),
            status: FileStatus::Ok,
            error: None,
            chunks: 3,
        });
        tracker.push_file_result(FileResult {
            name: "b.pdf".to_string(),
            status: FileStatus::Failed,
            error: Some("broken".to_string()),
            chunks: 0,
        });

        let snap = tracker.snapshot();
        assert_eq!(snap.file_results.len(), 2);
        assert_eq!(snap.file_results[1].status, FileStatus::Failed);
    }

    #[test]
    fn snapshot_is_a_copy() {
        let tracker = IngestTracker::new();
        tracker.begin(1);
        let snap = tracker.snapshot();
        tracker.incr_files_done();
        assert_eq!(snap.files_done, 0);
    }
}
