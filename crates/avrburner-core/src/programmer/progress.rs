//! Progress reporting for chunked memory transfers

/// Progress callback for memory reads and writes
///
/// `reading`/`writing` are called once at the start of an operation, the
/// `*_progress` methods after every completed chunk with the cumulative byte
/// count. The callbacks cannot fail, so a misbehaving reporter never aborts
/// a transfer.
pub trait Progress {
    /// Called when a read of up to `total_bytes` starts
    fn reading(&mut self, _total_bytes: usize) {}

    /// Called after each chunk is read
    fn read_progress(&mut self, _bytes_read: usize) {}

    /// Called when a write of `total_bytes` starts
    fn writing(&mut self, _total_bytes: usize) {}

    /// Called after each chunk is written
    fn write_progress(&mut self, _bytes_written: usize) {}
}

/// A no-op progress reporter
pub struct NoProgress;

impl Progress for NoProgress {}

/// Progress reporter that records every event, mostly useful in tests
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecordingProgress {
    /// Cumulative counts passed to `read_progress`
    pub reads: Vec<usize>,
    /// Cumulative counts passed to `write_progress`
    pub writes: Vec<usize>,
}

impl Progress for RecordingProgress {
    fn reading(&mut self, _total_bytes: usize) {
        self.reads.clear();
    }

    fn read_progress(&mut self, bytes_read: usize) {
        self.reads.push(bytes_read);
    }

    fn writing(&mut self, _total_bytes: usize) {
        self.writes.clear();
    }

    fn write_progress(&mut self, bytes_written: usize) {
        self.writes.push(bytes_written);
    }
}
