//! Background receive buffer
//!
//! A reader thread pulls bytes off the serial line and appends them to a
//! shared buffer. The command issuer arms the buffer with the number of
//! bytes it expects, writes its frame, and blocks on a condition variable
//! until that many bytes have arrived or the timeout expires.

use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::Result;

/// Receive buffer capacity
pub const RX_BUFFER_SIZE: usize = 4096;

#[derive(Debug, Default)]
struct RxState {
    data: Vec<u8>,
    expected: usize,
    waiting: bool,
}

/// Buffer shared between the reader thread and the command issuer
#[derive(Debug, Default)]
pub(crate) struct RxShared {
    state: Mutex<RxState>,
    ready: Condvar,
}

impl RxShared {
    fn lock(&self) -> MutexGuard<'_, RxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append incoming bytes
    ///
    /// Bytes arriving while no command waits are stale and dropped, as are
    /// bytes that would push the buffer to its capacity.
    pub(crate) fn push(&self, bytes: &[u8]) {
        let mut state = self.lock();
        if !state.waiting {
            log::trace!("RX (discarded) {:02X?}", bytes);
            return;
        }
        if state.data.len() + bytes.len() >= RX_BUFFER_SIZE {
            log::warn!("Receive buffer full, dropping {} bytes", bytes.len());
            return;
        }
        state.data.extend_from_slice(bytes);
        if state.data.len() >= state.expected {
            self.ready.notify_all();
        }
    }

    /// Start waiting for `expected` bytes
    pub(crate) fn arm(&self, expected: usize) {
        let mut state = self.lock();
        state.data.clear();
        state.expected = expected;
        state.waiting = true;
    }

    /// Drop what arrived since arming; nothing sent before the frame is a reply
    pub(crate) fn discard(&self) {
        let mut state = self.lock();
        if !state.data.is_empty() {
            log::trace!("RX (stale) {:02X?}", state.data);
            state.data.clear();
        }
    }

    /// Block until the armed count arrives or `timeout` passes
    pub(crate) fn wait(&self, timeout: Duration) -> Received {
        let guard = self.lock();
        let (mut state, _) = self
            .ready
            .wait_timeout_while(guard, timeout, |s| s.data.len() < s.expected)
            .unwrap_or_else(PoisonError::into_inner);
        state.waiting = false;
        let complete = state.data.len() >= state.expected;
        Received {
            data: std::mem::take(&mut state.data),
            complete,
        }
    }
}

/// Bytes collected for one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    /// Everything received while armed
    pub data: Vec<u8>,
    /// Whether the expected count was reached before the timeout
    pub complete: bool,
}

/// Reader thread plus its shared buffer
pub(crate) struct Receiver {
    shared: Arc<RxShared>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Receiver {
    /// Start a reader thread on `reader`
    pub(crate) fn spawn(mut reader: Box<dyn Read + Send>) -> Result<Self> {
        let shared = Arc::new(RxShared::default());
        let stop = Arc::new(AtomicBool::new(false));

        let thread_shared = Arc::clone(&shared);
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("stk500-rx".into())
            .spawn(move || {
                let mut buf = [0u8; 256];
                while !thread_stop.load(Ordering::Relaxed) {
                    match reader.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => thread_shared.push(&buf[..n]),
                        Err(e)
                            if matches!(
                                e.kind(),
                                ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                            ) => {}
                        Err(e) => {
                            log::warn!("Serial read failed: {}", e);
                            break;
                        }
                    }
                }
                log::trace!("Receive thread exiting");
            })?;

        Ok(Self {
            shared,
            stop,
            handle: Some(handle),
        })
    }

    /// Start waiting for `expected` bytes
    pub(crate) fn arm(&self, expected: usize) {
        self.shared.arm(expected);
    }

    /// Drop what arrived since arming
    pub(crate) fn discard(&self) {
        self.shared.discard();
    }

    /// Block until the armed count arrives or `timeout` passes
    pub(crate) fn wait(&self, timeout: Duration) -> Received {
        self.shared.wait(timeout)
    }

    /// Stop and join the reader thread; later calls do nothing
    pub(crate) fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Receive thread panicked");
            }
        }
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_ignored_when_idle() {
        let rx = RxShared::default();
        rx.push(&[0x14, 0x10]);
        rx.arm(2);
        let got = rx.wait(Duration::from_millis(10));
        assert!(got.data.is_empty());
        assert!(!got.complete);
    }

    #[test]
    fn test_discard_drops_bytes_before_frame() {
        let rx = RxShared::default();
        rx.arm(2);
        rx.push(&[0x14, 0x11]);
        rx.discard();
        rx.push(&[0x14, 0x10]);
        let got = rx.wait(Duration::from_millis(10));
        assert!(got.complete);
        assert_eq!(got.data, vec![0x14, 0x10]);
    }

    #[test]
    fn test_wait_complete() {
        let rx = Arc::new(RxShared::default());
        rx.arm(3);
        let writer = Arc::clone(&rx);
        let t = thread::spawn(move || {
            writer.push(&[0x14]);
            writer.push(&[0x1E, 0x10]);
        });
        let got = rx.wait(Duration::from_secs(2));
        t.join().unwrap();
        assert!(got.complete);
        assert_eq!(got.data, vec![0x14, 0x1E, 0x10]);
    }

    #[test]
    fn test_wait_timeout_returns_partial() {
        let rx = RxShared::default();
        rx.arm(5);
        rx.push(&[0x14, 0x01]);
        let got = rx.wait(Duration::from_millis(30));
        assert!(!got.complete);
        assert_eq!(got.data, vec![0x14, 0x01]);
    }

    #[test]
    fn test_overflow_capped() {
        let rx = RxShared::default();
        rx.arm(RX_BUFFER_SIZE + 10);
        rx.push(&[0xAA; RX_BUFFER_SIZE - 1]);
        rx.push(&[0xBB]);
        let got = rx.wait(Duration::from_millis(1));
        assert_eq!(got.data.len(), RX_BUFFER_SIZE - 1);
        assert!(got.data.iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn test_reader_thread_stops() {
        struct Idle;
        impl Read for Idle {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                thread::sleep(Duration::from_millis(5));
                Err(ErrorKind::TimedOut.into())
            }
        }

        let mut receiver = Receiver::spawn(Box::new(Idle)).unwrap();
        receiver.stop();
        receiver.stop();
        assert!(receiver.handle.is_none());
    }
}
