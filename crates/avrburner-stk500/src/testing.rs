//! Scripted serial line for protocol tests

use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};

use crate::error::{Result, Stk500Error};
use crate::line::{SerialLine, POLL_INTERVAL};

type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

#[derive(Default)]
struct State {
    open: bool,
    dtr: Option<bool>,
    clears: usize,
    late: Option<Vec<u8>>,
    writes: Vec<Vec<u8>>,
    replies: VecDeque<Vec<Vec<u8>>>,
    responder: Option<Responder>,
    tx: Option<mpsc::Sender<Vec<u8>>>,
}

/// Serial line whose replies are queued or computed by a responder
///
/// Clones share state, so a test keeps one clone to inspect the wire after handing
/// the other to the device.
#[derive(Clone, Default)]
pub(crate) struct MockLine {
    state: Arc<Mutex<State>>,
}

impl MockLine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next write, delivered in one piece
    pub(crate) fn reply(&self, bytes: &[u8]) {
        self.reply_chunks(&[bytes]);
    }

    /// Queue a reply for the next write, delivered in several pieces
    pub(crate) fn reply_chunks(&self, chunks: &[&[u8]]) {
        self.state
            .lock()
            .unwrap()
            .replies
            .push_back(chunks.iter().map(|c| c.to_vec()).collect());
    }

    /// Deliver `bytes` during the next buffer flush, as if still in flight
    pub(crate) fn late_on_clear(&self, bytes: &[u8]) {
        self.state.lock().unwrap().late = Some(bytes.to_vec());
    }

    /// Answer every write without a queued reply by calling `f`
    pub(crate) fn respond_with<F>(&self, f: F)
    where
        F: FnMut(&[u8]) -> Vec<u8> + Send + 'static,
    {
        self.state.lock().unwrap().responder = Some(Box::new(f));
    }

    pub(crate) fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().writes.clone()
    }

    pub(crate) fn dtr(&self) -> Option<bool> {
        self.state.lock().unwrap().dtr
    }

    pub(crate) fn clears(&self) -> usize {
        self.state.lock().unwrap().clears
    }

    pub(crate) fn is_open(&self) -> bool {
        self.state.lock().unwrap().open
    }
}

impl SerialLine for MockLine {
    fn open(&mut self) -> Result<()> {
        self.state.lock().unwrap().open = true;
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.open = false;
        state.tx = None;
    }

    fn is_open(&self) -> bool {
        MockLine::is_open(self)
    }

    fn set_dtr(&mut self, level: bool) -> Result<()> {
        self.state.lock().unwrap().dtr = Some(level);
        Ok(())
    }

    fn clear_buffers(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.clears += 1;
        let sent = match (state.late.take(), &state.tx) {
            (Some(bytes), Some(tx)) => tx.send(bytes).is_ok(),
            _ => false,
        };
        drop(state);
        if sent {
            // Let the receive thread pick them up before the flush returns
            std::thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.open {
            return Err(Stk500Error::NotOpen);
        }
        state.writes.push(data.to_vec());

        let chunks = match state.replies.pop_front() {
            Some(chunks) => chunks,
            None => match state.responder.as_mut() {
                Some(f) => vec![f(data)],
                None => Vec::new(),
            },
        };
        if let Some(tx) = &state.tx {
            for chunk in chunks.into_iter().filter(|c| !c.is_empty()) {
                let _ = tx.send(chunk);
            }
        }
        Ok(())
    }

    fn reader(&mut self) -> Result<Box<dyn Read + Send>> {
        let (tx, rx) = mpsc::channel();
        self.state.lock().unwrap().tx = Some(tx);
        Ok(Box::new(ChannelReader {
            rx,
            pending: Vec::new(),
        }))
    }
}

struct ChannelReader {
    rx: mpsc::Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv_timeout(POLL_INTERVAL) {
                Ok(chunk) => self.pending = chunk,
                Err(RecvTimeoutError::Timeout) => return Err(ErrorKind::TimedOut.into()),
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}
