//! Command/response exchange over a serial line

use std::thread;

use avrburner_core::programmer::ProgrammerConfig;

use crate::error::{Result, Stk500Error};
use crate::line::SerialLine;
use crate::receiver::Receiver;

/// Serial line plus receive thread, shared by both protocol versions
pub(crate) struct Link<L: SerialLine> {
    line: L,
    config: ProgrammerConfig,
    receiver: Option<Receiver>,
}

impl<L: SerialLine> Link<L> {
    pub(crate) fn new(line: L, config: ProgrammerConfig) -> Self {
        Self {
            line,
            config,
            receiver: None,
        }
    }

    pub(crate) fn config(&self) -> &ProgrammerConfig {
        &self.config
    }

    pub(crate) fn line(&self) -> &L {
        &self.line
    }

    pub(crate) fn is_open(&self) -> bool {
        self.receiver.is_some() && self.line.is_open()
    }

    /// Open the line, pulse reset through DTR and start receiving
    pub(crate) fn open(&mut self) -> Result<()> {
        self.line.open()?;
        if let Err(e) = self.start() {
            self.close();
            return Err(e);
        }
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.line.set_dtr(true)?;
        thread::sleep(self.config.reset_pulse);
        let reader = self.line.reader()?;
        self.receiver = Some(Receiver::spawn(reader)?);
        Ok(())
    }

    /// Send `frame` and collect up to `expected` bytes
    ///
    /// Returns whatever arrived, which may be shorter than `expected` after
    /// a timeout. Nothing at all is [`Stk500Error::NoResponse`].
    pub(crate) fn exchange(&mut self, frame: &[u8], expected: usize) -> Result<Vec<u8>> {
        let receiver = self.receiver.as_ref().ok_or(Stk500Error::NotOpen)?;

        // Armed before the flush so late bytes of an earlier answer land in
        // the buffer and get dropped with it
        receiver.arm(expected);
        self.line.clear_buffers()?;
        receiver.discard();
        log::trace!("TX {:02X?}", frame);
        self.line.write_all(frame)?;

        let received = receiver.wait(self.config.timeout);
        log::trace!("RX {:02X?}", received.data);

        if received.data.is_empty() {
            return Err(Stk500Error::NoResponse);
        }
        if !received.complete {
            log::debug!(
                "Response incomplete after {:?}: {} of {} bytes",
                self.config.timeout,
                received.data.len(),
                expected
            );
        }
        Ok(received.data)
    }

    /// Stop the receive thread and release the line
    pub(crate) fn close(&mut self) {
        if let Some(mut receiver) = self.receiver.take() {
            receiver.stop();
        }
        self.line.close();
    }
}
