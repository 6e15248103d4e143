//! STK500v2 programmer

use avrburner_core::chip::Signature;
use avrburner_core::error::{Error as CoreError, Result as CoreResult};
use avrburner_core::memory::{word_address, MemSource};
use avrburner_core::programmer::{Capabilities, Fuse, PageAccess, Programmer, ProgrammerConfig};

use super::protocol::*;
use crate::error::{Result, Stk500Error};
use crate::line::{SerialConfig, SerialLine, SerialPortLine};
use crate::link::Link;

/// Answer length of commands that only return command and status
const STATUS_ANSWER: usize = 2;
/// Answer length of the one-byte ISP reads: command, status, value, status
const BYTE_ANSWER: usize = 4;
/// Answer length of the sign-on reply
const SIGN_ON_ANSWER: usize = 11;

/// ENTER_PROGMODE_ISP arguments: timeout, stabilization delay, command
/// execution delay, sync loops, byte delay, poll value, poll index and the
/// "programming enable" instruction
const ENTER_PROGMODE_ARGS: [u8; 11] = [200, 100, 25, 32, 0, 0x53, 3, 0xAC, 0x53, 0, 0];
/// LEAVE_PROGMODE_ISP arguments: pre- and post-delay
const LEAVE_PROGMODE_ARGS: [u8; 2] = [1, 1];
/// CHIP_ERASE_ISP arguments: erase delay, poll method and the erase instruction
const CHIP_ERASE_ARGS: [u8; 6] = [55, 0, 0xAC, 0x80, 0, 0];

fn read_fuse_instruction(fuse: Fuse) -> (u8, [u8; 4]) {
    match fuse {
        Fuse::Low => (cmd::READ_FUSE_ISP, [0x50, 0x00, 0x00, 0x00]),
        Fuse::High => (cmd::READ_FUSE_ISP, [0x58, 0x08, 0x00, 0x00]),
        Fuse::Extended => (cmd::READ_FUSE_ISP, [0x50, 0x08, 0x00, 0x00]),
        Fuse::Lock => (cmd::READ_LOCK_ISP, [0x58, 0x00, 0x00, 0x00]),
    }
}

fn write_fuse_instruction(fuse: Fuse, value: u8) -> (u8, [u8; 4]) {
    match fuse {
        Fuse::Low => (cmd::PROGRAM_FUSE_ISP, [0xAC, 0xA0, 0x00, value]),
        Fuse::High => (cmd::PROGRAM_FUSE_ISP, [0xAC, 0xA8, 0x00, value]),
        Fuse::Extended => (cmd::PROGRAM_FUSE_ISP, [0xAC, 0xA4, 0x00, value]),
        Fuse::Lock => (cmd::PROGRAM_LOCK_ISP, [0xAC, 0xE0, 0x00, value]),
    }
}

fn size_bytes(size: usize) -> Result<[u8; 2]> {
    u16::try_from(size)
        .map(u16::to_be_bytes)
        .map_err(|_| Stk500Error::InvalidParameter(format!("page size {} too large", size)))
}

/// STK500v2 bootloader or ISP programmer
pub struct Stk500v2<L: SerialLine = SerialPortLine> {
    link: Link<L>,
    sequence: u8,
    strictness: Strictness,
    connected: bool,
    prog_mode: bool,
}

impl Stk500v2<SerialPortLine> {
    /// Create a closed programmer on a serial port
    pub fn new(serial: SerialConfig, config: ProgrammerConfig, strictness: Strictness) -> Self {
        Self::with_line(SerialPortLine::new(serial), config, strictness)
    }
}

impl<L: SerialLine> Stk500v2<L> {
    /// Create a closed programmer on a custom serial line
    pub fn with_line(line: L, config: ProgrammerConfig, strictness: Strictness) -> Self {
        Self {
            link: Link::new(line, config),
            sequence: 0,
            strictness,
            connected: false,
            prog_mode: false,
        }
    }

    /// Timing configuration
    pub fn config(&self) -> &ProgrammerConfig {
        self.link.config()
    }

    /// Borrow the serial line
    pub fn line(&self) -> &L {
        self.link.line()
    }

    /// Answer validation level
    pub fn strictness(&self) -> Strictness {
        self.strictness
    }

    /// Sequence number of the next packet
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    /// Whether the programmer is in ISP programming mode
    pub fn in_prog_mode(&self) -> bool {
        self.prog_mode
    }

    /// Send one message and return the `answer_len`-byte answer body
    fn command(&mut self, body: &[u8], answer_len: usize) -> Result<Vec<u8>> {
        let command = body.first().copied().unwrap_or_default();
        log::debug!("STK500v2 command 0x{:02X} seq {}", command, self.sequence);

        let packet = encode_packet(self.sequence, body)?;
        self.sequence = self.sequence.wrapping_add(1);

        let response = self.link.exchange(&packet, answer_len + PACKET_OVERHEAD)?;
        let answer = decode_packet(&response, answer_len, self.strictness)?;
        check_answer(command, answer, self.strictness)?;
        Ok(answer.to_vec())
    }

    /// One-byte ISP read: the value is the third answer byte
    fn read_byte(&mut self, command: u8, instruction: [u8; 4]) -> Result<u8> {
        let mut body = vec![command, 4];
        body.extend_from_slice(&instruction);
        let answer = self.command(&body, BYTE_ANSWER)?;
        Ok(answer[2])
    }

    fn enter_prog_mode(&mut self) -> CoreResult<()> {
        let mut body = vec![cmd::ENTER_PROGMODE_ISP];
        body.extend_from_slice(&ENTER_PROGMODE_ARGS);
        let answer = self.command(&body, STATUS_ANSWER)?;
        match check_status(cmd::ENTER_PROGMODE_ISP, &answer) {
            Ok(()) => {
                self.prog_mode = true;
                Ok(())
            }
            Err(Stk500Error::Status { status, .. }) => Err(CoreError::EnterProgMode(status)),
            Err(e) => Err(e.into()),
        }
    }

    fn connect(&mut self, enter_prog_mode: bool) -> CoreResult<()> {
        self.link.open()?;
        if enter_prog_mode {
            self.enter_prog_mode()?;
        }
        Ok(())
    }

    fn teardown(&mut self) {
        if self.link.is_open() && self.prog_mode {
            let mut body = vec![cmd::LEAVE_PROGMODE_ISP];
            body.extend_from_slice(&LEAVE_PROGMODE_ARGS);
            if let Err(e) = self.command(&body, STATUS_ANSWER) {
                log::warn!("STK500v2 leave programming mode failed: {}", e);
            }
        }
        self.link.close();
        self.prog_mode = false;
        self.connected = false;
    }
}

impl<L: SerialLine> PageAccess for Stk500v2<L> {
    fn load_address(&mut self, address: u32) -> CoreResult<()> {
        let mut body = vec![cmd::LOAD_ADDRESS];
        body.extend_from_slice(&word_address(address).to_be_bytes());
        self.command(&body, STATUS_ANSWER)?;
        Ok(())
    }

    fn read_page(&mut self, source: MemSource, buf: &mut [u8]) -> CoreResult<()> {
        let command = match source {
            MemSource::Flash => cmd::READ_FLASH_ISP,
            MemSource::Eeprom => cmd::READ_EEPROM_ISP,
        };
        let [hi, lo] = size_bytes(buf.len())?;
        let answer = self.command(&[command, hi, lo], buf.len() + 3)?;
        buf.copy_from_slice(&answer[2..2 + buf.len()]);
        Ok(())
    }

    fn write_page(&mut self, source: MemSource, data: &[u8]) -> CoreResult<()> {
        let command = match source {
            MemSource::Flash => cmd::PROGRAM_FLASH_ISP,
            MemSource::Eeprom => cmd::PROGRAM_EEPROM_ISP,
        };
        let [hi, lo] = size_bytes(data.len())?;
        // Mode, delay, the three programming instructions and the poll
        // values are left to the bootloader
        let mut body = vec![command, hi, lo, 0, 0, 0, 0, 0, 0, 0];
        body.extend_from_slice(data);
        self.command(&body, STATUS_ANSWER)?;
        Ok(())
    }
}

impl<L: SerialLine> Programmer for Stk500v2<L> {
    fn name(&self) -> &'static str {
        "stk500v2"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::READ_SIGNATURE
            | Capabilities::CHIP_ERASE
            | Capabilities::FUSES
            | Capabilities::LOCK
            | Capabilities::CALIBRATION
            | Capabilities::DEVICE_NAME
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn open(&mut self, enter_prog_mode: bool) -> CoreResult<()> {
        if self.link.is_open() {
            self.teardown();
        }

        if let Err(e) = self.connect(enter_prog_mode) {
            self.teardown();
            return Err(e);
        }

        self.connected = true;
        log::info!("STK500v2 connected ({} answers)", self.strictness);
        Ok(())
    }

    fn close(&mut self) {
        self.teardown();
    }

    fn read_signature(&mut self) -> CoreResult<Signature> {
        let mut bytes = [0u8; 3];
        for (index, byte) in (0u8..).zip(bytes.iter_mut()) {
            *byte = self.read_byte(cmd::READ_SIGNATURE_ISP, [0x30, 0x00, index, 0x00])?;
        }
        Ok(Signature::from_bytes(bytes))
    }

    fn chip_erase(&mut self) -> CoreResult<()> {
        let mut body = vec![cmd::CHIP_ERASE_ISP];
        body.extend_from_slice(&CHIP_ERASE_ARGS);
        self.command(&body, STATUS_ANSWER)?;
        Ok(())
    }

    fn read_fuse(&mut self, fuse: Fuse) -> CoreResult<u8> {
        let (command, instruction) = read_fuse_instruction(fuse);
        Ok(self.read_byte(command, instruction)?)
    }

    fn write_fuse(&mut self, fuse: Fuse, value: u8) -> CoreResult<()> {
        let (command, instruction) = write_fuse_instruction(fuse, value);
        let mut body = vec![command];
        body.extend_from_slice(&instruction);
        self.command(&body, 3)?;
        Ok(())
    }

    fn read_calibration_byte(&mut self) -> CoreResult<u8> {
        Ok(self.read_byte(cmd::READ_OSCCAL_ISP, [0x38, 0x00, 0x00, 0x00])?)
    }

    fn device_name(&mut self) -> CoreResult<String> {
        let answer = self.command(&[cmd::SIGN_ON], SIGN_ON_ANSWER)?;
        let len = usize::from(answer[2]).min(answer.len() - 3);
        Ok(String::from_utf8_lossy(&answer[3..3 + len]).into_owned())
    }
}

impl<L: SerialLine> Drop for Stk500v2<L> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockLine;
    use avrburner_core::programmer::RecordingProgress;
    use std::sync::{Arc, Mutex};

    fn config() -> ProgrammerConfig {
        ProgrammerConfig::default()
            .with_reset_pulse_ms(0)
            .with_timeout_ms(100)
    }

    fn stk500v2(strictness: Strictness) -> (Stk500v2<MockLine>, MockLine) {
        let line = MockLine::new();
        let wire = line.clone();
        (Stk500v2::with_line(line, config(), strictness), wire)
    }

    fn reply(sequence: u8, body: &[u8]) -> Vec<u8> {
        encode_packet(sequence, body).unwrap()
    }

    /// Body of a transmitted packet
    fn body(packet: &[u8]) -> &[u8] {
        &packet[HEADER_LEN..packet.len() - 1]
    }

    /// Minimal STK500v2 bootloader with a 1 KiB flash
    fn emulator(flash: Arc<Mutex<Vec<u8>>>) -> impl FnMut(&[u8]) -> Vec<u8> + Send {
        let mut address = 0usize;
        move |packet: &[u8]| {
            let seq = packet[1];
            let msg = body(packet);
            let mut answer = vec![msg[0], status::CMD_OK];
            match msg[0] {
                cmd::LOAD_ADDRESS => {
                    address =
                        u32::from_be_bytes([msg[1], msg[2], msg[3], msg[4]]) as usize * 2;
                }
                cmd::READ_FLASH_ISP | cmd::READ_EEPROM_ISP => {
                    let size = usize::from(u16::from_be_bytes([msg[1], msg[2]]));
                    answer.extend_from_slice(&flash.lock().unwrap()[address..address + size]);
                    answer.push(status::CMD_OK);
                }
                cmd::PROGRAM_FLASH_ISP | cmd::PROGRAM_EEPROM_ISP => {
                    let size = usize::from(u16::from_be_bytes([msg[1], msg[2]]));
                    flash.lock().unwrap()[address..address + size]
                        .copy_from_slice(&msg[10..10 + size]);
                }
                cmd::READ_SIGNATURE_ISP => {
                    answer.push([0x1E, 0x95, 0x0F][usize::from(msg[4])]);
                    answer.push(status::CMD_OK);
                }
                _ => answer[1] = status::CMD_UNKNOWN,
            }
            encode_packet(seq, &answer).unwrap()
        }
    }

    #[test]
    fn test_signature_three_exchanges() {
        let (mut prog, wire) = stk500v2(Strictness::Strict);
        wire.respond_with(emulator(Arc::new(Mutex::new(vec![0xFF; 1024]))));
        prog.open(false).unwrap();

        assert_eq!(prog.read_signature().unwrap(), Signature::new(0x1E950F));
        let writes = wire.writes();
        assert_eq!(writes.len(), 3);
        for (i, packet) in writes.iter().enumerate() {
            assert_eq!(packet[1], i as u8);
            assert_eq!(
                body(packet),
                &[cmd::READ_SIGNATURE_ISP, 4, 0x30, 0x00, i as u8, 0x00]
            );
            assert_eq!(checksum(packet), 0);
        }
    }

    #[test]
    fn test_sequence_wraps() {
        let (mut prog, wire) = stk500v2(Strictness::Lenient);
        wire.respond_with(|packet: &[u8]| {
            encode_packet(packet[1], &[cmd::LOAD_ADDRESS, status::CMD_OK]).unwrap()
        });
        prog.open(false).unwrap();
        for _ in 0..257 {
            prog.load_address(0).unwrap();
        }
        assert_eq!(prog.sequence(), 1);
        let writes = wire.writes();
        assert_eq!(writes[255][1], 255);
        assert_eq!(writes[256][1], 0);
    }

    #[test]
    fn test_no_response() {
        let (mut prog, _wire) = stk500v2(Strictness::Lenient);
        prog.open(false).unwrap();
        assert_eq!(prog.read_signature(), Err(CoreError::NoResponse));
    }

    #[test]
    fn test_not_in_sync() {
        let (mut prog, wire) = stk500v2(Strictness::Lenient);
        prog.open(false).unwrap();
        let mut rx = reply(0, &[cmd::READ_SIGNATURE_ISP, 0, 0x1E, 0]);
        rx[0] = 0x14;
        wire.reply(&rx);
        assert_eq!(
            prog.read_signature(),
            Err(CoreError::Sync {
                expected: MESSAGE_START,
                found: 0x14
            })
        );
    }

    #[test]
    fn test_lenient_ignores_status() {
        let (mut prog, wire) = stk500v2(Strictness::Lenient);
        prog.open(false).unwrap();
        wire.reply(&reply(0, &[cmd::CHIP_ERASE_ISP, status::CMD_FAILED]));
        prog.chip_erase().unwrap();

        let (mut strict, wire) = stk500v2(Strictness::Strict);
        strict.open(false).unwrap();
        wire.reply(&reply(0, &[cmd::CHIP_ERASE_ISP, status::CMD_FAILED]));
        assert!(matches!(
            strict.chip_erase(),
            Err(CoreError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_strict_rejects_bad_checksum() {
        let (mut prog, wire) = stk500v2(Strictness::Strict);
        prog.open(false).unwrap();
        let mut rx = reply(0, &[cmd::LOAD_ADDRESS, status::CMD_OK]);
        *rx.last_mut().unwrap() ^= 0x55;
        wire.reply(&rx);
        assert!(matches!(
            prog.load_address(0),
            Err(CoreError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_open_enters_and_leaves_prog_mode() {
        let (mut prog, wire) = stk500v2(Strictness::Lenient);
        wire.reply(&reply(0, &[cmd::ENTER_PROGMODE_ISP, status::CMD_OK]));
        prog.open(true).unwrap();
        assert!(prog.in_prog_mode());
        assert_eq!(
            body(&wire.writes()[0]),
            &[cmd::ENTER_PROGMODE_ISP, 200, 100, 25, 32, 0, 0x53, 3, 0xAC, 0x53, 0, 0]
        );

        wire.reply(&reply(1, &[cmd::LEAVE_PROGMODE_ISP, status::CMD_OK]));
        prog.close();
        assert_eq!(body(&wire.writes()[1]), &[cmd::LEAVE_PROGMODE_ISP, 1, 1]);
        prog.close();
        assert_eq!(wire.writes().len(), 2);
        assert!(!prog.is_connected());
    }

    #[test]
    fn test_enter_prog_mode_refused() {
        let (mut prog, wire) = stk500v2(Strictness::Lenient);
        wire.reply(&reply(0, &[cmd::ENTER_PROGMODE_ISP, status::CMD_TOUT]));
        assert_eq!(prog.open(true), Err(CoreError::EnterProgMode(status::CMD_TOUT)));
        assert!(!prog.is_connected());
        assert!(!wire.is_open());
    }

    #[test]
    fn test_read_and_write_memory() {
        let (mut prog, wire) = stk500v2(Strictness::Strict);
        let flash = Arc::new(Mutex::new(vec![0xFF; 1024]));
        wire.respond_with(emulator(Arc::clone(&flash)));
        prog.open(false).unwrap();

        let data: Vec<u8> = (0..260).map(|i| (i * 7) as u8).collect();
        let mut progress = RecordingProgress::default();
        prog.write_memory(MemSource::Flash, 0x200, 128, &data, &mut progress)
            .unwrap();
        assert_eq!(progress.writes, vec![128, 256, 260]);

        let writes = wire.writes();
        assert_eq!(body(&writes[0]), &[cmd::LOAD_ADDRESS, 0, 0, 0x01, 0x00]);
        assert_eq!(&body(&writes[1])[..10], &[cmd::PROGRAM_FLASH_ISP, 0, 128, 0, 0, 0, 0, 0, 0, 0]);

        let back = prog
            .read_memory(MemSource::Flash, 0x200, 260, false, &mut progress)
            .unwrap();
        assert_eq!(back, data);
        assert_eq!(progress.reads, vec![200, 260]);
    }

    #[test]
    fn test_break_on_erased() {
        let (mut prog, wire) = stk500v2(Strictness::Lenient);
        let mut image = vec![0xFF; 1024];
        image[..200].fill(0x12);
        wire.respond_with(emulator(Arc::new(Mutex::new(image))));
        prog.open(false).unwrap();

        let data = prog
            .read_memory(MemSource::Flash, 0, 800, true, &mut RecordingProgress::default())
            .unwrap();
        assert_eq!(data, vec![0x12; 200]);
    }

    #[test]
    fn test_fuses() {
        let (mut prog, wire) = stk500v2(Strictness::Lenient);
        prog.open(false).unwrap();

        wire.reply(&reply(0, &[cmd::READ_FUSE_ISP, 0, 0xD9, 0]));
        assert_eq!(prog.read_fuse(Fuse::High).unwrap(), 0xD9);
        wire.reply(&reply(1, &[cmd::READ_LOCK_ISP, 0, 0x3F, 0]));
        assert_eq!(prog.read_fuse(Fuse::Lock).unwrap(), 0x3F);
        wire.reply(&reply(2, &[cmd::PROGRAM_FUSE_ISP, 0, 0]));
        prog.write_fuse(Fuse::Extended, 0xFD).unwrap();
        wire.reply(&reply(3, &[cmd::READ_OSCCAL_ISP, 0, 0x9A, 0]));
        assert_eq!(prog.read_calibration_byte().unwrap(), 0x9A);

        let writes = wire.writes();
        assert_eq!(body(&writes[0]), &[cmd::READ_FUSE_ISP, 4, 0x58, 0x08, 0, 0]);
        assert_eq!(body(&writes[1]), &[cmd::READ_LOCK_ISP, 4, 0x58, 0, 0, 0]);
        assert_eq!(body(&writes[2]), &[cmd::PROGRAM_FUSE_ISP, 0xAC, 0xA4, 0, 0xFD]);
        assert_eq!(body(&writes[3]), &[cmd::READ_OSCCAL_ISP, 4, 0x38, 0, 0, 0]);
    }

    #[test]
    fn test_device_name() {
        let (mut prog, wire) = stk500v2(Strictness::Lenient);
        prog.open(false).unwrap();
        let mut answer = vec![cmd::SIGN_ON, status::CMD_OK, 8];
        answer.extend_from_slice(b"AVRISP_2");
        wire.reply(&reply(0, &answer));
        assert_eq!(prog.device_name().unwrap(), "AVRISP_2");
        assert!(matches!(prog.page_size(), Err(CoreError::NotSupported(_))));
    }
}
