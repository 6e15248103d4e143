//! Configuration shared by all programmers

use std::time::Duration;

/// Default reset pulse length in milliseconds
pub const DEFAULT_RESET_PULSE_MS: u64 = 150;

/// Default per-command read/write timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 1500;

/// Serial baud rates accepted by the bootloader programmers
pub const SUPPORTED_BAUD_RATES: [u32; 4] = [19200, 38400, 57600, 115200];

/// Timing configuration
///
/// Only the serial bootloader programmers use these values; the USB
/// programmer ignores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgrammerConfig {
    /// How long the reset line is held before talking to the bootloader
    pub reset_pulse: Duration,
    /// How long a command waits for its complete response
    pub timeout: Duration,
}

impl Default for ProgrammerConfig {
    fn default() -> Self {
        Self {
            reset_pulse: Duration::from_millis(DEFAULT_RESET_PULSE_MS),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

impl ProgrammerConfig {
    /// Set the reset pulse length in milliseconds
    pub fn with_reset_pulse_ms(mut self, ms: u64) -> Self {
        self.reset_pulse = Duration::from_millis(ms);
        self
    }

    /// Set the read/write timeout in milliseconds
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout = Duration::from_millis(ms);
        self
    }
}

/// Check a baud rate against [`SUPPORTED_BAUD_RATES`]
pub fn is_supported_baud(baud: u32) -> bool {
    SUPPORTED_BAUD_RATES.contains(&baud)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ProgrammerConfig::default();
        assert_eq!(cfg.reset_pulse, Duration::from_millis(150));
        assert_eq!(cfg.timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_builders() {
        let cfg = ProgrammerConfig::default()
            .with_reset_pulse_ms(50)
            .with_timeout_ms(200);
        assert_eq!(cfg.reset_pulse, Duration::from_millis(50));
        assert_eq!(cfg.timeout, Duration::from_millis(200));
    }

    #[test]
    fn test_baud_rates() {
        assert!(is_supported_baud(115200));
        assert!(is_supported_baud(19200));
        assert!(!is_supported_baud(9600));
    }
}
