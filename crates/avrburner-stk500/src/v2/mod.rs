//! STK500 version 2 bootloader protocol
//!
//! Every message is wrapped in a packet with a sequence number, a length
//! and an XOR checksum. The ISP commands carry the raw AVR programming
//! instruction bytes for the target.

mod device;
pub mod protocol;

pub use device::Stk500v2;
pub use protocol::Strictness;
