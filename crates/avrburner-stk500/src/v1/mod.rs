//! STK500 version 1 bootloader protocol

mod device;
pub mod protocol;

pub use device::Stk500;
