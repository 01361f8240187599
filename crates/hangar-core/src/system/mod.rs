//! System and hardware probing.

pub mod hardware;

pub use hardware::{
    Accelerator, GpuDevice, GpuVendor, HardwareSnapshot, MemoryLevel,
};
