mod file;
mod memory;

pub use file::{FileBlockDevice, FileBlockDeviceBuilder};
pub use memory::MemBlockDevice;
