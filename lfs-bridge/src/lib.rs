//! Drives a littlefs-style flash engine from a block device written in Rust.
//!
//! The engine wants a configuration struct holding geometry and four C
//! function pointers (read, program, erase, sync). This crate builds and owns
//! that struct ([`ConfigRecord`]), fills the callback slots with trampolines
//! that forward to a [`BlockDevice`], and stores a bounds-checked
//! [`ContextHandle`] in the context slot so a callback can find its device
//! without the engine holding a Rust pointer.
//!
//! ```no_run
//! use lfs_bridge::{backend::MemBlockDevice, CallbackDriver, Filesystem, Geometry};
//!
//! let geometry = Geometry::default();
//! let device = MemBlockDevice::new(geometry.block_size, geometry.block_count);
//! let mut fs = Filesystem::new(CallbackDriver::new(), geometry, device)?;
//! fs.format()?;
//! fs.mount()?;
//! # Ok::<(), lfs_bridge::BridgeError>(())
//! ```

pub mod backend;
mod bridge;
mod config;
mod device;
mod driver;
mod engine;
mod error;
pub mod registry;
mod trampoline;

pub use crate::bridge::Bridge;
pub use crate::config::{ConfigRecord, Geometry};
pub use crate::device::{BlockDevice, ERASED_BYTE};
pub use crate::driver::{check_geometry, CallbackDriver};
pub use crate::engine::{Engine, Filesystem};
pub use crate::error::{errval, BridgeError, LfsError, ResolveError};
pub use crate::registry::ContextHandle;

pub use lfs_sys as sys;
