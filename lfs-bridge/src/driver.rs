//! Engine-side view of a configuration record.
//!
//! [`CallbackDriver`] calls the function pointers stored in a record with the
//! same calling convention and argument shapes the filesystem engine uses.
//! It does no filesystem work of its own; it exists to exercise a record and
//! its device through the real C ABI path, for tests, diagnostics and the
//! demo image tool.

use std::os::raw::{c_int, c_void};

use lfs_sys::{lfs_config, LFS_ERR_INVAL, LFS_ERR_OK};
use log::{debug, warn};

use crate::config::{ConfigRecord, Geometry};
use crate::engine::Engine;

#[derive(Default)]
pub struct CallbackDriver {
    config: Option<*const lfs_config>,
}

impl CallbackDriver {
    pub fn new() -> Self {
        CallbackDriver::default()
    }

    pub fn is_mounted(&self) -> bool {
        self.config.is_some()
    }

    /// Reads `buf.len()` bytes through the mounted record's read callback.
    pub fn read(&self, block: u32, offset: u32, buf: &mut [u8]) -> c_int {
        let c = match self.config {
            Some(c) => c,
            None => return LFS_ERR_INVAL,
        };
        // SAFETY: the record outlives the mount window, see `Engine`.
        unsafe {
            match (*c).read {
                Some(read) => read(c, block, offset, buf.as_mut_ptr() as *mut c_void, buf.len() as u32),
                None => LFS_ERR_INVAL,
            }
        }
    }

    pub fn prog(&self, block: u32, offset: u32, buf: &[u8]) -> c_int {
        let c = match self.config {
            Some(c) => c,
            None => return LFS_ERR_INVAL,
        };
        unsafe {
            match (*c).prog {
                Some(prog) => prog(c, block, offset, buf.as_ptr() as *const c_void, buf.len() as u32),
                None => LFS_ERR_INVAL,
            }
        }
    }

    pub fn erase(&self, block: u32) -> c_int {
        match self.config {
            Some(c) => unsafe { erase_through(c, block) },
            None => LFS_ERR_INVAL,
        }
    }

    pub fn sync(&self) -> c_int {
        match self.config {
            Some(c) => unsafe { sync_through(c) },
            None => LFS_ERR_INVAL,
        }
    }
}

unsafe fn erase_through(c: *const lfs_config, block: u32) -> c_int {
    match (*c).erase {
        Some(erase) => erase(c, block),
        None => LFS_ERR_INVAL,
    }
}

unsafe fn sync_through(c: *const lfs_config) -> c_int {
    match (*c).sync {
        Some(sync) => sync(c),
        None => LFS_ERR_INVAL,
    }
}

/// The sanity checks the engine applies to a record before trusting it.
pub fn check_geometry(geometry: &Geometry) -> Result<(), &'static str> {
    let g = geometry;
    if g.read_size == 0 || g.prog_size == 0 || g.cache_size == 0 {
        return Err("read, prog and cache sizes must be non-zero");
    }
    if g.block_size == 0 || g.block_count == 0 {
        return Err("block size and block count must be non-zero");
    }
    if g.cache_size % g.read_size != 0 || g.cache_size % g.prog_size != 0 {
        return Err("cache size must be a multiple of the read and prog sizes");
    }
    if g.block_size % g.cache_size != 0 {
        return Err("block size must be a multiple of the cache size");
    }
    if g.lookahead_size == 0 || g.lookahead_size % 8 != 0 {
        return Err("lookahead size must be a non-zero multiple of 8");
    }
    if g.block_cycles == 0 {
        return Err("block cycles must be positive or -1");
    }
    Ok(())
}

impl Engine for CallbackDriver {
    /// Erases every block and syncs.
    fn format(&mut self, config: &ConfigRecord) -> c_int {
        let geometry = config.geometry();
        if let Err(reason) = check_geometry(&geometry) {
            warn!("format refused: {}", reason);
            return LFS_ERR_INVAL;
        }
        let c = config.as_ptr();
        for block in 0..geometry.block_count {
            let status = unsafe { erase_through(c, block) };
            if status < LFS_ERR_OK {
                return status;
            }
        }
        unsafe { sync_through(c) }
    }

    fn mount(&mut self, config: &ConfigRecord) -> c_int {
        if let Err(reason) = check_geometry(&config.geometry()) {
            warn!("mount refused: {}", reason);
            return LFS_ERR_INVAL;
        }
        debug!("driver mounted at {:p}", config.as_ptr());
        self.config = Some(config.as_ptr());
        LFS_ERR_OK
    }

    fn unmount(&mut self) -> c_int {
        match self.config.take() {
            Some(c) => unsafe { sync_through(c) },
            None => LFS_ERR_INVAL,
        }
    }
}
