use std::os::raw::c_void;

use lfs_sys::lfs_config;

use crate::registry::ContextHandle;
use crate::trampoline;

/// Device geometry and engine tunables carried by a configuration record.
/// None of these are checked here; the engine validates them at mount time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Minimum size of a read in bytes.
    pub read_size: u32,
    /// Minimum size of a program in bytes.
    pub prog_size: u32,
    /// Size of an erasable block in bytes.
    pub block_size: u32,
    pub block_count: u32,
    pub cache_size: u32,
    pub lookahead_size: u32,
    /// Erase cycles per block before the engine relocates its metadata,
    /// -1 disables wear leveling.
    pub block_cycles: i32,
}

impl Default for Geometry {
    fn default() -> Self {
        Geometry {
            read_size: 16,
            prog_size: 16,
            block_size: 512,
            block_count: 32,
            cache_size: 16,
            lookahead_size: 16,
            block_cycles: 500,
        }
    }
}

impl Geometry {
    /// Total bytes addressable through the record.
    pub fn capacity(&self) -> u64 {
        u64::from(self.block_size) * u64::from(self.block_count)
    }
}

/// The engine configuration struct, owned by the bridge until the engine is
/// done with it.
///
/// The struct lives on the heap so its address stays fixed for as long as
/// the record exists; the engine keeps that address from mount until
/// unmount and passes it back into every callback.
pub struct ConfigRecord {
    raw: Box<lfs_config>,
}

// The record holds no pointers of its own: the context slot carries a
// registry index and the optional buffer slots are never set by the bridge.
unsafe impl Send for ConfigRecord {}

impl ConfigRecord {
    /// Allocates a zeroed record. Allocation failure aborts the process
    /// through the global allocation error handler.
    pub fn allocate() -> Self {
        ConfigRecord {
            raw: Box::new(lfs_config::default()),
        }
    }

    /// Installs the four trampolines into the callback slots. Calling it again
    /// rewrites the same values; geometry and context are left alone.
    pub fn bind_callbacks(mut self) -> Self {
        self.raw.read = Some(trampoline::read);
        self.raw.prog = Some(trampoline::prog);
        self.raw.erase = Some(trampoline::erase);
        self.raw.sync = Some(trampoline::sync);
        self
    }

    pub fn with_geometry(mut self, geometry: &Geometry) -> Self {
        self.set_geometry(geometry);
        self
    }

    pub fn set_geometry(&mut self, geometry: &Geometry) {
        let raw = &mut *self.raw;
        raw.read_size = geometry.read_size;
        raw.prog_size = geometry.prog_size;
        raw.block_size = geometry.block_size;
        raw.block_count = geometry.block_count;
        raw.cache_size = geometry.cache_size;
        raw.lookahead_size = geometry.lookahead_size;
        raw.block_cycles = geometry.block_cycles;
    }

    pub fn geometry(&self) -> Geometry {
        Geometry {
            read_size: self.raw.read_size,
            prog_size: self.raw.prog_size,
            block_size: self.raw.block_size,
            block_count: self.raw.block_count,
            cache_size: self.raw.cache_size,
            lookahead_size: self.raw.lookahead_size,
            block_cycles: self.raw.block_cycles,
        }
    }

    pub fn set_context(&mut self, handle: ContextHandle) {
        self.raw.context = handle.to_context();
    }

    pub fn clear_context(&mut self) {
        self.raw.context = std::ptr::null_mut();
    }

    /// The raw context slot, as a callback would see it.
    pub fn context(&self) -> *const c_void {
        self.raw.context
    }

    /// True once every callback slot points at a trampoline.
    pub fn callbacks_bound(&self) -> bool {
        let raw = &*self.raw;
        raw.read.map(|f| f as usize) == Some(trampoline::read as usize)
            && raw.prog.map(|f| f as usize) == Some(trampoline::prog as usize)
            && raw.erase.map(|f| f as usize) == Some(trampoline::erase as usize)
            && raw.sync.map(|f| f as usize) == Some(trampoline::sync as usize)
    }

    /// The pointer handed to the engine. Valid for as long as `self` lives.
    pub fn as_ptr(&self) -> *const lfs_config {
        &*self.raw
    }

    pub fn raw(&self) -> &lfs_config {
        &self.raw
    }
}

impl std::fmt::Debug for ConfigRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigRecord")
            .field("address", &self.as_ptr())
            .field("context", &self.context())
            .field("callbacks_bound", &self.callbacks_bound())
            .field("geometry", &self.geometry())
            .finish()
    }
}
