//! littlefs
//!
//! Raw C ABI of the littlefs engine as seen from a block device: the primitive
//! typedefs, the configuration struct and the four callback signatures. Layout
//! follows littlefs 2.5 compiled without `LFS_THREADSAFE`.
#![allow(non_camel_case_types)]

use std::os::raw::{c_int, c_void};
use std::ptr;

pub type lfs_size_t = u32;
pub type lfs_off_t = u32;
pub type lfs_ssize_t = i32;
pub type lfs_soff_t = i32;
pub type lfs_block_t = u32;

/// Software library version, major in the upper 16 bits.
pub const LFS_VERSION: u32 = 0x0002_0005;
pub const LFS_VERSION_MAJOR: u32 = 0xffff & (LFS_VERSION >> 16);
pub const LFS_VERSION_MINOR: u32 = 0xffff & LFS_VERSION;

/// On-disk format version.
pub const LFS_DISK_VERSION: u32 = 0x0002_0000;

pub const LFS_ERR_OK: c_int = 0;
pub const LFS_ERR_IO: c_int = -5;
pub const LFS_ERR_CORRUPT: c_int = -84;
pub const LFS_ERR_NOENT: c_int = -2;
pub const LFS_ERR_EXIST: c_int = -17;
pub const LFS_ERR_NOTDIR: c_int = -20;
pub const LFS_ERR_ISDIR: c_int = -21;
pub const LFS_ERR_NOTEMPTY: c_int = -39;
pub const LFS_ERR_BADF: c_int = -9;
pub const LFS_ERR_FBIG: c_int = -27;
pub const LFS_ERR_INVAL: c_int = -22;
pub const LFS_ERR_NOSPC: c_int = -28;
pub const LFS_ERR_NOMEM: c_int = -12;
pub const LFS_ERR_NOATTR: c_int = -61;
pub const LFS_ERR_NAMETOOLONG: c_int = -36;

/// Read a region in a block.
pub type lfs_read_t = Option<
    unsafe extern "C" fn(
        c: *const lfs_config,
        block: lfs_block_t,
        off: lfs_off_t,
        buffer: *mut c_void,
        size: lfs_size_t,
    ) -> c_int,
>;

/// Program a region in a block. The block must have previously been erased.
pub type lfs_prog_t = Option<
    unsafe extern "C" fn(
        c: *const lfs_config,
        block: lfs_block_t,
        off: lfs_off_t,
        buffer: *const c_void,
        size: lfs_size_t,
    ) -> c_int,
>;

/// Erase a block.
pub type lfs_erase_t = Option<unsafe extern "C" fn(c: *const lfs_config, block: lfs_block_t) -> c_int>;

/// Sync the state of the underlying block device.
pub type lfs_sync_t = Option<unsafe extern "C" fn(c: *const lfs_config) -> c_int>;

#[repr(C)]
#[derive(Debug)]
pub struct lfs_config {
    /// Opaque user provided context that can be used to pass
    /// information to the block device operations.
    pub context: *mut c_void,

    pub read: lfs_read_t,
    pub prog: lfs_prog_t,
    pub erase: lfs_erase_t,
    pub sync: lfs_sync_t,

    /// Minimum size of a block read in bytes.
    pub read_size: lfs_size_t,
    /// Minimum size of a block program in bytes.
    pub prog_size: lfs_size_t,
    /// Size of an erasable block in bytes.
    pub block_size: lfs_size_t,
    /// Number of erasable blocks on the device.
    pub block_count: lfs_size_t,
    /// Erase cycles before metadata is moved to another block,
    /// -1 disables block-level wear-leveling.
    pub block_cycles: i32,
    /// Size of block caches in bytes.
    pub cache_size: lfs_size_t,
    /// Size of the lookahead buffer in bytes.
    pub lookahead_size: lfs_size_t,

    /// Optional statically allocated buffers, null means malloc.
    pub read_buffer: *mut c_void,
    pub prog_buffer: *mut c_void,
    pub lookahead_buffer: *mut c_void,

    /// Zero means the engine default.
    pub name_max: lfs_size_t,
    pub file_max: lfs_size_t,
    pub attr_max: lfs_size_t,
    pub metadata_max: lfs_size_t,
}

impl Default for lfs_config {
    fn default() -> Self {
        lfs_config {
            context: ptr::null_mut(),
            read: None,
            prog: None,
            erase: None,
            sync: None,
            read_size: 0,
            prog_size: 0,
            block_size: 0,
            block_count: 0,
            block_cycles: 0,
            cache_size: 0,
            lookahead_size: 0,
            read_buffer: ptr::null_mut(),
            prog_buffer: ptr::null_mut(),
            lookahead_buffer: ptr::null_mut(),
            name_max: 0,
            file_max: 0,
            attr_max: 0,
            metadata_max: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    #[test]
    fn callback_slots_are_pointer_sized() {
        // Nullable fn pointers must share the layout of a C function pointer.
        assert_eq!(mem::size_of::<lfs_read_t>(), mem::size_of::<*const c_void>());
        assert_eq!(mem::size_of::<lfs_sync_t>(), mem::size_of::<*const c_void>());
    }

    #[test]
    fn config_matches_c_layout() {
        let ptr = mem::size_of::<*const c_void>();
        // context + 4 callbacks, 7 geometry words, 3 buffers, 4 limits.
        let expected = 5 * ptr + 7 * 4 + 3 * ptr + 4 * 4;
        let align = mem::align_of::<lfs_config>();
        let rounded = |n: usize| (n + align - 1) / align * align;
        assert_eq!(mem::size_of::<lfs_config>(), rounded(expected));
    }

    #[test]
    fn default_config_is_zeroed() {
        let cfg = lfs_config::default();
        assert!(cfg.context.is_null());
        assert!(cfg.read.is_none() && cfg.prog.is_none());
        assert!(cfg.erase.is_none() && cfg.sync.is_none());
        assert_eq!(cfg.block_size, 0);
        assert_eq!(cfg.block_cycles, 0);
    }
}
