//! The four entry points installed into a configuration record.
//!
//! Each one resolves the record's context to a registered device, forwards
//! the call, and folds the outcome into the engine's status vocabulary:
//! zero, or a negative code from [`LfsError`]. Nothing else ever leaves
//! these functions, and no panic unwinds into the engine's frame.

use std::mem;
use std::os::raw::{c_int, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::slice;
use std::thread;

use lfs_sys::{lfs_block_t, lfs_config, lfs_off_t, lfs_size_t, LFS_ERR_OK};
use log::{debug, error, trace, warn};

use crate::error::{LfsError, ResolveError};
use crate::registry::{self, ContextHandle, SharedDevice};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Read,
    Prog,
    Erase,
    Sync,
}

enum Failure {
    Device(LfsError),
    Resolve(ResolveError),
}

pub(crate) unsafe extern "C" fn read(
    c: *const lfs_config,
    block: lfs_block_t,
    off: lfs_off_t,
    buffer: *mut c_void,
    size: lfs_size_t,
) -> c_int {
    dispatch(c, Op::Read, |dev| {
        trace!("read: block {} offset {} size {}", block, off, size);
        let buf = buffer_mut(buffer, size)?;
        dev.read_block(block, off, buf)
    })
}

pub(crate) unsafe extern "C" fn prog(
    c: *const lfs_config,
    block: lfs_block_t,
    off: lfs_off_t,
    buffer: *const c_void,
    size: lfs_size_t,
) -> c_int {
    dispatch(c, Op::Prog, |dev| {
        trace!("prog: block {} offset {} size {}", block, off, size);
        let buf = buffer_ref(buffer, size)?;
        dev.program_block(block, off, buf)
    })
}

pub(crate) unsafe extern "C" fn erase(c: *const lfs_config, block: lfs_block_t) -> c_int {
    dispatch(c, Op::Erase, |dev| {
        trace!("erase: block {}", block);
        dev.erase_block(block)
    })
}

pub(crate) unsafe extern "C" fn sync(c: *const lfs_config) -> c_int {
    dispatch(c, Op::Sync, |dev| {
        trace!("sync");
        dev.sync()
    })
}

/// Buffers are only valid for the duration of one callback, which is exactly
/// the lifetime of the slice handed to the device.
unsafe fn buffer_mut<'a>(buffer: *mut c_void, size: lfs_size_t) -> Result<&'a mut [u8], LfsError> {
    if size == 0 {
        return Ok(&mut []);
    }
    if buffer.is_null() {
        return Err(LfsError::InvalidParam);
    }
    Ok(slice::from_raw_parts_mut(buffer as *mut u8, size as usize))
}

unsafe fn buffer_ref<'a>(buffer: *const c_void, size: lfs_size_t) -> Result<&'a [u8], LfsError> {
    if size == 0 {
        return Ok(&[]);
    }
    if buffer.is_null() {
        return Err(LfsError::InvalidParam);
    }
    Ok(slice::from_raw_parts(buffer as *const u8, size as usize))
}

unsafe fn dispatch<F>(c: *const lfs_config, op: Op, f: F) -> c_int
where
    F: FnOnce(&mut SharedDevice) -> Result<(), LfsError>,
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| forward(c, f)));
    // Logging and dropping a panic payload run arbitrary code too.
    match panic::catch_unwind(AssertUnwindSafe(move || settle(op, outcome))) {
        Ok(status) => status,
        Err(payload) => {
            mem::forget(payload);
            LfsError::Io.code()
        }
    }
}

fn settle(op: Op, outcome: thread::Result<Result<(), Failure>>) -> c_int {
    match outcome {
        Ok(Ok(())) => LFS_ERR_OK,
        Ok(Err(Failure::Device(err))) => {
            debug!("{:?} failed: {}", op, err);
            err.code()
        }
        Ok(Err(Failure::Resolve(err))) if !err.is_fatal() => {
            warn!("{:?} could not reach its device: {}", op, err);
            LfsError::Io.code()
        }
        Ok(Err(Failure::Resolve(err))) => use_after_release(op, err),
        Err(payload) => {
            error!("{:?} panicked in the block device: {}", op, panic_message(&*payload));
            drop(payload);
            LfsError::Io.code()
        }
    }
}

unsafe fn forward<F>(c: *const lfs_config, f: F) -> Result<(), Failure>
where
    F: FnOnce(&mut SharedDevice) -> Result<(), LfsError>,
{
    if c.is_null() {
        return Err(Failure::Device(LfsError::InvalidParam));
    }
    let handle = ContextHandle::from_context((*c).context).map_err(Failure::Resolve)?;
    registry::global()
        .with_device(handle, f)
        .map_err(Failure::Resolve)?
        .map_err(Failure::Device)
}

/// A callback for a device that is gone means the engine outlived its mount.
/// There is no status code that would make the engine behave sensibly from
/// here on.
fn use_after_release(op: Op, err: ResolveError) -> ! {
    error!("{:?} called through a dead configuration record: {}", op, err);
    std::process::abort()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "<non-string panic payload>"
    }
}
