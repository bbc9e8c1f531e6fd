use crate::error::LfsError;

/// Byte every cell of a block holds right after an erase.
pub const ERASED_BYTE: u8 = 0xff;

/// The four primitive operations a flash engine needs from physical storage.
///
/// Implementations are called synchronously, one operation at a time, from
/// whatever thread drives the engine. Buffers are only borrowed for the
/// duration of a call and must not be retained.
pub trait BlockDevice {
    /// Fills `buf` with exactly `buf.len()` bytes starting at `offset` within
    /// `block`. A short read is an error, never a partial success.
    fn read_block(&mut self, block: u32, offset: u32, buf: &mut [u8]) -> Result<(), LfsError>;

    /// Programs `buf` at `offset` within `block`. The engine erases the region
    /// beforehand; implementations are not required to check.
    fn program_block(&mut self, block: u32, offset: u32, buf: &[u8]) -> Result<(), LfsError>;

    /// Erases the whole of `block`.
    fn erase_block(&mut self, block: u32) -> Result<(), LfsError>;

    /// Flushes any buffered writes, blocking until they are durable.
    fn sync(&mut self) -> Result<(), LfsError>;
}

impl<T: BlockDevice + ?Sized> BlockDevice for Box<T> {
    fn read_block(&mut self, block: u32, offset: u32, buf: &mut [u8]) -> Result<(), LfsError> {
        (**self).read_block(block, offset, buf)
    }

    fn program_block(&mut self, block: u32, offset: u32, buf: &[u8]) -> Result<(), LfsError> {
        (**self).program_block(block, offset, buf)
    }

    fn erase_block(&mut self, block: u32) -> Result<(), LfsError> {
        (**self).erase_block(block)
    }

    fn sync(&mut self) -> Result<(), LfsError> {
        (**self).sync()
    }
}

impl<T: BlockDevice + ?Sized> BlockDevice for &mut T {
    fn read_block(&mut self, block: u32, offset: u32, buf: &mut [u8]) -> Result<(), LfsError> {
        (**self).read_block(block, offset, buf)
    }

    fn program_block(&mut self, block: u32, offset: u32, buf: &[u8]) -> Result<(), LfsError> {
        (**self).program_block(block, offset, buf)
    }

    fn erase_block(&mut self, block: u32) -> Result<(), LfsError> {
        (**self).erase_block(block)
    }

    fn sync(&mut self) -> Result<(), LfsError> {
        (**self).sync()
    }
}

/// Byte range of `len` bytes at `offset` inside `block` of an image laid out
/// as `block_count` consecutive blocks of `block_size` bytes. `None` when the
/// range leaves the block or the image.
pub(crate) fn block_range(
    block_size: u32,
    block_count: u32,
    block: u32,
    offset: u32,
    len: usize,
) -> Option<std::ops::Range<u64>> {
    if block >= block_count {
        return None;
    }
    let end_in_block = u64::from(offset).checked_add(len as u64)?;
    if end_in_block > u64::from(block_size) {
        return None;
    }
    let start = u64::from(block) * u64::from(block_size) + u64::from(offset);
    Some(start..start + len as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_inside_block() {
        assert_eq!(block_range(4096, 64, 3, 16, 16), Some(12304..12320));
        assert_eq!(block_range(512, 1, 0, 0, 512), Some(0..512));
    }

    #[test]
    fn range_past_block_end_is_rejected() {
        assert_eq!(block_range(512, 4, 0, 500, 16), None);
        assert_eq!(block_range(512, 4, 4, 0, 1), None);
        assert_eq!(block_range(512, 4, 0, u32::MAX, 2), None);
    }

    #[test]
    fn empty_range_at_block_end() {
        assert_eq!(block_range(512, 4, 1, 512, 0), Some(1024..1024));
    }

    #[test]
    fn borrowed_device_forwards() {
        fn stamp<D: BlockDevice>(mut dev: D) -> Result<(), LfsError> {
            dev.erase_block(0)?;
            dev.program_block(0, 0, &[7; 4])
        }

        let mut dev = crate::backend::MemBlockDevice::new(64, 1);
        stamp(&mut dev).unwrap();
        assert_eq!(&dev.as_bytes()[..5], &[7, 7, 7, 7, ERASED_BYTE]);
    }
}
