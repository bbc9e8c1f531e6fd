use log::trace;

use crate::device::{block_range, BlockDevice, ERASED_BYTE};
use crate::error::LfsError;

/// Block device backed by a byte vector. Every block starts out erased.
pub struct MemBlockDevice {
    block_size: u32,
    block_count: u32,
    memory: Vec<u8>,
}

impl MemBlockDevice {
    pub fn new(block_size: u32, block_count: u32) -> Self {
        let len = block_size as usize * block_count as usize;
        MemBlockDevice {
            block_size,
            block_count,
            memory: vec![ERASED_BYTE; len],
        }
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    /// The raw image, blocks laid out back to back.
    pub fn as_bytes(&self) -> &[u8] {
        &self.memory
    }

    fn range(&self, block: u32, offset: u32, len: usize) -> Result<std::ops::Range<usize>, LfsError> {
        block_range(self.block_size, self.block_count, block, offset, len)
            .map(|r| r.start as usize..r.end as usize)
            .ok_or(LfsError::InvalidParam)
    }
}

impl BlockDevice for MemBlockDevice {
    fn read_block(&mut self, block: u32, offset: u32, buf: &mut [u8]) -> Result<(), LfsError> {
        trace!("mem: read block {} offset {} len {}", block, offset, buf.len());
        let range = self.range(block, offset, buf.len())?;
        buf.copy_from_slice(&self.memory[range]);
        Ok(())
    }

    fn program_block(&mut self, block: u32, offset: u32, buf: &[u8]) -> Result<(), LfsError> {
        trace!("mem: program block {} offset {} len {}", block, offset, buf.len());
        let range = self.range(block, offset, buf.len())?;
        self.memory[range].copy_from_slice(buf);
        Ok(())
    }

    fn erase_block(&mut self, block: u32) -> Result<(), LfsError> {
        trace!("mem: erase block {}", block);
        let range = self.range(block, 0, self.block_size as usize)?;
        for byte in &mut self.memory[range] {
            *byte = ERASED_BYTE;
        }
        Ok(())
    }

    fn sync(&mut self) -> Result<(), LfsError> {
        Ok(())
    }
}
