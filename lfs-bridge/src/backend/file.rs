use std::fs::{File, OpenOptions};
use std::io::prelude::*;
use std::io::{BufWriter, SeekFrom};
use std::path::Path;

use log::trace;

use crate::device::{block_range, BlockDevice, ERASED_BYTE};
use crate::error::LfsError;

/// Emulates flash storage in userspace using a single fixed-size file as the
/// image. Meant for development and testing of filesystems on top of the
/// bridge.
pub struct FileBlockDevice {
    /// Exactly `block_size * block_count` bytes long.
    fd: File,
    block_size: u32,
    block_count: u32,
    blank_block: Vec<u8>,
}

impl FileBlockDevice {
    /// Opens an existing image without touching its contents. Fails with
    /// `InvalidInput` unless the file is exactly `block_size * block_count`
    /// bytes long.
    pub fn open<P: AsRef<Path>>(path: P, block_size: u32, block_count: u32) -> std::io::Result<Self> {
        // Return error if the file does not exist rather than create one.
        let fd = OpenOptions::new().read(true).write(true).open(path)?;
        FileBlockDeviceBuilder::from(fd)
            .with_geometry(block_size, block_count)
            .clear_medium(false)
            .build()
    }

    /// Returns ownership of the underlying file descriptor to the caller.
    pub fn into_file(self) -> File {
        self.fd
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    fn seek_to(&mut self, block: u32, offset: u32, len: usize) -> Result<(), LfsError> {
        let range = block_range(self.block_size, self.block_count, block, offset, len)
            .ok_or(LfsError::InvalidParam)?;
        self.fd.seek(SeekFrom::Start(range.start))?;
        Ok(())
    }
}

impl BlockDevice for FileBlockDevice {
    fn read_block(&mut self, block: u32, offset: u32, buf: &mut [u8]) -> Result<(), LfsError> {
        trace!("file: read block {} offset {} len {}", block, offset, buf.len());
        self.seek_to(block, offset, buf.len())?;
        self.fd.read_exact(buf)?;
        Ok(())
    }

    fn program_block(&mut self, block: u32, offset: u32, buf: &[u8]) -> Result<(), LfsError> {
        trace!("file: program block {} offset {} len {}", block, offset, buf.len());
        self.seek_to(block, offset, buf.len())?;
        self.fd.write_all(buf)?;
        Ok(())
    }

    fn erase_block(&mut self, block: u32) -> Result<(), LfsError> {
        trace!("file: erase block {}", block);
        self.seek_to(block, 0, self.blank_block.len())?;
        self.fd.write_all(&self.blank_block)?;
        Ok(())
    }

    fn sync(&mut self) -> Result<(), LfsError> {
        trace!("file: sync");
        self.fd.sync_all()?;
        Ok(())
    }
}

pub struct FileBlockDeviceBuilder {
    fd: File,
    block_size: u32,
    block_count: u32,
    clear_medium: bool,
}

impl From<File> for FileBlockDeviceBuilder {
    fn from(fd: File) -> Self {
        FileBlockDeviceBuilder {
            fd,
            block_size: 4096,
            // A better default here might be the size of the file rounded down
            // to the nearest block.
            block_count: 0,
            clear_medium: true,
        }
    }
}

impl FileBlockDeviceBuilder {
    /// Sets the erase-block size and the number of blocks in the image.
    pub fn with_geometry(mut self, block_size: u32, block_count: u32) -> Self {
        self.block_size = block_size;
        self.block_count = block_count;
        self
    }

    /// Whether `build` erases the whole image. Defaults to true; turn it off to
    /// reopen an image that already holds a filesystem, in which case `build`
    /// checks that the file size matches the geometry.
    pub fn clear_medium(mut self, clear: bool) -> Self {
        self.clear_medium = clear;
        self
    }

    /// This builder assumes ownership of the file descriptor and, unless told
    /// otherwise, overwrites the whole image with erased blocks.
    pub fn build(mut self) -> std::io::Result<FileBlockDevice> {
        if self.block_size == 0 || self.block_count == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "image geometry must be non-zero",
            ));
        }
        let blank_block = vec![ERASED_BYTE; self.block_size as usize];
        if self.clear_medium {
            self.erase_medium(&blank_block)?;
        } else {
            let expected = u64::from(self.block_size) * u64::from(self.block_count);
            let len = self.fd.metadata()?.len();
            if len != expected {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("image is {} bytes, geometry needs {}", len, expected),
                ));
            }
        }
        Ok(FileBlockDevice {
            fd: self.fd,
            block_size: self.block_size,
            block_count: self.block_count,
            blank_block,
        })
    }

    fn erase_medium(&mut self, blank_block: &[u8]) -> std::io::Result<()> {
        self.fd.seek(SeekFrom::Start(0))?;
        let mut bfd = BufWriter::new(&self.fd);
        for _ in 0..self.block_count {
            bfd.write_all(blank_block)?;
        }
        bfd.flush()?;
        drop(bfd);
        let len = u64::from(self.block_size) * u64::from(self.block_count);
        self.fd.set_len(len)
    }
}
