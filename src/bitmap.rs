//! Management of the inode bitmap and the data bitmap.
//! Both live in memory for the whole mount and are written back by the superblock at unmount.
//! Bit index is the resource ID: inode IDs for the inode bitmap, data region block indices for the data bitmap.

use crate::SuperBlock;
use crate::error::{FsError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    bytes: Vec<u8>,
    max: u32,
}

impl Bitmap {
    /// A cleared bitmap of `len` bytes tracking at most `max` items.
    pub fn new(len: usize, max: u32) -> Self {
        Self::from_bytes(vec![0; len], max)
    }

    /// Wraps a bitmap read back from disk.
    /// 'max' is clamped to the number of bits actually stored.
    pub fn from_bytes(bytes: Vec<u8>, max: u32) -> Self {
        let capacity = u32::try_from(bytes.len() * 8).unwrap_or(u32::MAX);
        Self {
            max: max.min(capacity),
            bytes,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn is_set(&self, id: u32) -> bool {
        if id >= self.max {
            return false;
        }
        self.bytes[(id / 8) as usize] & (1 << (id % 8)) != 0
    }

    /// Sets the first clear bit, scanning bytes in order and bits from least significant.
    /// Returns the item ID of the bit that was set.
    pub fn alloc(&mut self) -> Result<u32> {
        for (byte_cursor, byte) in self.bytes.iter_mut().enumerate() {
            if *byte == u8::MAX {
                continue;
            }
            for bit_cursor in 0..8 {
                let id = byte_cursor as u32 * 8 + bit_cursor;
                if id >= self.max {
                    return Err(FsError::NoSpace);
                }
                if *byte & (1 << bit_cursor) == 0 {
                    *byte |= 1 << bit_cursor;
                    return Ok(id);
                }
            }
        }
        Err(FsError::NoSpace)
    }

    /// Clears the bit of an allocated item.
    /// Clearing a bit that is not set is reported and leaves the bitmap untouched.
    pub fn free(&mut self, id: u32) -> Result<()> {
        if id >= self.max {
            return Err(FsError::InvalidArgument("bit index out of range"));
        }
        if !self.is_set(id) {
            return Err(FsError::Corruption(format!("bit {id} freed while not allocated")));
        }
        self.bytes[(id / 8) as usize] &= !(1 << (id % 8));
        Ok(())
    }

    pub fn is_exhausted(&self) -> bool {
        (0..self.max).all(|id| self.is_set(id))
    }

    pub fn count_set(&self) -> u32 {
        (0..self.max).filter(|&id| self.is_set(id)).count() as u32
    }
}

// Session-level API, keeping the usage counter in step with the data bitmap.

/// Allocates a new inode ID, setting its bit in the inode bitmap.
/// Only called by inode::alloc_inode.
pub(crate) fn alloc_inode_id(superblock: &mut SuperBlock) -> Result<u32> {
    let ino = superblock.inode_map.alloc()?;
    log::trace!("[bitmap] allocated inode {}", ino);
    Ok(ino)
}

/// Frees an inode ID, clearing its bit in the inode bitmap.
pub(crate) fn free_inode_id(superblock: &mut SuperBlock, ino: u32) -> Result<()> {
    superblock.inode_map.free(ino)?;
    log::trace!("[bitmap] freed inode {}", ino);
    Ok(())
}

/// Allocates a data block, setting its bit in the data bitmap.
/// Returns the index of the block within the data region.
pub fn alloc_data_block(superblock: &mut SuperBlock) -> Result<u32> {
    let block = superblock.data_map.alloc()?;
    superblock.usage_size += superblock.blk_size as u64;
    log::trace!("[bitmap] allocated data block {}", block);
    Ok(block)
}

/// Frees a data block, clearing its bit in the data bitmap.
pub fn free_data_block(superblock: &mut SuperBlock, block: u32) -> Result<()> {
    superblock.data_map.free(block)?;
    superblock.usage_size = superblock.usage_size.saturating_sub(superblock.blk_size as u64);
    log::trace!("[bitmap] freed data block {}", block);
    Ok(())
}
