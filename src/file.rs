//! Byte-level access to the resident segments of a regular file.
//! None of these touch the device; the caller syncs the inode afterwards.

use crate::bitmap::{alloc_data_block, free_data_block};
use crate::config::DATA_PER_FILE;
use crate::error::{FsError, Result};
use crate::{FileType, Inode, SuperBlock};

fn check_regular(inode: &Inode) -> Result<()> {
    match inode.ftype {
        FileType::Regular => Ok(()),
        FileType::Directory => Err(FsError::IsDirectory),
        FileType::Symlink => Err(FsError::Unsupported),
    }
}

/// Largest size a file can reach with its direct block pointers.
pub fn max_file_size(superblock: &SuperBlock) -> u64 {
    superblock.blks_sz(DATA_PER_FILE as u32)
}

/// Makes sure every slot below `slots` has a block and a segment, allocating in slot order.
fn ensure_slots(superblock: &mut SuperBlock, inode: &mut Inode, slots: usize) -> Result<()> {
    let blk_size = superblock.blk_size as usize;
    for slot in 0..slots {
        if inode.blk_pointers[slot].is_none() {
            let block = alloc_data_block(superblock)?;
            inode.attach_block(slot, block, blk_size);
        }
    }
    Ok(())
}

/// Copies up to `buffer.len()` bytes starting at `offset`.
/// Returns the number of bytes read, which is short at the end of the file.
pub fn fread(superblock: &SuperBlock, inode: &Inode, offset: u64, buffer: &mut [u8]) -> Result<usize> {
    check_regular(inode)?;
    let size = inode.size as u64;
    if offset > size {
        return Err(FsError::InvalidSeek { offset, size });
    }

    let blk_size = superblock.blk_size as usize;
    let total = buffer.len().min((size - offset) as usize);
    let mut bytes_read = 0;
    let mut current_offset = offset as usize;
    while bytes_read < total {
        let slot = current_offset / blk_size;
        let start = current_offset % blk_size;
        let chunk = (blk_size - start).min(total - bytes_read);
        let segment = inode.data[slot].as_deref().ok_or_else(|| {
            FsError::Corruption(format!("inode {} has no segment for slot {}", inode.ino, slot))
        })?;
        buffer[bytes_read..bytes_read + chunk].copy_from_slice(&segment[start..start + chunk]);
        bytes_read += chunk;
        current_offset += chunk;
    }
    Ok(bytes_read)
}

/// Writes `buffer` at `offset`, growing the file when the write passes its end.
/// `offset` may be at most the current size.
pub fn fwrite(
    superblock: &mut SuperBlock,
    inode: &mut Inode,
    offset: u64,
    buffer: &[u8],
) -> Result<usize> {
    check_regular(inode)?;
    let size = inode.size as u64;
    if offset > size {
        return Err(FsError::InvalidSeek { offset, size });
    }
    if buffer.is_empty() {
        return Ok(0);
    }
    let end = offset + buffer.len() as u64;
    if end > max_file_size(superblock) {
        return Err(FsError::FileTooLarge);
    }

    let blk_size = superblock.blk_size as usize;
    ensure_slots(superblock, inode, (end as usize).div_ceil(blk_size))?;

    let mut bytes_written = 0;
    let mut current_offset = offset as usize;
    while bytes_written < buffer.len() {
        let slot = current_offset / blk_size;
        let start = current_offset % blk_size;
        let chunk = (blk_size - start).min(buffer.len() - bytes_written);
        let segment = inode.data[slot].as_deref_mut().ok_or_else(|| {
            FsError::Corruption(format!("inode {} has no segment for slot {}", inode.ino, slot))
        })?;
        segment[start..start + chunk].copy_from_slice(&buffer[bytes_written..bytes_written + chunk]);
        bytes_written += chunk;
        current_offset += chunk;
    }

    if end > size {
        inode.size = end as u32;
    }
    Ok(bytes_written)
}

/// Resizes a file. Shrinking frees the blocks past the new end and zeroes the rest of the last one;
/// growing fills the gap with zeroed blocks.
pub fn ftruncate(superblock: &mut SuperBlock, inode: &mut Inode, new_size: u64) -> Result<()> {
    check_regular(inode)?;
    if new_size > max_file_size(superblock) {
        return Err(FsError::FileTooLarge);
    }

    let blk_size = superblock.blk_size as usize;
    let keep = (new_size as usize).div_ceil(blk_size);
    if new_size < inode.size as u64 {
        for slot in keep..DATA_PER_FILE {
            if let Some(block) = inode.blk_pointers[slot].take() {
                free_data_block(superblock, block)?;
                inode.allocated -= 1;
                inode.data[slot] = None;
            }
        }
        let tail = new_size as usize % blk_size;
        if tail != 0 {
            if let Some(segment) = inode.data[keep - 1].as_deref_mut() {
                segment[tail..].fill(0);
            }
        }
    } else {
        ensure_slots(superblock, inode, keep)?;
    }
    inode.size = new_size as u32;
    log::debug!("[file] inode {} truncated to {} bytes", inode.ino, new_size);
    Ok(())
}
