//! Conversion between on-disk inode records and resident inodes,
//! including the recursive flush and the recursive release of a subtree.

use crate::bitmap::{alloc_inode_id, free_data_block, free_inode_id};
use crate::config::*;
use crate::directory::{Dentry, insert_child};
use crate::driver::Driver;
use crate::error::{FsError, Result};
use crate::structs::{DiskDirEntry, DiskInode, FileType, decode_name, encode_name};
use crate::{BlockDevice, SuperBlock};

#[derive(Debug)]
pub struct Inode {
    pub ino: u32,
    pub size: u32,
    pub blk_pointers: [Option<u32>; DATA_PER_FILE],
    pub allocated: u32, // Number of Some slots in blk_pointers
    pub link: u32,
    pub ftype: FileType,
    pub target_path: String,
    /// Entries of a directory, most recently added first.
    pub children: Vec<Dentry>,
    /// Contents of a regular file or symlink, one segment per used block pointer.
    pub data: [Option<Box<[u8]>>; DATA_PER_FILE],
    /// Name of the owning dentry, for diagnostics only.
    pub dentry_name: String,
}

impl Inode {
    pub fn new(ino: u32, ftype: FileType, dentry_name: &str) -> Self {
        Self {
            ino,
            size: 0,
            blk_pointers: [None; DATA_PER_FILE],
            allocated: 0,
            link: 1,
            ftype,
            target_path: String::new(),
            children: Vec::new(),
            data: Default::default(),
            dentry_name: dentry_name.to_string(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.ftype == FileType::Directory
    }

    pub fn dir_cnt(&self) -> u32 {
        self.children.len() as u32
    }

    /// Records a freshly allocated data block in the slot.
    pub(crate) fn attach_block(&mut self, slot: usize, block: u32, blk_size: usize) {
        self.blk_pointers[slot] = Some(block);
        self.allocated += 1;
        if !self.is_dir() {
            self.data[slot] = Some(vec![0u8; blk_size].into_boxed_slice());
        }
    }

    /// Gives back every data block of the inode.
    pub(crate) fn release_blocks(&mut self, superblock: &mut SuperBlock) -> Result<()> {
        for slot in 0..DATA_PER_FILE {
            if let Some(block) = self.blk_pointers[slot].take() {
                free_data_block(superblock, block)?;
                self.allocated -= 1;
            }
            self.data[slot] = None;
        }
        Ok(())
    }

    fn to_disk(&self) -> Result<DiskInode> {
        Ok(DiskInode {
            ino: self.ino,
            size: self.size,
            blk_pointers: self.blk_pointers.map(|ptr| ptr.unwrap_or(NULL_BLOCK)),
            allocated: self.allocated,
            link: self.link,
            target_path: encode_name(&self.target_path)?,
            ftype: self.ftype,
            dir_cnt: self.dir_cnt(),
        })
    }
}

/// Allocates an inode for a dentry that has just been created, and attaches it.
/// Returns the new inode ID.
pub fn alloc_inode(superblock: &mut SuperBlock, dentry: &mut Dentry) -> Result<u32> {
    let ino = alloc_inode_id(superblock)?;
    dentry.ino = ino;
    dentry.inode = Some(Box::new(Inode::new(ino, dentry.ftype, &dentry.name)));
    log::debug!("[inode] allocated inode {} for '{}'", ino, dentry.name);
    Ok(ino)
}

/// Reads inode `ino` from the inode table, together with its directory entries or file data.
pub fn read_inode<D: BlockDevice>(
    driver: &Driver<D>,
    superblock: &mut SuperBlock,
    dentry: &Dentry,
    ino: u32,
) -> Result<Inode> {
    if ino >= superblock.max_ino {
        return Err(FsError::Corruption(format!("inode {ino} is out of range")));
    }
    let buf = driver.read(superblock.inode_offset(ino), DiskInode::SIZE)?;
    let disk = DiskInode::decode(&buf)?;
    if disk.ino != ino {
        return Err(FsError::Corruption(format!(
            "inode slot {ino} holds a record for inode {}",
            disk.ino
        )));
    }

    let mut inode = Inode::new(ino, disk.ftype, &dentry.name);
    inode.size = disk.size;
    inode.link = disk.link;
    inode.target_path = decode_name(&disk.target_path)?;
    for (slot, &ptr) in disk.blk_pointers.iter().enumerate() {
        if ptr == NULL_BLOCK {
            continue;
        }
        if ptr >= superblock.layout.data.blocks {
            return Err(FsError::Corruption(format!("inode {ino} points at block {ptr}")));
        }
        inode.blk_pointers[slot] = Some(ptr);
        inode.allocated += 1;
    }
    if inode.allocated != disk.allocated {
        return Err(FsError::Corruption(format!(
            "inode {ino} claims {} blocks but references {}",
            disk.allocated, inode.allocated
        )));
    }

    let blk_size = superblock.blk_size as usize;
    if inode.is_dir() {
        let per_blk = superblock.dentries_per_blk();
        let mut remaining = disk.dir_cnt as usize;
        let mut records = Vec::with_capacity(remaining);
        for slot in 0..DATA_PER_FILE {
            if remaining == 0 {
                break;
            }
            let block = inode.blk_pointers[slot].ok_or_else(|| {
                FsError::Corruption(format!("directory {ino} is missing block slot {slot}"))
            })?;
            let block_buf = driver.read(superblock.data_offset(block), blk_size)?;
            for raw in block_buf.chunks_exact(DiskDirEntry::SIZE).take(per_blk.min(remaining)) {
                records.push(DiskDirEntry::decode(raw)?);
                remaining -= 1;
            }
        }
        if remaining != 0 {
            return Err(FsError::Corruption(format!(
                "directory {ino} lists more entries than its blocks hold"
            )));
        }
        // Entries are stored head first, prepending them in reverse restores the order.
        for record in records.iter().rev() {
            let child = Dentry::new(&record.name()?, record.ino, record.ftype);
            insert_child(superblock, &mut inode, child, false)?;
        }
        log::trace!("[inode] read directory {} with {} entries", ino, inode.dir_cnt());
    } else {
        if inode.ftype == FileType::Regular && inode.size as u64 > superblock.blks_sz(inode.allocated) {
            return Err(FsError::Corruption(format!(
                "inode {ino} is {} bytes but holds {} blocks",
                inode.size, inode.allocated
            )));
        }
        for slot in 0..DATA_PER_FILE {
            if let Some(block) = inode.blk_pointers[slot] {
                let segment = driver.read(superblock.data_offset(block), blk_size)?;
                inode.data[slot] = Some(segment.into_boxed_slice());
            }
        }
        log::trace!("[inode] read file {} of {} bytes", ino, inode.size);
    }

    Ok(inode)
}

/// Writes an inode and everything below it back to the device.
pub fn sync_inode<D: BlockDevice>(
    driver: &Driver<D>,
    superblock: &SuperBlock,
    inode: &Inode,
) -> Result<()> {
    driver.write(superblock.inode_offset(inode.ino), &inode.to_disk()?.encode()?)?;

    if inode.is_dir() {
        let per_blk = superblock.dentries_per_blk();
        for (slot, chunk) in inode.children.chunks(per_blk).enumerate() {
            let block = inode.blk_pointers.get(slot).copied().flatten().ok_or_else(|| {
                FsError::Corruption(format!(
                    "directory {} has entries beyond its allocated blocks",
                    inode.ino
                ))
            })?;
            let mut block_buf = Vec::with_capacity(chunk.len() * DiskDirEntry::SIZE);
            for child in chunk {
                DiskDirEntry::new(&child.name, child.ino, child.ftype)?.write_to(&mut block_buf)?;
            }
            driver.write(superblock.data_offset(block), &block_buf)?;
        }
        for child in &inode.children {
            if let Some(child_inode) = child.inode() {
                sync_inode(driver, superblock, child_inode)?;
            }
        }
    } else {
        for (ptr, segment) in inode.blk_pointers.iter().zip(&inode.data) {
            if let (Some(block), Some(segment)) = (ptr, segment) {
                driver.write(superblock.data_offset(*block), segment)?;
            }
        }
    }
    Ok(())
}

/// Releases an inode: its data blocks, its inode ID and, for a directory, the whole subtree.
/// Children that were never loaded are read first so their blocks can be freed.
pub fn drop_inode<D: BlockDevice>(
    driver: &Driver<D>,
    superblock: &mut SuperBlock,
    mut inode: Inode,
) -> Result<()> {
    if inode.ino == ROOT_INODE_ID {
        return Err(FsError::InvalidArgument("the root inode cannot be dropped"));
    }

    if inode.is_dir() {
        for mut child in std::mem::take(&mut inode.children) {
            let child_inode = match child.inode.take() {
                Some(child_inode) => *child_inode,
                None => read_inode(driver, superblock, &child, child.ino)?,
            };
            drop_inode(driver, superblock, child_inode)?;
        }
    }
    inode.release_blocks(superblock)?;
    free_inode_id(superblock, inode.ino)?;
    log::debug!("[inode] dropped inode {} ('{}')", inode.ino, inode.dentry_name);
    Ok(())
}
