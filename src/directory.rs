//! The resident dentry tree.
//! A directory inode owns its children; each child dentry owns its inode once it is loaded.

use crate::bitmap::alloc_data_block;
use crate::config::*;
use crate::error::{FsError, Result};
use crate::{FileType, Inode, SuperBlock};

const UNASSIGNED_INO: u32 = u32::MAX;

#[derive(Debug)]
pub struct Dentry {
    pub name: String,
    pub ino: u32,
    pub ftype: FileType,
    pub parent: Option<u32>, // Inode ID of the containing directory, None for the root
    pub(crate) inode: Option<Box<Inode>>,
}

impl Dentry {
    pub fn new(name: &str, ino: u32, ftype: FileType) -> Self {
        Self {
            name: name.to_string(),
            ino,
            ftype,
            parent: None,
            inode: None,
        }
    }

    /// A dentry waiting for `alloc_inode`.
    pub fn unassigned(name: &str, ftype: FileType) -> Self {
        Self::new(name, UNASSIGNED_INO, ftype)
    }

    pub fn root() -> Self {
        Self::new(ROOT_NAME, ROOT_INODE_ID, FileType::Directory)
    }

    pub fn is_dir(&self) -> bool {
        self.ftype == FileType::Directory
    }

    pub fn is_loaded(&self) -> bool {
        self.inode.is_some()
    }

    pub fn inode(&self) -> Option<&Inode> {
        self.inode.as_deref()
    }

    pub fn inode_mut(&mut self) -> Option<&mut Inode> {
        self.inode.as_deref_mut()
    }
}

pub fn find_child(parent: &Inode, name: &str) -> Option<usize> {
    parent.children.iter().position(|child| child.name == name)
}

pub fn child_at(parent: &Inode, index: usize) -> Option<&Dentry> {
    parent.children.get(index)
}

/// Highest number of entries a directory can reference.
pub fn dir_capacity(superblock: &SuperBlock) -> usize {
    DATA_PER_FILE * superblock.dentries_per_blk()
}

/// Checks whether `name` could be added below `parent` without changing anything.
pub fn check_insert(superblock: &SuperBlock, parent: &Inode, name: &str) -> Result<()> {
    if !parent.is_dir() {
        return Err(FsError::NotDirectory);
    }
    if name.is_empty() || name.contains('/') {
        return Err(FsError::InvalidArgument("invalid file name"));
    }
    if name.len() > MAX_FILE_NAME_LEN {
        return Err(FsError::NameTooLong);
    }
    if find_child(parent, name).is_some() {
        return Err(FsError::AlreadyExists);
    }
    let count = parent.children.len() + 1;
    if count > dir_capacity(superblock) {
        return Err(FsError::NoSpace);
    }
    let slot = (count - 1) / superblock.dentries_per_blk();
    if parent.blk_pointers[slot].is_none() && superblock.data_map.is_exhausted() {
        return Err(FsError::NoSpace);
    }
    Ok(())
}

/// Prepends `dentry` to the children of `parent`.
/// With `reserve_block`, a data block is claimed whenever the new entry starts a fresh block slot.
/// Nothing is modified when an error is returned.
pub fn insert_child(
    superblock: &mut SuperBlock,
    parent: &mut Inode,
    mut dentry: Dentry,
    reserve_block: bool,
) -> Result<()> {
    if reserve_block {
        check_insert(superblock, parent, &dentry.name)?;
        let per_blk = superblock.dentries_per_blk();
        let count = parent.children.len() + 1;
        let slot = (count - 1) / per_blk;
        if (count - 1) % per_blk == 0 && parent.blk_pointers[slot].is_none() {
            let block = alloc_data_block(superblock)?;
            parent.attach_block(slot, block, superblock.blk_size as usize);
            log::trace!("[directory] directory {} grew to block slot {}", parent.ino, slot);
        }
    }
    dentry.parent = Some(parent.ino);
    parent.children.insert(0, dentry);
    parent.size = parent.dir_cnt() * DIR_ENTRY_SIZE as u32;
    Ok(())
}

/// Detaches the child called `name` and hands it back.
/// Its inode and data blocks stay allocated, releasing them is the caller's job.
pub fn remove_child(parent: &mut Inode, name: &str) -> Result<Dentry> {
    if !parent.is_dir() {
        return Err(FsError::NotDirectory);
    }
    let index = find_child(parent, name).ok_or(FsError::NotFound)?;
    let mut dentry = parent.children.remove(index);
    dentry.parent = None;
    parent.size = parent.dir_cnt() * DIR_ENTRY_SIZE as u32;
    Ok(dentry)
}
