use std::collections::HashSet;
use std::sync::Arc;

use crate::bitmap::free_inode_id;
use crate::config::*;
use crate::directory::{check_insert, child_at, dir_capacity, insert_child, remove_child};
use crate::driver::Driver;
use crate::error::{FsError, Result};
use crate::file::{fread, ftruncate, fwrite};
use crate::inode::{alloc_inode, drop_inode, read_inode, sync_inode};
use crate::path::{self, Lookup, ensure_loaded, resolve, resolve_mut};
use crate::superblock::{open_or_initialize, persist};
use crate::{BlockDevice, Dentry, FileType, Inode, SuperBlock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Exists,
    Read,
    Write,
    Execute,
}

/// Attributes reported for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub ino: u32,
    pub ftype: FileType,
    pub mode: u32,
    pub nlink: u32,
    pub size: u64,
    pub blksize: u32,
    pub blocks: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub ino: u32,
    pub ftype: FileType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStats {
    pub blk_size: u32,
    pub total_blocks: u32,
    pub free_blocks: u32,
    pub total_inodes: u32,
    pub free_inodes: u32,
    pub name_max: u32,
}

fn stale(trail: &[usize]) -> FsError {
    FsError::Corruption(format!("lookup trail {trail:?} no longer resolves"))
}

fn inode_ref<'a>(root: &'a Dentry, trail: &[usize]) -> Result<&'a Inode> {
    resolve(root, trail)
        .and_then(|dentry| dentry.inode())
        .ok_or_else(|| stale(trail))
}

fn inode_mut<'a>(root: &'a mut Dentry, trail: &[usize]) -> Result<&'a mut Inode> {
    resolve_mut(root, trail)
        .and_then(|dentry| dentry.inode_mut())
        .ok_or_else(|| stale(trail))
}

fn file_mode(ftype: FileType) -> u32 {
    let kind = match ftype {
        FileType::Regular => libc::S_IFREG,
        FileType::Directory => libc::S_IFDIR,
        FileType::Symlink => libc::S_IFLNK,
    };
    kind as u32 | DEFAULT_PERM
}

/// A mounted filesystem. Owns the driver, the superblock with both bitmaps, and the resident tree.
/// Calls must be serialized by the host.
#[derive(Debug)]
pub struct FileSystem<D: BlockDevice> {
    driver: Driver<D>,
    superblock: SuperBlock,
    root: Dentry,
}

impl<D: BlockDevice> FileSystem<D> {
    /// Mounts the device, laying out a new filesystem first when no valid superblock is found.
    pub fn mount(device: Arc<D>) -> Result<Self> {
        let driver = Driver::new(device);
        let (mut superblock, fresh) = open_or_initialize(&driver)?;
        let mut root = Dentry::root();

        if fresh {
            let ino = alloc_inode(&mut superblock, &mut root)?;
            if ino != ROOT_INODE_ID {
                return Err(FsError::Corruption(format!("root was given inode {ino}")));
            }
            if let Some(inode) = root.inode() {
                sync_inode(&driver, &superblock, inode)?;
            }
            persist(&driver, &superblock)?;
        } else {
            let inode = ensure_loaded(&driver, &mut superblock, &mut root)?;
            if !inode.is_dir() {
                return Err(FsError::Corruption("root inode is not a directory".into()));
            }
        }

        log::info!(
            "[fs] mounted{}: {} of {} inodes in use",
            if fresh { " fresh device" } else { "" },
            superblock.inode_map.count_set(),
            superblock.max_ino
        );
        Ok(Self {
            driver,
            superblock,
            root,
        })
    }

    /// Writes the whole resident tree, the superblock and both bitmaps back to the device.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(inode) = self.root.inode() {
            sync_inode(&self.driver, &self.superblock, inode)?;
        }
        persist(&self.driver, &self.superblock)
    }

    pub fn unmount(mut self) -> Result<()> {
        self.flush()?;
        self.superblock.is_mounted = false;
        log::info!("[fs] unmounted, {} bytes of data in use", self.superblock.usage_size);
        Ok(())
    }

    pub fn lookup(&mut self, path: &str) -> Result<Lookup> {
        path::lookup(&self.driver, &mut self.superblock, &mut self.root, path)
    }

    /// The dentry a lookup ended on.
    pub fn dentry(&self, lookup: &Lookup) -> Option<&Dentry> {
        resolve(&self.root, &lookup.trail)
    }

    fn target(&mut self, path: &str) -> Result<Lookup> {
        let lookup = self.lookup(path)?;
        if !lookup.found {
            return Err(FsError::NotFound);
        }
        Ok(lookup)
    }

    /// Creates an entry of type `ftype`. Every directory above it must already exist.
    /// Returns the new inode ID.
    pub fn mknod(&mut self, path: &str, ftype: FileType) -> Result<u32> {
        let levels = path::levels(path);
        let Some(&name) = levels.last() else {
            return Err(FsError::AlreadyExists);
        };
        let lookup = self.lookup(path)?;
        if lookup.found {
            return Err(FsError::AlreadyExists);
        }
        let parent = inode_ref(&self.root, &lookup.trail)?;
        if !parent.is_dir() {
            return Err(FsError::Unsupported);
        }
        if lookup.depth() + 1 != levels.len() {
            return Err(FsError::NotFound);
        }
        check_insert(&self.superblock, parent, name)?;

        let Self {
            superblock, root, ..
        } = self;
        let parent = inode_mut(root, &lookup.trail)?;
        let mut dentry = Dentry::unassigned(name, ftype);
        let ino = alloc_inode(superblock, &mut dentry)?;
        if let Err(err) = insert_child(superblock, parent, dentry, true) {
            free_inode_id(superblock, ino)?;
            return Err(err);
        }
        log::debug!("[fs] created {:?} '{}' as inode {}", ftype, path, ino);
        Ok(ino)
    }

    pub fn mkdir(&mut self, path: &str) -> Result<u32> {
        self.mknod(path, FileType::Directory)
    }

    pub fn symlink(&mut self, target: &str, path: &str) -> Result<u32> {
        if target.len() > MAX_PATH_LEN {
            return Err(FsError::NameTooLong);
        }
        let ino = self.mknod(path, FileType::Symlink)?;
        let lookup = self.target(path)?;
        let inode = inode_mut(&mut self.root, &lookup.trail)?;
        inode.target_path = target.to_string();
        inode.size = target.len() as u32;
        Ok(ino)
    }

    pub fn readlink(&mut self, path: &str) -> Result<String> {
        let lookup = self.target(path)?;
        let inode = inode_ref(&self.root, &lookup.trail)?;
        if inode.ftype != FileType::Symlink {
            return Err(FsError::InvalidArgument("not a symbolic link"));
        }
        Ok(inode.target_path.clone())
    }

    pub fn stat(&mut self, path: &str) -> Result<Stat> {
        let lookup = self.target(path)?;
        let inode = inode_ref(&self.root, &lookup.trail)?;
        let sb = &self.superblock;
        let (size, nlink, blocks) = if lookup.is_root {
            (sb.usage_size, 2, sb.disk_size / sb.blk_size as u64)
        } else {
            (inode.size as u64, inode.link, inode.allocated as u64)
        };
        Ok(Stat {
            ino: inode.ino,
            ftype: inode.ftype,
            mode: file_mode(inode.ftype),
            nlink,
            size,
            blksize: sb.blk_size,
            blocks,
        })
    }

    /// Name of the entry at position `index`, or None past the last entry.
    pub fn readdir(&mut self, path: &str, index: usize) -> Result<Option<String>> {
        let lookup = self.target(path)?;
        let inode = inode_ref(&self.root, &lookup.trail)?;
        if !inode.is_dir() {
            return Err(FsError::NotDirectory);
        }
        Ok(child_at(inode, index).map(|child| child.name.clone()))
    }

    pub fn read_dir(&mut self, path: &str) -> Result<Vec<DirEntry>> {
        let lookup = self.target(path)?;
        let inode = inode_ref(&self.root, &lookup.trail)?;
        if !inode.is_dir() {
            return Err(FsError::NotDirectory);
        }
        Ok(inode
            .children
            .iter()
            .map(|child| DirEntry {
                name: child.name.clone(),
                ino: child.ino,
                ftype: child.ftype,
            })
            .collect())
    }

    pub fn read(&mut self, path: &str, buf: &mut [u8], offset: u64) -> Result<usize> {
        let lookup = self.target(path)?;
        let inode = inode_ref(&self.root, &lookup.trail)?;
        fread(&self.superblock, inode, offset, buf)
    }

    /// Writes `buf` at `offset` and flushes the file's record and data right away.
    pub fn write(&mut self, path: &str, buf: &[u8], offset: u64) -> Result<usize> {
        let lookup = self.target(path)?;
        let Self {
            driver,
            superblock,
            root,
        } = self;
        let inode = inode_mut(root, &lookup.trail)?;
        let written = fwrite(superblock, inode, offset, buf)?;
        sync_inode(driver, superblock, inode)?;
        log::trace!("[fs] wrote {} bytes to '{}' at {}", written, path, offset);
        Ok(written)
    }

    pub fn truncate(&mut self, path: &str, size: u64) -> Result<()> {
        let lookup = self.target(path)?;
        let Self {
            driver,
            superblock,
            root,
        } = self;
        let inode = inode_mut(root, &lookup.trail)?;
        ftruncate(superblock, inode, size)?;
        sync_inode(driver, superblock, inode)
    }

    /// Detaches the entry a lookup found and releases everything below it.
    fn remove_at(&mut self, lookup: &Lookup) -> Result<()> {
        let Some((_, parent_trail)) = lookup.trail.split_last() else {
            return Err(FsError::InvalidArgument("the root directory cannot be removed"));
        };
        let Self {
            driver,
            superblock,
            root,
        } = self;
        let name = resolve(root, &lookup.trail)
            .map(|dentry| dentry.name.clone())
            .ok_or_else(|| stale(&lookup.trail))?;
        let parent = inode_mut(root, parent_trail)?;
        let mut child = remove_child(parent, &name)?;
        let inode = match child.inode.take() {
            Some(inode) => *inode,
            None => read_inode(driver, superblock, &child, child.ino)?,
        };
        drop_inode(driver, superblock, inode)
    }

    pub fn unlink(&mut self, path: &str) -> Result<()> {
        let lookup = self.target(path)?;
        if inode_ref(&self.root, &lookup.trail)?.is_dir() {
            return Err(FsError::IsDirectory);
        }
        self.remove_at(&lookup)?;
        log::debug!("[fs] unlinked '{}'", path);
        Ok(())
    }

    /// Removes a directory together with everything inside it.
    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        let lookup = self.target(path)?;
        if lookup.is_root {
            return Err(FsError::InvalidArgument("the root directory cannot be removed"));
        }
        if !inode_ref(&self.root, &lookup.trail)?.is_dir() {
            return Err(FsError::NotDirectory);
        }
        self.remove_at(&lookup)?;
        log::debug!("[fs] removed directory '{}'", path);
        Ok(())
    }

    /// Moves an entry to `to`, keeping its inode.
    /// An existing non-directory at `to` is replaced when the source is not a directory either.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let src_levels = path::levels(from);
        let dst_levels = path::levels(to);
        let src = self.target(from)?;
        if src.is_root {
            return Err(FsError::InvalidArgument("the root directory cannot be moved"));
        }
        if src_levels == dst_levels {
            return Ok(());
        }
        let Some(&name) = dst_levels.last() else {
            return Err(FsError::AlreadyExists);
        };
        let src_ftype = inode_ref(&self.root, &src.trail)?.ftype;
        if src_ftype == FileType::Directory && dst_levels.starts_with(&src_levels) {
            return Err(FsError::InvalidArgument("cannot move a directory below itself"));
        }
        if name.len() > MAX_FILE_NAME_LEN {
            return Err(FsError::NameTooLong);
        }

        let dst = self.lookup(to)?;
        if dst.found {
            let dst_ftype = inode_ref(&self.root, &dst.trail)?.ftype;
            if src_ftype == FileType::Directory || dst_ftype == FileType::Directory {
                return Err(FsError::AlreadyExists);
            }
            self.remove_at(&dst)?;
            log::debug!("[fs] rename replaced '{}'", to);
        } else {
            if !inode_ref(&self.root, &dst.trail)?.is_dir() {
                return Err(FsError::Unsupported);
            }
            if dst.depth() + 1 != dst_levels.len() {
                return Err(FsError::NotFound);
            }
            let same_parent = src.trail[..src.depth() - 1] == dst.trail[..];
            if !same_parent {
                check_insert(&self.superblock, inode_ref(&self.root, &dst.trail)?, name)?;
            }
        }

        // Indices may have shifted, resolve both ends again.
        let src = self.target(from)?;
        let (_, src_parent_trail) = src.trail.split_last().ok_or_else(|| stale(&src.trail))?;
        let src_name = resolve(&self.root, &src.trail)
            .map(|dentry| dentry.name.clone())
            .ok_or_else(|| stale(&src.trail))?;
        let mut moved = remove_child(inode_mut(&mut self.root, src_parent_trail)?, &src_name)?;
        moved.name = name.to_string();
        if let Some(inode) = moved.inode_mut() {
            inode.dentry_name = name.to_string();
        }

        let dst = self.lookup(to)?;
        let Self {
            superblock, root, ..
        } = self;
        let ino = moved.ino;
        insert_child(superblock, inode_mut(root, &dst.trail)?, moved, true)?;
        log::debug!("[fs] renamed '{}' to '{}' (inode {})", from, to, ino);
        Ok(())
    }

    /// Every permission is granted, only existence is checked.
    pub fn access(&mut self, path: &str, mode: AccessMode) -> Result<()> {
        let lookup = self.lookup(path)?;
        if !lookup.found {
            log::debug!("[fs] access {:?} denied for missing '{}'", mode, path);
            return Err(FsError::AccessDenied);
        }
        Ok(())
    }

    pub fn statfs(&self) -> FsStats {
        let sb = &self.superblock;
        FsStats {
            blk_size: sb.blk_size,
            total_blocks: sb.data_map.max(),
            free_blocks: sb.data_map.max() - sb.data_map.count_set(),
            total_inodes: sb.inode_map.max(),
            free_inodes: sb.inode_map.max() - sb.inode_map.count_set(),
            name_max: MAX_FILE_NAME_LEN as u32,
        }
    }

    /// Cross-checks the resident tree against both bitmaps.
    /// When every inode is resident the bitmaps must also hold no other bits.
    pub fn check_consistency(&self) -> Result<()> {
        let mut inodes = HashSet::new();
        let mut blocks = HashSet::new();
        let mut complete = true;
        let root = self
            .root
            .inode()
            .ok_or_else(|| FsError::Corruption("root inode is not resident".into()))?;
        self.check_inode(root, &mut inodes, &mut blocks, &mut complete)?;

        if complete {
            let sb = &self.superblock;
            if sb.inode_map.count_set() as usize != inodes.len() {
                return Err(FsError::Corruption(format!(
                    "{} inode bits set for {} inodes",
                    sb.inode_map.count_set(),
                    inodes.len()
                )));
            }
            if sb.data_map.count_set() as usize != blocks.len() {
                return Err(FsError::Corruption(format!(
                    "{} data bits set for {} referenced blocks",
                    sb.data_map.count_set(),
                    blocks.len()
                )));
            }
            if sb.usage_size != sb.blks_sz(blocks.len() as u32) {
                return Err(FsError::Corruption("usage size disagrees with the data bitmap".into()));
            }
        }
        Ok(())
    }

    fn check_inode(
        &self,
        inode: &Inode,
        inodes: &mut HashSet<u32>,
        blocks: &mut HashSet<u32>,
        complete: &mut bool,
    ) -> Result<()> {
        let sb = &self.superblock;
        if !sb.inode_map.is_set(inode.ino) || !inodes.insert(inode.ino) {
            return Err(FsError::Corruption(format!("inode {} is not uniquely allocated", inode.ino)));
        }
        let used = inode.blk_pointers.iter().flatten().count() as u32;
        if used != inode.allocated {
            return Err(FsError::Corruption(format!(
                "inode {} counts {} blocks but holds {}",
                inode.ino, inode.allocated, used
            )));
        }
        for &block in inode.blk_pointers.iter().flatten() {
            if !sb.data_map.is_set(block) || !blocks.insert(block) {
                return Err(FsError::Corruption(format!("block {block} is not uniquely allocated")));
            }
        }

        if inode.is_dir() {
            let needed = inode.children.len().div_ceil(sb.dentries_per_blk());
            if inode.children.len() > dir_capacity(sb) || (inode.allocated as usize) < needed {
                return Err(FsError::Corruption(format!(
                    "directory {} holds {} entries in {} blocks",
                    inode.ino,
                    inode.children.len(),
                    inode.allocated
                )));
            }
            for child in &inode.children {
                if child.parent != Some(inode.ino) {
                    return Err(FsError::Corruption(format!("'{}' has a stale parent", child.name)));
                }
                match child.inode() {
                    Some(child_inode) if child_inode.ino == child.ino => {
                        self.check_inode(child_inode, inodes, blocks, complete)?;
                    }
                    Some(_) => {
                        return Err(FsError::Corruption(format!("'{}' owns a foreign inode", child.name)));
                    }
                    None => *complete = false,
                }
            }
        } else if inode.ftype == FileType::Regular && inode.size as u64 > sb.blks_sz(inode.allocated) {
            return Err(FsError::Corruption(format!(
                "inode {} is larger than its blocks",
                inode.ino
            )));
        }
        Ok(())
    }

    pub fn root_inode_id(&self) -> u32 {
        ROOT_INODE_ID
    }

    pub fn root(&self) -> &Dentry {
        &self.root
    }

    pub fn superblock(&self) -> &SuperBlock {
        &self.superblock
    }

    pub fn device(&self) -> Arc<D> {
        self.driver.device()
    }
}
