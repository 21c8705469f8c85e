//! Path resolution over the resident dentry tree.

use crate::directory::{Dentry, find_child};
use crate::driver::Driver;
use crate::error::{FsError, Result};
use crate::inode::{Inode, read_inode};
use crate::{BlockDevice, SuperBlock};

/// Outcome of a lookup.
/// `trail` holds the child indices leading from the root to the returned dentry:
/// the target itself when `found`, otherwise the deepest existing ancestor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    pub found: bool,
    pub is_root: bool,
    pub trail: Vec<usize>,
}

impl Lookup {
    fn miss(trail: Vec<usize>) -> Self {
        Self {
            found: false,
            is_root: false,
            trail,
        }
    }

    /// Number of path components the returned dentry sits below the root.
    pub fn depth(&self) -> usize {
        self.trail.len()
    }
}

/// Splits a path into its components. Empty components are skipped, so "/a//b/" is ["a", "b"].
pub fn levels(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Splits a path into (parent path, file name).
pub fn split(path: &str) -> (String, &str) {
    let mut levels = levels(path);
    let name = levels.pop().unwrap_or("");
    (format!("/{}", levels.join("/")), name)
}

/// Materializes the inode of `dentry` if it has not been read yet.
pub(crate) fn ensure_loaded<'a, D: BlockDevice>(
    driver: &Driver<D>,
    superblock: &mut SuperBlock,
    dentry: &'a mut Dentry,
) -> Result<&'a mut Inode> {
    if dentry.inode.is_none() {
        let inode = read_inode(driver, superblock, dentry, dentry.ino)?;
        dentry.inode = Some(Box::new(inode));
    }
    dentry
        .inode
        .as_deref_mut()
        .ok_or_else(|| FsError::Corruption(format!("inode {} failed to load", dentry.ino)))
}

/// Walks `path` from the root, reading inodes on the way down as needed.
pub fn lookup<D: BlockDevice>(
    driver: &Driver<D>,
    superblock: &mut SuperBlock,
    root: &mut Dentry,
    path: &str,
) -> Result<Lookup> {
    let levels = levels(path);
    let mut trail = Vec::with_capacity(levels.len());
    let mut cursor = root;

    for fname in &levels {
        let inode = ensure_loaded(driver, superblock, cursor)?;
        if !inode.is_dir() {
            log::trace!("[path] '{}' is not a directory, stopping at '{}'", inode.dentry_name, fname);
            return Ok(Lookup::miss(trail));
        }
        let Some(index) = find_child(inode, fname) else {
            log::trace!("[path] '{}' has no entry '{}'", inode.dentry_name, fname);
            return Ok(Lookup::miss(trail));
        };
        trail.push(index);
        cursor = &mut inode.children[index];
    }

    ensure_loaded(driver, superblock, cursor)?;
    Ok(Lookup {
        found: true,
        is_root: trail.is_empty(),
        trail,
    })
}

pub fn resolve<'a>(root: &'a Dentry, trail: &[usize]) -> Option<&'a Dentry> {
    trail
        .iter()
        .try_fold(root, |dentry, &index| dentry.inode()?.children.get(index))
}

pub fn resolve_mut<'a>(root: &'a mut Dentry, trail: &[usize]) -> Option<&'a mut Dentry> {
    let mut cursor = root;
    for &index in trail {
        cursor = cursor.inode.as_deref_mut()?.children.get_mut(index)?;
    }
    Some(cursor)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_levels() {
        assert!(levels("/").is_empty());
        assert!(levels("").is_empty());
        assert_eq!(levels("/a/b.txt"), vec!["a", "b.txt"]);
        assert_eq!(levels("//a///b/"), vec!["a", "b"]);
    }

    #[test]
    fn test_split() {
        assert_eq!(split("/a/b/c.txt"), ("/a/b".to_string(), "c.txt"));
        assert_eq!(split("/c.txt"), ("/".to_string(), "c.txt"));
        assert_eq!(split("/"), ("/".to_string(), ""));
    }
}
