//! Tauon is a small single-mount filesystem engine for a FUSE-style host.
//! There is no journaling and no timestamps, and every entry has the same fixed mode.
//!
//! Tauon's linear layout, in blocks of twice the device's io size:
//! - Superblock
//! - Inode Bitmap
//! - Data Bitmap
//! - Inode Table
//! - Data Blocks
//!
//! Tauon's layers (from bottom to top):
//! 1. Block Device: unit-addressed transport.               | User implemented (a file image is provided)
//! 2. Driver: byte-addressed reads and writes over it.      | Fs implemented
//! 3. Superblock/Bitmap: layout and free space accounting.  | Fs implemented
//! 4. Inode: on-disk records to resident inodes and back.   | Fs implemented
//! 5. Directory/Path: the resident dentry tree and lookup.  | Fs implemented
//! 6. File: byte access to resident file segments.          | Fs implemented
//! 7. FileSystem: the mounted session the host calls into.  | Host implemented (FUSE binding, option parsing)
//!
//! Inodes are read lazily while paths are resolved and stay resident until unmount,
//! which writes the whole tree back. File writes are also flushed immediately.

mod bitmap;
mod block_dev;
mod config;
mod directory;
mod driver;
mod error;
mod file;
mod fs;
mod inode;
mod path;
mod structs;
mod superblock;

pub use bitmap::{Bitmap, alloc_data_block, free_data_block};
pub use block_dev::{BlockDevice, FileDisk};
pub use config::*;
pub use directory::*;
pub use driver::Driver;
pub use error::{FsError as Error, Result};
pub use file::*;
pub use fs::*;
pub use inode::*;
pub use path::*;
pub use structs::*;
pub use superblock::*;
