pub const MAGIC: u32 = 0x5441_554E; // "TAUN" in ASCII

pub const SUPER_OFFSET: u64 = 0; // Byte offset of the superblock record
pub const ROOT_INODE_ID: u32 = 0; // Inode ID for the root directory
pub const ROOT_NAME: &str = "/";

pub const DATA_PER_FILE: usize = 6; // Block pointers per inode
pub const INODE_PER_FILE: usize = 1; // Inode table share of a file when sizing the inode count
pub const NULL_BLOCK: u32 = u32::MAX; // On-disk sentinel for an unused block pointer

pub const INODE_SIZE: usize = 256; // Size of an inode table slot
pub const MAX_PATH_LEN: usize = 128; // Symlink target length
pub const DIR_ENTRY_SIZE: usize = 128; // Size of a directory entry (name + inode ID + file type)
pub const MAX_FILE_NAME_LEN: usize = DIR_ENTRY_SIZE - 8;

pub const DEFAULT_PERM: u32 = 0o777;
