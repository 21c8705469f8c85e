//! On-disk records. All integers are little-endian; records are written field by field
//! so the layout does not depend on compiler struct layout.

use std::io::{self, Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::config::*;
use crate::error::{FsError, Result};

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Regular = 0,
    Directory = 1,
    Symlink = 2,
}

impl TryFrom<u32> for FileType {
    type Error = FsError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(FileType::Regular),
            1 => Ok(FileType::Directory),
            2 => Ok(FileType::Symlink),
            other => Err(FsError::Corruption(format!("unknown file type {other}"))),
        }
    }
}

/// A contiguous run of blocks on the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Region {
    pub offset: u32, // First block of the region
    pub blocks: u32, // Length of the region in blocks
}

impl Region {
    /// Block following the last block of the region.
    pub fn end(&self) -> u32 {
        self.offset + self.blocks
    }

    fn read_from(r: &mut impl Read) -> io::Result<Self> {
        Ok(Self {
            offset: r.read_u32::<LittleEndian>()?,
            blocks: r.read_u32::<LittleEndian>()?,
        })
    }

    fn write_to(&self, w: &mut impl Write) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.offset)?;
        w.write_u32::<LittleEndian>(self.blocks)
    }
}

/// Region layout in fixed order: superblock, inode bitmap, data bitmap, inode table, data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Layout {
    pub superblock: Region,
    pub inode_map: Region,
    pub data_map: Region,
    pub inode_table: Region,
    pub data: Region,
}

impl Layout {
    pub fn regions(&self) -> [Region; 5] {
        [self.superblock, self.inode_map, self.data_map, self.inode_table, self.data]
    }

    /// Every region starts where the previous one ends.
    pub fn is_contiguous(&self) -> bool {
        self.regions().windows(2).all(|w| w[0].end() == w[1].offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskSuperBlock {
    pub magic: u32,
    pub blk_size: u32,
    pub io_size: u32,
    pub disk_size: u64,
    pub usage_size: u64,
    pub layout: Layout,
    pub max_ino: u32,
    pub blks_nums: u32,
}

impl DiskSuperBlock {
    pub const SIZE: usize = 4 * 3 + 8 * 2 + 8 * 5 + 4 * 2;

    pub fn read_from(r: &mut impl Read) -> io::Result<Self> {
        Ok(Self {
            magic: r.read_u32::<LittleEndian>()?,
            blk_size: r.read_u32::<LittleEndian>()?,
            io_size: r.read_u32::<LittleEndian>()?,
            disk_size: r.read_u64::<LittleEndian>()?,
            usage_size: r.read_u64::<LittleEndian>()?,
            layout: Layout {
                superblock: Region::read_from(r)?,
                inode_map: Region::read_from(r)?,
                data_map: Region::read_from(r)?,
                inode_table: Region::read_from(r)?,
                data: Region::read_from(r)?,
            },
            max_ino: r.read_u32::<LittleEndian>()?,
            blks_nums: r.read_u32::<LittleEndian>()?,
        })
    }

    pub fn write_to(&self, w: &mut impl Write) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.magic)?;
        w.write_u32::<LittleEndian>(self.blk_size)?;
        w.write_u32::<LittleEndian>(self.io_size)?;
        w.write_u64::<LittleEndian>(self.disk_size)?;
        w.write_u64::<LittleEndian>(self.usage_size)?;
        for region in self.layout.regions() {
            region.write_to(w)?;
        }
        w.write_u32::<LittleEndian>(self.max_ino)?;
        w.write_u32::<LittleEndian>(self.blks_nums)
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        Ok(Self::read_from(&mut Cursor::new(buf))?)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        self.write_to(&mut buf)?;
        Ok(buf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskInode {
    pub ino: u32,
    pub size: u32,
    pub blk_pointers: [u32; DATA_PER_FILE], // NULL_BLOCK marks an unused slot
    pub allocated: u32,
    pub link: u32,
    pub target_path: [u8; MAX_PATH_LEN],
    pub ftype: FileType,
    pub dir_cnt: u32,
}

impl DiskInode {
    pub const SIZE: usize = INODE_SIZE;
    const USED: usize = 4 * 2 + 4 * DATA_PER_FILE + 4 * 2 + MAX_PATH_LEN + 4 * 2;

    pub fn read_from(r: &mut impl Read) -> Result<Self> {
        let ino = r.read_u32::<LittleEndian>()?;
        let size = r.read_u32::<LittleEndian>()?;
        let mut blk_pointers = [NULL_BLOCK; DATA_PER_FILE];
        for ptr in blk_pointers.iter_mut() {
            *ptr = r.read_u32::<LittleEndian>()?;
        }
        let allocated = r.read_u32::<LittleEndian>()?;
        let link = r.read_u32::<LittleEndian>()?;
        let mut target_path = [0u8; MAX_PATH_LEN];
        r.read_exact(&mut target_path)?;
        let ftype = FileType::try_from(r.read_u32::<LittleEndian>()?)?;
        let dir_cnt = r.read_u32::<LittleEndian>()?;
        Ok(Self {
            ino,
            size,
            blk_pointers,
            allocated,
            link,
            target_path,
            ftype,
            dir_cnt,
        })
    }

    pub fn write_to(&self, w: &mut impl Write) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.ino)?;
        w.write_u32::<LittleEndian>(self.size)?;
        for ptr in self.blk_pointers {
            w.write_u32::<LittleEndian>(ptr)?;
        }
        w.write_u32::<LittleEndian>(self.allocated)?;
        w.write_u32::<LittleEndian>(self.link)?;
        w.write_all(&self.target_path)?;
        w.write_u32::<LittleEndian>(self.ftype as u32)?;
        w.write_u32::<LittleEndian>(self.dir_cnt)?;
        w.write_all(&[0u8; INODE_SIZE - Self::USED])
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        Self::read_from(&mut Cursor::new(buf))
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        self.write_to(&mut buf)?;
        Ok(buf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskDirEntry {
    pub name: [u8; MAX_FILE_NAME_LEN],
    pub ino: u32,
    pub ftype: FileType,
}

impl DiskDirEntry {
    pub const SIZE: usize = DIR_ENTRY_SIZE;

    pub fn new(name: &str, ino: u32, ftype: FileType) -> Result<Self> {
        Ok(Self {
            name: encode_name(name)?,
            ino,
            ftype,
        })
    }

    pub fn name(&self) -> Result<String> {
        decode_name(&self.name)
    }

    pub fn read_from(r: &mut impl Read) -> Result<Self> {
        let mut name = [0u8; MAX_FILE_NAME_LEN];
        r.read_exact(&mut name)?;
        let ino = r.read_u32::<LittleEndian>()?;
        let ftype = FileType::try_from(r.read_u32::<LittleEndian>()?)?;
        Ok(Self { name, ino, ftype })
    }

    pub fn write_to(&self, w: &mut impl Write) -> io::Result<()> {
        w.write_all(&self.name)?;
        w.write_u32::<LittleEndian>(self.ino)?;
        w.write_u32::<LittleEndian>(self.ftype as u32)
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        Self::read_from(&mut Cursor::new(buf))
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        self.write_to(&mut buf)?;
        Ok(buf)
    }
}

/// Copies a name into a NUL padded field of `N` bytes.
pub fn encode_name<const N: usize>(name: &str) -> Result<[u8; N]> {
    let bytes = name.as_bytes();
    if bytes.len() > N {
        return Err(FsError::NameTooLong);
    }
    let mut arr = [0u8; N];
    arr[..bytes.len()].copy_from_slice(bytes);
    Ok(arr)
}

pub fn trim_zero(name: &[u8]) -> &[u8] {
    let mut end = name.len();
    while end > 0 && name[end - 1] == 0 {
        end -= 1;
    }
    &name[..end]
}

pub fn decode_name(name: &[u8]) -> Result<String> {
    String::from_utf8(trim_zero(name).to_vec())
        .map_err(|_| FsError::Corruption("name is not valid UTF-8".into()))
}
