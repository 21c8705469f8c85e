use crate::bitmap::Bitmap;
use crate::config::*;
use crate::driver::Driver;
use crate::error::{FsError, Result};
use crate::structs::{DiskSuperBlock, Layout, Region};
use crate::BlockDevice;

/// Superblock of a mounted session, including both bitmaps.
#[derive(Debug, Clone)]
pub struct SuperBlock {
    pub magic: u32,
    pub io_size: u32,   // Transfer unit of the device
    pub blk_size: u32,  // Logical block size, twice the io size
    pub disk_size: u64, // Device size in bytes
    pub usage_size: u64, // Bytes of data blocks in use
    pub layout: Layout,
    pub max_ino: u32,   // Number of inodes the table can hold
    pub blks_nums: u32, // Number of logical blocks on the device

    pub inode_map: Bitmap,
    pub data_map: Bitmap,
    pub is_mounted: bool,
}

impl SuperBlock {
    /// Computes the layout of a blank device.
    pub fn new(disk_size: u64, io_size: u32) -> Result<Self> {
        if io_size == 0 {
            return Err(FsError::InvalidArgument("io size must be non-zero"));
        }
        let blk_size = io_size * 2;
        let blk = blk_size as u64;
        let bits_per_blk = blk * 8;
        let blks_nums = u32::try_from(disk_size / blk)
            .map_err(|_| FsError::InvalidArgument("device has too many blocks"))?;

        let super_blks = (DiskSuperBlock::SIZE as u64).div_ceil(blk) as u32;
        let inode_num = disk_size / ((DATA_PER_FILE + INODE_PER_FILE) as u64 * blk);
        let inodes_per_blk = blk / INODE_SIZE as u64;
        if inodes_per_blk == 0 {
            return Err(FsError::InvalidArgument("block is smaller than an inode record"));
        }
        let inode_blks = inode_num.div_ceil(inodes_per_blk) as u32;
        let inode_map_blks = inode_num.div_ceil(bits_per_blk) as u32;

        let metadata = super_blks as u64 + inode_map_blks as u64 + inode_blks as u64;
        if inode_num == 0 || metadata >= blks_nums as u64 {
            return Err(FsError::InvalidArgument("device is too small"));
        }
        let remaining = blks_nums as u64 - metadata;
        let data_map_blks = remaining.div_ceil(bits_per_blk).max(1) as u32;
        if metadata + data_map_blks as u64 >= blks_nums as u64 {
            return Err(FsError::InvalidArgument("device is too small"));
        }

        let sb_region = Region { offset: 0, blocks: super_blks };
        let inode_map = Region { offset: sb_region.end(), blocks: inode_map_blks };
        let data_map = Region { offset: inode_map.end(), blocks: data_map_blks };
        let inode_table = Region { offset: data_map.end(), blocks: inode_blks };
        let data = Region {
            offset: inode_table.end(),
            blocks: blks_nums - inode_table.end(),
        };
        let layout = Layout {
            superblock: sb_region,
            inode_map,
            data_map,
            inode_table,
            data,
        };

        let max_ino = inode_num as u32;
        Ok(Self {
            magic: MAGIC,
            io_size,
            blk_size,
            disk_size,
            usage_size: 0,
            layout,
            max_ino,
            blks_nums,
            inode_map: Bitmap::new((inode_map_blks * blk_size) as usize, max_ino),
            data_map: Bitmap::new((data_map_blks * blk_size) as usize, data.blocks),
            is_mounted: false,
        })
    }

    pub fn blks_sz(&self, blks: u32) -> u64 {
        blks as u64 * self.blk_size as u64
    }

    pub fn inodes_per_blk(&self) -> u32 {
        self.blk_size / INODE_SIZE as u32
    }

    pub fn dentries_per_blk(&self) -> usize {
        self.blk_size as usize / DIR_ENTRY_SIZE
    }

    /// Byte offset of an inode table slot.
    pub fn inode_offset(&self, ino: u32) -> u64 {
        let per_blk = self.inodes_per_blk();
        self.blks_sz(self.layout.inode_table.offset + ino / per_blk)
            + (ino % per_blk) as u64 * INODE_SIZE as u64
    }

    /// Byte offset of a block of the data region.
    pub fn data_offset(&self, block: u32) -> u64 {
        self.blks_sz(self.layout.data.offset + block)
    }

    fn to_disk(&self) -> DiskSuperBlock {
        DiskSuperBlock {
            magic: self.magic,
            blk_size: self.blk_size,
            io_size: self.io_size,
            disk_size: self.disk_size,
            usage_size: self.usage_size,
            layout: self.layout,
            max_ino: self.max_ino,
            blks_nums: self.blks_nums,
        }
    }

    fn validate(disk: &DiskSuperBlock, io_size: u32) -> Result<()> {
        if disk.io_size != io_size || disk.blk_size != io_size * 2 {
            return Err(FsError::Corruption(format!(
                "superblock geometry (io {}, block {}) does not match the device (io {})",
                disk.io_size, disk.blk_size, io_size
            )));
        }
        if !disk.layout.is_contiguous() || disk.layout.data.end() > disk.blks_nums {
            return Err(FsError::Corruption("superblock regions are not contiguous".into()));
        }
        let slots = disk.layout.inode_table.blocks as u64 * (disk.blk_size / INODE_SIZE as u32) as u64;
        if slots < disk.max_ino as u64 {
            return Err(FsError::Corruption("inode table cannot hold max inode count".into()));
        }
        Ok(())
    }
}

/// Reads the superblock, or lays out a blank device when the magic number does not match.
/// Returns the superblock together with whether the device was freshly initialized,
/// in which case the caller must allocate the root inode.
pub fn open_or_initialize<D: BlockDevice>(driver: &Driver<D>) -> Result<(SuperBlock, bool)> {
    let io_size = u32::try_from(driver.io_size())
        .map_err(|_| FsError::InvalidArgument("io size does not fit the superblock"))?;
    let buf = driver.read(SUPER_OFFSET, DiskSuperBlock::SIZE)?;
    let disk = DiskSuperBlock::decode(&buf)?;

    if disk.magic != MAGIC {
        let mut superblock = SuperBlock::new(driver.device_size(), io_size)?;
        superblock.is_mounted = true;
        log::info!(
            "[superblock] initializing device: {} bytes, {} blocks, {} inodes, {} data blocks",
            superblock.disk_size,
            superblock.blks_nums,
            superblock.max_ino,
            superblock.layout.data.blocks
        );
        log::debug!("[superblock] layout {:?}", superblock.layout);
        return Ok((superblock, true));
    }

    SuperBlock::validate(&disk, io_size)?;
    let blk_size = disk.blk_size;
    let inode_map = driver.read(
        disk.layout.inode_map.offset as u64 * blk_size as u64,
        (disk.layout.inode_map.blocks * blk_size) as usize,
    )?;
    let data_map = driver.read(
        disk.layout.data_map.offset as u64 * blk_size as u64,
        (disk.layout.data_map.blocks * blk_size) as usize,
    )?;

    let superblock = SuperBlock {
        magic: disk.magic,
        io_size: disk.io_size,
        blk_size,
        disk_size: disk.disk_size,
        usage_size: disk.usage_size,
        layout: disk.layout,
        max_ino: disk.max_ino,
        blks_nums: disk.blks_nums,
        inode_map: Bitmap::from_bytes(inode_map, disk.max_ino),
        data_map: Bitmap::from_bytes(data_map, disk.layout.data.blocks),
        is_mounted: true,
    };
    log::info!(
        "[superblock] mounted existing filesystem: {} inodes in use, {} bytes of data",
        superblock.inode_map.count_set(),
        superblock.usage_size
    );
    Ok((superblock, false))
}

/// Writes the superblock record and both bitmaps back to their regions.
pub fn persist<D: BlockDevice>(driver: &Driver<D>, superblock: &SuperBlock) -> Result<()> {
    driver.write(SUPER_OFFSET, &superblock.to_disk().encode()?)?;
    driver.write(
        superblock.blks_sz(superblock.layout.inode_map.offset),
        superblock.inode_map.as_bytes(),
    )?;
    driver.write(
        superblock.blks_sz(superblock.layout.data_map.offset),
        superblock.data_map.as_bytes(),
    )?;
    driver.flush()?;
    log::debug!("[superblock] persisted, usage {} bytes", superblock.usage_size);
    Ok(())
}
