use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::{FsError, Result};

pub trait BlockDevice: Send + Sync {
    /// Returns the transfer granularity of the device in bytes.
    fn io_size(&self) -> usize;

    /// Returns the total size of the device in bytes.
    fn device_size(&self) -> u64;

    /// Reads one I/O unit from the device.
    /// buf.len() must be equal to io_size().
    fn read_unit(&self, unit_id: u64, buf: &mut [u8]) -> Result<()>;

    /// Writes one I/O unit to the device.
    /// buf.len() must be equal to io_size().
    fn write_unit(&self, unit_id: u64, buf: &[u8]) -> Result<()>;

    /// Flushes any cached data to the device.
    fn flush(&self) -> Result<()>;
}

impl<T: BlockDevice + ?Sized> BlockDevice for Arc<T> {
    fn io_size(&self) -> usize {
        (**self).io_size()
    }

    fn device_size(&self) -> u64 {
        (**self).device_size()
    }

    fn read_unit(&self, unit_id: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read_unit(unit_id, buf)
    }

    fn write_unit(&self, unit_id: u64, buf: &[u8]) -> Result<()> {
        (**self).write_unit(unit_id, buf)
    }

    fn flush(&self) -> Result<()> {
        (**self).flush()
    }
}

/// A device image kept in a regular file.
#[derive(Debug)]
pub struct FileDisk {
    inner: Mutex<File>,
    io_size: usize,
    size: u64,
}

impl FileDisk {
    /// Opens an existing image. Its length must be a multiple of `io_size`.
    pub fn open(path: impl AsRef<Path>, io_size: usize) -> Result<Self> {
        let file = File::options().read(true).write(true).open(path)?;
        let size = file.metadata()?.len();
        if io_size == 0 || size % io_size as u64 != 0 {
            return Err(FsError::InvalidArgument("image size is not a multiple of the io size"));
        }
        Ok(Self {
            inner: Mutex::new(file),
            io_size,
            size,
        })
    }

    /// Creates (or truncates) a zero-filled image of `size` bytes.
    pub fn create(path: impl AsRef<Path>, size: u64, io_size: usize) -> Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        file.set_len(size)?;
        drop(file);
        Self::open(path, io_size)
    }

    fn check(&self, unit_id: u64, len: usize) -> Result<u64> {
        if len != self.io_size {
            return Err(FsError::InvalidArgument("buffer length differs from the io size"));
        }
        let start = unit_id * self.io_size as u64;
        if start + self.io_size as u64 > self.size {
            return Err(FsError::InvalidArgument("io unit is beyond the end of the device"));
        }
        Ok(start)
    }

    fn file(&self) -> Result<std::sync::MutexGuard<'_, File>> {
        self.inner
            .lock()
            .map_err(|_| FsError::Corruption("device lock poisoned".into()))
    }
}

impl BlockDevice for FileDisk {
    fn io_size(&self) -> usize {
        self.io_size
    }

    fn device_size(&self) -> u64 {
        self.size
    }

    fn read_unit(&self, unit_id: u64, buf: &mut [u8]) -> Result<()> {
        let start = self.check(unit_id, buf.len())?;
        let mut file = self.file()?;
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_unit(&self, unit_id: u64, buf: &[u8]) -> Result<()> {
        let start = self.check(unit_id, buf.len())?;
        let mut file = self.file()?;
        file.seek(SeekFrom::Start(start))?;
        file.write_all(buf)?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let mut file = self.file()?;
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }
}
