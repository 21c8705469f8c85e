//! Byte-addressed access on top of a unit-addressed block device.
//! Every request is widened to whole I/O units; writes are read-modify-write.

use std::sync::Arc;

use crate::BlockDevice;
use crate::error::Result;

fn round_down(value: u64, round: u64) -> u64 {
    value / round * round
}

fn round_up(value: u64, round: u64) -> u64 {
    value.div_ceil(round) * round
}

#[derive(Debug)]
pub struct Driver<D: BlockDevice> {
    device: Arc<D>,
    io_size: usize,
}

impl<D: BlockDevice> Driver<D> {
    pub fn new(device: Arc<D>) -> Self {
        let io_size = device.io_size();
        Self { device, io_size }
    }

    pub fn io_size(&self) -> usize {
        self.io_size
    }

    pub fn device_size(&self) -> u64 {
        self.device.device_size()
    }

    pub fn device(&self) -> Arc<D> {
        Arc::clone(&self.device)
    }

    /// Reads the aligned span `[start, start + buf.len())`, unit by unit.
    fn read_aligned(&self, start: u64, buf: &mut [u8]) -> Result<()> {
        let first_unit = start / self.io_size as u64;
        for (i, unit) in buf.chunks_exact_mut(self.io_size).enumerate() {
            self.device.read_unit(first_unit + i as u64, unit)?;
        }
        Ok(())
    }

    fn write_aligned(&self, start: u64, buf: &[u8]) -> Result<()> {
        let first_unit = start / self.io_size as u64;
        for (i, unit) in buf.chunks_exact(self.io_size).enumerate() {
            self.device.write_unit(first_unit + i as u64, unit)?;
        }
        Ok(())
    }

    /// Fills `out` with the bytes stored at `offset`.
    pub fn read_into(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        if out.is_empty() {
            return Ok(());
        }
        let io = self.io_size as u64;
        let offset_aligned = round_down(offset, io);
        let bias = (offset - offset_aligned) as usize;
        let size_aligned = round_up(bias as u64 + out.len() as u64, io) as usize;

        let mut temp = vec![0u8; size_aligned];
        self.read_aligned(offset_aligned, &mut temp)?;
        out.copy_from_slice(&temp[bias..bias + out.len()]);
        Ok(())
    }

    pub fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; len];
        self.read_into(offset, &mut out)?;
        Ok(out)
    }

    /// Stores `data` at `offset`, preserving the surrounding bytes of the first and last unit.
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let io = self.io_size as u64;
        let offset_aligned = round_down(offset, io);
        let bias = (offset - offset_aligned) as usize;
        let size_aligned = round_up(bias as u64 + data.len() as u64, io) as usize;

        let mut temp = vec![0u8; size_aligned];
        self.read_aligned(offset_aligned, &mut temp)?;
        temp[bias..bias + data.len()].copy_from_slice(data);
        self.write_aligned(offset_aligned, &temp)?;
        log::trace!(
            "[driver] wrote {} bytes at {} ({} aligned bytes at {})",
            data.len(),
            offset,
            size_aligned,
            offset_aligned
        );
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.device.flush()
    }
}
