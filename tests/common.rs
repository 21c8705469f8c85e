//! Common utilities for tests
#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tauon::{BlockDevice, Error, Result};

pub const ORANGE: &str = "\x1b[38;5;214m";
pub const RESET: &str = "\x1b[0m";

pub const IO_SIZE: usize = 512;

/// Provides a macro for logging messages during tests.
/// e.g. log!("placeholder") -> println!("[test] placeholder");
#[macro_export]
macro_rules! log {
    ($msg:expr) => {
        println!("{}[test] {}{}", crate::common::ORANGE, $msg, crate::common::RESET)
    };
    ($msg:expr, $($arg:tt)*) => {
        println!("{}[test] {}{}", crate::common::ORANGE, format!($msg, $($arg)*), crate::common::RESET)
    };
}

/// An in-memory device. Writes can be made to fail to simulate a broken transport.
pub struct RamDisk {
    inner: Mutex<Vec<u8>>,
    io_size: usize,
    failing: AtomicBool,
}

impl RamDisk {
    pub fn new(size: usize, io_size: usize) -> Self {
        Self::from_bytes(vec![0u8; size], io_size)
    }

    pub fn from_bytes(bytes: Vec<u8>, io_size: usize) -> Self {
        RamDisk {
            inner: Mutex::new(bytes),
            io_size,
            failing: AtomicBool::new(false),
        }
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.inner.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn range(&self, unit_id: u64, len: usize) -> Result<std::ops::Range<usize>> {
        let start = unit_id as usize * self.io_size;
        if len != self.io_size || start + len > self.inner.lock().unwrap().len() {
            return Err(Error::InvalidArgument("bad unit access"));
        }
        Ok(start..start + len)
    }
}

impl BlockDevice for RamDisk {
    fn io_size(&self) -> usize {
        self.io_size
    }

    fn device_size(&self) -> u64 {
        self.inner.lock().unwrap().len() as u64
    }

    fn read_unit(&self, unit_id: u64, buf: &mut [u8]) -> Result<()> {
        let range = self.range(unit_id, buf.len())?;
        buf.copy_from_slice(&self.inner.lock().unwrap()[range]);
        Ok(())
    }

    fn write_unit(&self, unit_id: u64, buf: &[u8]) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::other("injected write failure")));
        }
        let range = self.range(unit_id, buf.len())?;
        self.inner.lock().unwrap()[range].copy_from_slice(buf);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        // Data is already in memory.
        Ok(())
    }
}
