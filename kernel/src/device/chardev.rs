//! Seam to character-device drivers (the RTC-class devices of the disk
//! format). The driver itself lives outside the core; reads and writes on a
//! device descriptor forward here.

use crate::error::Result;
use alloc::boxed::Box;
use spin::Mutex;

pub trait CharDevice: Send + Sync {
    fn read(&self, buf: &mut [u8]) -> Result<usize>;
    fn write(&self, buf: &[u8]) -> Result<usize>;
}

static CHAR_DEVICE: Mutex<Option<Box<dyn CharDevice>>> = Mutex::new(None);

pub fn register(dev: Box<dyn CharDevice>) {
    *CHAR_DEVICE.lock() = Some(dev);
}

pub fn unregister() {
    *CHAR_DEVICE.lock() = None;
}

pub fn read(buf: &mut [u8]) -> Result<usize> {
    match CHAR_DEVICE.lock().as_deref() {
        Some(dev) => dev.read(buf),
        None => Err("no character device registered".into()),
    }
}

pub fn write(buf: &[u8]) -> Result<usize> {
    match CHAR_DEVICE.lock().as_deref() {
        Some(dev) => dev.write(buf),
        None => Err("no character device registered".into()),
    }
}
