//! Flash user-data page.
//!
//! One 1 KiB page, erased to `0xFF`. Programming only clears bits, both from
//! the bus and through [`NorFlash`]. Named manufacturing tokens live on top of
//! it in [`token`].

use core::cell::RefCell;
use std::sync::Arc;

use embedded_storage::nor_flash::{ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash};

use crate::register::{RegisterPeripheral, Width};
use crate::sync::{with_clock, ClockOrder, StateMutex};

pub mod token;

pub use token::{TokenDef, TokenError, TokenLayout, TokenStore};

/// Page size in bytes.
pub const PAGE_SIZE: usize = 1024;

/// Programming granularity in bytes.
pub const WORD_SIZE: usize = 4;

pub const ERASED: u8 = 0xff;

/// Flash access error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum FlashError {
    /// Offset or length is not a multiple of the required size.
    NotAligned,
    /// The access extends past the end of the page.
    OutOfBounds,
}

impl core::fmt::Display for FlashError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FlashError::NotAligned => f.write_str("access not aligned"),
            FlashError::OutOfBounds => f.write_str("access out of bounds"),
        }
    }
}

impl core::error::Error for FlashError {}

impl NorFlashError for FlashError {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            FlashError::NotAligned => NorFlashErrorKind::NotAligned,
            FlashError::OutOfBounds => NorFlashErrorKind::OutOfBounds,
        }
    }
}

/// The user-data page.
pub struct UserDataPage {
    clock: Arc<dyn ClockOrder>,
    contents: StateMutex<RefCell<Vec<u8>>>,
}

impl UserDataPage {
    /// An erased page.
    pub fn new(clock: Arc<dyn ClockOrder>) -> Self {
        Self {
            clock,
            contents: StateMutex::new(RefCell::new(vec![ERASED; PAGE_SIZE])),
        }
    }

    /// A page holding `image`. A short image is padded with erased bytes.
    pub fn from_image(clock: Arc<dyn ClockOrder>, image: &[u8]) -> Result<Self, FlashError> {
        if image.len() > PAGE_SIZE {
            return Err(FlashError::OutOfBounds);
        }
        let page = Self::new(clock);
        page.contents.lock(|contents| {
            contents.borrow_mut()[..image.len()].copy_from_slice(image);
        });
        Ok(page)
    }

    /// Copy of the whole page.
    pub fn image(&self) -> Vec<u8> {
        self.contents.lock(|contents| contents.borrow().clone())
    }

    fn check(offset: u32, len: usize, align: usize) -> Result<core::ops::Range<usize>, FlashError> {
        let start = offset as usize;
        if start % align != 0 || len % align != 0 {
            return Err(FlashError::NotAligned);
        }
        match start.checked_add(len) {
            Some(end) if end <= PAGE_SIZE => Ok(start..end),
            _ => Err(FlashError::OutOfBounds),
        }
    }

    /// Copy `bytes.len()` bytes starting at `offset`.
    pub fn read_bytes(&self, offset: u32, bytes: &mut [u8]) -> Result<(), FlashError> {
        let range = Self::check(offset, bytes.len(), 1)?;
        self.contents.lock(|contents| bytes.copy_from_slice(&contents.borrow()[range]));
        Ok(())
    }

    /// Program `bytes` at `offset`. Stored bits can only go from 1 to 0.
    pub fn program(&self, offset: u32, bytes: &[u8]) -> Result<(), FlashError> {
        let range = Self::check(offset, bytes.len(), WORD_SIZE)?;
        with_clock(&*self.clock, || {
            self.contents.lock(|contents| {
                for (stored, byte) in contents.borrow_mut()[range].iter_mut().zip(bytes) {
                    *stored &= *byte;
                }
            })
        });
        trace!("userdata: programmed {} bytes at {:#x}", bytes.len(), offset);
        Ok(())
    }

    /// Erase the whole page.
    pub fn erase_page(&self) {
        with_clock(&*self.clock, || self.contents.lock(|contents| contents.borrow_mut().fill(ERASED)));
        debug!("userdata: page erased");
    }
}

impl RegisterPeripheral for UserDataPage {
    fn read_double_word(&self, offset: u32) -> u32 {
        if !Width::DoubleWord.is_aligned(offset) {
            warn!("userdata: misaligned read at {:#x}", offset);
            return 0;
        }
        let mut word = [ERASED; WORD_SIZE];
        if with_clock(&*self.clock, || self.read_bytes(offset, &mut word)).is_err() {
            warn!("userdata: read past the page at {:#x}", offset);
            return u32::MAX;
        }
        u32::from_le_bytes(word)
    }

    fn write_double_word(&self, offset: u32, value: u32) {
        if !Width::DoubleWord.is_aligned(offset) {
            warn!("userdata: misaligned write at {:#x}", offset);
            return;
        }
        if self.program(offset, &value.to_le_bytes()).is_err() {
            warn!("userdata: write past the page at {:#x}", offset);
        }
    }

    /// Flash keeps its contents across resets.
    fn reset(&self) {}
}

impl ErrorType for UserDataPage {
    type Error = FlashError;
}

impl ReadNorFlash for UserDataPage {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.read_bytes(offset, bytes)
    }

    fn capacity(&self) -> usize {
        PAGE_SIZE
    }
}

impl NorFlash for UserDataPage {
    const WRITE_SIZE: usize = WORD_SIZE;
    const ERASE_SIZE: usize = PAGE_SIZE;

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        self.program(offset, bytes)
    }

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        if from > to {
            return Err(FlashError::OutOfBounds);
        }
        let range = Self::check(from, (to - from) as usize, PAGE_SIZE)?;
        if !range.is_empty() {
            self.erase_page();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
