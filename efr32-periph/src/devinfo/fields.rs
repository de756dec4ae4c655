//! DEVINFO word layouts.

use bitfield_struct::bitfield;

/// INFO: CRC and revisions.
#[bitfield(u32, defmt = cfg(feature = "defmt"))]
#[derive(PartialEq, Eq)]
pub struct Info {
    /// [15:0] CRC-16/CCITT over the rest of DEVINFO
    #[bits(16)]
    pub crc: u16,
    /// [23:16] PRODREV
    #[bits(8)]
    pub prodrev: u8,
    /// [31:24] DEVINFOREV
    #[bits(8)]
    pub devinforev: u8,
}

/// PART: part number.
#[bitfield(u32, defmt = cfg(feature = "defmt"))]
#[derive(PartialEq, Eq)]
pub struct Part {
    /// [15:0] DEVICENUM
    #[bits(16)]
    pub devicenum: u16,
    /// [21:16] FAMILYNUM
    #[bits(6)]
    pub familynum: u8,
    #[bits(2)]
    __reserved0: u8,
    /// [29:24] FAMILY
    #[bits(6)]
    pub family: u8,
    #[bits(2)]
    __reserved1: u8,
}

/// MEMINFO: page sizes and DEVINFO length.
#[bitfield(u32, defmt = cfg(feature = "defmt"))]
#[derive(PartialEq, Eq)]
pub struct MemInfo {
    /// [7:0] FLASHPAGESIZE, page size is `2^(10 + value)` bytes
    #[bits(8)]
    pub flashpagesize: u8,
    /// [15:8] UDPAGESIZE, same encoding
    #[bits(8)]
    pub udpagesize: u8,
    /// [31:16] DILEN, DEVINFO length in bytes
    #[bits(16)]
    pub dilen: u16,
}

/// MSIZE: memory sizes in KiB.
#[bitfield(u32, defmt = cfg(feature = "defmt"))]
#[derive(PartialEq, Eq)]
pub struct MSize {
    /// [15:0] FLASH
    #[bits(16)]
    pub flash: u16,
    /// [26:16] SRAM
    #[bits(11)]
    pub sram: u16,
    #[bits(5)]
    __reserved0: u8,
}

impl MemInfo {
    /// Flash page size in bytes, `None` if the encoding overflows.
    pub fn flash_page_bytes(&self) -> Option<u32> {
        1u32.checked_shl(10 + u32::from(self.flashpagesize()))
    }

    /// User-data page size in bytes, `None` if the encoding overflows.
    pub fn ud_page_bytes(&self) -> Option<u32> {
        1u32.checked_shl(10 + u32::from(self.udpagesize()))
    }
}
