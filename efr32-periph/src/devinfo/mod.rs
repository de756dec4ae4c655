//! DEVINFO: factory device-information page.
//!
//! A read-only block built once from a [`DeviceInfo`]. INFO.CRC is computed
//! over the rest of the block, as firmware verifies it at boot.

mod fields;

use std::sync::Arc;

pub use fields::{Info, MSize, MemInfo, Part};

use crate::cmu::{Cal, FreqRange};
use crate::register::{Register, RegisterBank, RegisterPeripheral};
use crate::sync::{with_clock, ClockOrder};

pub const INFO: u32 = 0x000;
pub const PART: u32 = 0x004;
pub const MEMINFO: u32 = 0x008;
pub const MSIZE: u32 = 0x00c;
pub const PKGINFO: u32 = 0x010;
pub const CUSTOMINFO: u32 = 0x014;
pub const SWFIX: u32 = 0x018;
pub const SWCAPA: u32 = 0x01c;
pub const EXTINFO: u32 = 0x020;
pub const EUI48L: u32 = 0x040;
pub const EUI48H: u32 = 0x044;
pub const EUI64L: u32 = 0x048;
pub const EUI64H: u32 = 0x04c;
pub const CALTEMP: u32 = 0x050;
pub const EMUTEMP: u32 = 0x054;
pub const HFRCODPLLCAL: u32 = 0x058;

/// Number of HFRCODPLLCAL entries, one per HFRCO band (plus reserved).
pub const HFRCODPLLCAL_COUNT: usize = 18;

/// DEVINFO length covered by the CRC.
pub const DILEN: u32 = HFRCODPLLCAL + 4 * HFRCODPLLCAL_COUNT as u32;

/// Value returned for bytes outside the populated words.
pub const FILLER: u32 = 0xffff_ffff;

/// Offset of HFRCODPLLCAL entry `index`.
pub const fn hfrcodpllcal(index: usize) -> u32 {
    HFRCODPLLCAL + 4 * index as u32
}

/// Factory data the DEVINFO block is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DeviceInfo {
    pub prodrev: u8,
    pub devinforev: u8,
    pub family: u8,
    pub familynum: u8,
    pub devicenum: u16,
    /// log2(flash page size) - 10
    pub flashpagesize: u8,
    /// log2(user-data page size) - 10
    pub udpagesize: u8,
    pub flash_kib: u16,
    pub sram_kib: u16,
    pub pkginfo: u32,
    pub custominfo: u32,
    pub swfix: u32,
    pub swcapa: u32,
    pub extinfo: u32,
    /// 48-bit EUI, in the low bits.
    pub eui48: u64,
    pub eui64: u64,
    pub caltemp: u32,
    pub emutemp: u32,
    pub hfrcodpllcal: [u32; HFRCODPLLCAL_COUNT],
}

impl Default for DeviceInfo {
    fn default() -> Self {
        let mut hfrcodpllcal = [0; HFRCODPLLCAL_COUNT];
        for (bits, cal) in hfrcodpllcal.iter_mut().enumerate() {
            if let Some(range) = FreqRange::from_bits(bits as u8) {
                *cal = Cal::new()
                    .with_tuning(0x40)
                    .with_finetuning(0x1f)
                    .with_freqrange(range.to_bits())
                    .into_bits();
            }
        }

        Self {
            prodrev: 2,
            devinforev: 4,
            family: 1,
            familynum: 24,
            devicenum: 1224,
            flashpagesize: 3,
            udpagesize: 0,
            flash_kib: 1536,
            sram_kib: 256,
            pkginfo: 0x0000_0e30,
            custominfo: 0,
            swfix: FILLER,
            swcapa: 0,
            extinfo: FILLER,
            eui48: 0x0000_0b57_0000_0001,
            eui64: 0x000b_57ff_fe00_0001,
            caltemp: 25,
            emutemp: 0x0000_0440,
            hfrcodpllcal,
        }
    }
}

impl DeviceInfo {
    fn part(&self) -> Part {
        Part::new()
            .with_devicenum(self.devicenum)
            .with_familynum(self.familynum & 0x3f)
            .with_family(self.family & 0x3f)
    }

    fn meminfo(&self) -> MemInfo {
        MemInfo::new()
            .with_flashpagesize(self.flashpagesize)
            .with_udpagesize(self.udpagesize)
            .with_dilen(DILEN as u16)
    }

    fn msize(&self) -> MSize {
        MSize::new()
            .with_flash(self.flash_kib)
            .with_sram(self.sram_kib & 0x7ff)
    }

    /// Every populated word as `(offset, value)`, INFO included, in address order.
    pub fn words(&self) -> Vec<(u32, u32)> {
        let mut words = vec![
            (PART, self.part().into_bits()),
            (MEMINFO, self.meminfo().into_bits()),
            (MSIZE, self.msize().into_bits()),
            (PKGINFO, self.pkginfo),
            (CUSTOMINFO, self.custominfo),
            (SWFIX, self.swfix),
            (SWCAPA, self.swcapa),
            (EXTINFO, self.extinfo),
            (EUI48L, self.eui48 as u32),
            (EUI48H, (self.eui48 >> 32) as u32 & 0xffff),
            (EUI64L, self.eui64 as u32),
            (EUI64H, (self.eui64 >> 32) as u32),
            (CALTEMP, self.caltemp),
            (EMUTEMP, self.emutemp),
        ];
        words.extend(
            self.hfrcodpllcal
                .iter()
                .enumerate()
                .map(|(index, cal)| (hfrcodpllcal(index), *cal)),
        );

        let crc = crc16_ccitt(&image_bytes(&words)[PART as usize..]);
        let info = Info::new()
            .with_crc(crc)
            .with_prodrev(self.prodrev)
            .with_devinforev(self.devinforev);
        words.insert(0, (INFO, info.into_bits()));
        words
    }

    /// The block as bytes, `DILEN` long. Gaps read as the filler.
    pub fn to_bytes(&self) -> Vec<u8> {
        image_bytes(&self.words())
    }

    /// Factory CAL value for `range`.
    pub fn hfrco_cal(&self, range: FreqRange) -> Cal {
        Cal::from_bits(self.hfrcodpllcal[range.to_bits() as usize])
    }
}

fn image_bytes(words: &[(u32, u32)]) -> Vec<u8> {
    let mut bytes = vec![0xff; DILEN as usize];
    for (offset, value) in words {
        let offset = *offset as usize;
        bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// CRC-16/CCITT (polynomial 0x1021, initial value 0xFFFF, no reflection).
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xffff;
    for byte in data {
        crc ^= u16::from(*byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Check INFO.CRC of a raw DEVINFO image.
pub fn verify(image: &[u8]) -> bool {
    let Some(info) = image.get(..4) else {
        return false;
    };
    let info = Info::from_bits(u32::from_le_bytes([info[0], info[1], info[2], info[3]]));
    let Some(meminfo) = image.get(MEMINFO as usize..MEMINFO as usize + 4) else {
        return false;
    };
    let meminfo = MemInfo::from_bits(u32::from_le_bytes([meminfo[0], meminfo[1], meminfo[2], meminfo[3]]));
    match image.get(PART as usize..meminfo.dilen() as usize) {
        Some(covered) => crc16_ccitt(covered) == info.crc(),
        None => false,
    }
}

/// DEVINFO peripheral. All registers are read-only.
pub struct DevInfo {
    clock: Arc<dyn ClockOrder>,
    info: DeviceInfo,
    registers: RegisterBank<DevInfo>,
}

fn register_name(offset: u32) -> &'static str {
    match offset {
        INFO => "INFO",
        PART => "PART",
        MEMINFO => "MEMINFO",
        MSIZE => "MSIZE",
        PKGINFO => "PKGINFO",
        CUSTOMINFO => "CUSTOMINFO",
        SWFIX => "SWFIX",
        SWCAPA => "SWCAPA",
        EXTINFO => "EXTINFO",
        EUI48L => "EUI48L",
        EUI48H => "EUI48H",
        EUI64L => "EUI64L",
        EUI64H => "EUI64H",
        CALTEMP => "CALTEMP",
        EMUTEMP => "EMUTEMP",
        _ => "HFRCODPLLCAL",
    }
}

impl DevInfo {
    pub fn new(clock: Arc<dyn ClockOrder>, info: DeviceInfo) -> Self {
        let registers = info
            .words()
            .into_iter()
            .fold(RegisterBank::new("devinfo").with_filler(FILLER), |bank, (offset, value)| {
                bank.register(offset, Register::new(register_name(offset), value).read_only())
            });
        debug!("devinfo: crc {:#x}", Info::from_bits(registers.value(INFO)).crc());

        Self { clock, info, registers }
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.info
    }
}

impl RegisterPeripheral for DevInfo {
    fn read_double_word(&self, offset: u32) -> u32 {
        with_clock(&*self.clock, || self.registers.read(self, offset))
    }

    fn write_double_word(&self, offset: u32, value: u32) {
        with_clock(&*self.clock, || self.registers.write(self, offset, value))
    }

    fn reset(&self) {}
}
