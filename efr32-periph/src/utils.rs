/// A bit field inside a 32-bit register: `width` bits starting at `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Field {
    pub offset: u8,
    pub width: u8,
}

impl Field {
    pub const fn new(offset: u8, width: u8) -> Self {
        assert!(width > 0 && offset as u32 + width as u32 <= 32, "field does not fit in 32 bits");
        Self { offset, width }
    }

    /// Unshifted mask covering `width` bits.
    pub const fn mask(&self) -> u32 {
        if self.width == 32 {
            u32::MAX
        } else {
            (1u32 << self.width) - 1
        }
    }

    /// Mask of the field at its position in the register.
    pub const fn register_mask(&self) -> u32 {
        self.mask() << self.offset
    }

    /// Extract the field from a register value.
    pub const fn extract(&self, value: u32) -> u32 {
        (value >> self.offset) & self.mask()
    }

    /// Return `value` with the field replaced by `field`. Excess bits of `field` are dropped.
    pub const fn insert(&self, value: u32, field: u32) -> u32 {
        (value & !self.register_mask()) | ((field & self.mask()) << self.offset)
    }
}

/// Iterates over the indices of set bits, lowest first.
pub(crate) struct BitIter(pub(crate) u32);

impl Iterator for BitIter {
    type Item = u8;

    fn next(&mut self) -> Option<Self::Item> {
        match self.0.trailing_zeros() {
            32 => None,
            b => {
                self.0 &= !(1 << b);
                Some(b as _)
            }
        }
    }
}

/// Returns `true` when `bit` went from clear in `old` to set in `new`.
#[inline]
pub(crate) fn rose(old: u32, new: u32, bit: u32) -> bool {
    old & bit == 0 && new & bit != 0
}

/// Returns `true` when `bit` went from set in `old` to clear in `new`.
#[inline]
pub(crate) fn fell(old: u32, new: u32, bit: u32) -> bool {
    old & bit != 0 && new & bit == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_extract_and_insert() {
        let sourcesel = Field::new(8, 7);
        assert_eq!(sourcesel.register_mask(), 0x7f00);
        assert_eq!(sourcesel.extract(0x0000_5a03), 0x5a);
        assert_eq!(sourcesel.insert(0xffff_ffff, 0), 0xffff_80ff);
        assert_eq!(sourcesel.insert(0, 0xff), 0x7f00);
    }

    #[test]
    fn bit_iter_visits_set_bits_in_order() {
        let bits: Vec<u8> = BitIter(0b1000_0000_0000_0101).collect();
        assert_eq!(bits, [0, 2, 15]);
        assert_eq!(BitIter(0).count(), 0);
    }

    #[test]
    fn edges() {
        assert!(rose(0b00, 0b01, 0b01));
        assert!(!rose(0b01, 0b01, 0b01));
        assert!(fell(0b01, 0b00, 0b01));
        assert!(!fell(0b00, 0b00, 0b01));
    }
}
