//! Register-peripheral capability and the per-register behavior table.
//!
//! Every model exposes [`RegisterPeripheral`] to the emulator bus. Most models
//! back it with a [`RegisterBank`]: a table built once at construction that maps
//! each register offset to its reset value, writable mask, access kind and
//! optional read-side/write-side hooks.
//!
//! ```
//! use efr32_periph::register::{Register, RegisterBank};
//!
//! struct Model;
//!
//! let bank: RegisterBank<Model> = RegisterBank::new("demo")
//!     .register(0x00, Register::new("CTRL", 0x0000_0001).with_mask(0x0000_00ff))
//!     .register(0x04, Register::new("STATUS", 0).read_only());
//!
//! bank.write(&Model, 0x00, 0xffff_ff02);
//! assert_eq!(bank.read(&Model, 0x00), 0x02);
//! ```

use core::cell::RefCell;
use std::collections::BTreeMap;

use crate::sync::StateMutex;

/// Access width of a bus transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Width {
    Byte,
    Word,
    DoubleWord,
}

impl Width {
    /// Size of the access in bytes.
    pub const fn bytes(self) -> u32 {
        match self {
            Width::Byte => 1,
            Width::Word => 2,
            Width::DoubleWord => 4,
        }
    }

    /// Whether `offset` is naturally aligned for this width.
    pub const fn is_aligned(self, offset: u32) -> bool {
        offset % self.bytes() == 0
    }
}

/// Address-mapped register access, as seen by the emulator bus.
///
/// Offsets are peripheral-relative byte addresses. Only the 32-bit accessors
/// are required; narrower accesses are carved out of the containing 32-bit
/// register (read-modify-write for stores). Misaligned accesses are logged and
/// read as zero / dropped.
pub trait RegisterPeripheral: Send + Sync {
    /// Read a 32-bit register.
    fn read_double_word(&self, offset: u32) -> u32;

    /// Write a 32-bit register.
    fn write_double_word(&self, offset: u32, value: u32);

    /// Return the peripheral to its reset state.
    fn reset(&self);

    /// Read a 16-bit half of a register.
    fn read_word(&self, offset: u32) -> u16 {
        if !Width::Word.is_aligned(offset) {
            warn!("misaligned word read at {:#x}", offset);
            return 0;
        }
        let shift = (offset & 0x2) * 8;
        (self.read_double_word(offset & !0x3) >> shift) as u16
    }

    /// Write a 16-bit half of a register.
    fn write_word(&self, offset: u32, value: u16) {
        if !Width::Word.is_aligned(offset) {
            warn!("misaligned word write at {:#x}", offset);
            return;
        }
        let base = offset & !0x3;
        let shift = (offset & 0x2) * 8;
        let old = self.read_double_word(base);
        let new = (old & !(0xffff << shift)) | ((value as u32) << shift);
        self.write_double_word(base, new);
    }

    /// Read one byte of a register.
    fn read_byte(&self, offset: u32) -> u8 {
        let shift = (offset & 0x3) * 8;
        (self.read_double_word(offset & !0x3) >> shift) as u8
    }

    /// Write one byte of a register.
    fn write_byte(&self, offset: u32, value: u8) {
        let base = offset & !0x3;
        let shift = (offset & 0x3) * 8;
        let old = self.read_double_word(base);
        let new = (old & !(0xff << shift)) | ((value as u32) << shift);
        self.write_double_word(base, new);
    }
}

/// Register access kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Access {
    ReadWrite,
    Read,
    Write,
}

/// Read-side value hook: `(ctx, offset, stored)`, returns what the bus sees.
pub type ReadHook<C> = fn(&C, u32, u32) -> u32;

/// Write-side effect hook: `(ctx, offset, old, new)` with the stored value before and after the write.
pub type WriteHook<C> = fn(&C, u32, u32, u32);

/// One entry of a [`RegisterBank`].
pub struct Register<C> {
    name: &'static str,
    reset: u32,
    mask: u32,
    access: Access,
    protected: bool,
    read: Option<ReadHook<C>>,
    write: Option<WriteHook<C>>,
}

impl<C> Register<C> {
    /// A fully writable read/write register.
    pub const fn new(name: &'static str, reset: u32) -> Self {
        Self {
            name,
            reset,
            mask: u32::MAX,
            access: Access::ReadWrite,
            protected: false,
            read: None,
            write: None,
        }
    }

    /// Only bits set in `mask` are stored on writes.
    pub fn with_mask(mut self, mask: u32) -> Self {
        self.mask = mask;
        self
    }

    /// Bus writes are ignored. The model can still update the value.
    pub fn read_only(mut self) -> Self {
        self.access = Access::Read;
        self
    }

    /// Bus reads return zero. Writes are still stored so hooks can see the previous value.
    pub fn write_only(mut self) -> Self {
        self.access = Access::Write;
        self
    }

    /// Bus writes are ignored while the bank's lock bit is set.
    pub fn protected(mut self) -> Self {
        self.protected = true;
        self
    }

    /// Compute the bus-visible value from the stored value.
    pub fn on_read(mut self, hook: ReadHook<C>) -> Self {
        self.read = Some(hook);
        self
    }

    /// Run a side effect after every accepted write.
    pub fn on_write(mut self, hook: WriteHook<C>) -> Self {
        self.write = Some(hook);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn is_protected(&self) -> bool {
        self.protected
    }
}

/// Series-2 register alias windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WriteOp {
    /// Plain store.
    Store,
    /// `+0x1000`: OR the written bits in.
    Set,
    /// `+0x2000`: clear the written bits.
    Clear,
    /// `+0x3000`: toggle the written bits.
    Toggle,
}

impl WriteOp {
    const ALIAS_SHIFT: u32 = 12;

    /// Split a bus offset into the base register offset and the alias operation.
    pub const fn decode(offset: u32) -> (u32, WriteOp) {
        let op = match (offset >> Self::ALIAS_SHIFT) & 0x3 {
            0 => WriteOp::Store,
            1 => WriteOp::Set,
            2 => WriteOp::Clear,
            _ => WriteOp::Toggle,
        };
        (offset & 0xfff, op)
    }

    /// Apply the operation to the stored value.
    pub const fn apply(self, old: u32, value: u32) -> u32 {
        match self {
            WriteOp::Store => value,
            WriteOp::Set => old | value,
            WriteOp::Clear => old & !value,
            WriteOp::Toggle => old ^ value,
        }
    }
}

/// Per-register behavior table plus the stored register values.
///
/// `C` is the model context handed to the hooks (usually the model itself).
/// Hooks run after the value lock is released, so they may freely read or
/// update other registers of the same bank.
pub struct RegisterBank<C> {
    name: &'static str,
    filler: u32,
    aliases: bool,
    lock: Option<(u32, u32)>,
    registers: BTreeMap<u32, Register<C>>,
    values: StateMutex<RefCell<BTreeMap<u32, u32>>>,
}

impl<C> RegisterBank<C> {
    /// An empty bank. Unmapped reads return 0 and alias windows are disabled.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            filler: 0,
            aliases: false,
            lock: None,
            registers: BTreeMap::new(),
            values: StateMutex::new(RefCell::new(BTreeMap::new())),
        }
    }

    /// Value returned by reads of unmapped offsets.
    pub fn with_filler(mut self, filler: u32) -> Self {
        self.filler = filler;
        self
    }

    /// Decode the SET/CLR/TGL alias windows at `+0x1000`, `+0x2000` and `+0x3000`.
    pub fn with_aliases(mut self) -> Self {
        self.aliases = true;
        self
    }

    /// Writes to [`protected`](Register::protected) registers are dropped while
    /// `bit` of the register at `status` is set.
    pub fn with_lock(mut self, status: u32, bit: u32) -> Self {
        self.lock = Some((status, bit));
        self
    }

    /// Add a register at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is misaligned or already mapped.
    pub fn register(mut self, offset: u32, register: Register<C>) -> Self {
        assert!(Width::DoubleWord.is_aligned(offset), "{}: misaligned register {}", self.name, register.name);
        self.values.get_mut().get_mut().insert(offset, register.reset);
        let previous = self.registers.insert(offset, register);
        assert!(previous.is_none(), "{}: duplicate register at {:#x}", self.name, offset);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn filler(&self) -> u32 {
        self.filler
    }

    /// Whether a register is mapped at `offset` (alias windows excluded).
    pub fn is_mapped(&self, offset: u32) -> bool {
        self.registers.contains_key(&offset)
    }

    /// Look up the table entry at `offset`.
    pub fn definition(&self, offset: u32) -> Option<&Register<C>> {
        self.registers.get(&offset)
    }

    /// Whether protected registers currently reject writes.
    pub fn is_locked(&self) -> bool {
        match self.lock {
            Some((status, bit)) => self.value(status) & bit != 0,
            None => false,
        }
    }

    /// Handle a write to a LOCK register: `key` unlocks, any other value locks.
    pub fn apply_lock_key(&self, written: u32, key: u32) {
        let Some((status, bit)) = self.lock else {
            return;
        };
        if written & 0xffff == key {
            self.clear_bits(status, bit);
        } else {
            self.set_bits(status, bit);
        }
        debug!("{}: {}", self.name, if self.is_locked() { "locked" } else { "unlocked" });
    }

    fn decode(&self, offset: u32) -> (u32, WriteOp) {
        if self.aliases {
            WriteOp::decode(offset)
        } else {
            (offset, WriteOp::Store)
        }
    }

    /// Bus read of the register at `offset`.
    pub fn read(&self, ctx: &C, offset: u32) -> u32 {
        if !Width::DoubleWord.is_aligned(offset) {
            warn!("{}: misaligned read at {:#x}", self.name, offset);
            return 0;
        }
        // Alias windows read like the base register.
        let (base, _) = self.decode(offset);
        let Some(register) = self.registers.get(&base) else {
            warn!("{}: read from unmapped offset {:#x}", self.name, offset);
            return self.filler;
        };
        if register.access == Access::Write {
            return 0;
        }
        let stored = self.value(base);
        match register.read {
            Some(hook) => hook(ctx, base, stored),
            None => stored,
        }
    }

    /// Bus write of the register at `offset`.
    pub fn write(&self, ctx: &C, offset: u32, value: u32) {
        if !Width::DoubleWord.is_aligned(offset) {
            warn!("{}: misaligned write at {:#x}", self.name, offset);
            return;
        }
        let (base, op) = self.decode(offset);
        let Some(register) = self.registers.get(&base) else {
            warn!("{}: write to unmapped offset {:#x} ({:#x})", self.name, offset, value);
            return;
        };
        if register.access == Access::Read {
            debug!("{}: ignoring write to read-only {} ({:#x})", self.name, register.name, value);
            return;
        }
        if register.protected && self.is_locked() {
            debug!("{}: {} is locked, ignoring {:#x}", self.name, register.name, value);
            return;
        }
        let (old, new) = self.values.lock(|values| {
            let mut values = values.borrow_mut();
            let stored = values.entry(base).or_insert(register.reset);
            let old = *stored;
            let new = (old & !register.mask) | (op.apply(old, value) & register.mask);
            *stored = new;
            (old, new)
        });
        trace!("{}: {} {:#x} -> {:#x}", self.name, register.name, old, new);
        if let Some(hook) = register.write {
            hook(ctx, base, old, new);
        }
    }

    /// Stored value of the register at `offset`, bypassing hooks.
    pub fn value(&self, offset: u32) -> u32 {
        self.values
            .lock(|values| values.borrow().get(&offset).copied())
            .unwrap_or(self.filler)
    }

    /// Model-side update of a stored value. No hooks run, access kind and mask are ignored.
    pub fn set_value(&self, offset: u32, value: u32) {
        if !self.registers.contains_key(&offset) {
            warn!("{}: model update of unmapped offset {:#x}", self.name, offset);
            return;
        }
        self.values.lock(|values| {
            values.borrow_mut().insert(offset, value);
        });
    }

    /// Model-side read-modify-write of a stored value. Returns the new value.
    pub fn modify(&self, offset: u32, f: impl FnOnce(u32) -> u32) -> u32 {
        if !self.registers.contains_key(&offset) {
            warn!("{}: model update of unmapped offset {:#x}", self.name, offset);
            return self.filler;
        }
        self.values.lock(|values| {
            let mut values = values.borrow_mut();
            let stored = values.entry(offset).or_insert(0);
            *stored = f(*stored);
            *stored
        })
    }

    /// Set bits of a stored value.
    pub fn set_bits(&self, offset: u32, bits: u32) -> u32 {
        self.modify(offset, |v| v | bits)
    }

    /// Clear bits of a stored value.
    pub fn clear_bits(&self, offset: u32, bits: u32) -> u32 {
        self.modify(offset, |v| v & !bits)
    }

    /// Restore every register to its reset value. No hooks run.
    pub fn reset(&self) {
        self.values.lock(|values| {
            let mut values = values.borrow_mut();
            for (offset, register) in &self.registers {
                values.insert(*offset, register.reset);
            }
        });
    }
}
