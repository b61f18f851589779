//! The `mstatus`/`sstatus` registers, restricted to the fields `MRET`/`SRET`/trap-entry need.
//!
//! Everything else `mstatus` defines (FS/VS/XS extension-context tracking, MPRV/SUM/MXR memory
//! privilege modifiers, TVM/TW/TSR trap-virtualization bits) has no reader in this core: the F/D/V
//! extensions, MMU, and multi-hart trapping are all out of scope. Only the fields that `mret`,
//! `sret`, and trap entry actually read or write are modelled.

use bitvec::{field::BitField, order::Lsb0, view::BitView};

use crate::PrivilegeLevel;

/// Mask to apply to `mstatus` to obtain the restricted `sstatus` view.
const SSTATUS_MASK: u32 = (1 << idx::SIE) | (1 << idx::SPIE) | (1 << idx::SPP);

/// Provides the `mstatus`/`sstatus` registers.
///
/// > The mstatus register is an MXLEN-bit read/write register [...]. The mstatus register keeps
/// > track of and controls the hart's current operating state. A restricted view of mstatus
/// > appears as the sstatus register in the S-level ISA.
#[derive(Debug, Clone, Default)]
pub struct Status {
    mstatus: u32,
}

impl Status {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mie(&self) -> bool {
        self.mstatus.view_bits::<Lsb0>()[idx::MIE]
    }

    pub fn set_mie(&mut self, value: bool) {
        self.mstatus.view_bits_mut::<Lsb0>().set(idx::MIE, value);
    }

    pub fn sie(&self) -> bool {
        self.mstatus.view_bits::<Lsb0>()[idx::SIE]
    }

    pub fn set_sie(&mut self, value: bool) {
        self.mstatus.view_bits_mut::<Lsb0>().set(idx::SIE, value);
    }

    pub fn mpie(&self) -> bool {
        self.mstatus.view_bits::<Lsb0>()[idx::MPIE]
    }

    pub fn set_mpie(&mut self, value: bool) {
        self.mstatus.view_bits_mut::<Lsb0>().set(idx::MPIE, value);
    }

    pub fn spie(&self) -> bool {
        self.mstatus.view_bits::<Lsb0>()[idx::SPIE]
    }

    pub fn set_spie(&mut self, value: bool) {
        self.mstatus.view_bits_mut::<Lsb0>().set(idx::SPIE, value);
    }

    /// The privilege level encoded by the MPP (M-mode Previous Privilege level) field.
    ///
    /// The MPP field is **WARL**.
    pub fn mpp(&self) -> PrivilegeLevel {
        RawPrivilegeLevel::from_u2(
            self.mstatus.view_bits::<Lsb0>()[idx::MPP..(idx::MPP + 2)].load_le(),
        )
        .try_into()
        .unwrap_or(PrivilegeLevel::User)
    }

    /// Sets the MPP field. Illegal (reserved) values are dropped, per the field's WARL status.
    pub fn set_mpp(&mut self, value: RawPrivilegeLevel) {
        if value == RawPrivilegeLevel::Reserved {
            return;
        }
        self.mstatus.view_bits_mut::<Lsb0>()[idx::MPP..(idx::MPP + 2)].store_le(value as u8);
    }

    /// The privilege level encoded by the SPP (S-mode Previous Privilege level) field.
    ///
    /// SPP is a single bit: it can only encode U or S.
    pub fn spp(&self) -> PrivilegeLevel {
        match self.mstatus.view_bits::<Lsb0>()[idx::SPP] {
            false => PrivilegeLevel::User,
            true => PrivilegeLevel::Supervisor,
        }
    }

    /// Sets the SPP field. Values above Supervisor are dropped, per the field's WARL status.
    pub fn set_spp(&mut self, value: RawPrivilegeLevel) {
        match value {
            RawPrivilegeLevel::User => {
                self.mstatus.view_bits_mut::<Lsb0>().set(idx::SPP, false);
            }
            RawPrivilegeLevel::Supervisor => {
                self.mstatus.view_bits_mut::<Lsb0>().set(idx::SPP, true);
            }
            RawPrivilegeLevel::Reserved | RawPrivilegeLevel::Machine => {}
        }
    }

    pub fn read_mstatus(&self) -> u64 {
        self.mstatus as u64
    }

    pub fn write_mstatus(&mut self, value: u64, mask: u64) {
        let value = value as u32;
        let mask = mask as u32;
        self.mstatus = self.mstatus & !mask | value & mask;
    }

    pub fn read_sstatus(&self) -> u64 {
        (self.mstatus & SSTATUS_MASK) as u64
    }

    pub fn write_sstatus(&mut self, value: u64, mask: u64) {
        self.write_mstatus(value, mask & u64::from(SSTATUS_MASK));
    }
}

/// Bit indices into the `mstatus` register.
mod idx {
    pub const SIE: usize = 1;
    pub const MIE: usize = 3;
    pub const SPIE: usize = 5;
    pub const MPIE: usize = 7;
    pub const SPP: usize = 8;
    pub const MPP: usize = 11;
}

/// All possible 2-bit privilege-level encodings, including the reserved one (`0b10`).
///
/// Distinct from [`PrivilegeLevel`] because WARL fields like MPP/SPP can transiently hold the
/// reserved encoding and must not panic when read back before being corrected.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RawPrivilegeLevel {
    User = 0,
    Supervisor = 1,
    Reserved = 2,
    Machine = 3,
}

impl RawPrivilegeLevel {
    pub fn from_u2(value: u8) -> Self {
        match value {
            0 => Self::User,
            1 => Self::Supervisor,
            2 => Self::Reserved,
            3 => Self::Machine,
            _ => panic!("out of range u2 used"),
        }
    }
}

impl From<PrivilegeLevel> for RawPrivilegeLevel {
    fn from(value: PrivilegeLevel) -> Self {
        match value {
            PrivilegeLevel::User => Self::User,
            PrivilegeLevel::Supervisor => Self::Supervisor,
            PrivilegeLevel::Machine => Self::Machine,
        }
    }
}

impl TryFrom<RawPrivilegeLevel> for PrivilegeLevel {
    type Error = ();

    fn try_from(value: RawPrivilegeLevel) -> Result<Self, Self::Error> {
        match value {
            RawPrivilegeLevel::User => Ok(Self::User),
            RawPrivilegeLevel::Supervisor => Ok(Self::Supervisor),
            RawPrivilegeLevel::Machine => Ok(Self::Machine),
            RawPrivilegeLevel::Reserved => Err(()),
        }
    }
}
