//! Architectural state: everything an instruction's execution semantics can read or write.

use crate::csr::{self, CsrAddress, CsrFile, CsrPermission};
use crate::memory::{LoadResult, Memory};
use crate::registers::{Registers, Specifier};
use crate::status::Status;
use crate::trap::{CsrAccessError, CsrWriteError, TrapRegisters};
use crate::{PrivilegeLevel, Xlen};

/// Hart identity and reset parameters, supplied once at construction.
#[derive(Debug, Clone)]
pub struct Config {
    /// Value exposed through the read-only `mhartid` CSR.
    pub hart_id: u64,
    /// Initial value of `pc`.
    pub reset_vector: u64,
    /// Privilege level a fresh hart starts in. Real hardware always resets into M-mode; tests
    /// exercising privilege-gated behavior from a lower level can override this.
    pub initial_privilege: PrivilegeLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hart_id: 0,
            reset_vector: 0,
            initial_privilege: PrivilegeLevel::Machine,
        }
    }
}

/// The complete architectural state of a single hart.
///
/// Generic over the backing [`Memory`] implementation, the way a caller supplies its own bus or
/// flat array without this crate depending on either.
#[derive(Debug, Clone)]
pub struct ArchState<M: Memory> {
    registers: Registers,
    status: Status,
    trap: TrapRegisters,
    csrs: CsrFile,
    mem: M,
    privilege: PrivilegeLevel,
    minstret: u64,
    /// Set once execution should stop (an unhandled trap, or a caller-visible halt condition).
    /// Reset this to resume stepping; nothing in this crate clears it automatically.
    stop: bool,
    config: Config,
}

impl<M: Memory> ArchState<M> {
    pub fn new(config: Config, xlen: Xlen, mem: M) -> Self {
        Self {
            registers: Registers::new(config.reset_vector, xlen),
            status: Status::new(),
            trap: TrapRegisters::default(),
            csrs: CsrFile::new(),
            mem,
            privilege: config.initial_privilege,
            minstret: 0,
            stop: false,
            config,
        }
    }

    // -- Program counter --

    pub fn pc(&self) -> u64 {
        self.registers.pc()
    }

    /// Only [`crate::epilogue`]'s five transition primitives may call this: they are the sole
    /// authorized writers of `pc`.
    pub(crate) fn set_pc(&mut self, value: u64) {
        let xlen = self.registers.xlen();
        *self.registers.pc_mut() = xlen.truncate(value);
    }

    // -- General purpose registers --

    pub fn gpr(&self, specifier: Specifier) -> u64 {
        self.registers.x(specifier)
    }

    pub fn set_gpr(&mut self, specifier: Specifier, value: u64) {
        self.registers.set_x(specifier, value);
    }

    // -- Privilege level and XLEN --

    pub fn privilege(&self) -> PrivilegeLevel {
        self.privilege
    }

    /// Only [`crate::epilogue`]'s `trap` and `ret` primitives may call this.
    pub(crate) fn set_privilege(&mut self, value: PrivilegeLevel) {
        self.privilege = value;
    }

    pub fn xlen(&self) -> Xlen {
        self.registers.xlen()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // -- Retired-instruction / cycle counters --

    pub fn minstret(&self) -> u64 {
        self.minstret
    }

    /// Only [`crate::epilogue`]'s `common`, `jump`, `branch`, and `ret` primitives may call this:
    /// a trapping instruction does not retire.
    pub(crate) fn increment_minstret(&mut self) {
        self.minstret = self.minstret.wrapping_add(1);
    }

    pub fn mcycle(&self) -> u64 {
        self.csrs.mcycle()
    }

    /// Advances the cycle counter. Unlike `minstret`, this counts every instruction attempt,
    /// including ones that trap.
    pub fn increment_mcycle(&mut self) {
        self.csrs.increment_cycle();
    }

    // -- Halt flag --

    pub fn stop(&self) -> bool {
        self.stop
    }

    pub fn stop_write(&mut self, value: bool) {
        self.stop = value;
    }

    // -- Memory --

    pub fn mem_read_u8(&self, address: u64) -> LoadResult<u8> {
        self.mem.read_u8(address)
    }

    pub fn mem_read_u16(&self, address: u64) -> LoadResult<u16> {
        self.mem.read_u16(address)
    }

    pub fn mem_read_u32(&self, address: u64) -> LoadResult<u32> {
        self.mem.read_u32(address)
    }

    pub fn mem_read_u64(&self, address: u64) -> LoadResult<u64> {
        self.mem.read_u64(address)
    }

    pub fn mem_write_u8(&mut self, address: u64, value: u8) -> LoadResult<()> {
        self.mem.write_u8(address, value)
    }

    pub fn mem_write_u16(&mut self, address: u64, value: u16) -> LoadResult<()> {
        self.mem.write_u16(address, value)
    }

    pub fn mem_write_u32(&mut self, address: u64, value: u32) -> LoadResult<()> {
        self.mem.write_u32(address, value)
    }

    pub fn mem_write_u64(&mut self, address: u64, value: u64) -> LoadResult<()> {
        self.mem.write_u64(address, value)
    }

    // -- Status (mstatus/sstatus) --

    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Only [`crate::epilogue`]'s `trap` and `ret` primitives, and the `mstatus`/`sstatus` CSR
    /// write path, may call this.
    pub(crate) fn status_mut(&mut self) -> &mut Status {
        &mut self.status
    }

    // -- Trap bookkeeping registers --

    pub fn trap(&self) -> &TrapRegisters {
        &self.trap
    }

    /// Only [`crate::epilogue`]'s `trap` primitive, and the CSR write path for
    /// `mepc`/`mcause`/`mtval`/`mscratch` (and their S-mode counterparts), may call this.
    pub(crate) fn trap_mut(&mut self) -> &mut TrapRegisters {
        &mut self.trap
    }

    // -- CSR access --

    /// Resolves the access policy for `addr` from the current privilege level, per
    /// [`crate::csr::permission`].
    pub fn csr_permission(&self, addr: CsrAddress) -> CsrPermission {
        csr::permission(self.privilege, addr)
    }

    fn check_csr_access(&self, addr: CsrAddress) -> Result<CsrPermission, CsrAccessError> {
        if !csr::specifier::is_supported(addr) {
            return Err(CsrAccessError::CsrUnsupported(addr));
        }
        let required = csr::specifier::required_privilege_level(addr)
            .ok_or(CsrAccessError::CsrUnsupported(addr))?;
        if self.privilege < required {
            return Err(CsrAccessError::Privileged {
                specifier: addr,
                required,
                actual: self.privilege,
            });
        }
        Ok(if csr::specifier::is_read_only(addr) {
            CsrPermission::ReadOnly
        } else {
            CsrPermission::ReadWrite
        })
    }

    pub fn csr_read(&self, addr: CsrAddress) -> Result<u64, CsrAccessError> {
        self.check_csr_access(addr)?;
        Ok(self.csr_read_raw(addr))
    }

    pub fn csr_write(&mut self, addr: CsrAddress, value: u64) -> Result<(), CsrWriteError> {
        match self.check_csr_access(addr)? {
            CsrPermission::ReadOnly => Err(CsrWriteError::WriteToReadOnly),
            CsrPermission::ReadWrite => {
                self.csr_write_raw(addr, value);
                Ok(())
            }
            CsrPermission::None => unreachable!("check_csr_access never returns None"),
        }
    }

    fn csr_read_raw(&self, addr: CsrAddress) -> u64 {
        use csr::specifier::*;
        match addr {
            MSTATUS => self.status.read_mstatus(),
            SSTATUS => self.status.read_sstatus(),
            MISA => misa(self.xlen()),
            MVENDORID | MARCHID | MIMPID => 0,
            MHARTID => self.config.hart_id,
            MTVEC => self.csrs.read_mtvec(),
            STVEC => self.csrs.read_stvec(),
            SATP => self.csrs.read_satp(),
            MSCRATCH => self.trap.mscratch,
            MEPC => self.trap.mepc,
            MCAUSE => self.trap.mcause,
            MTVAL => self.trap.mtval,
            SSCRATCH => self.trap.sscratch,
            SEPC => self.trap.sepc,
            SCAUSE => self.trap.scause,
            STVAL => self.trap.stval,
            CYCLE | MCYCLE => self.csrs.mcycle(),
            CYCLEH | MCYCLEH => high32(self.csrs.mcycle()),
            TIME => self.csrs.mcycle(),
            TIMEH => high32(self.csrs.mcycle()),
            INSTRET | MINSTRET => self.minstret,
            INSTRETH | MINSTRETH => high32(self.minstret),
            _ => unreachable!("unsupported CSR {addr:#05x} reached csr_read_raw"),
        }
    }

    fn csr_write_raw(&mut self, addr: CsrAddress, value: u64) {
        use csr::specifier::*;
        match addr {
            MSTATUS => self.status.write_mstatus(value, u64::MAX),
            SSTATUS => self.status.write_sstatus(value, u64::MAX),
            MTVEC => self.csrs.write_mtvec(value),
            STVEC => self.csrs.write_stvec(value),
            SATP => self.csrs.write_satp(value),
            MSCRATCH => self.trap.mscratch = value,
            MEPC => self.trap.mepc = value & !0b11,
            MCAUSE => self.trap.mcause = value,
            MTVAL => self.trap.mtval = value,
            SSCRATCH => self.trap.sscratch = value,
            SEPC => self.trap.sepc = value & !0b11,
            SCAUSE => self.trap.scause = value,
            STVAL => self.trap.stval = value,
            MCYCLE => self.csrs.write_mcycle(value),
            MCYCLEH => self
                .csrs
                .write_mcycle(set_high32(self.csrs.mcycle(), value)),
            MINSTRET => self.minstret = value,
            MINSTRETH => self.minstret = set_high32(self.minstret, value),
            _ => unreachable!("writable CSR {addr:#05x} has no write-path in csr_write_raw"),
        }
    }
}

fn high32(value: u64) -> u64 {
    value >> 32
}

fn set_high32(value: u64, high: u64) -> u64 {
    (value & 0xFFFF_FFFF) | (high << 32)
}

/// The value exposed through the read-only `misa` CSR: a minimal I/M/S/U machine with no
/// compressed instructions and no floating point.
fn misa(xlen: Xlen) -> u64 {
    // Extension letters map to bit index `letter - 'A'`.
    const I: u64 = 1 << (b'I' - b'A');
    const M: u64 = 1 << (b'M' - b'A');
    const S: u64 = 1 << (b'S' - b'A');
    const U: u64 = 1 << (b'U' - b'A');
    let extensions = I | M | S | U;
    match xlen {
        Xlen::Rv32 => (1u64 << 30) | extensions,
        Xlen::Rv64 => (2u64 << 62) | extensions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::FlatMemory;

    fn new_state(xlen: Xlen) -> ArchState<FlatMemory> {
        ArchState::new(Config::default(), xlen, FlatMemory::new(64))
    }

    #[test]
    fn test_reset_state() {
        let state = new_state(Xlen::Rv64);
        assert_eq!(0, state.pc());
        assert_eq!(PrivilegeLevel::Machine, state.privilege());
        assert_eq!(0, state.minstret());
        assert!(!state.stop());
    }

    #[test]
    fn test_gpr_x0_ignores_writes() {
        let mut state = new_state(Xlen::Rv64);
        state.set_gpr(Specifier::X0, 42);
        assert_eq!(0, state.gpr(Specifier::X0));
    }

    #[test]
    fn test_csr_privilege_gate() {
        let mut state = new_state(Xlen::Rv64);
        state.set_privilege(PrivilegeLevel::User);
        assert!(state.csr_read(csr::specifier::MSTATUS).is_err());
        state.set_privilege(PrivilegeLevel::Machine);
        assert!(state.csr_read(csr::specifier::MSTATUS).is_ok());
    }

    #[test]
    fn test_csr_write_to_read_only_is_rejected() {
        let mut state = new_state(Xlen::Rv64);
        assert_eq!(
            Err(CsrWriteError::WriteToReadOnly),
            state.csr_write(csr::specifier::MHARTID, 1)
        );
    }

    #[test]
    fn test_minstret_h_split_on_rv32() {
        let mut state = new_state(Xlen::Rv32);
        state.csr_write(csr::specifier::MINSTRET, 0xFFFF_FFFF).unwrap();
        state.csr_write(csr::specifier::MINSTRETH, 1).unwrap();
        assert_eq!(0x1_FFFF_FFFF, state.minstret());
    }

    #[test]
    fn test_misa_mxl_matches_xlen() {
        assert_eq!(1, misa(Xlen::Rv32) >> 30 & 0b11);
        assert_eq!(2, misa(Xlen::Rv64) >> 62 & 0b11);
    }
}
