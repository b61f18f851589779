//! Exceptions and the trap-CSR storage they populate.

use thiserror::Error;

/// A trap cause, as raised by instruction semantics. Always an exception in this core: external
/// device interrupts are out of scope.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Exception {
    /// Inner value is the faulting (misaligned) target PC.
    InstructionAddressMisaligned(u64),
    /// Inner value is the raw instruction word, when available.
    ///
    /// Currently always `None` in this implementation: the decoder interface this core consumes
    /// does not thread the raw instruction word through (see `DESIGN.md`, open question 2).
    IllegalInstruction(Option<u64>),
    /// `tval` is the current `pc`.
    Breakpoint,
    /// Inner value is the faulting virtual address.
    LoadAddressMisaligned(u64),
    LoadAccessFault(u64),
    StoreOrAmoAddressMisaligned(u64),
    StoreOrAmoAccessFault(u64),
    EnvironmentCallFromUMode,
    EnvironmentCallFromSMode,
    EnvironmentCallFromMMode,
}

impl Exception {
    pub const INSTRUCTION_ADDRESS_MISALIGNED: u64 = 0;
    pub const ILLEGAL_INSTRUCTION: u64 = 2;
    pub const BREAKPOINT: u64 = 3;
    pub const LOAD_ADDRESS_MISALIGNED: u64 = 4;
    pub const LOAD_ACCESS_FAULT: u64 = 5;
    pub const STORE_OR_AMO_ADDRESS_MISALIGNED: u64 = 6;
    pub const STORE_OR_AMO_ACCESS_FAULT: u64 = 7;
    pub const ENVIRONMENT_CALL_FROM_U_MODE: u64 = 8;
    pub const ENVIRONMENT_CALL_FROM_S_MODE: u64 = 9;
    pub const ENVIRONMENT_CALL_FROM_M_MODE: u64 = 11;

    /// Returns the exception code (the value `mcause`/`scause` is set to).
    pub const fn code(&self) -> u64 {
        match self {
            Self::InstructionAddressMisaligned(_) => Self::INSTRUCTION_ADDRESS_MISALIGNED,
            Self::IllegalInstruction(_) => Self::ILLEGAL_INSTRUCTION,
            Self::Breakpoint => Self::BREAKPOINT,
            Self::LoadAddressMisaligned(_) => Self::LOAD_ADDRESS_MISALIGNED,
            Self::LoadAccessFault(_) => Self::LOAD_ACCESS_FAULT,
            Self::StoreOrAmoAddressMisaligned(_) => Self::STORE_OR_AMO_ADDRESS_MISALIGNED,
            Self::StoreOrAmoAccessFault(_) => Self::STORE_OR_AMO_ACCESS_FAULT,
            Self::EnvironmentCallFromUMode => Self::ENVIRONMENT_CALL_FROM_U_MODE,
            Self::EnvironmentCallFromSMode => Self::ENVIRONMENT_CALL_FROM_S_MODE,
            Self::EnvironmentCallFromMMode => Self::ENVIRONMENT_CALL_FROM_M_MODE,
        }
    }

    /// The `tval` value this exception carries, per SPEC_FULL.md §7.
    pub const fn tval(&self, pc: u64) -> u64 {
        match self {
            Self::IllegalInstruction(raw) => match raw {
                Some(raw) => *raw,
                None => 0,
            },
            Self::Breakpoint => pc,
            Self::InstructionAddressMisaligned(addr)
            | Self::LoadAddressMisaligned(addr)
            | Self::LoadAccessFault(addr)
            | Self::StoreOrAmoAddressMisaligned(addr)
            | Self::StoreOrAmoAccessFault(addr) => *addr,
            Self::EnvironmentCallFromUMode
            | Self::EnvironmentCallFromSMode
            | Self::EnvironmentCallFromMMode => 0,
        }
    }
}

impl std::fmt::Display for Exception {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "exception (cause={:#x})", self.code())
    }
}

impl std::error::Error for Exception {}

/// Errors surfaced by CSR permission checks. See [`crate::csr`].
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
pub enum CsrAccessError {
    #[error("unsupported CSR: {0:#05x}")]
    CsrUnsupported(u16),
    #[error("cannot access CSR {specifier:#05x} from privilege level {actual}, requires {required}")]
    Privileged {
        specifier: u16,
        required: crate::PrivilegeLevel,
        actual: crate::PrivilegeLevel,
    },
}

#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
pub enum CsrWriteError {
    #[error("{0}")]
    AccessError(#[from] CsrAccessError),
    #[error("write to read-only CSR")]
    WriteToReadOnly,
}

/// Per-privilege-level trap bookkeeping registers (`mepc`/`mcause`/`mtval`/`mscratch` and their
/// S-mode counterparts).
#[derive(Debug, Clone, Default)]
pub struct TrapRegisters {
    pub mscratch: u64,
    pub mepc: u64,
    pub mcause: u64,
    pub mtval: u64,

    pub sscratch: u64,
    pub sepc: u64,
    pub scause: u64,
    pub stval: u64,
}
