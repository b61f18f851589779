//! The decoded instruction set this core executes.
//!
//! This is the boundary with the (out-of-scope) decoder: nothing here parses raw instruction
//! words from memory. Each variant already carries its operands in a directly-usable shape
//! (register specifiers, sign-extended immediates, an inner op tag selecting the exact
//! operation), grouped the way the base ISA's instruction formats group them.

use crate::csr::CsrAddress;
use crate::registers::Specifier;

/// Operations available to the immediate ALU forms (`ADDI`/`SLTI`/`SLTIU`/`XORI`/`ORI`/`ANDI`).
///
/// There is no immediate subtract: `SUBI` does not exist, callers use `ADDI` with a negated
/// immediate.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum IntOp {
    Add,
    Slt,
    Sltu,
    Xor,
    Or,
    And,
}

/// Operations available to the immediate shift forms (`SLLI`/`SRLI`/`SRAI`, and their `W`-suffixed
/// RV64 counterparts).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ShiftOp {
    Sll,
    Srl,
    Sra,
}

/// Operations available to the register-register ALU form (`OP`), including the M extension.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RegOp {
    Add,
    Sub,
    Sll,
    Slt,
    Sltu,
    Xor,
    Srl,
    Sra,
    Or,
    And,
    Mul,
    Mulh,
    Mulhsu,
    Mulhu,
    Div,
    Divu,
    Rem,
    Remu,
}

/// Operations available to the `W`-suffixed (RV64-only) register-register form (`OP-32`).
///
/// A strict subset of [`RegOp`]: there is no `SLTW`/`SLTUW`/`XORW`/`ORW`/`ANDW`, since those
/// operations are already width-independent and the base `OP` form covers them.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RegOpW {
    Add,
    Sub,
    Sll,
    Srl,
    Sra,
    Mul,
    Div,
    Divu,
    Rem,
    Remu,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BranchOp {
    Beq,
    Bne,
    Blt,
    Bge,
    Bltu,
    Bgeu,
}

/// Width (and, for `LB`/`LH`/`LW`, signedness) of a load.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LoadWidth {
    Byte,
    ByteUnsigned,
    Half,
    HalfUnsigned,
    Word,
    /// RV64 only.
    WordUnsigned,
    /// RV64 only.
    Double,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StoreWidth {
    Byte,
    Half,
    Word,
    /// RV64 only.
    Double,
}

/// The read-modify-write operation a CSR instruction performs between the CSR and a source value.
///
/// > The CSRRW (Atomic Read/Write CSR) instruction atomically swaps values in the CSRs and
/// > integer registers. CSRRS (Atomic Read and Set Bits in CSR) reads the value of the CSR,
/// > zero-extends the value [...] and writes it to integer register rd. The initial value in
/// > integer register rs1 is treated as a bit mask that specifies bit positions to be set in the
/// > CSR. [...] CSRRC (Atomic Read and Clear Bits in CSR) [is] analogous to CSRRS.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CsrOp {
    ReadWrite,
    ReadSet,
    ReadClear,
}

/// A fully decoded instruction, ready for execution against an `ArchState`.
///
/// Immediates are represented as `i32`: every immediate field the base ISA and its `C`-free 32-bit
/// encoding produces (even RV64 ones) is sign-extended from at most 32 bits, so `i32` always has
/// enough range; sign-extension to the architectural word width happens in the execution
/// semantics, not here.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Instruction {
    OpImm {
        op: IntOp,
        rd: Specifier,
        rs1: Specifier,
        imm: i32,
    },
    OpShiftImm {
        op: ShiftOp,
        rd: Specifier,
        rs1: Specifier,
        shamt: u32,
    },
    /// `ADDIW`. RV64 only.
    AddiW {
        rd: Specifier,
        rs1: Specifier,
        imm: i32,
    },
    /// `SLLIW`/`SRLIW`/`SRAIW`. RV64 only; `shamt` is 5 bits.
    OpShiftImmW {
        op: ShiftOp,
        rd: Specifier,
        rs1: Specifier,
        shamt: u32,
    },
    /// `imm` is the full 32-bit upper immediate (bits 31:12 of the encoding, bits 11:0 zero),
    /// already sign-extended; this instruction does not shift it further.
    Auipc {
        rd: Specifier,
        imm: i32,
    },
    /// See [`Instruction::Auipc`] for the `imm` convention.
    Lui {
        rd: Specifier,
        imm: i32,
    },
    Op {
        op: RegOp,
        rd: Specifier,
        rs1: Specifier,
        rs2: Specifier,
    },
    /// `OP-32`. RV64 only.
    OpW {
        op: RegOpW,
        rd: Specifier,
        rs1: Specifier,
        rs2: Specifier,
    },
    Jal {
        rd: Specifier,
        imm: i32,
    },
    Jalr {
        rd: Specifier,
        rs1: Specifier,
        imm: i32,
    },
    Branch {
        op: BranchOp,
        rs1: Specifier,
        rs2: Specifier,
        imm: i32,
    },
    Load {
        width: LoadWidth,
        rd: Specifier,
        rs1: Specifier,
        imm: i32,
    },
    Store {
        width: StoreWidth,
        rs1: Specifier,
        rs2: Specifier,
        imm: i32,
    },
    /// `FENCE`. A no-op: this core executes on a single hart with no other memory observers.
    Fence,
    /// `FENCE.I`. A no-op: there is no separate instruction cache to synchronize.
    FenceI,
    /// `SFENCE.VMA`. A no-op: address translation is out of scope.
    SfenceVm,
    Ecall,
    Ebreak,
    Mret,
    Sret,
    Csr {
        op: CsrOp,
        rd: Specifier,
        rs1: Specifier,
        csr: CsrAddress,
    },
    /// `CSRRWI`/`CSRRSI`/`CSRRCI`: the operand is a 5-bit immediate instead of a register.
    Csri {
        op: CsrOp,
        rd: Specifier,
        uimm: u8,
        csr: CsrAddress,
    },
    /// Not a real opcode: stands in for any encoding this core does not implement.
    ///
    /// `URET` decodes to this variant: the N extension (user-mode traps) is not modelled, so there
    /// is no `uepc` for it to return to. This is an open question rather than a closed one — see
    /// `DESIGN.md`.
    Illegal,
}
