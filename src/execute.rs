//! Instruction execution semantics: the `Instruction` → `ArchState` transformation.

use log::trace;

use crate::epilogue::{self, INSTRUCTION_WIDTH};
use crate::instruction::{
    BranchOp, CsrOp, Instruction, IntOp, LoadWidth, RegOp, RegOpW, ShiftOp, StoreWidth,
};
use crate::memory::{LoadResult, Memory, MemoryError};
use crate::registers::Specifier;
use crate::sign_extend;
use crate::state::ArchState;
use crate::trap::{CsrAccessError, CsrWriteError, Exception};
use crate::{PrivilegeLevel, Xlen};

/// Executes a single decoded instruction against `state`.
///
/// On an exception, this calls the `trap` epilogue itself rather than returning the exception to
/// the caller: the resulting state (`stop` set, `mcause`/`mepc`/`mtval` populated) is always
/// visible to the caller through `state`. Callers step the hart in a loop and check
/// [`ArchState::stop`] between calls.
pub fn execute<M: Memory>(state: &mut ArchState<M>, instruction: Instruction) {
    if let Err(exception) = try_execute(state, instruction) {
        epilogue::trap(state, exception);
    }
}

fn try_execute<M: Memory>(state: &mut ArchState<M>, instruction: Instruction) -> Result<(), Exception> {
    match instruction {
        Instruction::OpImm { op, rd, rs1, imm } => {
            trace!("Executing op-imm {op:?} {rd} {rs1} {imm}");
            let result = reg_imm_op(state, op, rs1, imm);
            state.set_gpr(rd, result);
            epilogue::common(state);
            Ok(())
        }
        Instruction::OpShiftImm { op, rd, rs1, shamt } => {
            trace!("Executing shift-imm {op:?} {rd} {rs1} {shamt}");
            let result = shift_imm_op(state, op, rs1, shamt);
            state.set_gpr(rd, result);
            epilogue::common(state);
            Ok(())
        }
        Instruction::AddiW { rd, rs1, imm } => {
            trace!("Executing addiw {rd} {rs1} {imm}");
            let a = state.gpr(rs1) as u32 as i32;
            let result = (a.wrapping_add(imm) as i64) as u64;
            state.set_gpr(rd, result);
            epilogue::common(state);
            Ok(())
        }
        Instruction::OpShiftImmW { op, rd, rs1, shamt } => {
            trace!("Executing shift-immw {op:?} {rd} {rs1} {shamt}");
            let a = state.gpr(rs1) as u32;
            let result32: i32 = match op {
                ShiftOp::Sll => a.wrapping_shl(shamt) as i32,
                ShiftOp::Srl => a.wrapping_shr(shamt) as i32,
                ShiftOp::Sra => (a as i32).wrapping_shr(shamt),
            };
            state.set_gpr(rd, result32 as i64 as u64);
            epilogue::common(state);
            Ok(())
        }
        Instruction::Auipc { rd, imm } => {
            trace!("Executing auipc {rd} {imm}");
            let result = state.pc().wrapping_add(imm as i64 as u64);
            state.set_gpr(rd, result);
            epilogue::common(state);
            Ok(())
        }
        Instruction::Lui { rd, imm } => {
            trace!("Executing lui {rd} {imm}");
            state.set_gpr(rd, imm as i64 as u64);
            epilogue::common(state);
            Ok(())
        }
        Instruction::Op { op, rd, rs1, rs2 } => {
            trace!("Executing op {op:?} {rd} {rs1} {rs2}");
            let result = reg_reg_op(state, op, rs1, rs2);
            state.set_gpr(rd, result);
            epilogue::common(state);
            Ok(())
        }
        Instruction::OpW { op, rd, rs1, rs2 } => {
            trace!("Executing opw {op:?} {rd} {rs1} {rs2}");
            let result = reg_reg_op_w(state.gpr(rs1), state.gpr(rs2), op);
            state.set_gpr(rd, result);
            epilogue::common(state);
            Ok(())
        }
        Instruction::Jal { rd, imm } => {
            trace!("Executing jal {rd} {imm}");
            let link = state.pc().wrapping_add(INSTRUCTION_WIDTH);
            let target = state.pc().wrapping_add(imm as i64 as u64);
            epilogue::jump(state, target)?;
            state.set_gpr(rd, link);
            Ok(())
        }
        Instruction::Jalr { rd, rs1, imm } => {
            trace!("Executing jalr {rd} {rs1} {imm}");
            let link = state.pc().wrapping_add(INSTRUCTION_WIDTH);
            // Per design decision, the low bit of the computed target is *not* cleared here; see
            // DESIGN.md.
            let target = state.gpr(rs1).wrapping_add(imm as i64 as u64);
            epilogue::jump(state, target)?;
            state.set_gpr(rd, link);
            Ok(())
        }
        Instruction::Branch { op, rs1, rs2, imm } => {
            trace!("Executing branch {op:?} {rs1} {rs2} {imm}");
            let taken = branch_taken(state, op, rs1, rs2);
            let target = state.pc().wrapping_add(imm as i64 as u64);
            epilogue::branch(state, taken, target)
        }
        Instruction::Load { width, rd, rs1, imm } => {
            trace!("Executing load {width:?} {rd} {imm}({rs1})");
            let addr = state.gpr(rs1).wrapping_add(imm as i64 as u64);
            let value = load_value(state, width, addr)
                .map_err(|e| memory_error_to_exception(e, addr, false))?;
            state.set_gpr(rd, value);
            epilogue::common(state);
            Ok(())
        }
        Instruction::Store { width, rs1, rs2, imm } => {
            trace!("Executing store {width:?} {rs2} {imm}({rs1})");
            let addr = state.gpr(rs1).wrapping_add(imm as i64 as u64);
            let value = state.gpr(rs2);
            store_value(state, width, addr, value)
                .map_err(|e| memory_error_to_exception(e, addr, true))?;
            epilogue::common(state);
            Ok(())
        }
        Instruction::Fence | Instruction::FenceI | Instruction::SfenceVm => {
            trace!("Executing fence-family {instruction:?}");
            epilogue::common(state);
            Ok(())
        }
        Instruction::Ecall => {
            trace!("Executing ecall");
            Err(match state.privilege() {
                PrivilegeLevel::User => Exception::EnvironmentCallFromUMode,
                PrivilegeLevel::Supervisor => Exception::EnvironmentCallFromSMode,
                PrivilegeLevel::Machine => Exception::EnvironmentCallFromMMode,
            })
        }
        Instruction::Ebreak => {
            trace!("Executing ebreak");
            Err(Exception::Breakpoint)
        }
        Instruction::Mret => {
            trace!("Executing mret");
            if state.privilege() != PrivilegeLevel::Machine {
                return Err(Exception::IllegalInstruction(None));
            }
            epilogue::ret(state, PrivilegeLevel::Machine);
            Ok(())
        }
        Instruction::Sret => {
            trace!("Executing sret");
            if state.privilege() < PrivilegeLevel::Supervisor {
                return Err(Exception::IllegalInstruction(None));
            }
            epilogue::ret(state, PrivilegeLevel::Supervisor);
            Ok(())
        }
        Instruction::Csr { op, rd, rs1, csr } => {
            trace!("Executing csr {op:?} {rd} {rs1} {csr:?}");
            exec_csr(state, op, rd, rs1, csr)
        }
        Instruction::Csri { op, rd, uimm, csr } => {
            trace!("Executing csri {op:?} {rd} {uimm} {csr:?}");
            exec_csri(state, op, rd, uimm, csr)
        }
        Instruction::Illegal => {
            trace!("Executing illegal");
            Err(Exception::IllegalInstruction(None))
        }
    }
}

// -- Operand helpers --

/// The value of `rs1`, sign-extended from the architectural word width to 64 bits.
fn read_signed<M: Memory>(state: &ArchState<M>, rs1: Specifier) -> i64 {
    let raw = state.gpr(rs1);
    match state.xlen() {
        Xlen::Rv32 => sign_extend(raw, 32),
        Xlen::Rv64 => raw as i64,
    }
}

/// The value of `rs1`, zero-extended to 64 bits (registers already hold this representation).
fn read_unsigned<M: Memory>(state: &ArchState<M>, rs1: Specifier) -> u64 {
    state.gpr(rs1)
}

/// `imm` sign-extended and then truncated to the architectural word width, for use alongside
/// [`read_unsigned`] in bitwise/unsigned-compare operations.
fn truncated_imm<M: Memory>(state: &ArchState<M>, imm: i32) -> u64 {
    state.xlen().truncate(imm as i64 as u64)
}

// -- Immediate ALU / shift ops --

fn reg_imm_op<M: Memory>(state: &ArchState<M>, op: IntOp, rs1: Specifier, imm: i32) -> u64 {
    match op {
        IntOp::Add => (read_signed(state, rs1).wrapping_add(imm as i64)) as u64,
        IntOp::Slt => u64::from(read_signed(state, rs1) < imm as i64),
        IntOp::Sltu => u64::from(read_unsigned(state, rs1) < truncated_imm(state, imm)),
        IntOp::Xor => read_unsigned(state, rs1) ^ truncated_imm(state, imm),
        IntOp::Or => read_unsigned(state, rs1) | truncated_imm(state, imm),
        IntOp::And => read_unsigned(state, rs1) & truncated_imm(state, imm),
    }
}

fn shift_imm_op<M: Memory>(state: &ArchState<M>, op: ShiftOp, rs1: Specifier, shamt: u32) -> u64 {
    let mask = state.xlen().shift_mask() as u32;
    let shamt = shamt & mask;
    match op {
        ShiftOp::Sll => read_unsigned(state, rs1).wrapping_shl(shamt),
        ShiftOp::Srl => read_unsigned(state, rs1).wrapping_shr(shamt),
        ShiftOp::Sra => (read_signed(state, rs1).wrapping_shr(shamt)) as u64,
    }
}

// -- Register-register ALU / M-extension ops --

fn reg_reg_op<M: Memory>(state: &ArchState<M>, op: RegOp, rs1: Specifier, rs2: Specifier) -> u64 {
    let xlen = state.xlen();
    let shift_mask = xlen.shift_mask() as u32;
    match op {
        RegOp::Add => read_unsigned(state, rs1).wrapping_add(read_unsigned(state, rs2)),
        RegOp::Sub => read_unsigned(state, rs1).wrapping_sub(read_unsigned(state, rs2)),
        RegOp::Sll => {
            let shamt = (read_unsigned(state, rs2) as u32) & shift_mask;
            read_unsigned(state, rs1).wrapping_shl(shamt)
        }
        RegOp::Slt => u64::from(read_signed(state, rs1) < read_signed(state, rs2)),
        RegOp::Sltu => u64::from(read_unsigned(state, rs1) < read_unsigned(state, rs2)),
        RegOp::Xor => read_unsigned(state, rs1) ^ read_unsigned(state, rs2),
        RegOp::Srl => {
            let shamt = (read_unsigned(state, rs2) as u32) & shift_mask;
            read_unsigned(state, rs1).wrapping_shr(shamt)
        }
        RegOp::Sra => {
            let shamt = (read_unsigned(state, rs2) as u32) & shift_mask;
            (read_signed(state, rs1).wrapping_shr(shamt)) as u64
        }
        RegOp::Or => read_unsigned(state, rs1) | read_unsigned(state, rs2),
        RegOp::And => read_unsigned(state, rs1) & read_unsigned(state, rs2),
        RegOp::Mul => read_unsigned(state, rs1).wrapping_mul(read_unsigned(state, rs2)),
        RegOp::Mulh => {
            let product = i128::from(read_signed(state, rs1)) * i128::from(read_signed(state, rs2));
            (product >> xlen.bits()) as u64
        }
        RegOp::Mulhsu => {
            let a = i128::from(read_signed(state, rs1));
            let b = read_unsigned(state, rs2) as u128 as i128;
            let product = a * b;
            (product >> xlen.bits()) as u64
        }
        RegOp::Mulhu => {
            let product = u128::from(read_unsigned(state, rs1)) * u128::from(read_unsigned(state, rs2));
            (product >> xlen.bits()) as u64
        }
        RegOp::Div => div_signed(read_signed(state, rs1), read_signed(state, rs2), xlen),
        RegOp::Divu => div_unsigned(read_unsigned(state, rs1), read_unsigned(state, rs2), xlen),
        RegOp::Rem => rem_signed(read_signed(state, rs1), read_signed(state, rs2), xlen),
        RegOp::Remu => rem_unsigned(read_unsigned(state, rs1), read_unsigned(state, rs2)),
    }
}

/// The most negative value representable in `xlen` bits, sign-extended to 64 bits. Used to detect
/// the signed division/remainder overflow case (`MIN / -1`).
fn xlen_min_signed(xlen: Xlen) -> i64 {
    i64::MIN >> (64 - xlen.bits())
}

fn div_signed(a: i64, b: i64, xlen: Xlen) -> u64 {
    if b == 0 {
        return xlen.word_mask();
    }
    if a == xlen_min_signed(xlen) && b == -1 {
        return a as u64;
    }
    a.wrapping_div(b) as u64
}

fn rem_signed(a: i64, b: i64, xlen: Xlen) -> u64 {
    if b == 0 {
        return a as u64;
    }
    if a == xlen_min_signed(xlen) && b == -1 {
        return 0;
    }
    a.wrapping_rem(b) as u64
}

fn div_unsigned(a: u64, b: u64, xlen: Xlen) -> u64 {
    if b == 0 {
        return xlen.word_mask();
    }
    a.wrapping_div(b)
}

fn rem_unsigned(a: u64, b: u64) -> u64 {
    if b == 0 {
        return a;
    }
    a.wrapping_rem(b)
}

fn div_signed32(a: i32, b: i32) -> i32 {
    if b == 0 {
        return -1;
    }
    if a == i32::MIN && b == -1 {
        return a;
    }
    a.wrapping_div(b)
}

fn rem_signed32(a: i32, b: i32) -> i32 {
    if b == 0 {
        return a;
    }
    if a == i32::MIN && b == -1 {
        return 0;
    }
    a.wrapping_rem(b)
}

fn div_unsigned32(a: u32, b: u32) -> u32 {
    if b == 0 {
        return u32::MAX;
    }
    a.wrapping_div(b)
}

fn rem_unsigned32(a: u32, b: u32) -> u32 {
    if b == 0 {
        return a;
    }
    a.wrapping_rem(b)
}

/// `OP-32`: operates on the low 32 bits of both operands, sign-extending the result to 64 bits.
fn reg_reg_op_w(rs1_val: u64, rs2_val: u64, op: RegOpW) -> u64 {
    let a32 = rs1_val as u32;
    let b32 = rs2_val as u32;
    let ai = a32 as i32;
    let bi = b32 as i32;
    let result32: i32 = match op {
        RegOpW::Add => ai.wrapping_add(bi),
        RegOpW::Sub => ai.wrapping_sub(bi),
        RegOpW::Sll => a32.wrapping_shl(b32 & 0x1F) as i32,
        RegOpW::Srl => a32.wrapping_shr(b32 & 0x1F) as i32,
        RegOpW::Sra => ai.wrapping_shr(b32 & 0x1F),
        RegOpW::Mul => ai.wrapping_mul(bi),
        RegOpW::Div => div_signed32(ai, bi),
        RegOpW::Divu => div_unsigned32(a32, b32) as i32,
        RegOpW::Rem => rem_signed32(ai, bi),
        RegOpW::Remu => rem_unsigned32(a32, b32) as i32,
    };
    result32 as i64 as u64
}

// -- Branch --

fn branch_taken<M: Memory>(state: &ArchState<M>, op: BranchOp, rs1: Specifier, rs2: Specifier) -> bool {
    match op {
        BranchOp::Beq => read_unsigned(state, rs1) == read_unsigned(state, rs2),
        BranchOp::Bne => read_unsigned(state, rs1) != read_unsigned(state, rs2),
        BranchOp::Blt => read_signed(state, rs1) < read_signed(state, rs2),
        BranchOp::Bge => read_signed(state, rs1) >= read_signed(state, rs2),
        BranchOp::Bltu => read_unsigned(state, rs1) < read_unsigned(state, rs2),
        BranchOp::Bgeu => read_unsigned(state, rs1) >= read_unsigned(state, rs2),
    }
}

// -- Loads / stores --

fn load_value<M: Memory>(state: &ArchState<M>, width: LoadWidth, addr: u64) -> LoadResult<u64> {
    Ok(match width {
        LoadWidth::Byte => sign_extend(u64::from(state.mem_read_u8(addr)?), 8) as u64,
        LoadWidth::ByteUnsigned => u64::from(state.mem_read_u8(addr)?),
        LoadWidth::Half => sign_extend(u64::from(state.mem_read_u16(addr)?), 16) as u64,
        LoadWidth::HalfUnsigned => u64::from(state.mem_read_u16(addr)?),
        LoadWidth::Word => sign_extend(u64::from(state.mem_read_u32(addr)?), 32) as u64,
        LoadWidth::WordUnsigned => u64::from(state.mem_read_u32(addr)?),
        LoadWidth::Double => state.mem_read_u64(addr)?,
    })
}

fn store_value<M: Memory>(
    state: &mut ArchState<M>,
    width: StoreWidth,
    addr: u64,
    value: u64,
) -> LoadResult<()> {
    match width {
        StoreWidth::Byte => state.mem_write_u8(addr, value as u8),
        StoreWidth::Half => state.mem_write_u16(addr, value as u16),
        StoreWidth::Word => state.mem_write_u32(addr, value as u32),
        StoreWidth::Double => state.mem_write_u64(addr, value),
    }
}

fn memory_error_to_exception(error: MemoryError, addr: u64, is_store: bool) -> Exception {
    match (error, is_store) {
        (MemoryError::MisalignedAccess, false) => Exception::LoadAddressMisaligned(addr),
        (MemoryError::AccessFault, false) => Exception::LoadAccessFault(addr),
        (MemoryError::MisalignedAccess, true) => Exception::StoreOrAmoAddressMisaligned(addr),
        (MemoryError::AccessFault, true) => Exception::StoreOrAmoAccessFault(addr),
    }
}

// -- CSR access --

fn csr_access_to_exception(_: CsrAccessError) -> Exception {
    Exception::IllegalInstruction(None)
}

fn csr_write_to_exception(_: CsrWriteError) -> Exception {
    Exception::IllegalInstruction(None)
}

fn exec_csr<M: Memory>(
    state: &mut ArchState<M>,
    op: CsrOp,
    rd: Specifier,
    rs1: Specifier,
    csr: crate::csr::CsrAddress,
) -> Result<(), Exception> {
    let old = state.csr_read(csr).map_err(csr_access_to_exception)?;
    let write_val = match op {
        CsrOp::ReadWrite => Some(state.gpr(rs1)),
        CsrOp::ReadSet if rs1.is_zero() => None,
        CsrOp::ReadSet => Some(old | state.gpr(rs1)),
        CsrOp::ReadClear if rs1.is_zero() => None,
        CsrOp::ReadClear => Some(old & !state.gpr(rs1)),
    };
    if let Some(value) = write_val {
        state.csr_write(csr, value).map_err(csr_write_to_exception)?;
    }
    state.set_gpr(rd, old);
    epilogue::common(state);
    Ok(())
}

fn exec_csri<M: Memory>(
    state: &mut ArchState<M>,
    op: CsrOp,
    rd: Specifier,
    uimm: u8,
    csr: crate::csr::CsrAddress,
) -> Result<(), Exception> {
    let old = state.csr_read(csr).map_err(csr_access_to_exception)?;
    let imm = u64::from(uimm);
    let write_val = match op {
        CsrOp::ReadWrite => Some(imm),
        CsrOp::ReadSet if uimm == 0 => None,
        CsrOp::ReadSet => Some(old | imm),
        CsrOp::ReadClear if uimm == 0 => None,
        CsrOp::ReadClear => Some(old & !imm),
    };
    if let Some(value) = write_val {
        state.csr_write(csr, value).map_err(csr_write_to_exception)?;
    }
    state.set_gpr(rd, old);
    epilogue::common(state);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csr;
    use crate::memory::FlatMemory;
    use crate::state::Config;

    fn new_state(xlen: Xlen) -> ArchState<FlatMemory> {
        ArchState::new(Config::default(), xlen, FlatMemory::new(256))
    }

    #[test]
    fn test_addi() {
        let mut state = new_state(Xlen::Rv64);
        state.set_gpr(Specifier::from_u5(1), 5);
        execute(
            &mut state,
            Instruction::OpImm {
                op: IntOp::Add,
                rd: Specifier::from_u5(2),
                rs1: Specifier::from_u5(1),
                imm: -3,
            },
        );
        assert_eq!(2, state.gpr(Specifier::from_u5(2)));
        assert_eq!(4, state.pc());
        assert_eq!(1, state.minstret());
    }

    #[test]
    fn test_div_by_zero() {
        let mut state = new_state(Xlen::Rv64);
        state.set_gpr(Specifier::from_u5(1), 10);
        state.set_gpr(Specifier::from_u5(2), 0);
        execute(
            &mut state,
            Instruction::Op {
                op: RegOp::Div,
                rd: Specifier::from_u5(3),
                rs1: Specifier::from_u5(1),
                rs2: Specifier::from_u5(2),
            },
        );
        assert_eq!(u64::MAX, state.gpr(Specifier::from_u5(3)));
    }

    #[test]
    fn test_div_overflow() {
        let mut state = new_state(Xlen::Rv32);
        state.set_gpr(Specifier::from_u5(1), i32::MIN as u32 as u64);
        state.set_gpr(Specifier::from_u5(2), u64::from(u32::MAX)); // -1 truncated to 32 bits
        execute(
            &mut state,
            Instruction::Op {
                op: RegOp::Div,
                rd: Specifier::from_u5(3),
                rs1: Specifier::from_u5(1),
                rs2: Specifier::from_u5(2),
            },
        );
        assert_eq!(i32::MIN as u32 as u64, state.gpr(Specifier::from_u5(3)));
    }

    #[test]
    fn test_jalr_does_not_clear_low_bit() {
        let mut state = new_state(Xlen::Rv64);
        state.set_gpr(Specifier::from_u5(1), 5);
        execute(
            &mut state,
            Instruction::Jalr {
                rd: Specifier::from_u5(2),
                rs1: Specifier::from_u5(1),
                imm: 0,
            },
        );
        // Target 5 is not 4-byte aligned, so this must trap rather than silently mask bit 0.
        assert!(state.stop());
        assert_eq!(Exception::INSTRUCTION_ADDRESS_MISALIGNED, state.trap().mcause);
    }

    #[test]
    fn test_ecall_from_machine_mode_traps() {
        let mut state = new_state(Xlen::Rv64);
        execute(&mut state, Instruction::Ecall);
        assert!(state.stop());
        assert_eq!(
            Exception::ENVIRONMENT_CALL_FROM_M_MODE,
            state.trap().mcause
        );
        assert_eq!(0, state.minstret());
    }

    #[test]
    fn test_mret_from_user_mode_is_illegal() {
        let mut state = new_state(Xlen::Rv64);
        state.set_privilege(PrivilegeLevel::User);
        execute(&mut state, Instruction::Mret);
        assert!(state.stop());
        assert_eq!(Exception::ILLEGAL_INSTRUCTION, state.trap().mcause);
    }

    #[test]
    fn test_csrrw_round_trip() {
        let mut state = new_state(Xlen::Rv64);
        state.set_gpr(Specifier::from_u5(1), 0x42);
        execute(
            &mut state,
            Instruction::Csr {
                op: CsrOp::ReadWrite,
                rd: Specifier::from_u5(2),
                rs1: Specifier::from_u5(1),
                csr: csr::specifier::MSCRATCH,
            },
        );
        assert_eq!(0, state.gpr(Specifier::from_u5(2)));
        assert_eq!(0x42, state.trap().mscratch);
    }

    #[test]
    fn test_csrrs_with_x0_does_not_write() {
        let mut state = new_state(Xlen::Rv64);
        state.csr_write(csr::specifier::MSCRATCH, 7).unwrap();
        execute(
            &mut state,
            Instruction::Csr {
                op: CsrOp::ReadSet,
                rd: Specifier::from_u5(1),
                rs1: Specifier::X0,
                csr: csr::specifier::MSCRATCH,
            },
        );
        assert_eq!(7, state.gpr(Specifier::from_u5(1)));
        assert_eq!(7, state.trap().mscratch);
    }

    #[test]
    fn test_illegal_instruction_traps_without_retiring() {
        let mut state = new_state(Xlen::Rv64);
        execute(&mut state, Instruction::Illegal);
        assert!(state.stop());
        assert_eq!(Exception::ILLEGAL_INSTRUCTION, state.trap().mcause);
        assert_eq!(0, state.minstret());
    }
}
