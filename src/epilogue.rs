//! The five state transitions that may conclude an instruction's execution.
//!
//! `pc` and `minstret` are written nowhere else in this crate: every instruction's execution
//! semantics ends by calling exactly one of these five functions, which keeps the bookkeeping
//! (retirement count, trap-entry CSR writes, privilege transitions) in one place instead of
//! duplicated across every instruction clause.

use crate::memory::Memory;
use crate::state::ArchState;
use crate::status::RawPrivilegeLevel;
use crate::trap::Exception;
use crate::PrivilegeLevel;

/// Instructions are always 4 bytes wide: this core does not implement the `C` (compressed)
/// extension.
pub(crate) const INSTRUCTION_WIDTH: u64 = 4;

/// The ordinary, non-control-flow conclusion: advance past the current instruction.
pub fn common<M: Memory>(state: &mut ArchState<M>) {
    let next_pc = state.pc().wrapping_add(INSTRUCTION_WIDTH);
    state.set_pc(next_pc);
    state.increment_minstret();
    state.increment_mcycle();
}

/// Unconditional control-flow transfer (`JAL`/`JALR`).
///
/// Raises [`Exception::InstructionAddressMisaligned`] without mutating any other state if
/// `target` is not 4-byte aligned.
pub fn jump<M: Memory>(state: &mut ArchState<M>, target: u64) -> Result<(), Exception> {
    if target % INSTRUCTION_WIDTH != 0 {
        return Err(Exception::InstructionAddressMisaligned(target));
    }
    state.set_pc(target);
    state.increment_minstret();
    state.increment_mcycle();
    Ok(())
}

/// Conditional control-flow transfer (`BRANCH`). Behaves as [`jump`] to `target` if `taken`, or as
/// [`common`] otherwise.
///
/// Per the base ISA, a not-taken branch is never checked for target alignment: only a taken
/// branch can raise [`Exception::InstructionAddressMisaligned`].
pub fn branch<M: Memory>(
    state: &mut ArchState<M>,
    taken: bool,
    target: u64,
) -> Result<(), Exception> {
    if taken {
        jump(state, target)
    } else {
        common(state);
        Ok(())
    }
}

/// Trap entry: records the cause and enters M-mode.
///
/// This core does not redirect `pc` to `mtvec`, does not delegate to S-mode, and does not
/// increment `minstret` (the faulting instruction never retires); instead it halts by setting the
/// stop flag. See `DESIGN.md` for why this simplification is adequate for the scope here.
pub fn trap<M: Memory>(state: &mut ArchState<M>, exception: Exception) {
    let pc = state.pc();
    let mpie = state.status().mie();
    let mpp = state.privilege();

    let trap_regs = state.trap_mut();
    trap_regs.mepc = pc;
    trap_regs.mcause = exception.code();
    trap_regs.mtval = exception.tval(pc);

    let status = state.status_mut();
    status.set_mpie(mpie);
    status.set_mie(false);
    status.set_mpp(mpp.into());

    state.set_privilege(PrivilegeLevel::Machine);
    state.increment_mcycle();
    state.stop_write(true);
}

/// Trap return (`MRET`/`SRET`): restores the privilege level and interrupt-enable state saved at
/// the most recent trap into that mode, and jumps to the saved exception program counter.
///
/// `mode` selects which trap return is performed: [`PrivilegeLevel::Machine`] for `MRET`,
/// [`PrivilegeLevel::Supervisor`] for `SRET`. Any other value is a decoder contract violation.
pub fn ret<M: Memory>(state: &mut ArchState<M>, mode: PrivilegeLevel) {
    let target = match mode {
        PrivilegeLevel::Machine => state.trap().mepc,
        PrivilegeLevel::Supervisor => state.trap().sepc,
        PrivilegeLevel::User => panic!("ret() called with PrivilegeLevel::User"),
    };

    let status = state.status_mut();
    match mode {
        PrivilegeLevel::Machine => {
            let mpp = status.mpp();
            status.set_mie(status.mpie());
            status.set_mpie(true);
            // Per the base privileged spec, MRET resets MPP to the least-privileged supported
            // mode (U, since this core implements user mode).
            status.set_mpp(RawPrivilegeLevel::User);
            state.set_privilege(mpp);
        }
        PrivilegeLevel::Supervisor => {
            let spp = status.spp();
            status.set_sie(status.spie());
            status.set_spie(true);
            status.set_spp(RawPrivilegeLevel::User);
            state.set_privilege(spp);
        }
        PrivilegeLevel::User => unreachable!(),
    }

    state.set_pc(target);
    state.increment_minstret();
    state.increment_mcycle();
}
