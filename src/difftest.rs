//! Differential-test comparison against a reference CPU snapshot.
//!
//! Grounded in the reference `isa_difftest_checkregs`: the passed-in PC
//! labels the diagnostic only (it names the instruction that just ran);
//! the actual comparison is between the reference snapshot and this
//! core's *current* (post-execution) state. On the first mismatching
//! register the checker stops and reports just that one line, it does
//! not produce an exhaustive diff.

use thiserror::Error;

use crate::registers::RegisterFile;

/// A reference-model CPU snapshot taken after executing one instruction
/// from a matching pre-state.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceSnapshot<'a> {
    pub pc: u32,
    pub gpr: &'a RegisterFile,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DiffTestError {
    #[error("diff-test mismatch at pc 0x{pc:08x}: {detail}")]
    Mismatch { pc: u32, detail: String },
}

/// Compare the reference snapshot against this core's current state.
/// `orig_pc` is the address of the instruction that just executed, used
/// only to label the error; it is not itself compared.
pub fn check(
    orig_pc: u32,
    reference: ReferenceSnapshot,
    local_pc: u32,
    local_gpr: &RegisterFile,
) -> Result<(), DiffTestError> {
    if reference.pc != local_pc {
        return Err(DiffTestError::Mismatch {
            pc: orig_pc,
            detail: format!("pc: ref 0x{:08x} != dut 0x{:08x}", reference.pc, local_pc),
        });
    }
    for i in 0..local_gpr.len() {
        let ref_val = reference.gpr.get(i as u8);
        let dut_val = local_gpr.get(i as u8);
        if ref_val != dut_val {
            let name = RegisterFile::reg_name(i as u8).unwrap_or("?");
            return Err(DiffTestError::Mismatch {
                pc: orig_pc,
                detail: format!(
                    "{name} (x{i}): ref 0x{ref_val:08x} != dut 0x{dut_val:08x}"
                ),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_state_passes() {
        let mut reference = RegisterFile::new();
        reference.set(1, 5);
        let mut local = RegisterFile::new();
        local.set(1, 5);
        let snapshot = ReferenceSnapshot {
            pc: 0x100,
            gpr: &reference,
        };
        assert!(check(0xfc, snapshot, 0x100, &local).is_ok());
    }

    #[test]
    fn pc_mismatch_is_reported() {
        let reference = RegisterFile::new();
        let local = RegisterFile::new();
        let snapshot = ReferenceSnapshot {
            pc: 0x104,
            gpr: &reference,
        };
        let err = check(0x100, snapshot, 0x108, &local).unwrap_err();
        assert!(matches!(err, DiffTestError::Mismatch { pc: 0x100, .. }));
    }

    #[test]
    fn first_register_mismatch_is_reported() {
        let mut reference = RegisterFile::new();
        reference.set(5, 1);
        reference.set(6, 2);
        let mut local = RegisterFile::new();
        local.set(5, 99);
        local.set(6, 2);
        let snapshot = ReferenceSnapshot {
            pc: 0x100,
            gpr: &reference,
        };
        let err = check(0x100, snapshot, 0x100, &local).unwrap_err();
        match err {
            DiffTestError::Mismatch { detail, .. } => assert!(detail.contains("t0")),
            _ => panic!(),
        }
    }
}
