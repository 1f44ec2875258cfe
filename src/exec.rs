//! Execution semantics for each decoded mnemonic.
//!
//! Each function receives the already-extracted operands and the
//! register/memory state it needs, and returns the value(s) to write
//! back plus the dynamic next PC. The step driver in [`crate::machine`]
//! is responsible for actually committing the write-back and advancing
//! `pc`.

use crate::decode::{Mnemonic, Operands};
use crate::memory::Memory;
use crate::registers::RegisterFile;
use crate::utils::interpret_u32_as_signed;

/// Outcome of executing one instruction: either it completed normally
/// (the dynamic next PC to commit), or it requested a halt via `ebreak`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    Continue { dnpc: u32 },
    Ebreak { a0: u32 },
}

/// Signed division truncating toward zero, with RISC-V's divide-by-zero
/// and `INT32_MIN / -1` special cases (mirrors the reference `my_div`).
pub fn signed_div(dividend: i32, divisor: i32) -> i32 {
    if divisor == 0 {
        -1
    } else if dividend == i32::MIN && divisor == -1 {
        i32::MIN
    } else {
        dividend.wrapping_div(divisor)
    }
}

/// Signed remainder with RISC-V's divide-by-zero and overflow special
/// cases (mirrors the reference `my_rem`).
pub fn signed_rem(dividend: i32, divisor: i32) -> i32 {
    if divisor == 0 {
        dividend
    } else if dividend == i32::MIN && divisor == -1 {
        0
    } else {
        dividend.wrapping_rem(divisor)
    }
}

/// Unsigned division with RISC-V's divide-by-zero special case.
pub fn unsigned_div(dividend: u32, divisor: u32) -> u32 {
    if divisor == 0 {
        0xffff_ffff
    } else {
        dividend / divisor
    }
}

/// Unsigned remainder with RISC-V's divide-by-zero special case.
pub fn unsigned_rem(dividend: u32, divisor: u32) -> u32 {
    if divisor == 0 {
        dividend
    } else {
        dividend % divisor
    }
}

/// Execute one decoded instruction against `regs`/`mem`, given its
/// pre-execution PC and sequential next PC. Returns the register
/// write-back (if any) and the outcome (continue with a dynamic next
/// PC, or an `ebreak` halt request).
///
/// `gpr[0] = 0` and the `pc` commit are the step driver's responsibility
/// (§4.1's "post-exec" step), not this function's.
pub fn execute(
    mnemonic: Mnemonic,
    operands: Operands,
    pc: u32,
    snpc: u32,
    regs: &mut RegisterFile,
    mem: &mut Memory,
) -> Result<ExecOutcome, crate::memory::MemoryError> {
    use Mnemonic::*;

    let mut dnpc = snpc;

    match (mnemonic, operands) {
        (Lui, Operands::U(u)) => {
            regs.set(u.rd, u.imm);
        }
        (Auipc, Operands::U(u)) => {
            regs.set(u.rd, pc.wrapping_add(u.imm));
        }
        (Jal, Operands::J(j)) => {
            regs.set(j.rd, pc.wrapping_add(4));
            dnpc = pc.wrapping_add(j.imm);
        }
        (Jalr, Operands::I(i)) => {
            let target = regs.get(i.rs1).wrapping_add(i.imm);
            regs.set(i.rd, pc.wrapping_add(4));
            dnpc = target & !1;
        }
        (Beq, Operands::B(b)) => {
            if regs.get(b.rs1) == regs.get(b.rs2) {
                dnpc = pc.wrapping_add(b.imm);
            }
        }
        (Bne, Operands::B(b)) => {
            if regs.get(b.rs1) != regs.get(b.rs2) {
                dnpc = pc.wrapping_add(b.imm);
            }
        }
        (Blt, Operands::B(b)) => {
            let lhs = interpret_u32_as_signed(regs.get(b.rs1));
            let rhs = interpret_u32_as_signed(regs.get(b.rs2));
            if lhs < rhs {
                dnpc = pc.wrapping_add(b.imm);
            }
        }
        (Bge, Operands::B(b)) => {
            let lhs = interpret_u32_as_signed(regs.get(b.rs1));
            let rhs = interpret_u32_as_signed(regs.get(b.rs2));
            if lhs >= rhs {
                dnpc = pc.wrapping_add(b.imm);
            }
        }
        (Bltu, Operands::B(b)) => {
            if regs.get(b.rs1) < regs.get(b.rs2) {
                dnpc = pc.wrapping_add(b.imm);
            }
        }
        (Bgeu, Operands::B(b)) => {
            if regs.get(b.rs1) >= regs.get(b.rs2) {
                dnpc = pc.wrapping_add(b.imm);
            }
        }
        (Lb, Operands::I(i)) => {
            let addr = regs.get(i.rs1).wrapping_add(i.imm);
            let byte = mem.read(addr, 1)? as u8;
            regs.set(i.rd, (byte as i8) as u32);
        }
        (Lbu, Operands::I(i)) => {
            let addr = regs.get(i.rs1).wrapping_add(i.imm);
            regs.set(i.rd, mem.read(addr, 1)?);
        }
        (Lh, Operands::I(i)) => {
            let addr = regs.get(i.rs1).wrapping_add(i.imm);
            let half = mem.read(addr, 2)? as u16;
            regs.set(i.rd, (half as i16) as u32);
        }
        (Lhu, Operands::I(i)) => {
            let addr = regs.get(i.rs1).wrapping_add(i.imm);
            regs.set(i.rd, mem.read(addr, 2)?);
        }
        (Lw, Operands::I(i)) => {
            let addr = regs.get(i.rs1).wrapping_add(i.imm);
            regs.set(i.rd, mem.read(addr, 4)?);
        }
        (Sb, Operands::S(s)) => {
            let addr = regs.get(s.rs1).wrapping_add(s.imm);
            mem.write(addr, 1, regs.get(s.rs2))?;
        }
        (Sh, Operands::S(s)) => {
            let addr = regs.get(s.rs1).wrapping_add(s.imm);
            mem.write(addr, 2, regs.get(s.rs2))?;
        }
        (Sw, Operands::S(s)) => {
            let addr = regs.get(s.rs1).wrapping_add(s.imm);
            mem.write(addr, 4, regs.get(s.rs2))?;
        }
        (Addi, Operands::I(i)) => {
            regs.set(i.rd, regs.get(i.rs1).wrapping_add(i.imm));
        }
        (Slti, Operands::I(i)) => {
            let lhs = interpret_u32_as_signed(regs.get(i.rs1));
            let rhs = interpret_u32_as_signed(i.imm);
            regs.set(i.rd, (lhs < rhs) as u32);
        }
        (Sltiu, Operands::I(i)) => {
            regs.set(i.rd, (regs.get(i.rs1) < i.imm) as u32);
        }
        (Xori, Operands::I(i)) => {
            regs.set(i.rd, regs.get(i.rs1) ^ i.imm);
        }
        (Ori, Operands::I(i)) => {
            regs.set(i.rd, regs.get(i.rs1) | i.imm);
        }
        (Andi, Operands::I(i)) => {
            regs.set(i.rd, regs.get(i.rs1) & i.imm);
        }
        (Slli, Operands::IShift { rs1, rd, shamt }) => {
            regs.set(rd, regs.get(rs1) << shamt);
        }
        (Srli, Operands::IShift { rs1, rd, shamt }) => {
            regs.set(rd, regs.get(rs1) >> shamt);
        }
        (Srai, Operands::IShift { rs1, rd, shamt }) => {
            let value = interpret_u32_as_signed(regs.get(rs1));
            regs.set(rd, (value >> shamt) as u32);
        }
        (Add, Operands::R(r)) => {
            regs.set(r.rd, regs.get(r.rs1).wrapping_add(regs.get(r.rs2)));
        }
        (Sub, Operands::R(r)) => {
            regs.set(r.rd, regs.get(r.rs1).wrapping_sub(regs.get(r.rs2)));
        }
        (Sll, Operands::R(r)) => {
            let shamt = regs.get(r.rs2) & 0x1f;
            regs.set(r.rd, regs.get(r.rs1) << shamt);
        }
        (Slt, Operands::R(r)) => {
            let lhs = interpret_u32_as_signed(regs.get(r.rs1));
            let rhs = interpret_u32_as_signed(regs.get(r.rs2));
            regs.set(r.rd, (lhs < rhs) as u32);
        }
        (Sltu, Operands::R(r)) => {
            regs.set(r.rd, (regs.get(r.rs1) < regs.get(r.rs2)) as u32);
        }
        (Xor, Operands::R(r)) => {
            regs.set(r.rd, regs.get(r.rs1) ^ regs.get(r.rs2));
        }
        (Srl, Operands::R(r)) => {
            let shamt = regs.get(r.rs2) & 0x1f;
            regs.set(r.rd, regs.get(r.rs1) >> shamt);
        }
        (Sra, Operands::R(r)) => {
            let shamt = regs.get(r.rs2) & 0x1f;
            let value = interpret_u32_as_signed(regs.get(r.rs1));
            regs.set(r.rd, (value >> shamt) as u32);
        }
        (Or, Operands::R(r)) => {
            regs.set(r.rd, regs.get(r.rs1) | regs.get(r.rs2));
        }
        (And, Operands::R(r)) => {
            regs.set(r.rd, regs.get(r.rs1) & regs.get(r.rs2));
        }
        (Mul, Operands::R(r)) => {
            let lhs = interpret_u32_as_signed(regs.get(r.rs1)) as i64;
            let rhs = interpret_u32_as_signed(regs.get(r.rs2)) as i64;
            regs.set(r.rd, (lhs.wrapping_mul(rhs)) as u32);
        }
        (Mulh, Operands::R(r)) => {
            let lhs = interpret_u32_as_signed(regs.get(r.rs1)) as i64;
            let rhs = interpret_u32_as_signed(regs.get(r.rs2)) as i64;
            let product = lhs.wrapping_mul(rhs);
            regs.set(r.rd, (product >> 32) as u32);
        }
        (Mulhsu, Operands::R(r)) => {
            let lhs = interpret_u32_as_signed(regs.get(r.rs1)) as i64;
            let rhs = regs.get(r.rs2) as i64;
            let product = lhs.wrapping_mul(rhs);
            regs.set(r.rd, (product >> 32) as u32);
        }
        (Mulhu, Operands::R(r)) => {
            let lhs = regs.get(r.rs1) as u64;
            let rhs = regs.get(r.rs2) as u64;
            let product = lhs.wrapping_mul(rhs);
            regs.set(r.rd, (product >> 32) as u32);
        }
        (Div, Operands::R(r)) => {
            let lhs = interpret_u32_as_signed(regs.get(r.rs1));
            let rhs = interpret_u32_as_signed(regs.get(r.rs2));
            regs.set(r.rd, signed_div(lhs, rhs) as u32);
        }
        (Divu, Operands::R(r)) => {
            regs.set(r.rd, unsigned_div(regs.get(r.rs1), regs.get(r.rs2)));
        }
        (Rem, Operands::R(r)) => {
            let lhs = interpret_u32_as_signed(regs.get(r.rs1));
            let rhs = interpret_u32_as_signed(regs.get(r.rs2));
            regs.set(r.rd, signed_rem(lhs, rhs) as u32);
        }
        (Remu, Operands::R(r)) => {
            regs.set(r.rd, unsigned_rem(regs.get(r.rs1), regs.get(r.rs2)));
        }
        (Ebreak, Operands::None) => {
            return Ok(ExecOutcome::Ebreak { a0: regs.get(10) });
        }
        _ => unreachable!("decoder produced a mnemonic/operand-shape mismatch"),
    }

    Ok(ExecOutcome::Continue { dnpc })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn div_by_zero_matches_riscv_spec() {
        assert_eq!(signed_div(10, 0), -1);
        assert_eq!(signed_rem(10, 0), 10);
        assert_eq!(unsigned_div(10, 0), 0xffff_ffff);
        assert_eq!(unsigned_rem(10, 0), 10);
    }

    #[test]
    fn div_overflow_case_does_not_trap() {
        assert_eq!(signed_div(i32::MIN, -1), i32::MIN);
        assert_eq!(signed_rem(i32::MIN, -1), 0);
    }

    #[test]
    fn div_rem_satisfy_the_identity() {
        for (a, b) in [(7, 2), (-7, 2), (7, -2), (-7, -2), (100, 7)] {
            let q = signed_div(a, b);
            let r = signed_rem(a, b);
            assert_eq!(q.wrapping_mul(b).wrapping_add(r), a);
        }
    }
}
