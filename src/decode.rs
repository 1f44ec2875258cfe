//! Pattern-table instruction decoder.
//!
//! Each instruction is matched against an ordered table of 32-bit
//! key/mask patterns, one per mnemonic, expressed with the same
//! six-group bitfield layout the reference decoder uses in its
//! `INSTPAT` pattern strings: `funct7 rs2 rs1 funct3 rd opcode` (widths
//! 7,5,5,3,5,7 = 32 bits; the opcode group's own low two bits are
//! always `11` for RV32IM, so no separate width-2 "opext" group is
//! needed). `0`/`1` characters contribute to both key and mask; `?` is
//! a don't-care. A word that matches no pattern falls through the scan
//! and is reported as illegal; there's no explicit catch-all row.

use thiserror::Error;

use crate::fields::{self, Btype, Itype, Jtype, Rtype, Stype, Utype};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("illegal instruction 0x{word:08x} at pc 0x{pc:08x}")]
    IllegalInstruction { pc: u32, word: u32 },
}

/// The mnemonic a decoded instruction word names, tagged by its operand
/// shape so [`crate::exec`] knows how to extract operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    Lui,
    Auipc,
    Jal,
    Jalr,
    Beq,
    Bne,
    Blt,
    Bge,
    Bltu,
    Bgeu,
    Lb,
    Lh,
    Lw,
    Lbu,
    Lhu,
    Sb,
    Sh,
    Sw,
    Addi,
    Slti,
    Sltiu,
    Xori,
    Ori,
    Andi,
    Slli,
    Srli,
    Srai,
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
    Ebreak,
}

/// Operands extracted from a decoded instruction, tagged by format.
#[derive(Debug, Clone, Copy)]
pub enum Operands {
    R(Rtype),
    I(Itype),
    IShift { rs1: u8, rd: u8, shamt: u32 },
    S(Stype),
    B(Btype),
    U(Utype),
    J(Jtype),
    None,
}

#[derive(Debug, Clone, Copy)]
enum Format {
    R,
    I,
    IShift,
    S,
    B,
    U,
    J,
    N,
}

struct Pattern {
    key: u32,
    mask: u32,
    mnemonic: Mnemonic,
    format: Format,
}

/// Parse a pattern string of seven whitespace-separated groups
/// (widths 7,5,5,3,5,5,2 = 32 bits total) into a `(key, mask)` pair.
fn parse_pattern(pattern: &str) -> (u32, u32) {
    let mut key: u32 = 0;
    let mut mask: u32 = 0;
    for ch in pattern.chars().filter(|c| !c.is_whitespace()) {
        key <<= 1;
        mask <<= 1;
        match ch {
            '0' => {
                mask |= 1;
            }
            '1' => {
                key |= 1;
                mask |= 1;
            }
            '?' => {}
            other => panic!("invalid pattern character '{other}'"),
        }
    }
    (key, mask)
}

macro_rules! pattern {
    ($table:expr, $pattern:expr, $mnemonic:expr, $format:expr) => {{
        let (key, mask) = parse_pattern($pattern);
        $table.push(Pattern {
            key,
            mask,
            mnemonic: $mnemonic,
            format: $format,
        });
    }};
}

/// Decodes raw instruction words by linear scan of an ordered pattern
/// table built once at construction.
pub struct Decoder {
    patterns: Vec<Pattern>,
}

impl Decoder {
    pub fn new() -> Self {
        let mut patterns = Vec::new();
        use Format::*;
        use Mnemonic::*;

        pattern!(patterns, "??????? ????? ????? ??? ????? 0110111", Lui, U);
        pattern!(patterns, "??????? ????? ????? ??? ????? 0010111", Auipc, U);
        pattern!(patterns, "??????? ????? ????? ??? ????? 1101111", Jal, J);
        pattern!(patterns, "??????? ????? ????? 000 ????? 1100111", Jalr, I);

        pattern!(patterns, "??????? ????? ????? 000 ????? 1100011", Beq, B);
        pattern!(patterns, "??????? ????? ????? 001 ????? 1100011", Bne, B);
        pattern!(patterns, "??????? ????? ????? 100 ????? 1100011", Blt, B);
        pattern!(patterns, "??????? ????? ????? 101 ????? 1100011", Bge, B);
        pattern!(patterns, "??????? ????? ????? 110 ????? 1100011", Bltu, B);
        pattern!(patterns, "??????? ????? ????? 111 ????? 1100011", Bgeu, B);

        pattern!(patterns, "??????? ????? ????? 000 ????? 0000011", Lb, I);
        pattern!(patterns, "??????? ????? ????? 001 ????? 0000011", Lh, I);
        pattern!(patterns, "??????? ????? ????? 010 ????? 0000011", Lw, I);
        pattern!(patterns, "??????? ????? ????? 100 ????? 0000011", Lbu, I);
        pattern!(patterns, "??????? ????? ????? 101 ????? 0000011", Lhu, I);

        pattern!(patterns, "??????? ????? ????? 000 ????? 0100011", Sb, S);
        pattern!(patterns, "??????? ????? ????? 001 ????? 0100011", Sh, S);
        pattern!(patterns, "??????? ????? ????? 010 ????? 0100011", Sw, S);

        pattern!(patterns, "??????? ????? ????? 000 ????? 0010011", Addi, I);
        pattern!(patterns, "??????? ????? ????? 010 ????? 0010011", Slti, I);
        pattern!(patterns, "??????? ????? ????? 011 ????? 0010011", Sltiu, I);
        pattern!(patterns, "??????? ????? ????? 100 ????? 0010011", Xori, I);
        pattern!(patterns, "??????? ????? ????? 110 ????? 0010011", Ori, I);
        pattern!(patterns, "??????? ????? ????? 111 ????? 0010011", Andi, I);

        pattern!(patterns, "0000000 ????? ????? 001 ????? 0010011", Slli, IShift);
        pattern!(patterns, "0000000 ????? ????? 101 ????? 0010011", Srli, IShift);
        pattern!(patterns, "0100000 ????? ????? 101 ????? 0010011", Srai, IShift);

        pattern!(patterns, "0000000 ????? ????? 000 ????? 0110011", Add, R);
        pattern!(patterns, "0100000 ????? ????? 000 ????? 0110011", Sub, R);
        pattern!(patterns, "0000000 ????? ????? 001 ????? 0110011", Sll, R);
        pattern!(patterns, "0000000 ????? ????? 010 ????? 0110011", Slt, R);
        pattern!(patterns, "0000000 ????? ????? 011 ????? 0110011", Sltu, R);
        pattern!(patterns, "0000000 ????? ????? 100 ????? 0110011", Xor, R);
        pattern!(patterns, "0000000 ????? ????? 101 ????? 0110011", Srl, R);
        pattern!(patterns, "0100000 ????? ????? 101 ????? 0110011", Sra, R);
        pattern!(patterns, "0000000 ????? ????? 110 ????? 0110011", Or, R);
        pattern!(patterns, "0000000 ????? ????? 111 ????? 0110011", And, R);

        pattern!(patterns, "0000001 ????? ????? 000 ????? 0110011", Mul, R);
        pattern!(patterns, "0000001 ????? ????? 001 ????? 0110011", Mulh, R);
        pattern!(patterns, "0000001 ????? ????? 010 ????? 0110011", Mulhsu, R);
        pattern!(patterns, "0000001 ????? ????? 011 ????? 0110011", Mulhu, R);
        pattern!(patterns, "0000001 ????? ????? 100 ????? 0110011", Div, R);
        pattern!(patterns, "0000001 ????? ????? 101 ????? 0110011", Divu, R);
        pattern!(patterns, "0000001 ????? ????? 110 ????? 0110011", Rem, R);
        pattern!(patterns, "0000001 ????? ????? 111 ????? 0110011", Remu, R);

        pattern!(patterns, "000000000001 00000 000 00000 1110011", Ebreak, N);

        Self { patterns }
    }

    /// Decode `word`, returning its mnemonic and extracted operands, or a
    /// `DecodeError` if no pattern matches. `pc` is used only to label the
    /// error.
    pub fn decode(&self, pc: u32, word: u32) -> Result<(Mnemonic, Operands), DecodeError> {
        for p in &self.patterns {
            if word & p.mask == p.key {
                let operands = match p.format {
                    Format::R => Operands::R(fields::decode_rtype(word)),
                    Format::I => Operands::I(fields::decode_itype(word)),
                    Format::IShift => {
                        let itype = fields::decode_itype(word);
                        Operands::IShift {
                            rs1: itype.rs1,
                            rd: itype.rd,
                            shamt: fields::shamt(word),
                        }
                    }
                    Format::S => Operands::S(fields::decode_stype(word)),
                    Format::B => Operands::B(fields::decode_btype(word)),
                    Format::U => Operands::U(fields::decode_utype(word)),
                    Format::J => Operands::J(fields::decode_jtype(word)),
                    Format::N => Operands::None,
                };
                return Ok((p.mnemonic, operands));
            }
        }
        Err(DecodeError::IllegalInstruction { pc, word })
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
