// =============================================================================
// INSTR - Stack machine instructions
// =============================================================================

use thiserror::Error;

/// Bytes per encoded instruction.
pub const INSTR_WIDTH: usize = 8;

/// Bytes per memory word.
pub const WORD_WIDTH: usize = 4;

/// Machine registers.
///
/// `GP` points at the data segment, `SP` at the most recently reserved stack
/// cell, `FP` at the link cell of the active frame. `RA` holds the return
/// address of the innermost call and `AT` is the scratch register used for
/// static-link walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    Gp,
    Sp,
    Fp,
    Ra,
    At,
}

impl Reg {
    pub const ALL: [Reg; 5] = [Reg::Gp, Reg::Sp, Reg::Fp, Reg::Ra, Reg::At];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Reg::Gp => "$gp",
            Reg::Sp => "$sp",
            Reg::Fp => "$fp",
            Reg::Ra => "$ra",
            Reg::At => "$at",
        }
    }

    fn from_byte(b: u8) -> Option<Reg> {
        Reg::ALL.get(b as usize).copied()
    }
}

/// Two-operand arithmetic: `mem[t+ot] = mem[SP] op mem[s+os]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Alu {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl Alu {
    const ALL: [Alu; 5] = [Alu::Add, Alu::Sub, Alu::Mul, Alu::Div, Alu::Mod];

    pub fn mnemonic(self) -> &'static str {
        match self {
            Alu::Add => "ADD",
            Alu::Sub => "SUB",
            Alu::Mul => "MUL",
            Alu::Div => "DIV",
            Alu::Mod => "MOD",
        }
    }
}

/// Comparison of a memory cell against zero, used by conditional branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZeroTest {
    Eq,
    Ne,
    Ltz,
    Lez,
    Gtz,
    Gez,
}

impl ZeroTest {
    const ALL: [ZeroTest; 6] = [
        ZeroTest::Eq,
        ZeroTest::Ne,
        ZeroTest::Ltz,
        ZeroTest::Lez,
        ZeroTest::Gtz,
        ZeroTest::Gez,
    ];

    pub fn holds(self, v: i32) -> bool {
        match self {
            ZeroTest::Eq => v == 0,
            ZeroTest::Ne => v != 0,
            ZeroTest::Ltz => v < 0,
            ZeroTest::Lez => v <= 0,
            ZeroTest::Gtz => v > 0,
            ZeroTest::Gez => v >= 0,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            ZeroTest::Eq => "BEQ",
            ZeroTest::Ne => "BNE",
            ZeroTest::Ltz => "BLTZ",
            ZeroTest::Lez => "BLEZ",
            ZeroTest::Gtz => "BGTZ",
            ZeroTest::Gez => "BGEZ",
        }
    }
}

/// One machine instruction. Memory operands are written `(reg, offset)` and
/// address the word `reg + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instr {
    // ──────────────────────────── Registers ─────────────────────────────
    /// `reg -= imm`. With `SP` this reserves `imm` stack cells.
    Sri { reg: Reg, imm: u16 },

    /// `reg += imm`. With `SP` this releases `imm` stack cells.
    Ari { reg: Reg, imm: u16 },

    /// `t = s`
    Cpr { t: Reg, s: Reg },

    /// `t = mem[s+os]`
    Lwr { t: Reg, s: Reg, os: i16 },

    /// `mem[t+ot] = s`
    Swr { t: Reg, ot: i16, s: Reg },

    // ───────────────────────────── Memory ───────────────────────────────
    /// `mem[t+ot] = mem[s+os]`
    Cpw { t: Reg, ot: i16, s: Reg, os: i16 },

    /// `mem[t+ot] = imm`
    Lit { t: Reg, ot: i16, imm: i16 },

    /// `mem[t+ot] = pc + off`, the absolute index of an instruction.
    Lea { t: Reg, ot: i16, off: i16 },

    // ─────────────────────────── Arithmetic ─────────────────────────────
    Arith {
        op: Alu,
        t: Reg,
        ot: i16,
        s: Reg,
        os: i16,
    },

    /// `mem[t+ot] = -mem[s+os]`
    Neg { t: Reg, ot: i16, s: Reg, os: i16 },

    // ─────────────────────────── Control flow ───────────────────────────
    /// `pc += off` when `mem[s+os]` passes `test`, otherwise `pc += 1`.
    Branch {
        test: ZeroTest,
        s: Reg,
        os: i16,
        off: i16,
    },

    /// Unconditional relative jump. `Jrel(1)` is a no-op.
    Jrel { off: i32 },

    /// `RA = pc + 1; pc = mem[s+os]`
    Call { s: Reg, os: i16 },

    /// `pc = RA`
    Rtn,

    /// Halt with an exit code.
    Exit { code: i16 },

    // ─────────────────────────────── I/O ────────────────────────────────
    /// Print `mem[s+os]` as a decimal integer followed by a newline.
    Pint { s: Reg, os: i16 },

    /// Read a decimal integer into `mem[t+ot]`.
    Rint { t: Reg, ot: i16 },
}

const OP_SRI: u8 = 1;
const OP_ARI: u8 = 2;
const OP_CPR: u8 = 3;
const OP_LWR: u8 = 4;
const OP_SWR: u8 = 5;
const OP_CPW: u8 = 6;
const OP_LIT: u8 = 7;
const OP_LEA: u8 = 8;
const OP_ARITH: u8 = 0x10; // + Alu index
const OP_NEG: u8 = 0x18;
const OP_BRANCH: u8 = 0x20; // + ZeroTest index
const OP_JREL: u8 = 0x30;
const OP_CALL: u8 = 0x31;
const OP_RTN: u8 = 0x32;
const OP_EXIT: u8 = 0x33;
const OP_PINT: u8 = 0x40;
const OP_RINT: u8 = 0x41;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),
    #[error("unknown register {0} in opcode 0x{1:02x}")]
    UnknownRegister(u8, u8),
}

fn pack(op: u8, r1: Reg, r2: Reg, a: i16, b: i16) -> [u8; INSTR_WIDTH] {
    let a = a.to_le_bytes();
    let b = b.to_le_bytes();
    [
        op,
        r1.index() as u8,
        r2.index() as u8,
        0,
        a[0],
        a[1],
        b[0],
        b[1],
    ]
}

impl Instr {
    /// Fixed-width little-endian encoding: `[op][r1][r2][0][a:i16][b:i16]`,
    /// or `[op][0][0][0][imm:i32]` for `JREL`.
    pub fn encode(&self) -> [u8; INSTR_WIDTH] {
        const Z: Reg = Reg::Gp;
        match *self {
            Instr::Sri { reg, imm } => pack(OP_SRI, reg, Z, imm as i16, 0),
            Instr::Ari { reg, imm } => pack(OP_ARI, reg, Z, imm as i16, 0),
            Instr::Cpr { t, s } => pack(OP_CPR, t, s, 0, 0),
            Instr::Lwr { t, s, os } => pack(OP_LWR, t, s, 0, os),
            Instr::Swr { t, ot, s } => pack(OP_SWR, t, s, ot, 0),
            Instr::Cpw { t, ot, s, os } => pack(OP_CPW, t, s, ot, os),
            Instr::Lit { t, ot, imm } => pack(OP_LIT, t, Z, ot, imm),
            Instr::Lea { t, ot, off } => pack(OP_LEA, t, Z, ot, off),
            Instr::Arith { op, t, ot, s, os } => pack(OP_ARITH + op as u8, t, s, ot, os),
            Instr::Neg { t, ot, s, os } => pack(OP_NEG, t, s, ot, os),
            Instr::Branch { test, s, os, off } => pack(OP_BRANCH + test as u8, Z, s, os, off),
            Instr::Jrel { off } => {
                let w = off.to_le_bytes();
                [OP_JREL, 0, 0, 0, w[0], w[1], w[2], w[3]]
            }
            Instr::Call { s, os } => pack(OP_CALL, Z, s, 0, os),
            Instr::Rtn => pack(OP_RTN, Z, Z, 0, 0),
            Instr::Exit { code } => pack(OP_EXIT, Z, Z, code, 0),
            Instr::Pint { s, os } => pack(OP_PINT, Z, s, 0, os),
            Instr::Rint { t, ot } => pack(OP_RINT, t, Z, ot, 0),
        }
    }

    pub fn decode(bytes: [u8; INSTR_WIDTH]) -> Result<Instr, DecodeError> {
        let op = bytes[0];
        let reg = |b: u8| Reg::from_byte(b).ok_or(DecodeError::UnknownRegister(b, op));
        let r1 = reg(bytes[1])?;
        let r2 = reg(bytes[2])?;
        let a = i16::from_le_bytes([bytes[4], bytes[5]]);
        let b = i16::from_le_bytes([bytes[6], bytes[7]]);

        let instr = match op {
            OP_SRI => Instr::Sri { reg: r1, imm: a as u16 },
            OP_ARI => Instr::Ari { reg: r1, imm: a as u16 },
            OP_CPR => Instr::Cpr { t: r1, s: r2 },
            OP_LWR => Instr::Lwr { t: r1, s: r2, os: b },
            OP_SWR => Instr::Swr { t: r1, ot: a, s: r2 },
            OP_CPW => Instr::Cpw { t: r1, ot: a, s: r2, os: b },
            OP_LIT => Instr::Lit { t: r1, ot: a, imm: b },
            OP_LEA => Instr::Lea { t: r1, ot: a, off: b },
            op if (OP_ARITH..OP_ARITH + Alu::ALL.len() as u8).contains(&op) => Instr::Arith {
                op: Alu::ALL[(op - OP_ARITH) as usize],
                t: r1,
                ot: a,
                s: r2,
                os: b,
            },
            OP_NEG => Instr::Neg { t: r1, ot: a, s: r2, os: b },
            op if (OP_BRANCH..OP_BRANCH + ZeroTest::ALL.len() as u8).contains(&op) => {
                Instr::Branch {
                    test: ZeroTest::ALL[(op - OP_BRANCH) as usize],
                    s: r2,
                    os: a,
                    off: b,
                }
            }
            OP_JREL => Instr::Jrel {
                off: i32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            },
            OP_CALL => Instr::Call { s: r2, os: b },
            OP_RTN => Instr::Rtn,
            OP_EXIT => Instr::Exit { code: a },
            OP_PINT => Instr::Pint { s: r2, os: b },
            OP_RINT => Instr::Rint { t: r1, ot: a },
            other => return Err(DecodeError::UnknownOpcode(other)),
        };

        Ok(instr)
    }

    /// Relative distance to the instruction this one may transfer control
    /// (or, for `LEA`, an address) to.
    pub fn relative_target(&self) -> Option<i64> {
        match *self {
            Instr::Branch { off, .. } => Some(off as i64),
            Instr::Jrel { off } => Some(off as i64),
            Instr::Lea { off, .. } => Some(off as i64),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(instr: Instr) -> Instr {
        Instr::decode(instr.encode()).unwrap()
    }

    #[test]
    fn test_encoding_is_fixed_width_little_endian() {
        let bytes = Instr::Cpw {
            t: Reg::Sp,
            ot: 2,
            s: Reg::Gp,
            os: -3,
        }
        .encode();

        assert_eq!(bytes, [OP_CPW, 1, 0, 0, 2, 0, 0xfd, 0xff]);
    }

    #[test]
    fn test_jrel_uses_full_word() {
        let bytes = Instr::Jrel { off: -70_000 }.encode();
        assert_eq!(bytes[0], OP_JREL);
        assert_eq!(
            i32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            -70_000
        );
        assert_eq!(roundtrip(Instr::Jrel { off: -70_000 }), Instr::Jrel { off: -70_000 });
    }

    #[test]
    fn test_operand_families_survive_decoding() {
        let samples = [
            Instr::Sri {
                reg: Reg::Sp,
                imm: 65_535,
            },
            Instr::Lwr {
                t: Reg::At,
                s: Reg::At,
                os: 0,
            },
            Instr::Arith {
                op: Alu::Mod,
                t: Reg::Sp,
                ot: 1,
                s: Reg::Sp,
                os: 1,
            },
            Instr::Branch {
                test: ZeroTest::Gez,
                s: Reg::Sp,
                os: -1,
                off: 2,
            },
            Instr::Lea {
                t: Reg::Sp,
                ot: 0,
                off: -12,
            },
            Instr::Exit { code: 3 },
        ];

        for instr in samples {
            assert_eq!(roundtrip(instr), instr);
        }
    }

    #[test]
    fn test_unknown_opcode_is_rejected() {
        let err = Instr::decode([0xee, 0, 0, 0, 0, 0, 0, 0]).unwrap_err();
        assert_eq!(err, DecodeError::UnknownOpcode(0xee));
        assert!(err.to_string().contains("0xee"));
    }

    #[test]
    fn test_unknown_register_is_rejected() {
        let err = Instr::decode([OP_CPR, 9, 0, 0, 0, 0, 0, 0]).unwrap_err();
        assert_eq!(err, DecodeError::UnknownRegister(9, OP_CPR));
    }

    #[test]
    fn test_zero_tests() {
        assert!(ZeroTest::Eq.holds(0));
        assert!(!ZeroTest::Ne.holds(0));
        assert!(ZeroTest::Ltz.holds(-1));
        assert!(ZeroTest::Lez.holds(0));
        assert!(!ZeroTest::Gtz.holds(0));
        assert!(ZeroTest::Gez.holds(0));
    }

    #[test]
    fn test_relative_targets() {
        assert_eq!(Instr::Jrel { off: -4 }.relative_target(), Some(-4));
        assert_eq!(Instr::Rtn.relative_target(), None);
    }
}
