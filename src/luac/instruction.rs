//! Lua 5.3 instructions.
//!
//! ```text
//!  31       23       14       6      0
//!  +--------+--------+-------+------+
//!  | B:9    | C:9    | A:8   | op:6 |  iABC
//!  | Bx:18           | A:8   | op:6 |  iABx / iAsBx
//!  | Ax:26                   | op:6 |  iAx
//!  +--------+--------+-------+------+
//! ```

use log::trace;

use crate::component::Draft;
use crate::error::DecodeError;
use crate::luac::function::FunctionInfo;
use crate::reader::Reader;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpMode {
    ABC,
    ABx,
    AsBx,
    Ax,
}

/// How an instruction uses its B or C argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpArg {
    /// not used
    N,
    /// used as a plain value
    U,
    /// register or jump offset
    R,
    /// constant or register/constant
    K,
}

#[derive(Debug)]
pub struct LuaOpcode {
    pub name: &'static str,
    pub mode: OpMode,
    pub b: OpArg,
    pub c: OpArg,
    /// What the instruction does, in the notation of `lopcodes.h`.
    pub summary: &'static str,
}

const fn op(name: &'static str, mode: OpMode, b: OpArg, c: OpArg, summary: &'static str) -> LuaOpcode {
    LuaOpcode { name, mode, b, c, summary }
}

use OpArg::{K, N, R, U};
use OpMode::{ABC, ABx, AsBx, Ax};

pub static OPCODES: [LuaOpcode; 47] = [
    op("MOVE", ABC, R, N, "R(A) := R(B)"),
    op("LOADK", ABx, K, N, "R(A) := Kst(Bx)"),
    op("LOADKX", ABx, N, N, "R(A) := Kst(extra arg)"),
    op("LOADBOOL", ABC, U, U, "R(A) := (Bool)B; if (C) pc++"),
    op("LOADNIL", ABC, U, N, "R(A), R(A+1), ..., R(A+B) := nil"),
    op("GETUPVAL", ABC, U, N, "R(A) := UpValue[B]"),
    op("GETTABUP", ABC, U, K, "R(A) := UpValue[B][RK(C)]"),
    op("GETTABLE", ABC, R, K, "R(A) := R(B)[RK(C)]"),
    op("SETTABUP", ABC, K, K, "UpValue[A][RK(B)] := RK(C)"),
    op("SETUPVAL", ABC, U, N, "UpValue[B] := R(A)"),
    op("SETTABLE", ABC, K, K, "R(A)[RK(B)] := RK(C)"),
    op("NEWTABLE", ABC, U, U, "R(A) := {} (size = B,C)"),
    op("SELF", ABC, R, K, "R(A+1) := R(B); R(A) := R(B)[RK(C)]"),
    op("ADD", ABC, K, K, "R(A) := RK(B) + RK(C)"),
    op("SUB", ABC, K, K, "R(A) := RK(B) - RK(C)"),
    op("MUL", ABC, K, K, "R(A) := RK(B) * RK(C)"),
    op("MOD", ABC, K, K, "R(A) := RK(B) % RK(C)"),
    op("POW", ABC, K, K, "R(A) := RK(B) ^ RK(C)"),
    op("DIV", ABC, K, K, "R(A) := RK(B) / RK(C)"),
    op("IDIV", ABC, K, K, "R(A) := RK(B) // RK(C)"),
    op("BAND", ABC, K, K, "R(A) := RK(B) & RK(C)"),
    op("BOR", ABC, K, K, "R(A) := RK(B) | RK(C)"),
    op("BXOR", ABC, K, K, "R(A) := RK(B) ~ RK(C)"),
    op("SHL", ABC, K, K, "R(A) := RK(B) << RK(C)"),
    op("SHR", ABC, K, K, "R(A) := RK(B) >> RK(C)"),
    op("UNM", ABC, R, N, "R(A) := -R(B)"),
    op("BNOT", ABC, R, N, "R(A) := ~R(B)"),
    op("NOT", ABC, R, N, "R(A) := not R(B)"),
    op("LEN", ABC, R, N, "R(A) := length of R(B)"),
    op("CONCAT", ABC, R, R, "R(A) := R(B).. ... ..R(C)"),
    op("JMP", AsBx, R, N, "pc+=sBx; if (A) close all upvalues >= R(A - 1)"),
    op("EQ", ABC, K, K, "if ((RK(B) == RK(C)) ~= A) then pc++"),
    op("LT", ABC, K, K, "if ((RK(B) <  RK(C)) ~= A) then pc++"),
    op("LE", ABC, K, K, "if ((RK(B) <= RK(C)) ~= A) then pc++"),
    op("TEST", ABC, N, U, "if not (R(A) <=> C) then pc++"),
    op("TESTSET", ABC, R, U, "if (R(B) <=> C) then R(A) := R(B) else pc++"),
    op("CALL", ABC, U, U, "R(A), ... ,R(A+C-2) := R(A)(R(A+1), ... ,R(A+B-1))"),
    op("TAILCALL", ABC, U, U, "return R(A)(R(A+1), ... ,R(A+B-1))"),
    op("RETURN", ABC, U, N, "return R(A), ... ,R(A+B-2)"),
    op("FORLOOP", AsBx, R, N, "R(A)+=R(A+2); if R(A) <?= R(A+1) then { pc+=sBx; R(A+3)=R(A) }"),
    op("FORPREP", AsBx, R, N, "R(A)-=R(A+2); pc+=sBx"),
    op("TFORCALL", ABC, N, U, "R(A+3), ... ,R(A+2+C) := R(A)(R(A+1), R(A+2));"),
    op("TFORLOOP", AsBx, R, N, "if R(A+1) ~= nil then { R(A)=R(A+1); pc += sBx }"),
    op("SETLIST", ABC, U, U, "R(A)[(C-1)*FPF+i] := R(A+i), 1 <= i <= B"),
    op("CLOSURE", ABx, U, N, "R(A) := closure(KPROTO[Bx])"),
    op("VARARG", ABC, U, N, "R(A), R(A+1), ..., R(A+B-2) = vararg"),
    op("EXTRAARG", Ax, U, U, "extra (larger) argument for previous opcode"),
];

const MAXARG_SBX: i32 = 0x1FFFF;
/// RK operands above this select a constant.
const BITRK: u32 = 0xFF;

pub fn opcode(code: u32) -> u32 {
    code & 0x3F
}

pub fn arg_a(code: u32) -> u32 {
    code >> 6 & 0xFF
}

pub fn arg_c(code: u32) -> u32 {
    code >> 14 & 0x1FF
}

pub fn arg_b(code: u32) -> u32 {
    code >> 23 & 0x1FF
}

pub fn arg_bx(code: u32) -> u32 {
    code >> 14
}

pub fn arg_sbx(code: u32) -> i32 {
    arg_bx(code) as i32 - MAXARG_SBX
}

pub fn arg_ax(code: u32) -> u32 {
    code >> 6
}

/// An RK operand: a register, or a constant when above [`BITRK`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rk {
    Register(u32),
    Constant(u32),
}

impl Rk {
    pub fn from_arg(v: u32) -> Rk {
        if v > BITRK {
            Rk::Constant(v & BITRK)
        } else {
            Rk::Register(v)
        }
    }
}

/// Registers listed by `RETURN A B`: `R(A) .. R(A+B-2)`, none when B <= 1.
pub fn return_registers(a: u32, b: u32) -> std::ops::Range<u32> {
    if b <= 1 {
        a..a
    } else {
        a..a + b - 1
    }
}

type Node = Draft<FunctionInfo>;

fn register_child(name: &str, offset: usize, reg: u32, pc: usize) -> Node {
    Draft::deferred(name, offset, 0, move |f: &FunctionInfo| Ok(f.register(reg, pc)))
}

fn rk_child(name: &str, offset: usize, v: u32, pc: usize) -> Node {
    Draft::deferred(name, offset, 0, move |f: &FunctionInfo| match Rk::from_arg(v) {
        Rk::Register(reg) => Ok(f.register(reg, pc)),
        Rk::Constant(k) => f.show_constant(k),
    })
}

fn upvalue_child(name: &str, offset: usize, idx: u32) -> Node {
    Draft::deferred(name, offset, 0, move |f: &FunctionInfo| Ok(f.upvalue(idx)))
}

/// `luac -l` style operand list, negative numbers naming constants.
fn operands(op: &LuaOpcode, code: u32) -> String {
    let a = arg_a(code);
    let shown = |mode: OpArg, v: u32| -> Option<i64> {
        match (mode, Rk::from_arg(v)) {
            (OpArg::N, _) => None,
            (OpArg::K, Rk::Constant(k)) => Some(-1 - k as i64),
            _ => Some(v as i64),
        }
    };
    match op.mode {
        OpMode::ABC => {
            let mut parts = vec![a as i64];
            parts.extend(shown(op.b, arg_b(code)));
            parts.extend(shown(op.c, arg_c(code)));
            parts.iter().map(i64::to_string).collect::<Vec<_>>().join(" ")
        }
        OpMode::ABx => match op.b {
            OpArg::K => format!("{} {}", a, -1 - arg_bx(code) as i64),
            OpArg::U => format!("{} {}", a, arg_bx(code)),
            _ => a.to_string(),
        },
        OpMode::AsBx => format!("{} {}", a, arg_sbx(code)),
        OpMode::Ax => format!("{}", -1 - arg_ax(code) as i64),
    }
}

/// Constants and jump targets worth a trailing comment.
fn comment(op: &LuaOpcode, code: u32, pc: usize, f: &FunctionInfo) -> Result<Option<String>, DecodeError> {
    let mut notes = Vec::new();
    match op.mode {
        OpMode::ABC => {
            for (mode, v) in [(op.b, arg_b(code)), (op.c, arg_c(code))] {
                if let (OpArg::K, Rk::Constant(k)) = (mode, Rk::from_arg(v)) {
                    notes.push(f.constant(k)?.to_string());
                }
            }
        }
        OpMode::ABx if op.b == OpArg::K => notes.push(f.constant(arg_bx(code))?.to_string()),
        OpMode::AsBx => notes.push(format!("to {}", pc as i64 + 1 + arg_sbx(code) as i64)),
        _ => {}
    }
    Ok(if notes.is_empty() { None } else { Some(notes.join(" ")) })
}

/// Decodes one instruction at `pc`. Descriptions and operand children are
/// resolved against the function's constants and debug info.
pub(crate) fn read_instruction(r: &mut Reader<'_>, pc: usize) -> Result<Node, DecodeError> {
    let offset = r.position();
    let code = r.read_u4()?;
    let op = match OPCODES.get(opcode(code) as usize) {
        Some(op) => op,
        None => fail!(UnsupportedOpcode, offset, "Unsupported Lua opcode {} at pc {}", opcode(code), pc),
    };
    trace!("pc {} {} {:#010x}", pc, op.name, code);

    let mut insn = Draft::leaf(op.name, offset, 4, "");
    insn.push(Draft::leaf("summary", offset, 0, op.summary));

    let a = arg_a(code);
    let b = arg_b(code);
    let c = arg_c(code);

    if op.name == "RETURN" {
        insn.push(Draft::leaf("A", offset, 0, a.to_string()));
        insn.push(Draft::leaf("B", offset, 0, b.to_string()));
        for reg in return_registers(a, b) {
            insn.push(register_child(&format!("R({})", reg), offset, reg, pc));
        }
    } else {
        let summary = op.summary;
        if summary.contains("R(A)") {
            insn.push(register_child("R(A)", offset, a, pc));
        }
        if summary.contains("R(B)") {
            insn.push(register_child("R(B)", offset, b, pc));
        }
        if summary.contains("R(C)") {
            insn.push(register_child("R(C)", offset, c, pc));
        }
        if summary.contains("RK(B)") {
            insn.push(rk_child("RK(B)", offset, b, pc));
        }
        if summary.contains("RK(C)") {
            insn.push(rk_child("RK(C)", offset, c, pc));
        }
        if summary.contains("UpValue[A]") {
            insn.push(upvalue_child("UpValue[A]", offset, a));
        }
        if summary.contains("UpValue[B]") {
            insn.push(upvalue_child("UpValue[B]", offset, b));
        }
        if summary.contains("Kst(Bx)") {
            let k = arg_bx(code);
            insn.push(Draft::deferred("Kst(Bx)", offset, 0, move |f: &FunctionInfo| f.show_constant(k)));
        }
        if summary.contains("KPROTO[Bx]") {
            let bx = arg_bx(code);
            insn.push(Draft::deferred("KPROTO[Bx]", offset, 0, move |f: &FunctionInfo| f.show_proto(bx)));
        }
        match op.mode {
            OpMode::AsBx => {
                let sbx = arg_sbx(code);
                insn.push(Draft::leaf("sBx", offset, 0, format!("{} -> pc {}", sbx, pc as i64 + 1 + sbx as i64)));
            }
            OpMode::Ax => insn.push(Draft::leaf("Ax", offset, 0, arg_ax(code).to_string())),
            _ => {}
        }
    }

    let line_pc = pc;
    insn.describe_with(move |f| {
        let mut s = match f.line(line_pc) {
            Some(line) => format!("[{}] {}", line, operands(op, code)),
            None => operands(op, code),
        };
        if let Some(note) = comment(op, code, line_pc, f)? {
            s.push_str(" ; ");
            s.push_str(&note);
        }
        Ok(s)
    });
    Ok(insn)
}


#[cfg(test)]
mod tests {
    use super::*;

    fn abc(op: u32, a: u32, b: u32, c: u32) -> u32 {
        op | a << 6 | c << 14 | b << 23
    }

    #[test]
    fn table_matches_opcode_numbers() {
        assert_eq!(OPCODES.len(), 47);
        assert_eq!(OPCODES[0].name, "MOVE");
        assert_eq!(OPCODES[30].name, "JMP");
        assert_eq!(OPCODES[38].name, "RETURN");
        assert_eq!(OPCODES[46].mode, OpMode::Ax);
    }

    #[test]
    fn fields() {
        let code = abc(7, 3, 0x105, 0x1ff);
        assert_eq!(opcode(code), 7);
        assert_eq!(arg_a(code), 3);
        assert_eq!(arg_b(code), 0x105);
        assert_eq!(arg_c(code), 0x1ff);
    }

    #[test]
    fn signed_bx_is_biased() {
        assert_eq!(arg_sbx(0x1FFFF << 14), 0);
        assert_eq!(arg_sbx(0), -0x1FFFF);
        assert_eq!(arg_sbx(0x20000 << 14), 1);
    }

    #[test]
    fn rk_selects_constants_above_0xff() {
        assert_eq!(Rk::from_arg(0x105), Rk::Constant(5));
        assert_eq!(Rk::from_arg(0x05), Rk::Register(5));
        assert_eq!(Rk::from_arg(0xff), Rk::Register(0xff));
    }

    #[test]
    fn return_range() {
        assert_eq!(return_registers(2, 4).collect::<Vec<_>>(), [2, 3, 4]);
        assert_eq!(return_registers(2, 1).count(), 0);
        assert_eq!(return_registers(2, 0).count(), 0);
    }

    #[test]
    fn luac_style_operands() {
        // GETTABUP 0 0 -1
        assert_eq!(operands(&OPCODES[6], abc(6, 0, 0, 0x100)), "0 0 -1");
        // LOADK 1 -3
        assert_eq!(operands(&OPCODES[1], 1 | 1 << 6 | 2 << 14), "1 -3");
        // RETURN 0 1
        assert_eq!(operands(&OPCODES[38], abc(38, 0, 1, 0)), "0 1");
        // JMP 0 -2
        assert_eq!(operands(&OPCODES[30], 30 | ((0x1FFFF - 2) << 14)), "0 -2");
    }
}
