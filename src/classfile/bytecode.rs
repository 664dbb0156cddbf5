//! JVM bytecode: opcode table and per-shape operand decoding.

use std::collections::HashMap;

use log::trace;
use once_cell::sync::Lazy;

use crate::classfile::constant::{cp_index, ConstantPool};
use crate::component::Draft;
use crate::error::{DecodeError, ErrorKind};
use crate::reader::Reader;


/// Layout of the operands following an opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    None,
    /// u1 local variable index.
    Local,
    /// s1 immediate (`bipush`).
    Byte,
    /// s2 immediate (`sipush`).
    Short,
    /// u1 constant pool index (`ldc`).
    ConstantU1,
    /// u2 constant pool index.
    Constant,
    /// s2 branch offset.
    Branch,
    /// s4 branch offset.
    WideBranch,
    Iinc,
    InvokeInterface,
    InvokeDynamic,
    NewArray,
    MultiANewArray,
    TableSwitch,
    LookupSwitch,
    Wide,
}

#[derive(Debug)]
pub struct Opcode {
    pub value: u8,
    pub name: &'static str,
    pub shape: Shape,
}

const IINC: u8 = 0x84;

static OPCODES: Lazy<HashMap<u8, Opcode>> = Lazy::new(|| {
    use Shape::*;

    let mut table: Vec<(u8, &'static str, Shape)> = vec![
        (0x00, "nop", None), (0x01, "aconst_null", None), (0x02, "iconst_m1", None),
        (0x03, "iconst_0", None), (0x04, "iconst_1", None), (0x05, "iconst_2", None),
        (0x06, "iconst_3", None), (0x07, "iconst_4", None), (0x08, "iconst_5", None),
        (0x09, "lconst_0", None), (0x0a, "lconst_1", None), (0x0b, "fconst_0", None),
        (0x0c, "fconst_1", None), (0x0d, "fconst_2", None), (0x0e, "dconst_0", None),
        (0x0f, "dconst_1", None), (0x10, "bipush", Byte), (0x11, "sipush", Short),
        (0x12, "ldc", ConstantU1), (0x13, "ldc_w", Constant), (0x14, "ldc2_w", Constant),
        (0x15, "iload", Local), (0x16, "lload", Local), (0x17, "fload", Local),
        (0x18, "dload", Local), (0x19, "aload", Local),
        (0x2e, "iaload", None), (0x2f, "laload", None), (0x30, "faload", None),
        (0x31, "daload", None), (0x32, "aaload", None), (0x33, "baload", None),
        (0x34, "caload", None), (0x35, "saload", None),
        (0x36, "istore", Local), (0x37, "lstore", Local), (0x38, "fstore", Local),
        (0x39, "dstore", Local), (0x3a, "astore", Local),
        (0x4f, "iastore", None), (0x50, "lastore", None), (0x51, "fastore", None),
        (0x52, "dastore", None), (0x53, "aastore", None), (0x54, "bastore", None),
        (0x55, "castore", None), (0x56, "sastore", None),
        (0x57, "pop", None), (0x58, "pop2", None), (0x59, "dup", None),
        (0x5a, "dup_x1", None), (0x5b, "dup_x2", None), (0x5c, "dup2", None),
        (0x5d, "dup2_x1", None), (0x5e, "dup2_x2", None), (0x5f, "swap", None),
        (IINC, "iinc", Iinc),
        (0x85, "i2l", None), (0x86, "i2f", None), (0x87, "i2d", None),
        (0x88, "l2i", None), (0x89, "l2f", None), (0x8a, "l2d", None),
        (0x8b, "f2i", None), (0x8c, "f2l", None), (0x8d, "f2d", None),
        (0x8e, "d2i", None), (0x8f, "d2l", None), (0x90, "d2f", None),
        (0x91, "i2b", None), (0x92, "i2c", None), (0x93, "i2s", None),
        (0x94, "lcmp", None), (0x95, "fcmpl", None), (0x96, "fcmpg", None),
        (0x97, "dcmpl", None), (0x98, "dcmpg", None),
        (0x99, "ifeq", Branch), (0x9a, "ifne", Branch), (0x9b, "iflt", Branch),
        (0x9c, "ifge", Branch), (0x9d, "ifgt", Branch), (0x9e, "ifle", Branch),
        (0x9f, "if_icmpeq", Branch), (0xa0, "if_icmpne", Branch), (0xa1, "if_icmplt", Branch),
        (0xa2, "if_icmpge", Branch), (0xa3, "if_icmpgt", Branch), (0xa4, "if_icmple", Branch),
        (0xa5, "if_acmpeq", Branch), (0xa6, "if_acmpne", Branch),
        (0xa7, "goto", Branch), (0xa8, "jsr", Branch), (0xa9, "ret", Local),
        (0xaa, "tableswitch", TableSwitch), (0xab, "lookupswitch", LookupSwitch),
        (0xac, "ireturn", None), (0xad, "lreturn", None), (0xae, "freturn", None),
        (0xaf, "dreturn", None), (0xb0, "areturn", None), (0xb1, "return", None),
        (0xb2, "getstatic", Constant), (0xb3, "putstatic", Constant),
        (0xb4, "getfield", Constant), (0xb5, "putfield", Constant),
        (0xb6, "invokevirtual", Constant), (0xb7, "invokespecial", Constant),
        (0xb8, "invokestatic", Constant), (0xb9, "invokeinterface", InvokeInterface),
        (0xba, "invokedynamic", InvokeDynamic), (0xbb, "new", Constant),
        (0xbc, "newarray", NewArray), (0xbd, "anewarray", Constant),
        (0xbe, "arraylength", None), (0xbf, "athrow", None),
        (0xc0, "checkcast", Constant), (0xc1, "instanceof", Constant),
        (0xc2, "monitorenter", None), (0xc3, "monitorexit", None),
        (0xc4, "wide", Wide), (0xc5, "multianewarray", MultiANewArray),
        (0xc6, "ifnull", Branch), (0xc7, "ifnonnull", Branch),
        (0xc8, "goto_w", WideBranch), (0xc9, "jsr_w", WideBranch),
        (0xca, "breakpoint", None), (0xfe, "impdep1", None), (0xff, "impdep2", None),
    ];

    // <op>_<n> shortcuts for local slots 0..=3
    const SHORTCUTS: [u8; 10] = [0x1a, 0x1e, 0x22, 0x26, 0x2a, 0x3b, 0x3f, 0x43, 0x47, 0x4b];
    const SLOT_NAMES: [[&str; 4]; 10] = [
        ["iload_0", "iload_1", "iload_2", "iload_3"],
        ["lload_0", "lload_1", "lload_2", "lload_3"],
        ["fload_0", "fload_1", "fload_2", "fload_3"],
        ["dload_0", "dload_1", "dload_2", "dload_3"],
        ["aload_0", "aload_1", "aload_2", "aload_3"],
        ["istore_0", "istore_1", "istore_2", "istore_3"],
        ["lstore_0", "lstore_1", "lstore_2", "lstore_3"],
        ["fstore_0", "fstore_1", "fstore_2", "fstore_3"],
        ["dstore_0", "dstore_1", "dstore_2", "dstore_3"],
        ["astore_0", "astore_1", "astore_2", "astore_3"],
    ];
    for (base, names) in SHORTCUTS.iter().zip(SLOT_NAMES.iter()) {
        for (n, name) in names.iter().enumerate() {
            table.push((base + n as u8, *name, None));
        }
    }

    // arithmetic and logic: i/l/f/d variants in sequence
    const ARITH: [&str; 20] = [
        "iadd", "ladd", "fadd", "dadd", "isub", "lsub", "fsub", "dsub",
        "imul", "lmul", "fmul", "dmul", "idiv", "ldiv", "fdiv", "ddiv",
        "irem", "lrem", "frem", "drem",
    ];
    const LOGIC: [&str; 16] = [
        "ineg", "lneg", "fneg", "dneg", "ishl", "lshl", "ishr", "lshr",
        "iushr", "lushr", "iand", "land", "ior", "lor", "ixor", "lxor",
    ];
    for (n, name) in ARITH.iter().chain(LOGIC.iter()).enumerate() {
        table.push((0x60 + n as u8, *name, None));
    }

    table.into_iter().map(|(value, name, shape)| (value, Opcode { value, name, shape })).collect()
});

pub fn opcode(value: u8) -> Option<&'static Opcode> {
    OPCODES.get(&value)
}

fn array_type(atype: u8) -> String {
    match atype {
        4 => "boolean".to_string(),
        5 => "char".to_string(),
        6 => "float".to_string(),
        7 => "double".to_string(),
        8 => "byte".to_string(),
        9 => "short".to_string(),
        10 => "int".to_string(),
        11 => "long".to_string(),
        _ => format!("atype {}", atype),
    }
}

fn target(pc: usize, offset: i64) -> String {
    format!("{}", pc as i64 + offset)
}

/// Decodes the bytecode array of a `Code` attribute. `r` is positioned on
/// the first instruction and `code_length` bytes must decode into whole
/// instructions.
pub(crate) fn read_code(
    r: &mut Reader<'_>,
    code_length: usize,
) -> Result<Draft<ConstantPool>, DecodeError> {
    let start = r.position();
    let mut code = r.window(code_length)?;
    let mut list = Draft::open("code", r);
    let mut count = 0;

    while code.remaining() > 0 {
        let insn = read_instruction(&mut code, start).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEndOfBuffer {
                err!(
                    TruncatedCode,
                    e.offset(),
                    "Instruction at pc {} runs past code_length {}",
                    e.offset() - start,
                    code_length
                )
            } else {
                e
            }
        })?;
        list.push(insn);
        count += 1;
    }

    r.skip(code_length)?;
    list.close(r);
    list.describe(format!("{} instructions", count));
    Ok(list)
}

fn read_instruction(code: &mut Reader<'_>, start: usize) -> Result<Draft<ConstantPool>, DecodeError> {
    let offset = code.position();
    let pc = offset - start;
    let value = code.read_u1()?;
    let op = match opcode(value) {
        Some(op) => op,
        None => fail!(UnsupportedOpcode, offset, "Unsupported opcode {:#04x} at pc {}", value, pc),
    };
    trace!("pc {} {}", pc, op.name);

    let mut insn = Draft::leaf(op.name, offset, 0, String::new());
    insn.push(Draft::leaf("opcode", offset, 1, format!("{:#04x}", value)));

    match op.shape {
        Shape::None => {}
        Shape::Local => {
            let index = insn.u1(code, "index")?;
            insn.describe(index.to_string());
        }
        Shape::Byte => {
            let v = insn.field(code, "byte", Reader::read_i1, |v| v.to_string())?;
            insn.describe(v.to_string());
        }
        Shape::Short => {
            let v = insn.field(code, "value", Reader::read_i2, |v| v.to_string())?;
            insn.describe(v.to_string());
        }
        Shape::ConstantU1 => {
            let at = code.position();
            let index = code.read_u1()? as u16;
            insn.push(Draft::deferred("index", at, 1, move |cp: &ConstantPool| cp.show_index(index)));
            insn.describe_with(move |cp| cp.show_index(index));
        }
        Shape::Constant => {
            let index = cp_index(&mut insn, code, "index")?;
            insn.describe_with(move |cp| cp.show_index(index));
        }
        Shape::Branch => {
            let branch = insn.field(code, "branchoffset", Reader::read_i2, |v| v.to_string())?;
            insn.describe(target(pc, branch as i64));
        }
        Shape::WideBranch => {
            let branch = insn.field(code, "branchoffset", Reader::read_i4, |v| v.to_string())?;
            insn.describe(target(pc, branch as i64));
        }
        Shape::Iinc => {
            let index = insn.u1(code, "index")?;
            let delta = insn.field(code, "const", Reader::read_i1, |v| v.to_string())?;
            insn.describe(format!("{} by {}", index, delta));
        }
        Shape::InvokeInterface => {
            let index = cp_index(&mut insn, code, "index")?;
            let args = insn.u1(code, "count")?;
            insn.u1(code, "zero")?;
            insn.describe_with(move |cp| Ok(format!("{}, {}", cp.show_index(index)?, args)));
        }
        Shape::InvokeDynamic => {
            let index = cp_index(&mut insn, code, "index")?;
            insn.u2(code, "zero")?;
            insn.describe_with(move |cp| cp.show_index(index));
        }
        Shape::NewArray => {
            let atype = insn.field(code, "atype", Reader::read_u1, |t| array_type(*t))?;
            insn.describe(array_type(atype));
        }
        Shape::MultiANewArray => {
            let index = cp_index(&mut insn, code, "index")?;
            let dims = insn.u1(code, "dimensions")?;
            insn.describe_with(move |cp| Ok(format!("{}, {}", cp.show_index(index)?, dims)));
        }
        Shape::TableSwitch => read_tableswitch(code, &mut insn, pc)?,
        Shape::LookupSwitch => read_lookupswitch(code, &mut insn, pc)?,
        Shape::Wide => read_wide(code, &mut insn)?,
    }

    insn.close(code);
    Ok(insn)
}

/// Switch operands start at the next multiple of four from the code start.
fn padding(code: &mut Reader<'_>, insn: &mut Draft<ConstantPool>, pc: usize) -> Result<(), DecodeError> {
    let pad = (4 - (pc + 1) % 4) % 4;
    if pad > 0 {
        insn.bytes(code, "padding", pad)?;
    }
    Ok(())
}

fn read_tableswitch(code: &mut Reader<'_>, insn: &mut Draft<ConstantPool>, pc: usize) -> Result<(), DecodeError> {
    padding(code, insn, pc)?;
    let default = insn.field(code, "default", Reader::read_i4, |v| target(pc, *v as i64))?;
    let low = insn.field(code, "low", Reader::read_i4, |v| v.to_string())?;
    let high = insn.field(code, "high", Reader::read_i4, |v| v.to_string())?;
    if high < low {
        fail!(LengthMismatch, insn.offset(), "tableswitch at pc {} has high {} below low {}", pc, high, low);
    }

    let mut offsets = Draft::open("jump_offsets", code);
    for key in low as i64..=high as i64 {
        offsets.field(code, &key.to_string(), Reader::read_i4, |v| target(pc, *v as i64))?;
    }
    offsets.close(code);
    insn.push(offsets);
    insn.describe(format!("{} to {}, default {}", low, high, target(pc, default as i64)));
    Ok(())
}

fn read_lookupswitch(code: &mut Reader<'_>, insn: &mut Draft<ConstantPool>, pc: usize) -> Result<(), DecodeError> {
    padding(code, insn, pc)?;
    let default = insn.field(code, "default", Reader::read_i4, |v| target(pc, *v as i64))?;
    let npairs = insn.field(code, "npairs", Reader::read_i4, |v| v.to_string())?;
    if npairs < 0 {
        fail!(LengthMismatch, insn.offset(), "lookupswitch at pc {} has negative npairs {}", pc, npairs);
    }

    let mut pairs = Draft::open("match_offset_pairs", code);
    for _ in 0..npairs {
        let at = code.position();
        let key = code.read_i4()?;
        let branch = code.read_i4()?;
        pairs.push(Draft::leaf(key.to_string(), at, 8, target(pc, branch as i64)));
    }
    pairs.close(code);
    insn.push(pairs);
    insn.describe(format!("{} pairs, default {}", npairs, target(pc, default as i64)));
    Ok(())
}

fn read_wide(code: &mut Reader<'_>, insn: &mut Draft<ConstantPool>) -> Result<(), DecodeError> {
    let at = code.position();
    let value = code.read_u1()?;
    let op = match opcode(value) {
        Some(op) if value == IINC || op.shape == Shape::Local => op,
        _ => fail!(UnsupportedOpcode, at, "Opcode {:#04x} cannot be widened", value),
    };
    insn.push(Draft::leaf("opcode", at, 1, op.name));
    let index = insn.u2(code, "index")?;
    if value == IINC {
        let delta = insn.field(code, "const", Reader::read_i2, |v| v.to_string())?;
        insn.describe(format!("{} {} by {}", op.name, index, delta));
    } else {
        insn.describe(format!("{} {}", op.name, index));
    }
    Ok(())
}
