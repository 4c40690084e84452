//! ECMA-335 opcode table
//!
//! The table is static configuration data: every base instruction of
//! Partition III with its encoding, operand type and flow control. Lookups go
//! through a lazily built hash map keyed by the encoded opcode value
//! (`0x00..=0xE0` for one-byte opcodes, `0xFE00..` for two-byte ones).

use ahash::AHashMap;
use once_cell::sync::Lazy;
use std::fmt;

/// Prefix byte of two-byte opcodes (ECMA-335 III.1.2).
pub const TWO_BYTE_PREFIX: u8 = 0xFE;

/// Operand encoding following an opcode (ECMA-335 VI.C.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandType {
    InlineBrTarget,
    InlineField,
    InlineI,
    InlineI8,
    InlineMethod,
    InlineNone,
    InlineR,
    InlineSig,
    InlineString,
    InlineSwitch,
    InlineTok,
    InlineType,
    InlineVar,
    ShortInlineBrTarget,
    ShortInlineI,
    ShortInlineR,
    ShortInlineVar,
}

impl OperandType {
    /// Width of the inline operand in bytes.
    ///
    /// For `InlineSwitch` this is the width of the target count only; the
    /// jump table that follows is `4 * count` bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::InlineNone => 0,
            Self::ShortInlineBrTarget | Self::ShortInlineI | Self::ShortInlineVar => 1,
            Self::InlineVar => 2,
            Self::InlineBrTarget
            | Self::InlineField
            | Self::InlineI
            | Self::InlineMethod
            | Self::InlineSig
            | Self::InlineString
            | Self::InlineSwitch
            | Self::InlineTok
            | Self::InlineType
            | Self::ShortInlineR => 4,
            Self::InlineI8 | Self::InlineR => 8,
        }
    }

    /// Whether the operand is a metadata token resolved through the module.
    pub const fn is_token(self) -> bool {
        matches!(
            self,
            Self::InlineField
                | Self::InlineMethod
                | Self::InlineSig
                | Self::InlineString
                | Self::InlineTok
                | Self::InlineType
        )
    }
}

/// How an instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowControl {
    Next,
    Branch,
    CondBranch,
    Call,
    Return,
    Throw,
    Break,
    Meta,
}

/// A single opcode definition.
#[derive(Debug, PartialEq, Eq)]
pub struct OpCode {
    pub value: u16,
    pub name: &'static str,
    pub operand: OperandType,
    pub flow: FlowControl,
}

impl OpCode {
    /// Encoded size of the opcode itself (1 or 2 bytes).
    #[inline]
    pub const fn size(&self) -> usize {
        if self.value > 0xFF { 2 } else { 1 }
    }

    #[inline]
    pub fn is_call(&self) -> bool {
        self.flow == FlowControl::Call
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Look up an opcode by its encoded value.
#[inline]
pub fn lookup(value: u16) -> Option<&'static OpCode> {
    OPCODE_MAP.get(&value).copied()
}

static OPCODE_MAP: Lazy<AHashMap<u16, &'static OpCode>> =
    Lazy::new(|| OPCODES.iter().map(|op| (op.value, op)).collect());

macro_rules! opcodes {
    ($($konst:ident = $value:literal, $name:literal, $operand:ident, $flow:ident;)+) => {
        /// Encoded opcode values, for emitting and matching instructions.
        pub mod codes {
            $(pub const $konst: u16 = $value;)+
        }

        /// Every opcode of the base instruction set.
        pub static OPCODES: &[OpCode] = &[
            $(OpCode {
                value: $value,
                name: $name,
                operand: OperandType::$operand,
                flow: FlowControl::$flow,
            },)+
        ];
    };
}

opcodes! {
    NOP = 0x00, "nop", InlineNone, Next;
    BREAK = 0x01, "break", InlineNone, Break;
    LDARG_0 = 0x02, "ldarg.0", InlineNone, Next;
    LDARG_1 = 0x03, "ldarg.1", InlineNone, Next;
    LDARG_2 = 0x04, "ldarg.2", InlineNone, Next;
    LDARG_3 = 0x05, "ldarg.3", InlineNone, Next;
    LDLOC_0 = 0x06, "ldloc.0", InlineNone, Next;
    LDLOC_1 = 0x07, "ldloc.1", InlineNone, Next;
    LDLOC_2 = 0x08, "ldloc.2", InlineNone, Next;
    LDLOC_3 = 0x09, "ldloc.3", InlineNone, Next;
    STLOC_0 = 0x0A, "stloc.0", InlineNone, Next;
    STLOC_1 = 0x0B, "stloc.1", InlineNone, Next;
    STLOC_2 = 0x0C, "stloc.2", InlineNone, Next;
    STLOC_3 = 0x0D, "stloc.3", InlineNone, Next;
    LDARG_S = 0x0E, "ldarg.s", ShortInlineVar, Next;
    LDARGA_S = 0x0F, "ldarga.s", ShortInlineVar, Next;
    STARG_S = 0x10, "starg.s", ShortInlineVar, Next;
    LDLOC_S = 0x11, "ldloc.s", ShortInlineVar, Next;
    LDLOCA_S = 0x12, "ldloca.s", ShortInlineVar, Next;
    STLOC_S = 0x13, "stloc.s", ShortInlineVar, Next;
    LDNULL = 0x14, "ldnull", InlineNone, Next;
    LDC_I4_M1 = 0x15, "ldc.i4.m1", InlineNone, Next;
    LDC_I4_0 = 0x16, "ldc.i4.0", InlineNone, Next;
    LDC_I4_1 = 0x17, "ldc.i4.1", InlineNone, Next;
    LDC_I4_2 = 0x18, "ldc.i4.2", InlineNone, Next;
    LDC_I4_3 = 0x19, "ldc.i4.3", InlineNone, Next;
    LDC_I4_4 = 0x1A, "ldc.i4.4", InlineNone, Next;
    LDC_I4_5 = 0x1B, "ldc.i4.5", InlineNone, Next;
    LDC_I4_6 = 0x1C, "ldc.i4.6", InlineNone, Next;
    LDC_I4_7 = 0x1D, "ldc.i4.7", InlineNone, Next;
    LDC_I4_8 = 0x1E, "ldc.i4.8", InlineNone, Next;
    LDC_I4_S = 0x1F, "ldc.i4.s", ShortInlineI, Next;
    LDC_I4 = 0x20, "ldc.i4", InlineI, Next;
    LDC_I8 = 0x21, "ldc.i8", InlineI8, Next;
    LDC_R4 = 0x22, "ldc.r4", ShortInlineR, Next;
    LDC_R8 = 0x23, "ldc.r8", InlineR, Next;
    DUP = 0x25, "dup", InlineNone, Next;
    POP = 0x26, "pop", InlineNone, Next;
    JMP = 0x27, "jmp", InlineMethod, Call;
    CALL = 0x28, "call", InlineMethod, Call;
    CALLI = 0x29, "calli", InlineSig, Call;
    RET = 0x2A, "ret", InlineNone, Return;
    BR_S = 0x2B, "br.s", ShortInlineBrTarget, Branch;
    BRFALSE_S = 0x2C, "brfalse.s", ShortInlineBrTarget, CondBranch;
    BRTRUE_S = 0x2D, "brtrue.s", ShortInlineBrTarget, CondBranch;
    BEQ_S = 0x2E, "beq.s", ShortInlineBrTarget, CondBranch;
    BGE_S = 0x2F, "bge.s", ShortInlineBrTarget, CondBranch;
    BGT_S = 0x30, "bgt.s", ShortInlineBrTarget, CondBranch;
    BLE_S = 0x31, "ble.s", ShortInlineBrTarget, CondBranch;
    BLT_S = 0x32, "blt.s", ShortInlineBrTarget, CondBranch;
    BNE_UN_S = 0x33, "bne.un.s", ShortInlineBrTarget, CondBranch;
    BGE_UN_S = 0x34, "bge.un.s", ShortInlineBrTarget, CondBranch;
    BGT_UN_S = 0x35, "bgt.un.s", ShortInlineBrTarget, CondBranch;
    BLE_UN_S = 0x36, "ble.un.s", ShortInlineBrTarget, CondBranch;
    BLT_UN_S = 0x37, "blt.un.s", ShortInlineBrTarget, CondBranch;
    BR = 0x38, "br", InlineBrTarget, Branch;
    BRFALSE = 0x39, "brfalse", InlineBrTarget, CondBranch;
    BRTRUE = 0x3A, "brtrue", InlineBrTarget, CondBranch;
    BEQ = 0x3B, "beq", InlineBrTarget, CondBranch;
    BGE = 0x3C, "bge", InlineBrTarget, CondBranch;
    BGT = 0x3D, "bgt", InlineBrTarget, CondBranch;
    BLE = 0x3E, "ble", InlineBrTarget, CondBranch;
    BLT = 0x3F, "blt", InlineBrTarget, CondBranch;
    BNE_UN = 0x40, "bne.un", InlineBrTarget, CondBranch;
    BGE_UN = 0x41, "bge.un", InlineBrTarget, CondBranch;
    BGT_UN = 0x42, "bgt.un", InlineBrTarget, CondBranch;
    BLE_UN = 0x43, "ble.un", InlineBrTarget, CondBranch;
    BLT_UN = 0x44, "blt.un", InlineBrTarget, CondBranch;
    SWITCH = 0x45, "switch", InlineSwitch, CondBranch;
    LDIND_I1 = 0x46, "ldind.i1", InlineNone, Next;
    LDIND_U1 = 0x47, "ldind.u1", InlineNone, Next;
    LDIND_I2 = 0x48, "ldind.i2", InlineNone, Next;
    LDIND_U2 = 0x49, "ldind.u2", InlineNone, Next;
    LDIND_I4 = 0x4A, "ldind.i4", InlineNone, Next;
    LDIND_U4 = 0x4B, "ldind.u4", InlineNone, Next;
    LDIND_I8 = 0x4C, "ldind.i8", InlineNone, Next;
    LDIND_I = 0x4D, "ldind.i", InlineNone, Next;
    LDIND_R4 = 0x4E, "ldind.r4", InlineNone, Next;
    LDIND_R8 = 0x4F, "ldind.r8", InlineNone, Next;
    LDIND_REF = 0x50, "ldind.ref", InlineNone, Next;
    STIND_REF = 0x51, "stind.ref", InlineNone, Next;
    STIND_I1 = 0x52, "stind.i1", InlineNone, Next;
    STIND_I2 = 0x53, "stind.i2", InlineNone, Next;
    STIND_I4 = 0x54, "stind.i4", InlineNone, Next;
    STIND_I8 = 0x55, "stind.i8", InlineNone, Next;
    STIND_R4 = 0x56, "stind.r4", InlineNone, Next;
    STIND_R8 = 0x57, "stind.r8", InlineNone, Next;
    ADD = 0x58, "add", InlineNone, Next;
    SUB = 0x59, "sub", InlineNone, Next;
    MUL = 0x5A, "mul", InlineNone, Next;
    DIV = 0x5B, "div", InlineNone, Next;
    DIV_UN = 0x5C, "div.un", InlineNone, Next;
    REM = 0x5D, "rem", InlineNone, Next;
    REM_UN = 0x5E, "rem.un", InlineNone, Next;
    AND = 0x5F, "and", InlineNone, Next;
    OR = 0x60, "or", InlineNone, Next;
    XOR = 0x61, "xor", InlineNone, Next;
    SHL = 0x62, "shl", InlineNone, Next;
    SHR = 0x63, "shr", InlineNone, Next;
    SHR_UN = 0x64, "shr.un", InlineNone, Next;
    NEG = 0x65, "neg", InlineNone, Next;
    NOT = 0x66, "not", InlineNone, Next;
    CONV_I1 = 0x67, "conv.i1", InlineNone, Next;
    CONV_I2 = 0x68, "conv.i2", InlineNone, Next;
    CONV_I4 = 0x69, "conv.i4", InlineNone, Next;
    CONV_I8 = 0x6A, "conv.i8", InlineNone, Next;
    CONV_R4 = 0x6B, "conv.r4", InlineNone, Next;
    CONV_R8 = 0x6C, "conv.r8", InlineNone, Next;
    CONV_U4 = 0x6D, "conv.u4", InlineNone, Next;
    CONV_U8 = 0x6E, "conv.u8", InlineNone, Next;
    CALLVIRT = 0x6F, "callvirt", InlineMethod, Call;
    CPOBJ = 0x70, "cpobj", InlineType, Next;
    LDOBJ = 0x71, "ldobj", InlineType, Next;
    LDSTR = 0x72, "ldstr", InlineString, Next;
    NEWOBJ = 0x73, "newobj", InlineMethod, Call;
    CASTCLASS = 0x74, "castclass", InlineType, Next;
    ISINST = 0x75, "isinst", InlineType, Next;
    CONV_R_UN = 0x76, "conv.r.un", InlineNone, Next;
    UNBOX = 0x79, "unbox", InlineType, Next;
    THROW = 0x7A, "throw", InlineNone, Throw;
    LDFLD = 0x7B, "ldfld", InlineField, Next;
    LDFLDA = 0x7C, "ldflda", InlineField, Next;
    STFLD = 0x7D, "stfld", InlineField, Next;
    LDSFLD = 0x7E, "ldsfld", InlineField, Next;
    LDSFLDA = 0x7F, "ldsflda", InlineField, Next;
    STSFLD = 0x80, "stsfld", InlineField, Next;
    STOBJ = 0x81, "stobj", InlineType, Next;
    CONV_OVF_I1_UN = 0x82, "conv.ovf.i1.un", InlineNone, Next;
    CONV_OVF_I2_UN = 0x83, "conv.ovf.i2.un", InlineNone, Next;
    CONV_OVF_I4_UN = 0x84, "conv.ovf.i4.un", InlineNone, Next;
    CONV_OVF_I8_UN = 0x85, "conv.ovf.i8.un", InlineNone, Next;
    CONV_OVF_U1_UN = 0x86, "conv.ovf.u1.un", InlineNone, Next;
    CONV_OVF_U2_UN = 0x87, "conv.ovf.u2.un", InlineNone, Next;
    CONV_OVF_U4_UN = 0x88, "conv.ovf.u4.un", InlineNone, Next;
    CONV_OVF_U8_UN = 0x89, "conv.ovf.u8.un", InlineNone, Next;
    CONV_OVF_I_UN = 0x8A, "conv.ovf.i.un", InlineNone, Next;
    CONV_OVF_U_UN = 0x8B, "conv.ovf.u.un", InlineNone, Next;
    BOX = 0x8C, "box", InlineType, Next;
    NEWARR = 0x8D, "newarr", InlineType, Next;
    LDLEN = 0x8E, "ldlen", InlineNone, Next;
    LDELEMA = 0x8F, "ldelema", InlineType, Next;
    LDELEM_I1 = 0x90, "ldelem.i1", InlineNone, Next;
    LDELEM_U1 = 0x91, "ldelem.u1", InlineNone, Next;
    LDELEM_I2 = 0x92, "ldelem.i2", InlineNone, Next;
    LDELEM_U2 = 0x93, "ldelem.u2", InlineNone, Next;
    LDELEM_I4 = 0x94, "ldelem.i4", InlineNone, Next;
    LDELEM_U4 = 0x95, "ldelem.u4", InlineNone, Next;
    LDELEM_I8 = 0x96, "ldelem.i8", InlineNone, Next;
    LDELEM_I = 0x97, "ldelem.i", InlineNone, Next;
    LDELEM_R4 = 0x98, "ldelem.r4", InlineNone, Next;
    LDELEM_R8 = 0x99, "ldelem.r8", InlineNone, Next;
    LDELEM_REF = 0x9A, "ldelem.ref", InlineNone, Next;
    STELEM_I = 0x9B, "stelem.i", InlineNone, Next;
    STELEM_I1 = 0x9C, "stelem.i1", InlineNone, Next;
    STELEM_I2 = 0x9D, "stelem.i2", InlineNone, Next;
    STELEM_I4 = 0x9E, "stelem.i4", InlineNone, Next;
    STELEM_I8 = 0x9F, "stelem.i8", InlineNone, Next;
    STELEM_R4 = 0xA0, "stelem.r4", InlineNone, Next;
    STELEM_R8 = 0xA1, "stelem.r8", InlineNone, Next;
    STELEM_REF = 0xA2, "stelem.ref", InlineNone, Next;
    LDELEM = 0xA3, "ldelem", InlineType, Next;
    STELEM = 0xA4, "stelem", InlineType, Next;
    UNBOX_ANY = 0xA5, "unbox.any", InlineType, Next;
    CONV_OVF_I1 = 0xB3, "conv.ovf.i1", InlineNone, Next;
    CONV_OVF_U1 = 0xB4, "conv.ovf.u1", InlineNone, Next;
    CONV_OVF_I2 = 0xB5, "conv.ovf.i2", InlineNone, Next;
    CONV_OVF_U2 = 0xB6, "conv.ovf.u2", InlineNone, Next;
    CONV_OVF_I4 = 0xB7, "conv.ovf.i4", InlineNone, Next;
    CONV_OVF_U4 = 0xB8, "conv.ovf.u4", InlineNone, Next;
    CONV_OVF_I8 = 0xB9, "conv.ovf.i8", InlineNone, Next;
    CONV_OVF_U8 = 0xBA, "conv.ovf.u8", InlineNone, Next;
    REFANYVAL = 0xC2, "refanyval", InlineType, Next;
    CKFINITE = 0xC3, "ckfinite", InlineNone, Next;
    MKREFANY = 0xC6, "mkrefany", InlineType, Next;
    LDTOKEN = 0xD0, "ldtoken", InlineTok, Next;
    CONV_U2 = 0xD1, "conv.u2", InlineNone, Next;
    CONV_U1 = 0xD2, "conv.u1", InlineNone, Next;
    CONV_I = 0xD3, "conv.i", InlineNone, Next;
    CONV_OVF_I = 0xD4, "conv.ovf.i", InlineNone, Next;
    CONV_OVF_U = 0xD5, "conv.ovf.u", InlineNone, Next;
    ADD_OVF = 0xD6, "add.ovf", InlineNone, Next;
    ADD_OVF_UN = 0xD7, "add.ovf.un", InlineNone, Next;
    MUL_OVF = 0xD8, "mul.ovf", InlineNone, Next;
    MUL_OVF_UN = 0xD9, "mul.ovf.un", InlineNone, Next;
    SUB_OVF = 0xDA, "sub.ovf", InlineNone, Next;
    SUB_OVF_UN = 0xDB, "sub.ovf.un", InlineNone, Next;
    ENDFINALLY = 0xDC, "endfinally", InlineNone, Return;
    LEAVE = 0xDD, "leave", InlineBrTarget, Branch;
    LEAVE_S = 0xDE, "leave.s", ShortInlineBrTarget, Branch;
    STIND_I = 0xDF, "stind.i", InlineNone, Next;
    CONV_U = 0xE0, "conv.u", InlineNone, Next;
    ARGLIST = 0xFE00, "arglist", InlineNone, Next;
    CEQ = 0xFE01, "ceq", InlineNone, Next;
    CGT = 0xFE02, "cgt", InlineNone, Next;
    CGT_UN = 0xFE03, "cgt.un", InlineNone, Next;
    CLT = 0xFE04, "clt", InlineNone, Next;
    CLT_UN = 0xFE05, "clt.un", InlineNone, Next;
    LDFTN = 0xFE06, "ldftn", InlineMethod, Next;
    LDVIRTFTN = 0xFE07, "ldvirtftn", InlineMethod, Next;
    LDARG = 0xFE09, "ldarg", InlineVar, Next;
    LDARGA = 0xFE0A, "ldarga", InlineVar, Next;
    STARG = 0xFE0B, "starg", InlineVar, Next;
    LDLOC = 0xFE0C, "ldloc", InlineVar, Next;
    LDLOCA = 0xFE0D, "ldloca", InlineVar, Next;
    STLOC = 0xFE0E, "stloc", InlineVar, Next;
    LOCALLOC = 0xFE0F, "localloc", InlineNone, Next;
    ENDFILTER = 0xFE11, "endfilter", InlineNone, Return;
    UNALIGNED = 0xFE12, "unaligned.", ShortInlineI, Meta;
    VOLATILE = 0xFE13, "volatile.", InlineNone, Meta;
    TAIL = 0xFE14, "tail.", InlineNone, Meta;
    INITOBJ = 0xFE15, "initobj", InlineType, Next;
    CONSTRAINED = 0xFE16, "constrained.", InlineType, Meta;
    CPBLK = 0xFE17, "cpblk", InlineNone, Next;
    INITBLK = 0xFE18, "initblk", InlineNone, Next;
    NO = 0xFE19, "no.", ShortInlineI, Meta;
    RETHROW = 0xFE1A, "rethrow", InlineNone, Throw;
    SIZEOF = 0xFE1C, "sizeof", InlineType, Next;
    REFANYTYPE = 0xFE1D, "refanytype", InlineNone, Next;
    READONLY = 0xFE1E, "readonly.", InlineNone, Meta;
}
