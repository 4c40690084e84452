//! Method body emitter
//!
//! Small fluent writer for CIL method bodies, used to author images in
//! tests, benches, fuzz targets and demos.

use crate::image::Token;
use crate::opcode::{TWO_BYTE_PREFIX, codes};

/// Writes CIL instructions into a byte buffer.
///
/// ```rust
/// use dependency_validator::IlEmitter;
///
/// let body = IlEmitter::new().ldarg_0().pop().ret().to_bytes();
/// assert_eq!(body, vec![0x02, 0x26, 0x2A]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct IlEmitter {
    bytes: Vec<u8>,
}

impl IlEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit a bare opcode.
    pub fn op(mut self, value: u16) -> Self {
        if value > 0xFF {
            self.bytes.push(TWO_BYTE_PREFIX);
        }
        self.bytes.push(value as u8);
        self
    }

    fn op_i8(self, value: u16, operand: i8) -> Self {
        let mut this = self.op(value);
        this.bytes.push(operand as u8);
        this
    }

    fn op_i32(self, value: u16, operand: i32) -> Self {
        let mut this = self.op(value);
        this.bytes.extend_from_slice(&operand.to_le_bytes());
        this
    }

    fn op_token(self, value: u16, token: Token) -> Self {
        let mut this = self.op(value);
        this.bytes.extend_from_slice(&token.to_le_bytes());
        this
    }

    pub fn nop(self) -> Self {
        self.op(codes::NOP)
    }

    pub fn ldarg_0(self) -> Self {
        self.op(codes::LDARG_0)
    }

    pub fn ldarg_1(self) -> Self {
        self.op(codes::LDARG_1)
    }

    pub fn ldnull(self) -> Self {
        self.op(codes::LDNULL)
    }

    pub fn ldc_i4(self, value: i32) -> Self {
        self.op_i32(codes::LDC_I4, value)
    }

    pub fn ldstr(self, token: Token) -> Self {
        self.op_token(codes::LDSTR, token)
    }

    pub fn call(self, token: Token) -> Self {
        self.op_token(codes::CALL, token)
    }

    pub fn callvirt(self, token: Token) -> Self {
        self.op_token(codes::CALLVIRT, token)
    }

    pub fn newobj(self, token: Token) -> Self {
        self.op_token(codes::NEWOBJ, token)
    }

    pub fn ldftn(self, token: Token) -> Self {
        self.op_token(codes::LDFTN, token)
    }

    pub fn ldtoken(self, token: Token) -> Self {
        self.op_token(codes::LDTOKEN, token)
    }

    pub fn ldfld(self, token: Token) -> Self {
        self.op_token(codes::LDFLD, token)
    }

    pub fn stfld(self, token: Token) -> Self {
        self.op_token(codes::STFLD, token)
    }

    pub fn ldsfld(self, token: Token) -> Self {
        self.op_token(codes::LDSFLD, token)
    }

    pub fn stsfld(self, token: Token) -> Self {
        self.op_token(codes::STSFLD, token)
    }

    /// Store into a local, using the short forms where they exist.
    pub fn stloc(self, index: u8) -> Self {
        match index {
            0 => self.op(codes::STLOC_0),
            1 => self.op(codes::STLOC_1),
            2 => self.op(codes::STLOC_2),
            3 => self.op(codes::STLOC_3),
            n => self.op_i8(codes::STLOC_S, n as i8),
        }
    }

    /// Load a local, using the short forms where they exist.
    pub fn ldloc(self, index: u8) -> Self {
        match index {
            0 => self.op(codes::LDLOC_0),
            1 => self.op(codes::LDLOC_1),
            2 => self.op(codes::LDLOC_2),
            3 => self.op(codes::LDLOC_3),
            n => self.op_i8(codes::LDLOC_S, n as i8),
        }
    }

    pub fn pop(self) -> Self {
        self.op(codes::POP)
    }

    pub fn ret(self) -> Self {
        self.op(codes::RET)
    }

    pub fn br_s(self, delta: i8) -> Self {
        self.op_i8(codes::BR_S, delta)
    }

    pub fn brfalse_s(self, delta: i8) -> Self {
        self.op_i8(codes::BRFALSE_S, delta)
    }

    pub fn brtrue_s(self, delta: i8) -> Self {
        self.op_i8(codes::BRTRUE_S, delta)
    }

    /// Emit a `switch` with its jump table.
    pub fn switch(self, targets: &[i32]) -> Self {
        let mut this = self.op_i32(codes::SWITCH, targets.len() as i32);
        for target in targets {
            this.bytes.extend_from_slice(&target.to_le_bytes());
        }
        this
    }

    /// Current body length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.bytes.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encodings() {
        let token = Token::new(Token::MEMBER_REF, 1);
        assert_eq!(IlEmitter::new().call(token).to_bytes(), vec![0x28, 0x01, 0x00, 0x00, 0x0A]);
        assert_eq!(IlEmitter::new().ldftn(token).len(), 6);
        assert_eq!(IlEmitter::new().stloc(1).stloc(7).to_bytes(), vec![0x0B, 0x13, 0x07]);
        assert_eq!(IlEmitter::new().switch(&[2]).len(), 9);
        assert!(IlEmitter::new().is_empty());
    }
}
