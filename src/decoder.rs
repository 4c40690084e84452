//! Instruction decoding
//!
//! Turns one compiled method body into an ordered list of [`Instruction`]s.
//! Each instruction carries its opcode, its raw operand bytes and, when the
//! operand is a metadata token, the symbol it resolves to in the declaring
//! module (with generic arguments in scope substituted).
//!
//! The walker only depends on the [`InstructionDecoder`] trait; [`CilDecoder`]
//! is the implementation for ECMA-335 method bodies.

use crate::error::DecodeError;
use crate::image::{FieldInfo, Image, MethodId, MethodRef, Module, Symbol, Token};
use crate::opcode::{self, OpCode, OperandType, TWO_BYTE_PREFIX};
use crate::types::GenericContext;
use std::fmt;

#[cfg(feature = "logging")]
use tracing::trace;

/// Raw little-endian operand bytes of an instruction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperandBytes(Vec<u8>);

impl OperandBytes {
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Interpret a 4-byte operand as a signed integer.
    pub fn read_i32(&self) -> Option<i32> {
        let bytes: [u8; 4] = self.0.as_slice().try_into().ok()?;
        Some(i32::from_le_bytes(bytes))
    }

    /// Interpret a 4-byte operand as a metadata token.
    pub fn token(&self) -> Option<Token> {
        self.read_i32().map(|v| Token(v as u32))
    }
}

impl fmt::Display for OperandBytes {
    /// Big-endian hex, e.g. `0A000001`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter().rev() {
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

/// A decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Byte offset of the opcode within the method body
    pub offset: usize,
    pub opcode: &'static OpCode,
    pub operand: OperandBytes,
    /// Resolved symbol for token operands
    pub symbol: Option<Symbol>,
}

impl Instruction {
    /// Whether this is the instruction with the given encoded value.
    #[inline]
    pub fn is(&self, value: u16) -> bool {
        self.opcode.value == value
    }

    /// The method this instruction references, if any.
    pub fn method(&self) -> Option<&MethodRef> {
        match &self.symbol {
            Some(Symbol::Method(method)) => Some(method),
            _ => None,
        }
    }

    /// The field this instruction references, if any.
    pub fn field(&self) -> Option<&FieldInfo> {
        match &self.symbol {
            Some(Symbol::Field(field)) => Some(field),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04} : {}", self.offset, self.opcode)?;
        match &self.symbol {
            Some(Symbol::Field(field)) => write!(
                f,
                " {} {}::{}",
                field.field_type,
                field.declaring_type.full_name(),
                field.name
            ),
            Some(Symbol::Method(method)) => {
                let instance = if method.is_static { "" } else { "instance " };
                if method.is_constructor {
                    write!(f, " {instance}void {}::.ctor()", method.declaring_type.full_name())
                } else {
                    write!(
                        f,
                        " {instance}{} {}::{}()",
                        method.return_type,
                        method.declaring_type.full_name(),
                        method.name
                    )
                }
            }
            Some(Symbol::Type(ty)) => write!(f, " {}", ty.full_name()),
            Some(Symbol::String(s)) => write!(f, " {s:?}"),
            Some(Symbol::Signature(_)) | None if !self.operand.is_empty() => {
                write!(f, " {}", self.operand)
            }
            _ => Ok(()),
        }
    }
}

/// Source of decoded method bodies.
pub trait InstructionDecoder {
    /// Decode `method` with `generics` in scope.
    ///
    /// Methods that cannot be analyzed (no body, excluded namespace) yield an
    /// empty list rather than an error.
    fn decode(&self, method: MethodId, generics: &GenericContext) -> Result<Vec<Instruction>, DecodeError>;
}

/// Decoder for ECMA-335 CIL method bodies stored in an [`Image`].
#[derive(Debug, Clone)]
pub struct CilDecoder<'a> {
    image: &'a Image,
    system_namespaces: Vec<String>,
}

impl<'a> CilDecoder<'a> {
    /// Decoder skipping methods declared in the `System` namespace.
    pub fn new(image: &'a Image) -> Self {
        Self {
            image,
            system_namespaces: vec!["System".to_string()],
        }
    }

    /// Replace the set of namespaces whose methods are never decoded.
    pub fn with_system_namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.system_namespaces = namespaces.into_iter().map(Into::into).collect();
        self
    }

    #[inline]
    pub fn image(&self) -> &'a Image {
        self.image
    }
}

impl InstructionDecoder for CilDecoder<'_> {
    fn decode(&self, method: MethodId, generics: &GenericContext) -> Result<Vec<Instruction>, DecodeError> {
        let Some(info) = self.image.method(method) else {
            return Ok(Vec::new());
        };

        if self
            .system_namespaces
            .iter()
            .any(|ns| info.declaring_type.is_in_namespace(ns))
        {
            return Ok(Vec::new());
        }

        let Some(body) = info.body.as_deref() else {
            #[cfg(feature = "logging")]
            trace!(target: "dependency_validator", method = %info.name, "Method has no body");
            return Ok(Vec::new());
        };

        let module = self.image.module(info.module).ok_or(DecodeError::MissingModule {
            method,
            module: info.module,
        })?;

        decode_body(self.image, module, method, body, generics)
    }
}

/// Decode a raw method body in the context of `module`.
pub fn decode_body(
    image: &Image,
    module: &Module,
    method: MethodId,
    body: &[u8],
    generics: &GenericContext,
) -> Result<Vec<Instruction>, DecodeError> {
    let mut instructions = Vec::new();
    let mut cursor = 0;

    while cursor < body.len() {
        let offset = cursor;
        let first = body[cursor];
        let value = if first == TWO_BYTE_PREFIX {
            let second = *body
                .get(cursor + 1)
                .ok_or(DecodeError::Truncated { method, offset })?;
            u16::from_be_bytes([first, second])
        } else {
            u16::from(first)
        };

        let opcode = opcode::lookup(value).ok_or(DecodeError::UnknownOpcode {
            method,
            offset,
            value,
        })?;
        cursor += opcode.size();

        let width = opcode.operand.size();
        let operand = body
            .get(cursor..cursor + width)
            .ok_or(DecodeError::Truncated { method, offset })?;
        cursor += width;

        let operand = OperandBytes(operand.to_vec());

        if opcode.operand == OperandType::InlineSwitch {
            let count = operand.read_i32().unwrap_or(0) as u32 as usize;
            let targets = count
                .checked_mul(4)
                .filter(|len| cursor + len <= body.len())
                .ok_or(DecodeError::Truncated { method, offset })?;
            cursor += targets;
        }

        let symbol = if opcode.operand.is_token() {
            match operand.token() {
                Some(token) => {
                    let symbol = image.resolve_token(module, token, generics)?;
                    check_symbol_kind(opcode.operand, token, &symbol)?;
                    Some(symbol)
                }
                None => None,
            }
        } else {
            None
        };

        instructions.push(Instruction {
            offset,
            opcode,
            operand,
            symbol,
        });
    }

    Ok(instructions)
}

fn check_symbol_kind(operand: OperandType, token: Token, symbol: &Symbol) -> Result<(), DecodeError> {
    let expected = match (operand, symbol) {
        (OperandType::InlineMethod, Symbol::Method(_))
        | (OperandType::InlineField, Symbol::Field(_))
        | (OperandType::InlineType, Symbol::Type(_))
        | (OperandType::InlineString, Symbol::String(_))
        | (OperandType::InlineSig, Symbol::Signature(_))
        | (OperandType::InlineTok, Symbol::Method(_) | Symbol::Field(_) | Symbol::Type(_)) => {
            return Ok(());
        }
        (OperandType::InlineMethod, _) => "method",
        (OperandType::InlineField, _) => "field",
        (OperandType::InlineType, _) => "type",
        (OperandType::InlineString, _) => "string",
        (OperandType::InlineSig, _) => "signature",
        _ => "member",
    };
    Err(DecodeError::UnexpectedSymbol {
        token,
        expected,
        found: symbol.kind_name(),
    })
}
