//! Error types for dependency graph validation

use crate::image::{MethodId, ModuleId, Token};
use crate::validation::ContainerValidationResult;
use thiserror::Error;

/// Errors that abort validation or fail the container build
#[derive(Error, Debug, Clone)]
pub enum DiError {
    /// A callback registration points at a method the image does not contain
    #[error("Cannot find activation function for {service}: method {method} is not defined")]
    EntryPointNotFound { service: String, method: MethodId },

    /// A method body could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Validation found errors (the message is the full report)
    #[error("{0}")]
    Validation(ContainerValidationResult),

    /// A build callback failed for a reason of its own
    #[error("Build callback failed: {0}")]
    Callback(String),

    /// Internal error
    #[error("Internal DI error: {0}")]
    Internal(String),
}

impl DiError {
    /// Create an EntryPointNotFound error
    #[inline]
    pub fn entry_point_not_found(service: impl Into<String>, method: MethodId) -> Self {
        Self::EntryPointNotFound {
            service: service.into(),
            method,
        }
    }

    /// The validation result carried by a validation failure
    pub fn validation_result(&self) -> Option<&ContainerValidationResult> {
        match self {
            Self::Validation(result) => Some(result),
            _ => None,
        }
    }
}

/// Errors raised while decoding a compiled method body
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The byte at `offset` does not start a known instruction
    #[error("Unknown opcode {value:#06x} at offset {offset} in method {method}")]
    UnknownOpcode {
        method: MethodId,
        offset: usize,
        value: u16,
    },

    /// The method body ends in the middle of an instruction
    #[error("Truncated instruction at offset {offset} in method {method}")]
    Truncated { method: MethodId, offset: usize },

    /// A metadata token has no entry in the module's symbol table
    #[error("Token {token} cannot be resolved in module {module}")]
    UnresolvedToken { module: ModuleId, token: Token },

    /// A token resolved to a symbol of the wrong kind for its operand
    #[error("Token {token} resolved to a {found}, expected a {expected}")]
    UnexpectedSymbol {
        token: Token,
        expected: &'static str,
        found: &'static str,
    },

    /// A method refers to a module the image does not contain
    #[error("Method {method} belongs to unknown module {module}")]
    MissingModule { method: MethodId, module: ModuleId },

    /// A method reference points at a method the image does not contain
    #[error("Token {token} refers to undefined method {method}")]
    MissingMethod { token: Token, method: MethodId },
}

/// Failure while enumerating constructor candidates
///
/// Never propagated: constructor emulation folds it into
/// `NoAvailableConstructors`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntrospectionError {
    /// The image has no definition for the type
    #[error("No type definition for {0}")]
    UnknownType(String),

    /// The type cannot be constructed at all (interface, delegate, array)
    #[error("Type {0} is not constructible")]
    NotConstructible(String),
}

/// Constructor selection could not settle on a single candidate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    /// Several candidates tie under the selection rule
    #[error("Cannot choose between multiple constructors with {parameters} parameters")]
    Ambiguous { parameters: usize, candidates: usize },

    /// The selector was handed no candidates
    #[error("No constructor candidates to select from")]
    NoCandidates,
}

/// Result type alias for validation operations
pub type Result<T> = std::result::Result<T, DiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = DiError::entry_point_not_found("App.Service", MethodId(7));
        assert_eq!(
            err.to_string(),
            "Cannot find activation function for App.Service: method #7 is not defined"
        );

        let err = DiError::from(DecodeError::UnknownOpcode {
            method: MethodId(1),
            offset: 3,
            value: 0x24,
        });
        assert_eq!(err.to_string(), "Unknown opcode 0x0024 at offset 3 in method #1");
        assert!(err.validation_result().is_none());
    }

    #[test]
    fn test_selection_error_message() {
        let err = SelectionError::Ambiguous {
            parameters: 1,
            candidates: 2,
        };
        assert!(err.to_string().contains("1 parameters"));
    }
}
