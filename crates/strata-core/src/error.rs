//! Unified error type and output code constants for strata.
//!
//! Every pipeline stage has its own typed error (`LexError`, `ParseError`,
//! `ResolveError`, defined in the crates that own those stages). This module
//! provides the unified type (`StrataError`) those errors are bridged into
//! when a caller wants one error channel, plus stable integer codes suitable
//! for JSON output.
//!
//! ## Error Code Mapping
//!
//! - `2`: Lex errors (bad indentation, unterminated literal, bad number)
//! - `3`: Parse errors (unexpected token, unbalanced construct)
//! - `4`: Resolve errors (duplicate member, incompatible qualifiers)
//! - `10`: Internal errors (structural-invariant violations, analyzer bugs)
//!
//! Lex and parse errors describe the user's source; internal errors describe
//! defects in the analyzer itself and must never be presented as source
//! diagnostics.

use std::fmt;

use thiserror::Error;

use crate::span::Location;

// ============================================================================
// Output Error Codes
// ============================================================================

/// Stable integer codes for serialized error output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputErrorCode {
    /// Tokenization failed (bad indentation, unterminated literal).
    LexError = 2,
    /// Parsing failed (unexpected token, unbalanced construct).
    ParseError = 3,
    /// Resolution diagnostic (duplicate member, incompatible qualifiers).
    ResolveError = 4,
    /// Internal errors (bugs, invariant violations).
    InternalError = 10,
}

impl OutputErrorCode {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OutputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type bridging all pipeline stage errors.
///
/// Each variant carries enough context to produce a helpful message plus an
/// optional `details` payload for serialized output. The stage crates
/// provide `From` bridges into this type.
#[derive(Debug, Error)]
pub enum StrataError {
    /// Tokenization failed; the file's pipeline was aborted.
    #[error("lex error at {location}: {message}")]
    Lex {
        message: String,
        location: Location,
    },

    /// Parsing failed; the file's pipeline was aborted.
    #[error("parse error at {location}: expected {expected}, found {found}")]
    Parse {
        expected: String,
        found: String,
        location: Location,
    },

    /// A resolution diagnostic for one declaration.
    #[error("resolve error at {location}: {message}")]
    Resolve {
        message: String,
        location: Location,
        details: Option<serde_json::Value>,
    },

    /// Internal error (bug or invariant violation), not a source diagnostic.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl From<&StrataError> for OutputErrorCode {
    fn from(err: &StrataError) -> Self {
        match err {
            StrataError::Lex { .. } => OutputErrorCode::LexError,
            StrataError::Parse { .. } => OutputErrorCode::ParseError,
            StrataError::Resolve { .. } => OutputErrorCode::ResolveError,
            StrataError::Internal { .. } => OutputErrorCode::InternalError,
        }
    }
}

impl From<StrataError> for OutputErrorCode {
    fn from(err: StrataError) -> Self {
        OutputErrorCode::from(&err)
    }
}

// ============================================================================
// Convenience Constructors
// ============================================================================

impl StrataError {
    /// Create a lex error.
    pub fn lex(message: impl Into<String>, location: Location) -> Self {
        StrataError::Lex {
            message: message.into(),
            location,
        }
    }

    /// Create a parse error.
    pub fn parse(
        expected: impl Into<String>,
        found: impl Into<String>,
        location: Location,
    ) -> Self {
        StrataError::Parse {
            expected: expected.into(),
            found: found.into(),
            location,
        }
    }

    /// Create a resolve error without details.
    pub fn resolve(message: impl Into<String>, location: Location) -> Self {
        StrataError::Resolve {
            message: message.into(),
            location,
            details: None,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        StrataError::Internal {
            message: message.into(),
        }
    }

    /// Get the output code for this error.
    pub fn error_code(&self) -> OutputErrorCode {
        OutputErrorCode::from(self)
    }

    /// True if this error describes an analyzer defect rather than the
    /// user's source.
    pub fn is_internal(&self) -> bool {
        matches!(self, StrataError::Internal { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
