//! Core infrastructure for the strata analyzer.
//!
//! This crate provides stage-agnostic infrastructure shared by the syntax
//! and analysis crates:
//! - Byte spans and file locations for diagnostics
//! - A unified error type with stable output codes
//! - Serializable symbol summary types for external report layers

pub mod error;
pub mod span;
pub mod symbol_info;

pub use error::{OutputErrorCode, StrataError};
pub use span::{Location, Span};
pub use symbol_info::SymbolInfo;
