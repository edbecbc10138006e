//! Serializable symbol summaries for external report layers.
//!
//! The analysis crate's symbol table is an arena-backed in-memory structure;
//! `SymbolInfo` is the flat, owned record a consuming report/CLI layer
//! serializes. The "Info" suffix distinguishes it from the resolver's
//! internal symbol types.

use serde::{Deserialize, Serialize};

use crate::span::Location;

/// Flat symbol record for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolInfo {
    /// Symbol name.
    pub name: String,
    /// Symbol kind (class, function, method, variable, import).
    pub kind: String,
    /// Definition location.
    pub location: Location,
    /// Name of the containing class, for methods.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    /// Visibility classification (public, protected, private).
    pub visibility: String,
}

impl SymbolInfo {
    /// Create a symbol record.
    pub fn new(
        name: impl Into<String>,
        kind: impl Into<String>,
        location: Location,
        visibility: impl Into<String>,
    ) -> Self {
        SymbolInfo {
            name: name.into(),
            kind: kind.into(),
            location,
            container: None,
            visibility: visibility.into(),
        }
    }

    /// Attach the containing class name.
    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_without_container_omits_field() {
        let sym = SymbolInfo::new(
            "process_data",
            "function",
            Location::new("src/utils.py", 42, 4),
            "public",
        );
        let json = serde_json::to_string(&sym).unwrap();
        assert!(!json.contains("container"));
        assert!(json.contains("\"name\":\"process_data\""));
        assert!(json.contains("\"kind\":\"function\""));
        assert!(json.contains("\"visibility\":\"public\""));
    }

    #[test]
    fn symbol_with_container_includes_field() {
        let sym = SymbolInfo::new(
            "do_work",
            "method",
            Location::new("src/utils.py", 50, 8),
            "protected",
        )
        .with_container("Worker");
        let json = serde_json::to_string(&sym).unwrap();
        assert!(json.contains("\"container\":\"Worker\""));
    }
}
