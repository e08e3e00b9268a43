//! Human-readable messages for device error codes.
//!
//! The catalog is read once at startup and never mutated afterwards; it is
//! shared through an `Arc` by everything that enriches error codes.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Section whose codes apply to every asset type.
const ANY_TYPE: &str = "*";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct ErrorCatalog {
    messages: HashMap<String, HashMap<String, String>>,
}

impl ErrorCatalog {
    pub fn from_toml_str(contents: &str) -> Result<Self, String> {
        toml::from_str(contents).map_err(|e| format!("Failed to parse error catalog: {e}"))
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read error catalog at {path:?}: {e}"))?;
        Self::from_toml_str(&contents)
    }

    /// Always yields a message; unknown type/code pairs get a generic one.
    pub fn get_error_message(&self, type_id: &str, error_code: &str) -> String {
        [type_id, ANY_TYPE]
            .iter()
            .find_map(|section| {
                self.messages
                    .get(*section)
                    .and_then(|codes| codes.get(error_code))
            })
            .cloned()
            .unwrap_or_else(|| format!("Unsupported type/code: {type_id}/{error_code}"))
    }

    pub fn len(&self) -> usize {
        self.messages.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CATALOG: &str = r#"
        [GW]
        E001 = "Gateway unreachable"

        ["*"]
        E001 = "Generic failure"
        E999 = "Unknown device error"
    "#;

    #[test]
    fn test_type_specific_message_wins() {
        let catalog = ErrorCatalog::from_toml_str(CATALOG).unwrap();
        assert_eq!(catalog.get_error_message("GW", "E001"), "Gateway unreachable");
        assert_eq!(catalog.get_error_message("SENSOR", "E001"), "Generic failure");
        assert_eq!(catalog.get_error_message("GW", "E999"), "Unknown device error");
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn test_unknown_code_falls_back() {
        let catalog = ErrorCatalog::default();
        assert!(catalog.is_empty());
        assert_eq!(
            catalog.get_error_message("GW", "E404"),
            "Unsupported type/code: GW/E404"
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CATALOG.as_bytes()).unwrap();

        let catalog = ErrorCatalog::load(file.path()).unwrap();
        assert_eq!(catalog.get_error_message("GW", "E001"), "Gateway unreachable");
    }

    #[test]
    fn test_invalid_catalog_is_rejected() {
        assert!(ErrorCatalog::from_toml_str("GW = 3").is_err());
    }
}
