use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::lowering::{LoweringError, NameGenerator};

/// Lowering configuration.
///
/// - The identifier fields name what the generated pipeline declares or recognizes.
/// - `inline_bindings` controls how join aliases reach a lambda body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoweringConfig {
    /// Prefix of compiler-generated row parameter names (`__t` gives `__t_0`, `__t_1`, ...)
    pub synthetic_prefix: String,
    /// Local holding the per-query metadata table
    pub metadata_binding: String,
    /// Counter declared when the row number is referenced
    pub row_counter: String,
    /// Implicit identifier for the current row number inside `select`
    pub row_number_identifier: String,
    /// Implicit identifier for the current group after `groupby`
    pub group_identifier: String,
    /// Substitute access paths for aliases instead of emitting `alias = path` bindings
    pub inline_bindings: bool,
}

impl Default for LoweringConfig {
    fn default() -> Self {
        Self {
            synthetic_prefix: "__t".to_string(),
            metadata_binding: "__metaDataMap".to_string(),
            row_counter: "__rowNumber".to_string(),
            row_number_identifier: "_rn".to_string(),
            group_identifier: "_g".to_string(),
            inline_bindings: false,
        }
    }
}

impl LoweringConfig {
    /// Create default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience: default configuration with alias paths inlined into lambda bodies.
    pub fn inlined() -> Self {
        Self { inline_bindings: true, ..Self::default() }
    }

    /// Parse a JSON document; absent keys keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, LoweringError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| LoweringError::InvalidConfig(format!("invalid config json: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LoweringError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| LoweringError::Io(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), LoweringError> {
        let names = [
            ("synthetic_prefix", &self.synthetic_prefix),
            ("metadata_binding", &self.metadata_binding),
            ("row_counter", &self.row_counter),
            ("row_number_identifier", &self.row_number_identifier),
            ("group_identifier", &self.group_identifier),
        ];
        for (key, value) in names {
            if !NameGenerator::is_identifier(value) {
                return Err(LoweringError::InvalidConfig(format!("{key} is not an identifier: '{value}'")));
            }
        }
        if self.row_number_identifier == self.group_identifier {
            return Err(LoweringError::InvalidConfig(
                "row_number_identifier and group_identifier must differ".into(),
            ));
        }
        Ok(())
    }
}
