use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DecompileError, Result};

/// Selects how method bodies are structured. Both engines produce valid
/// source; `Linear` skips control-flow recovery entirely.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DecompileEngine {
    #[default]
    Reducer,
    Linear,
}

/// User-facing decompiler options.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DecompilerConfig {
    /// Escape non-ASCII and control characters in string literals as `\uXXXX`.
    pub escape_unicode_characters: bool,
    /// Drop redundant `this.` qualifiers.
    pub omit_this_prefix: bool,
    /// Pad the output so statements land on their original line numbers.
    pub realign_line_numbers: bool,
    /// Prefix lines with `/* 12 */` comments carrying the original line.
    pub show_line_numbers: bool,
    /// Emit the implicit no-arg constructor.
    pub write_default_constructor: bool,
    /// Append the location / compiler version comment block.
    pub write_metadata: bool,
    pub decompile_engine: DecompileEngine,
    pub indent: String,
    /// Upper bound on reducer passes per method.
    pub max_reducer_passes: usize,
}

impl Default for DecompilerConfig {
    fn default() -> Self {
        DecompilerConfig {
            escape_unicode_characters: false,
            omit_this_prefix: false,
            realign_line_numbers: false,
            show_line_numbers: false,
            write_default_constructor: false,
            write_metadata: true,
            decompile_engine: DecompileEngine::Reducer,
            indent: "    ".to_string(),
            max_reducer_passes: 256,
        }
    }
}

impl DecompilerConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| DecompileError::Config {
            message: e.to_string(),
        })
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| DecompileError::Config {
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            DecompilerConfig::from_json_str(r#"{"showLineNumbers": true, "decompileEngine": "linear"}"#)
                .unwrap();
        assert!(config.show_line_numbers);
        assert!(config.write_metadata);
        assert_eq!(config.decompile_engine, DecompileEngine::Linear);
        assert_eq!(config.max_reducer_passes, 256);
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(
            DecompilerConfig::from_json_str("{"),
            Err(DecompileError::Config { .. })
        ));
    }
}
