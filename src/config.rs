// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model registry: which model keys a deployment allows, and the hub repo
//! each key resolves to.
//!
//! The registry is read from a YAML file with an `llms` list:
//!
//! ```yaml
//! llms:
//!   - tiny-gpt2
//!   - distilgpt2
//!   - google/gemma-3-4b-it
//! ```
//!
//! Short aliases (such as `tiny-gpt2`) map to full `HuggingFace` repo ids.
//! The scoring engine never reads this; it is consumed by whatever loads
//! models before a probe runs.
//!
//! # Usage
//!
//! ```
//! use candle_headscope::ModelRegistry;
//!
//! let registry = ModelRegistry::from_yaml_str("llms:\n  - tiny-gpt2\n").unwrap();
//! assert_eq!(registry.resolve("tiny-gpt2").unwrap(), "sshleifer/tiny-gpt2");
//! assert!(registry.resolve("gpt-j").is_err());
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{HeadScopeError, Result};

/// Model keys used when no registry file exists or it lists nothing.
pub const DEFAULT_MODELS: [&str; 2] = ["tiny-gpt2", "distilgpt2"];

/// Built-in short names and the repo ids they stand for.
const BUILTIN_ALIASES: [(&str, &str); 1] = [("tiny-gpt2", "sshleifer/tiny-gpt2")];

/// On-disk shape of the registry file.
#[derive(Debug, Default, Deserialize)]
struct RegistryFile {
    /// Allowed model keys, in display order.
    #[serde(default)]
    llms: Vec<String>,
    /// Extra aliases on top of the built-in ones.
    #[serde(default)]
    aliases: HashMap<String, String>,
}

/// Allowed model keys plus their alias table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRegistry {
    models: Vec<String>,
    aliases: HashMap<String, String>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::from_parts(Vec::new(), HashMap::new())
    }
}

impl ModelRegistry {
    fn from_parts(models: Vec<String>, extra_aliases: HashMap<String, String>) -> Self {
        let models: Vec<String> = models
            .into_iter()
            .map(|m| m.trim().to_owned())
            .filter(|m| !m.is_empty())
            .collect();
        let models = if models.is_empty() {
            tracing::info!(defaults = ?DEFAULT_MODELS, "model registry lists no models, using defaults");
            DEFAULT_MODELS.iter().map(|&m| m.to_owned()).collect()
        } else {
            models
        };
        let mut aliases: HashMap<String, String> = BUILTIN_ALIASES
            .iter()
            .map(|&(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        aliases.extend(extra_aliases);
        Self { models, aliases }
    }

    /// Parse a registry from YAML text.
    ///
    /// An empty document yields the default model list.
    ///
    /// # Errors
    ///
    /// Returns [`HeadScopeError::Config`] if the YAML is malformed.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let file: RegistryFile = serde_yaml::from_str(yaml)
            .map_err(|e| HeadScopeError::Config(format!("parse model registry: {e}")))?;
        Ok(Self::from_parts(file.llms, file.aliases))
    }

    /// Load a registry file; a missing file yields the default model list.
    ///
    /// # Errors
    ///
    /// Returns [`HeadScopeError::Io`] if the file exists but cannot be read,
    /// and [`HeadScopeError::Config`] if it is malformed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(path = %path.display(), "model registry not found, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Allowed model keys, in file order.
    #[must_use]
    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Whether `key` is allowed.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.models.iter().any(|m| m == key)
    }

    /// Resolve an allowed key to its hub repo id.
    ///
    /// # Errors
    ///
    /// Returns [`HeadScopeError::Config`] naming the allowed keys (sorted)
    /// if `key` is not in the registry.
    pub fn resolve(&self, key: &str) -> Result<String> {
        if !self.contains(key) {
            let mut allowed = self.models.clone();
            allowed.sort();
            return Err(HeadScopeError::Config(format!(
                "unknown model key: {key}. Allowed: {allowed:?}"
            )));
        }
        Ok(self
            .aliases
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_owned()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn reads_llms_list() {
        let reg = ModelRegistry::from_yaml_str(
            "# models\nllms:\n  - tiny-gpt2\n  - google/gemma-3-4b-it\n",
        )
        .unwrap();
        assert_eq!(reg.models(), &["tiny-gpt2", "google/gemma-3-4b-it"]);
        assert_eq!(reg.resolve("google/gemma-3-4b-it").unwrap(), "google/gemma-3-4b-it");
        assert_eq!(reg.resolve("tiny-gpt2").unwrap(), "sshleifer/tiny-gpt2");
    }

    #[test]
    fn empty_list_falls_back_to_defaults() {
        let reg = ModelRegistry::from_yaml_str("llms: []\n").unwrap();
        assert_eq!(reg.models(), &["tiny-gpt2", "distilgpt2"]);
        assert_eq!(ModelRegistry::from_yaml_str("").unwrap(), ModelRegistry::default());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let reg = ModelRegistry::from_path("/nonexistent/config.yaml").unwrap();
        assert!(reg.contains("distilgpt2"));
    }

    #[test]
    fn unknown_key_lists_allowed_models() {
        let reg = ModelRegistry::default();
        let err = reg.resolve("gpt-j").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("gpt-j"));
        assert!(msg.contains("distilgpt2"));
    }

    #[test]
    fn extra_aliases() {
        let reg = ModelRegistry::from_yaml_str(
            "llms:\n  - small\naliases:\n  small: org/small-model\n",
        )
        .unwrap();
        assert_eq!(reg.resolve("small").unwrap(), "org/small-model");
    }

    #[test]
    fn malformed_yaml_is_config_error() {
        let err = ModelRegistry::from_yaml_str("llms: [unterminated").unwrap_err();
        assert!(matches!(err, HeadScopeError::Config(_)));
    }
}
