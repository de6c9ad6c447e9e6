//! Model identifiers

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::InvalidModelId;

/// Longest identifier accepted, in bytes
pub const MAX_MODEL_ID_LEN: usize = 256;

/// Opaque, immutable name of a model (e.g. `"Llama-2-7b-chat-glm-4b-q0f16_0"`
/// or `"mistral:latest"`).
///
/// Cheap to clone; used as the key of the artifact and pool tables.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModelId(Arc<str>);

impl ModelId {
    /// Parse and validate an identifier. Surrounding whitespace is trimmed.
    pub fn parse(raw: &str) -> Result<Self, InvalidModelId> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(InvalidModelId::Empty);
        }
        if trimmed.len() > MAX_MODEL_ID_LEN {
            return Err(InvalidModelId::TooLong {
                max: MAX_MODEL_ID_LEN,
                actual: trimmed.len(),
            });
        }
        if trimmed.chars().any(char::is_control) {
            return Err(InvalidModelId::ControlCharacter);
        }
        Ok(Self(Arc::from(trimmed)))
    }

    /// The identifier as given
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory name used for this model under a models root.
    ///
    /// Every byte outside `[A-Za-z0-9._-]` becomes `_`, and the special names
    /// `.` and `..` are replaced, so the result is always a single path
    /// component inside the root.
    pub fn storage_name(&self) -> String {
        let sanitized: String = self
            .0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        match sanitized.as_str() {
            "." | ".." => sanitized.replace('.', "_"),
            _ => sanitized,
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModelId({:?})", &*self.0)
    }
}

impl AsRef<str> for ModelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ModelId {
    type Error = InvalidModelId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for ModelId {
    type Error = InvalidModelId;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ModelId> for String {
    fn from(id: ModelId) -> Self {
        id.0.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_trims_whitespace() {
        let id = ModelId::parse("  mistral:latest \n").unwrap();
        assert_eq!(id.as_str(), "mistral:latest");
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert_eq!(ModelId::parse("   "), Err(InvalidModelId::Empty));
    }

    #[test]
    fn test_parse_rejects_control_characters() {
        assert_eq!(
            ModelId::parse("bad\u{0007}name"),
            Err(InvalidModelId::ControlCharacter)
        );
    }

    #[test]
    fn test_parse_rejects_overlong() {
        let raw = "m".repeat(MAX_MODEL_ID_LEN + 1);
        assert!(matches!(
            ModelId::parse(&raw),
            Err(InvalidModelId::TooLong { .. })
        ));
    }

    #[test]
    fn test_storage_name_flattens_paths() {
        let id = ModelId::parse("../etc/passwd").unwrap();
        assert_eq!(id.storage_name(), ".._etc_passwd");

        let id = ModelId::parse("..").unwrap();
        assert_eq!(id.storage_name(), "__");

        let id = ModelId::parse("HF://mlc-ai/Llama-2-7b").unwrap();
        assert_eq!(id.storage_name(), "HF___mlc-ai_Llama-2-7b");
    }

    #[test]
    fn test_serde_validates() {
        let id: ModelId = serde_json::from_str("\"phi-2\"").unwrap();
        assert_eq!(id.as_str(), "phi-2");
        assert!(serde_json::from_str::<ModelId>("\"\"").is_err());
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"phi-2\"");
    }

    proptest! {
        #[test]
        fn prop_storage_name_is_single_component(raw in "\\PC{1,64}") {
            if let Ok(id) = ModelId::parse(&raw) {
                let name = id.storage_name();
                prop_assert!(!name.is_empty());
                prop_assert!(!name.contains('/'));
                prop_assert!(!name.contains('\\'));
                prop_assert!(name != "." && name != "..");
            }
        }
    }
}
