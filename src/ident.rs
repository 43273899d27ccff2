//! Structural module identifiers

use crate::error::ModuleError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Structural name of a module: `group:artifact[:slot]`.
///
/// Equality and hashing are purely structural; two identifiers parsed from
/// the same text are interchangeable everywhere in the system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleIdentifier {
    group: String,
    artifact: String,
    slot: Option<String>,
}

impl ModuleIdentifier {
    /// Create an identifier without a slot
    pub fn new(group: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            artifact: artifact.into(),
            slot: None,
        }
    }

    /// Create an identifier with an explicit slot
    pub fn with_slot(
        group: impl Into<String>,
        artifact: impl Into<String>,
        slot: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            artifact: artifact.into(),
            slot: Some(slot.into()),
        }
    }

    /// The group portion of the identifier
    pub fn group(&self) -> &str {
        &self.group
    }

    /// The artifact portion of the identifier
    pub fn artifact(&self) -> &str {
        &self.artifact
    }

    /// The slot portion, if any
    pub fn slot(&self) -> Option<&str> {
        self.slot.as_deref()
    }
}

impl fmt::Display for ModuleIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.artifact)?;
        if let Some(slot) = &self.slot {
            write!(f, ":{}", slot)?;
        }
        Ok(())
    }
}

impl FromStr for ModuleIdentifier {
    type Err = ModuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ModuleError::InvalidIdentifier {
            text: s.to_string(),
        };
        let mut parts = s.split(':');
        let group = parts.next().filter(|p| !p.is_empty()).ok_or_else(invalid)?;
        let artifact = parts.next().filter(|p| !p.is_empty()).ok_or_else(invalid)?;
        let slot = match parts.next() {
            Some(slot) if !slot.is_empty() => Some(slot.to_string()),
            Some(_) => return Err(invalid()),
            None => None,
        };
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self {
            group: group.to_string(),
            artifact: artifact.to_string(),
            slot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_without_slot() {
        let id: ModuleIdentifier = "org.acme:widgets".parse().unwrap();
        assert_eq!(id.group(), "org.acme");
        assert_eq!(id.artifact(), "widgets");
        assert_eq!(id.slot(), None);
        assert_eq!(id.to_string(), "org.acme:widgets");
    }

    #[test]
    fn test_parse_with_slot() {
        let id: ModuleIdentifier = "org.acme:widgets:1.0".parse().unwrap();
        assert_eq!(id.slot(), Some("1.0"));
        assert_eq!(id.to_string(), "org.acme:widgets:1.0");
    }

    #[test]
    fn test_structural_equality() {
        let parsed: ModuleIdentifier = "test:a:main".parse().unwrap();
        let built = ModuleIdentifier::with_slot("test", "a", "main");
        assert_eq!(parsed, built);
        assert_ne!(built, ModuleIdentifier::new("test", "a"));
    }

    #[test]
    fn test_reject_malformed() {
        for text in ["", "group", ":artifact", "g:", "g::s", "g:a:s:extra"] {
            let result: Result<ModuleIdentifier, _> = text.parse();
            assert!(
                matches!(result, Err(ModuleError::InvalidIdentifier { .. })),
                "should reject {:?}",
                text
            );
        }
    }
}
