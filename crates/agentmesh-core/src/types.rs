//! Agent identity

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Longest accepted agent identifier, in bytes
pub const MAX_ID_LEN: usize = 128;

/// Error type for ID validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdValidationError {
    /// The ID string is empty
    Empty,
    /// The ID contains only whitespace
    WhitespaceOnly,
    /// The ID has leading or trailing whitespace
    LeadingTrailingWhitespace,
    /// The ID contains invalid characters
    InvalidCharacters,
    /// The ID is longer than [`MAX_ID_LEN`]
    TooLong(usize),
}

impl fmt::Display for IdValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "ID cannot be empty"),
            Self::WhitespaceOnly => write!(f, "ID cannot be whitespace-only"),
            Self::LeadingTrailingWhitespace => {
                write!(f, "ID cannot have leading or trailing whitespace")
            }
            Self::InvalidCharacters => write!(
                f,
                "ID can only contain alphanumeric characters, hyphens, underscores, and dots"
            ),
            Self::TooLong(len) => {
                write!(f, "ID is {} bytes long (limit: {} bytes)", len, MAX_ID_LEN)
            }
        }
    }
}

impl std::error::Error for IdValidationError {}

/// Unique identifier for an agent participating in a topology
///
/// Valid IDs are non-empty, at most [`MAX_ID_LEN`] bytes, carry no
/// leading/trailing whitespace and use only alphanumerics, hyphens,
/// underscores and dots.
///
/// # Examples
///
/// ```
/// use agentmesh_core::AgentId;
///
/// assert!(AgentId::parse("gateway").is_ok());
/// assert!(AgentId::parse("temp-sensor.01").is_ok());
///
/// assert!(AgentId::parse("").is_err());
/// assert!(AgentId::parse(" hub").is_err());
/// assert!(AgentId::parse("hub/spoke").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentId(String);

impl AgentId {
    /// Parse and validate an agent ID from a string
    pub fn parse(id: impl AsRef<str>) -> Result<Self, IdValidationError> {
        let s = id.as_ref();

        if s.is_empty() {
            return Err(IdValidationError::Empty);
        }

        if s.trim().is_empty() {
            return Err(IdValidationError::WhitespaceOnly);
        }

        if s != s.trim() {
            return Err(IdValidationError::LeadingTrailingWhitespace);
        }

        if s.len() > MAX_ID_LEN {
            return Err(IdValidationError::TooLong(s.len()));
        }

        if !s
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(IdValidationError::InvalidCharacters);
        }

        Ok(Self(s.to_string()))
    }

    /// Get the agent ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for AgentId {
    type Err = IdValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AgentId {
    type Error = IdValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<AgentId> for String {
    fn from(id: AgentId) -> Self {
        id.0
    }
}

impl From<&str> for AgentId {
    /// Creates an AgentId from a string slice.
    ///
    /// # Panics
    /// Panics if the string fails validation. Use `AgentId::parse()` for
    /// untrusted input.
    fn from(s: &str) -> Self {
        Self::parse(s).unwrap_or_else(|e| panic!("Invalid AgentId '{}': {}", s, e))
    }
}

impl AsRef<str> for AgentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_id_parse_valid() {
        assert!(AgentId::parse("agent-1").is_ok());
        assert!(AgentId::parse("my_agent").is_ok());
        assert!(AgentId::parse("agent.123").is_ok());
        assert!(AgentId::parse("HUB").is_ok());
        assert_eq!(AgentId::parse("gateway").unwrap().as_str(), "gateway");
    }

    #[test]
    fn test_agent_id_parse_rejections() {
        assert_eq!(AgentId::parse(""), Err(IdValidationError::Empty));
        assert_eq!(AgentId::parse("  "), Err(IdValidationError::WhitespaceOnly));
        assert_eq!(
            AgentId::parse(" hub"),
            Err(IdValidationError::LeadingTrailingWhitespace)
        );
        assert_eq!(
            AgentId::parse("../hub"),
            Err(IdValidationError::InvalidCharacters)
        );
        assert_eq!(
            AgentId::parse("agent space"),
            Err(IdValidationError::InvalidCharacters)
        );
    }

    #[test]
    fn test_agent_id_length_limit() {
        let long = "a".repeat(MAX_ID_LEN + 1);
        assert_eq!(
            AgentId::parse(&long),
            Err(IdValidationError::TooLong(MAX_ID_LEN + 1))
        );
        assert!(AgentId::parse("a".repeat(MAX_ID_LEN)).is_ok());
    }

    #[test]
    #[should_panic(expected = "Invalid AgentId")]
    fn test_agent_id_from_panics_on_invalid() {
        let _: AgentId = "".into();
    }

    #[test]
    fn test_agent_id_serde_validates() {
        let id: AgentId = serde_json::from_str("\"spoke-1\"").unwrap();
        assert_eq!(id.as_str(), "spoke-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"spoke-1\"");

        let bad: Result<AgentId, _> = serde_json::from_str("\"spoke 1\"");
        assert!(bad.is_err());
    }
}
