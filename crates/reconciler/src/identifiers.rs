//! Newtype identifiers for the reconciliation domain.
//!
//! Every key that crosses a system boundary is a distinct newtype so a case
//! key can never be handed to the tracker (or the reverse) by accident, even
//! though both are strings on the wire.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ValidationError;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: partitioning and record keys
// ---------------------------------------------------------------------------

string_id! {
    /// Partitioning key for mappings (a municipality identifier, e.g. `"2281"`).
    ///
    /// All mapping lookups are scoped by tenant.
    TenantId
}

string_id! {
    /// Key of a record in the case system (e.g. `"POB-1"`).
    CaseKey
}

string_id! {
    /// Key of the mirrored issue in the tracker (e.g. `"JIR-9"`).
    TrackerKey
}

string_id! {
    /// Identifier of a comment on a tracker issue.
    CommentId
}

string_id! {
    /// Identifier of an attachment on a tracker issue.
    TrackerAttachmentId
}

string_id! {
    /// Identifier of an attachment stored on a case-system record.
    CaseAttachmentId
}

/// Longest case key accepted at ingestion.
pub const MAX_CASE_KEY_LEN: usize = 255;

impl TenantId {
    /// Parses an ingestion-supplied tenant identifier.
    ///
    /// Tenants are municipality ids: exactly four ASCII digits.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.len() != 4 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::InvalidTenantId {
                value: raw.to_string(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl CaseKey {
    /// Parses an ingestion-supplied case key (non-blank, bounded length).
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::InvalidCaseKey {
                reason: "a case key must not be blank".to_string(),
            });
        }
        if trimmed.len() > MAX_CASE_KEY_LEN {
            return Err(ValidationError::InvalidCaseKey {
                reason: format!("a case key must be at most {MAX_CASE_KEY_LEN} characters"),
            });
        }
        Ok(Self(trimmed.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Opaque identity of a stored incident mapping, assigned at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MappingId(Uuid);

impl MappingId {
    /// Generates a new random mapping identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a [`MappingId`] from an existing UUID (e.g. read back from storage).
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for MappingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a single pipeline run (one orchestrator invocation).
///
/// Generated fresh for every run and recorded on the run span so all activity
/// from one pass can be correlated in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineRunId(Uuid);

impl PipelineRunId {
    /// Generates a new random run identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for PipelineRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
