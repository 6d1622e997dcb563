//! Displayed-object state and its value objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{DomainError, DomainResult};

/// Sentinel object name meaning "nothing is being displayed".
pub const NO_OBJECT: &str = "nothing";

// ============================================================================
// Value Objects
// ============================================================================

/// Name of a physical object in the catalog.
///
/// Always trimmed and non-empty. Whether the name is actually known to the
/// catalog is checked by the caller, since the catalog lives elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectName(String);

impl ObjectName {
    /// Parses a raw name, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::BlankObjectName` if nothing is left after trimming.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::BlankObjectName);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The "no object" sentinel.
    pub fn nothing() -> Self {
        Self(NO_OBJECT.to_string())
    }

    /// Returns true if this is the "no object" sentinel.
    #[must_use]
    pub fn is_nothing(&self) -> bool {
        self.0 == NO_OBJECT
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ObjectName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Recognition confidence attached to a displayed object.
///
/// Any finite number is accepted. Screens treat `0.0..=1.0` as the usual range.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Probability(f64);

impl Probability {
    /// Zero confidence.
    pub const ZERO: Probability = Probability(0.0);

    /// Creates a probability, rejecting NaN and infinities.
    pub fn new(value: f64) -> DomainResult<Self> {
        if !value.is_finite() {
            return Err(DomainError::InvalidProbability { value });
        }
        Ok(Self(value))
    }

    /// Returns the raw value.
    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Probability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Display State
// ============================================================================

/// What is currently being shown on the connected screens.
///
/// There is exactly one live instance per server; only the latest value is
/// kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayState {
    /// Object being displayed (or the "nothing" sentinel)
    pub object_name: ObjectName,

    /// Confidence reported alongside the object
    pub probability: Probability,

    /// When this state replaced the previous one
    pub updated_at: DateTime<Utc>,
}

impl DisplayState {
    /// Creates a state stamped with the current time.
    pub fn new(object_name: ObjectName, probability: Probability) -> Self {
        Self {
            object_name,
            probability,
            updated_at: Utc::now(),
        }
    }

    /// State with nothing displayed.
    pub fn nothing() -> Self {
        Self::new(ObjectName::nothing(), Probability::ZERO)
    }
}

impl Default for DisplayState {
    fn default() -> Self {
        Self::nothing()
    }
}
