//! Query-string parameters accepted by the HTTP endpoints.

use serde::{Deserialize, Serialize};

/// `?object_name=` for the per-object read endpoints.
///
/// A missing parameter deserializes as an empty name, which the catalog
/// treats as unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectQuery {
    #[serde(default)]
    pub object_name: String,
}

/// `?object_name=&prob=` for display updates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateDisplayQuery {
    /// Blank when omitted, which fails validation
    #[serde(default)]
    pub object_name: String,

    /// Defaults to zero when omitted
    #[serde(default)]
    pub prob: Option<f64>,
}

impl UpdateDisplayQuery {
    /// Probability to apply, zero when the caller sent none.
    pub fn probability(&self) -> f64 {
        self.prob.unwrap_or(0.0)
    }
}
