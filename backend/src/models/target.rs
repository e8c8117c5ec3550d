//! Target facilities and the notifications emitted when the set changes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::geo::LatLng;
use crate::api::TargetId;

/// A facility population points are evaluated against (e.g., a school).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub location: LatLng,
    /// Facility kind used for category-wide selection (e.g. "school").
    pub category: String,
    /// Free-form attributes (name, address, operator, ...).
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Target {
    pub fn new(id: TargetId, location: LatLng, category: impl Into<String>) -> Self {
        Self {
            id,
            location,
            category: category.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata.get("name").map(String::as_str)
    }
}

/// Change notification broadcast by the target service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target_id", rename_all = "lowercase")]
pub enum TargetChange {
    Added(TargetId),
    Removed(TargetId),
    /// The whole set was replaced; listeners must re-check their selection.
    Reloaded,
}
