//! Target service: the set of candidate facilities.
//!
//! Every mutation is broadcast as a [`TargetChange`] so the aggregation service
//! can drop removed targets from its selection and recompute.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::api::TargetId;
use crate::error::{ErrorContext, ValidationError};
use crate::models::{validate_coordinates, Target, TargetChange};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

fn validate_target(target: &Target) -> Result<(), ValidationError> {
    let ctx = ErrorContext::new("add_target")
        .with_entity("target")
        .with_entity_id(target.id);
    validate_coordinates(target.location.lat, target.location.lon).map_err(|e| e.in_context(ctx))
}

#[derive(Clone)]
pub struct TargetService {
    targets: Arc<RwLock<BTreeMap<TargetId, Target>>>,
    changes: broadcast::Sender<TargetChange>,
}

impl TargetService {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            targets: Arc::new(RwLock::new(BTreeMap::new())),
            changes,
        }
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<TargetChange> {
        self.changes.subscribe()
    }

    fn notify(&self, change: TargetChange) {
        // No receivers is fine; nobody is aggregating yet.
        let _ = self.changes.send(change);
    }

    /// All targets ordered by id.
    pub fn list_targets(&self) -> Vec<Target> {
        self.targets.read().values().cloned().collect()
    }

    pub fn get_target(&self, id: TargetId) -> Option<Target> {
        self.targets.read().get(&id).cloned()
    }

    pub fn contains(&self, id: TargetId) -> bool {
        self.targets.read().contains_key(&id)
    }

    /// Targets of one category, ordered by id. Case-insensitive.
    pub fn targets_in_category(&self, category: &str) -> Vec<Target> {
        self.targets
            .read()
            .values()
            .filter(|t| t.category.eq_ignore_ascii_case(category))
            .cloned()
            .collect()
    }

    /// Add a target. Rejects invalid coordinates and duplicate ids.
    pub fn add_target(&self, target: Target) -> Result<(), ValidationError> {
        validate_target(&target)?;
        let id = target.id;
        {
            let mut targets = self.targets.write();
            if targets.contains_key(&id) {
                return Err(ValidationError::with_context(
                    format!("Target {} already exists", id),
                    ErrorContext::new("add_target")
                        .with_entity("target")
                        .with_entity_id(id),
                ));
            }
            targets.insert(id, target);
        }
        log::debug!("Added target {}", id);
        self.notify(TargetChange::Added(id));
        Ok(())
    }

    /// Remove a target; returns whether it existed.
    pub fn remove_target(&self, id: TargetId) -> bool {
        let removed = self.targets.write().remove(&id).is_some();
        if removed {
            log::debug!("Removed target {}", id);
            self.notify(TargetChange::Removed(id));
        }
        removed
    }

    /// Replace the whole set. Invalid or duplicate targets are skipped and returned.
    pub fn replace_targets(&self, targets: Vec<Target>) -> Vec<ValidationError> {
        let mut issues = Vec::new();
        let mut next = BTreeMap::new();
        for target in targets {
            if let Err(e) = validate_target(&target) {
                issues.push(e);
                continue;
            }
            if next.contains_key(&target.id) {
                issues.push(ValidationError::with_context(
                    format!("Duplicate target id {}", target.id),
                    ErrorContext::new("replace_targets")
                        .with_entity("target")
                        .with_entity_id(target.id),
                ));
                continue;
            }
            next.insert(target.id, target);
        }
        log::info!(
            "Replaced targets: {} accepted, {} skipped",
            next.len(),
            issues.len()
        );
        *self.targets.write() = next;
        self.notify(TargetChange::Reloaded);
        issues
    }

    pub fn len(&self) -> usize {
        self.targets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.read().is_empty()
    }
}

impl Default for TargetService {
    fn default() -> Self {
        Self::new()
    }
}
