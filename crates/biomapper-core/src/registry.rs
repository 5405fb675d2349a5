// biomapper-core/src/registry.rs
// ============================================================================
// Module: Biomapper Action Registry
// Description: Process-wide mapping from action type to action instance.
// Purpose: Make actions reachable by name without the executor importing them.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! The registry is the only mechanism by which actions become callable.
//! Registration happens once per type at application startup, guarded by a
//! central mutex; re-registering a type is a configuration bug surfaced as
//! `DUPLICATE_ACTION_TYPE`. The executor resolves action types exclusively
//! through [`ActionRegistry::lookup`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use crate::core::error::EngineError;
use crate::core::error::ErrorKind;
use crate::core::identifiers::ActionType;
use crate::interfaces::Action;

// ============================================================================
// SECTION: Action Registry
// ============================================================================

/// Process-wide action registry.
#[derive(Default)]
pub struct ActionRegistry {
    /// Registered actions keyed by action type, guarded for startup-time
    /// registration.
    entries: Mutex<BTreeMap<ActionType, Arc<dyn Action>>>,
}

impl ActionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an action under its declared type.
    ///
    /// # Errors
    ///
    /// Returns a [`ErrorKind::DuplicateActionType`] error when the type is
    /// already registered.
    pub fn register(&self, action: Arc<dyn Action>) -> Result<(), EngineError> {
        let action_type = action.action_type();
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| EngineError::internal("action registry mutex poisoned"))?;
        if entries.contains_key(&action_type) {
            return Err(EngineError::new(
                ErrorKind::DuplicateActionType,
                format!("action type registered twice: {action_type}"),
            ));
        }
        entries.insert(action_type, action);
        Ok(())
    }

    /// Looks up an action by type.
    ///
    /// # Errors
    ///
    /// Returns a [`ErrorKind::UnknownActionType`] error when the type is
    /// not registered.
    pub fn lookup(&self, action_type: &ActionType) -> Result<Arc<dyn Action>, EngineError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| EngineError::internal("action registry mutex poisoned"))?;
        entries.get(action_type).cloned().ok_or_else(|| {
            EngineError::new(
                ErrorKind::UnknownActionType,
                format!("unknown action type: {action_type}"),
            )
        })
    }

    /// Returns true when the type is registered.
    #[must_use]
    pub fn contains(&self, action_type: &ActionType) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(action_type))
            .unwrap_or(false)
    }

    /// Lists registered action types in stable (sorted) order.
    #[must_use]
    pub fn list(&self) -> Vec<ActionType> {
        self.entries
            .lock()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }
}
