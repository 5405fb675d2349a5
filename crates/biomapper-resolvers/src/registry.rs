// biomapper-resolvers/src/registry.rs
// ============================================================================
// Module: Resolver Registry
// Description: Registry of shell-wrapped resolvers keyed by name.
// Purpose: Route resolution requests by resolver name.
// Dependencies: biomapper-core, crate::shell
// ============================================================================

//! ## Overview
//! The resolver registry holds shell-wrapped resolvers keyed by name.
//! Mapping actions address resolvers exclusively through this registry, so
//! every outward call inherits the shell's timeout, rate, and cache
//! policies.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use biomapper_core::ResolveRequest;
use biomapper_core::ResolveResponse;
use biomapper_core::Resolver;
use biomapper_core::ResolverError;
use biomapper_core::ResolverName;

use crate::shell::ResolverShell;

// ============================================================================
// SECTION: Resolver Registry
// ============================================================================

/// Registry of shell-wrapped resolvers.
#[derive(Default)]
pub struct ResolverRegistry {
    /// Shells keyed by resolver name.
    entries: BTreeMap<ResolverName, Arc<ResolverShell>>,
}

impl ResolverRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a shell under its resolver name.
    pub fn register(&mut self, shell: ResolverShell) {
        self.entries.insert(shell.name(), Arc::new(shell));
    }

    /// Returns a shell by name.
    #[must_use]
    pub fn get(&self, name: &ResolverName) -> Option<Arc<ResolverShell>> {
        self.entries.get(name).cloned()
    }

    /// Lists registered resolver names in stable order.
    #[must_use]
    pub fn list(&self) -> Vec<ResolverName> {
        self.entries.keys().cloned().collect()
    }

    /// Resolves a request through the named shell.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::Unavailable`] when the resolver is not
    /// registered, or the shell's failure otherwise.
    pub fn resolve(
        &self,
        name: &ResolverName,
        request: &ResolveRequest,
    ) -> Result<ResolveResponse, ResolverError> {
        let Some(shell) = self.entries.get(name) else {
            return Err(ResolverError::Unavailable(format!("resolver not registered: {name}")));
        };
        shell.resolve(request)
    }
}
