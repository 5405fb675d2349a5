// biomapper-resolvers/src/table.rs
// ============================================================================
// Module: Table Resolver
// Description: Deterministic in-memory lookup resolver.
// Purpose: Serve exact and bridge lookups from local reference tables.
// Dependencies: biomapper-core
// ============================================================================

//! ## Overview
//! The table resolver answers exact and bridge lookups from an in-memory
//! map loaded from a two-column delimited file (source, target). It is the
//! air-gapped counterpart to the HTTP resolver and the workhorse of the
//! test suite.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use biomapper_core::ResolveRequest;
use biomapper_core::ResolveResponse;
use biomapper_core::Resolver;
use biomapper_core::ResolverCandidate;
use biomapper_core::ResolverCapability;
use biomapper_core::ResolverError;
use biomapper_core::ResolverName;

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Deterministic lookup resolver over an in-memory table.
pub struct TableResolver {
    /// Resolver name exposed to mapping actions.
    name: String,
    /// Capabilities offered (exact and/or bridge lookup).
    capabilities: Vec<ResolverCapability>,
    /// Method label stamped on candidates.
    method: String,
    /// Confidence stamped on candidates.
    confidence: f64,
    /// Source to targets mapping.
    table: BTreeMap<String, Vec<String>>,
}

impl TableResolver {
    /// Creates a resolver from explicit pairs.
    #[must_use]
    pub fn from_pairs(
        name: impl Into<String>,
        method: impl Into<String>,
        confidence: f64,
        pairs: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        let mut table: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (source, target) in pairs {
            table.entry(source).or_default().push(target);
        }
        Self {
            name: name.into(),
            capabilities: vec![
                ResolverCapability::ExactLookup,
                ResolverCapability::BridgeLookup,
            ],
            method: method.into(),
            confidence,
            table,
        }
    }

    /// Loads a resolver from a two-column tab-delimited file.
    ///
    /// Lines starting with `#` and blank lines are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::Unavailable`] when the file cannot be read
    /// or a line is not two tab-separated fields.
    pub fn from_tsv_path(
        name: impl Into<String>,
        method: impl Into<String>,
        confidence: f64,
        path: &Path,
    ) -> Result<Self, ResolverError> {
        let content = fs::read_to_string(path).map_err(|err| {
            ResolverError::Unavailable(format!("cannot read table {}: {err}", path.display()))
        })?;
        let mut pairs = Vec::new();
        for (line_number, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let mut fields = trimmed.split('\t');
            let (Some(source), Some(target)) = (fields.next(), fields.next()) else {
                return Err(ResolverError::Unavailable(format!(
                    "table {} line {} is not two tab-separated fields",
                    path.display(),
                    line_number + 1
                )));
            };
            pairs.push((source.trim().to_string(), target.trim().to_string()));
        }
        Ok(Self::from_pairs(name, method, confidence, pairs))
    }
}

impl Resolver for TableResolver {
    fn name(&self) -> ResolverName {
        ResolverName::new(self.name.clone())
    }

    fn capabilities(&self) -> Vec<ResolverCapability> {
        self.capabilities.clone()
    }

    fn resolve(&self, request: &ResolveRequest) -> Result<ResolveResponse, ResolverError> {
        if !self.capabilities.contains(&request.capability) {
            return Err(ResolverError::Malformed(format!(
                "capability not offered by {}: {:?}",
                self.name, request.capability
            )));
        }
        let mut response = ResolveResponse::default();
        for source in &request.sources {
            if let Some(targets) = self.table.get(source) {
                let candidates = targets
                    .iter()
                    .map(|target| ResolverCandidate {
                        target_id: target.clone(),
                        confidence: self.confidence,
                        method: self.method.clone(),
                        details: None,
                    })
                    .collect();
                response.candidates.insert(source.clone(), candidates);
            }
        }
        Ok(response)
    }
}
