//! Provenance manager.
//!
//! Maps start/complete operation pairs onto audit trail entries.

use crate::audit::{AuditEntry, AuditTrail, IntegrityReport, References, TrailExport};
use crate::config::ProvenanceConfig;
use crate::core::crypto::genesis_hash;
use crate::core::{now, Error, Hash256, Result, Status};
use crate::monitoring::ReliabilityMetrics;
use crate::provenance::token::{InFlight, OperationToken};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// Owner of every audit trail in the process.
///
/// Trails are created lazily and live as long as the manager. Appends to one
/// trail serialize on that trail's own lock; the manager never holds a lock
/// while appending.
pub struct ProvenanceManager {
    genesis_hash: Hash256,
    trails: RwLock<HashMap<String, Arc<AuditTrail>>>,
    in_flight: Mutex<HashMap<Uuid, InFlight>>,
    metrics: Arc<ReliabilityMetrics>,
}

impl ProvenanceManager {
    /// Create a new manager.
    pub fn new(config: &ProvenanceConfig, metrics: Arc<ReliabilityMetrics>) -> Self {
        Self {
            genesis_hash: genesis_hash(&config.genesis_seed),
            trails: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    /// Genesis hash shared by all trails of this manager.
    pub fn genesis_hash(&self) -> &Hash256 {
        &self.genesis_hash
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<Uuid, InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get a trail, creating it on first reference.
    pub fn get_trail(&self, trail_id: &str) -> Arc<AuditTrail> {
        if let Some(trail) = self
            .trails
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(trail_id)
        {
            return Arc::clone(trail);
        }

        let mut trails = self.trails.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(trails.entry(trail_id.to_string()).or_insert_with(|| {
            debug!(trail_id, "audit trail created");
            Arc::new(AuditTrail::new(trail_id, self.genesis_hash))
        }))
    }

    /// Get a trail only if it already exists.
    pub fn find_trail(&self, trail_id: &str) -> Option<Arc<AuditTrail>> {
        self.trails
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(trail_id)
            .cloned()
    }

    /// IDs of all trails.
    pub fn trail_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .trails
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Begin an operation. Nothing is written to the trail yet.
    pub fn start_operation(
        &self,
        trail_id: &str,
        operation_type: &str,
        used: References,
    ) -> OperationToken {
        let token = OperationToken::issue(trail_id);
        self.pending().insert(
            token.id(),
            InFlight {
                trail_id: trail_id.to_string(),
                operation_type: operation_type.to_string(),
                used,
                started: Instant::now(),
                started_at: now(),
            },
        );
        self.metrics.in_flight_operations.inc();
        debug!(trail_id, operation_type, token = %token.id(), "operation started");
        token
    }

    /// Finish an operation and append its entry.
    ///
    /// Tokens are single-use: a second completion fails with
    /// [`Error::UnknownToken`].
    pub fn complete_operation(
        &self,
        token: &OperationToken,
        generated: References,
        status: Status,
    ) -> Result<AuditEntry> {
        let record = self.take(token)?;
        let duration = record.started.elapsed();

        let trail = self.get_trail(&record.trail_id);
        let entry = trail.append_timed(
            &record.operation_type,
            record.used,
            generated,
            status,
            duration,
        );
        self.metrics.entries_appended.inc();
        debug!(
            trail_id = %record.trail_id,
            operation_type = %record.operation_type,
            started_at = %record.started_at,
            duration_ms = duration.as_secs_f64() * 1000.0,
            "operation completed"
        );
        Ok(entry)
    }

    /// Like [`complete_operation`](Self::complete_operation), but the token
    /// must have been issued for `trail_id`.
    ///
    /// A token from another trail is rejected and stays in flight.
    pub fn complete_operation_on(
        &self,
        trail_id: &str,
        token: &OperationToken,
        generated: References,
        status: Status,
    ) -> Result<AuditEntry> {
        if token.trail_id() != trail_id {
            self.metrics.unknown_tokens.inc();
            warn!(trail_id, token = %token, "token belongs to a different trail");
            return Err(Error::UnknownToken(token.to_string()));
        }
        self.complete_operation(token, generated, status)
    }

    /// Drop an in-flight operation without recording it.
    pub fn abandon_operation(&self, token: &OperationToken) -> bool {
        let removed = self.pending().remove(&token.id()).is_some();
        if removed {
            self.metrics.in_flight_operations.dec();
        }
        removed
    }

    /// Number of operations started but not completed.
    pub fn in_flight_count(&self) -> usize {
        self.pending().len()
    }

    fn take(&self, token: &OperationToken) -> Result<InFlight> {
        let mut pending = self.pending();
        let known = matches!(
            pending.get(&token.id()),
            Some(record) if record.trail_id == token.trail_id()
        );
        if !known {
            drop(pending);
            self.metrics.unknown_tokens.inc();
            warn!(token = %token, "complete_operation with unknown token");
            return Err(Error::UnknownToken(token.to_string()));
        }
        let record = pending
            .remove(&token.id())
            .ok_or_else(|| Error::Internal("in-flight record vanished".into()))?;
        drop(pending);
        self.metrics.in_flight_operations.dec();
        Ok(record)
    }

    /// Verify every trail. Failing trails are logged for operator attention
    /// and left in place.
    pub fn verify_all(&self) -> Vec<(String, IntegrityReport)> {
        let trails: Vec<Arc<AuditTrail>> = self
            .trails
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut reports: Vec<(String, IntegrityReport)> = trails
            .iter()
            .map(|trail| {
                let report = trail.verify_integrity();
                if !report.ok {
                    warn!(
                        trail_id = trail.trail_id(),
                        first_bad_index = ?report.first_bad_index,
                        failure = ?report.failure,
                        "audit trail failed integrity verification"
                    );
                }
                (trail.trail_id().to_string(), report)
            })
            .collect();
        reports.sort_by(|a, b| a.0.cmp(&b.0));
        reports
    }

    /// Export an existing trail.
    pub fn export_trail(&self, trail_id: &str) -> Result<TrailExport> {
        self.find_trail(trail_id)
            .map(|trail| trail.export())
            .ok_or_else(|| Error::TrailNotFound(trail_id.to_string()))
    }

    /// Reload an exported trail, e.g. after a restart.
    pub fn restore_trail(&self, export: &TrailExport) -> Result<Arc<AuditTrail>> {
        let trail = self.get_trail(&export.trail_id);
        trail.restore(export.entries.clone())?;
        Ok(trail)
    }
}

impl Default for ProvenanceManager {
    fn default() -> Self {
        Self::new(&ProvenanceConfig::default(), Arc::new(ReliabilityMetrics::new()))
    }
}
