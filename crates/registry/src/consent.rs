//! Per-(patient, task) consent tracking using DashMap for concurrent access

use dashmap::DashMap;

use crate::types::{Consent, PatientId, TaskId};

/// Thread-safe consent store.
///
/// One row per (patient, task) key, overwritten on every grant or revoke.
/// There is no authorization check at this layer: the gateway binds the
/// caller's identity before any mutation reaches the store.
#[derive(Default)]
pub struct ConsentStore {
    entries: DashMap<(PatientId, TaskId), Consent>,
}

impl ConsentStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Unconditionally record consent. Idempotent, last-writer-wins.
    pub fn grant(&self, patient_id: PatientId, task_id: TaskId, scope: &str, ts: i64) {
        self.entries.insert(
            (patient_id, task_id),
            Consent {
                allowed: true,
                granted_at: ts,
                scope: scope.to_string(),
            },
        );
    }

    /// Withdraw consent. The row is kept with `allowed = false` so the
    /// revocation timestamp stays readable.
    pub fn revoke(&self, patient_id: PatientId, task_id: TaskId, ts: i64) {
        self.entries.insert(
            (patient_id, task_id),
            Consent {
                allowed: false,
                granted_at: ts,
                scope: String::new(),
            },
        );
    }

    /// An absent key reads as not-allowed.
    pub fn is_allowed(&self, patient_id: &PatientId, task_id: &TaskId) -> bool {
        self.entries
            .get(&(*patient_id, *task_id))
            .map(|c| c.allowed)
            .unwrap_or(false)
    }

    pub fn get(&self, patient_id: &PatientId, task_id: &TaskId) -> Option<Consent> {
        self.entries
            .get(&(*patient_id, *task_id))
            .map(|c| c.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
