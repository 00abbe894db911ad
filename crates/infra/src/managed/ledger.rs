//! Process-wide record of managed resources that still exist remotely.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

use vendorflow_core::TenantId;

use super::backend::{ResourceHandle, ResourceKind};
use super::stage::PipelineJobId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub job_id: PipelineJobId,
    pub tenant_id: TenantId,
    pub kind: ResourceKind,
    pub handle: ResourceHandle,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ResourceLedger {
    inner: Mutex<Vec<LedgerEntry>>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &self,
        job_id: PipelineJobId,
        tenant_id: TenantId,
        kind: ResourceKind,
        handle: ResourceHandle,
    ) {
        self.record_at(job_id, tenant_id, kind, handle, Utc::now());
    }

    pub fn record_at(
        &self,
        job_id: PipelineJobId,
        tenant_id: TenantId,
        kind: ResourceKind,
        handle: ResourceHandle,
        created_at: DateTime<Utc>,
    ) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.iter().any(|e| e.kind == kind && e.handle == handle) {
            return;
        }
        inner.push(LedgerEntry {
            job_id,
            tenant_id,
            kind,
            handle,
            created_at,
        });
    }

    /// Drop a handle once it has been deleted remotely.
    pub fn forget(&self, kind: ResourceKind, handle: &ResourceHandle) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let before = inner.len();
        inner.retain(|e| !(e.kind == kind && &e.handle == handle));
        inner.len() != before
    }

    /// Entries created before `cutoff`, grouped by job in deletion order.
    pub fn expired(&self, cutoff: DateTime<Utc>) -> Vec<LedgerEntry> {
        let mut out: Vec<LedgerEntry> = self
            .inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| e.created_at < cutoff)
            .cloned()
            .collect();
        out.sort_by_key(|e| (e.job_id, e.kind.deletion_rank()));
        out
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
