// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Record lookup and construction.
//!
//! Each source object has at most one `CertInjection` record. Records carry the owner
//! labels of their source and a deterministic name, `ca-injection-<kind>-<name>`, so a
//! second record can never be created: a racing create fails with `AlreadyExists` and
//! the pass is retried.
//!
//! Lookups go through [`RecordIndex`], an in-process map from owner key to record
//! name. An index hit is verified against the store; a miss or a stale entry falls
//! back to a label-selected list, whose result is written back to the index.

use crate::constants::{CERT_INJECTION_NAME_PREFIX, MAX_RECORD_NAME_LEN};
use crate::crd::{CertInjection, CertInjectionSpec};
use crate::identity::{OwnerKey, TypeIdentity};
use crate::labels::bounded_name;
use crate::reconcilers::status::upsert_condition;
use crate::status_reasons::{CONDITION_STATUS_FALSE, CONDITION_TYPE_CA_READY, REASON_CA_PENDING};
use crate::store::ObjectStore;
use anyhow::{Context as _, Result};
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::ResourceExt;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Deterministic record name of a source object.
///
/// Long source names are shortened with a hash suffix so the record and the objects
/// named after it stay within the object name limit.
#[must_use]
pub fn record_name(identity: &TypeIdentity, source_name: &str) -> String {
    bounded_name(
        &format!(
            "{CERT_INJECTION_NAME_PREFIX}-{}-{source_name}",
            identity.kind().to_lowercase()
        ),
        MAX_RECORD_NAME_LEN,
    )
}

/// Returns `true` if `record` was derived from `owner`.
///
/// Owner labels select candidates; a recorded `status.certSource` must also name the
/// owner itself.
#[must_use]
pub fn is_record_of(record: &CertInjection, owner: &OwnerKey) -> bool {
    let source_name = record
        .status
        .as_ref()
        .and_then(|s| s.cert_source.as_ref())
        .and_then(|r| r.name.as_deref());
    owner.matches(record.labels()) && source_name.is_none_or(|n| n == owner.name())
}

/// In-process index from owner key to record name.
#[derive(Debug, Default)]
pub struct RecordIndex {
    entries: RwLock<HashMap<OwnerKey, String>>,
}

impl RecordIndex {
    /// Record name indexed for `owner`.
    #[must_use]
    pub fn get(&self, owner: &OwnerKey) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(owner)
            .cloned()
    }

    /// Index `record_name` under `owner`.
    pub fn insert(&self, owner: OwnerKey, record_name: String) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(owner, record_name);
    }

    /// Drop the entry of `owner`.
    pub fn remove(&self, owner: &OwnerKey) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(owner);
    }

    /// Number of indexed owners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Find the record of `owner`, if one exists.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub async fn find_record<S: ObjectStore>(
    store: &S,
    index: &RecordIndex,
    owner: &OwnerKey,
    cancel: &CancellationToken,
) -> Result<Option<CertInjection>> {
    let namespace = owner.namespace();

    if let Some(name) = index.get(owner) {
        let record: Option<CertInjection> = store
            .get(namespace, &name, cancel)
            .await
            .with_context(|| format!("failed to get record {namespace}/{name}"))?;
        match record {
            Some(record) if is_record_of(&record, owner) => return Ok(Some(record)),
            _ => {
                debug!(owner = %owner, record = %name, "Dropping stale record index entry");
                index.remove(owner);
            }
        }
    }

    let mut records: Vec<CertInjection> = store
        .list(namespace, &owner.selector_labels(), cancel)
        .await
        .with_context(|| format!("failed to list records of {owner}"))?;
    records.retain(|record| is_record_of(record, owner));
    if records.len() > 1 {
        warn!(owner = %owner, count = records.len(), "Multiple records for one source, using the oldest");
        records.sort_by(|a, b| {
            a.metadata
                .creation_timestamp
                .cmp(&b.metadata.creation_timestamp)
                .then_with(|| a.name_any().cmp(&b.name_any()))
        });
    }
    let record = records.into_iter().next();
    if let Some(record) = &record {
        index.insert(owner.clone(), record.name_any());
    }
    Ok(record)
}

/// Build a new, unpersisted record for a source object.
///
/// The record carries the owner labels of the source, is owned by it (so it is
/// garbage-collected with it) and starts with `CAReady=False`.
#[must_use]
pub fn new_record(
    owner: &OwnerKey,
    identity: &TypeIdentity,
    source_owner_ref: Option<OwnerReference>,
    cert_source: ObjectReference,
) -> CertInjection {
    let name = record_name(identity, owner.name());
    let mut record = CertInjection::new(&name, CertInjectionSpec::default());
    record.metadata = ObjectMeta {
        name: Some(name),
        namespace: Some(owner.namespace().to_string()),
        labels: Some(owner.derived_labels()),
        owner_references: source_owner_ref.map(|r| vec![r]),
        ..ObjectMeta::default()
    };
    let status = record.status.get_or_insert_with(Default::default);
    status.cert_source = Some(cert_source);
    upsert_condition(
        &mut status.conditions,
        CONDITION_TYPE_CA_READY,
        CONDITION_STATUS_FALSE,
        REASON_CA_PENDING,
        "Waiting for the CA secret",
    );
    record
}
