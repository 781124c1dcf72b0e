// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation of `CertInjection` records.
//!
//! Keeps the injector `DaemonSet` of each record in line with it. Records that are
//! being deleted, or that do not reference a CA secret yet, are left alone.

#[cfg(test)]
#[path = "certinjection_tests.rs"]
mod certinjection_tests;

use crate::context::Context;
use crate::crd::CertInjection;
use crate::identity::OwnerKey;
use crate::injector;
use crate::reconcilers::status::upsert_condition;
use crate::status_reasons::{
    CONDITION_STATUS_TRUE, CONDITION_TYPE_INJECTOR_READY, CONDITION_TYPE_READY,
    REASON_INJECTOR_CREATED, REASON_RECONCILED,
};
use crate::store::ObjectStore;
use anyhow::{Context as _, Result};
use k8s_openapi::api::apps::v1::DaemonSet;
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Converge the injector of the record `namespace/name`.
///
/// Creates the injector when the record has none, otherwise rebuilds it if its version
/// stamp lags the record. Finally marks the record `Ready`; a record that is already
/// ready with an in-sync injector causes no writes.
///
/// # Errors
///
/// Returns an error if any store call fails, including optimistic-concurrency
/// conflicts; the pass is retried on the next delivery.
#[instrument(skip(ctx, cancel))]
pub async fn reconcile_certinjection<S: ObjectStore>(
    ctx: &Context<S>,
    namespace: &str,
    name: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    let Some(record) = ctx
        .store
        .get::<CertInjection>(namespace, name, cancel)
        .await
        .with_context(|| format!("failed to get record {namespace}/{name}"))?
    else {
        debug!(namespace = %namespace, record = %name, "Record not found, nothing to do");
        return Ok(());
    };

    if record.metadata.deletion_timestamp.is_some() {
        debug!(namespace = %namespace, record = %name, "Record is being deleted, skipping");
        return Ok(());
    }
    if record.cert_secret_name().is_none() {
        debug!(namespace = %namespace, record = %name, "Record has no CA secret yet, skipping");
        return Ok(());
    }

    let injectors: Vec<DaemonSet> = ctx
        .store
        .list(namespace, &OwnerKey::of(&record).selector_labels(), cancel)
        .await
        .with_context(|| format!("failed to list injectors of record {namespace}/{name}"))?;
    if injectors.len() > 1 {
        warn!(namespace = %namespace, record = %name, count = injectors.len(), "Multiple injectors for one record");
    }

    let Some(mut daemonset) = injectors.into_iter().next() else {
        let updated = injector::inject(&ctx.store, &record, &ctx.injector, cancel).await?;
        return mark_ready(ctx, &updated, None, cancel).await;
    };
    injector::sync(&ctx.store, &record, &mut daemonset, &ctx.injector, cancel).await?;

    mark_ready(ctx, &record, Some(&mut daemonset), cancel).await
}

/// Upsert `InjectorReady`, `Ready` and the injector reference on `record`; if that
/// writes the status, re-stamp `daemonset` with the record's new resource version.
async fn mark_ready<S: ObjectStore>(
    ctx: &Context<S>,
    record: &CertInjection,
    mut daemonset: Option<&mut DaemonSet>,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut status = record.status.clone().unwrap_or_default();
    let mut changed = false;
    if let Some(daemonset) = daemonset.as_deref() {
        let reference = injector::injector_ref(daemonset);
        if status.injector.as_ref() != Some(&reference) {
            status.injector = Some(reference);
            changed = true;
        }
        changed |= upsert_condition(
            &mut status.conditions,
            CONDITION_TYPE_INJECTOR_READY,
            CONDITION_STATUS_TRUE,
            REASON_INJECTOR_CREATED,
            &format!("DaemonSet {} exists", daemonset.name_any()),
        );
    }
    changed |= upsert_condition(
        &mut status.conditions,
        CONDITION_TYPE_READY,
        CONDITION_STATUS_TRUE,
        REASON_RECONCILED,
        "CA injection is in place",
    );
    if !changed {
        return Ok(());
    }

    let namespace = record.namespace().unwrap_or_default();
    let name = record.name_any();
    let updated: CertInjection = ctx
        .store
        .patch_status(
            &namespace,
            &name,
            record.resource_version().as_deref(),
            serde_json::to_value(&status)?,
            cancel,
        )
        .await
        .with_context(|| format!("failed to update status of record {namespace}/{name}"))?;
    debug!(namespace = %namespace, record = %name, "Marked CertInjection ready");

    if let Some(daemonset) = daemonset.as_deref_mut() {
        injector::restamp(&ctx.store, daemonset, &updated, cancel).await?;
    }
    Ok(())
}
