// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation of CA source objects.
//!
//! One generic flow serves every source type (`HarborCluster`, `PackageInstall` and
//! labelled `Secret`s). A pass converges the derived state of one source object:
//!
//! 1. Load the source; a vanished source ends the pass, a deleting one is refused.
//! 2. Extract the registry host and CA with the extractor registered for its type.
//!    Sources without TLS are skipped without error.
//! 3. Find the source's record, or build a new one in memory.
//! 4. Synchronize the CA secret.
//! 5. Persist the record (create or update) with `CAReady=True`, and give the CA
//!    secret its owner.
//!
//! When the record already holds the extracted host and secret, the pass only repairs
//! drift (record status and secret ownership) and makes no writes once converged.

#[cfg(test)]
#[path = "certsource_tests.rs"]
mod certsource_tests;

use crate::ca_secret::{self, ca_secret_name};
use crate::constants::KIND_CERT_INJECTION;
use crate::context::Context;
use crate::crd::{CertInjection, CertInjectionStatus, SecretReference};
use crate::errors::{is_tls_not_enabled, InjectionError};
use crate::extractors::CertSource;
use crate::identity::{OwnerKey, TypeIdentity};
use crate::labels::is_injection_enabled;
use crate::metrics;
use crate::reconcilers::records::{find_record, new_record};
use crate::reconcilers::status::upsert_condition;
use crate::status_reasons::{CONDITION_STATUS_TRUE, CONDITION_TYPE_CA_READY, REASON_CA_EXTRACTED};
use crate::store::ObjectStore;
use anyhow::{Context as _, Result};
use kube::{Resource, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Converge the derived state of the source object `namespace/name` of type `K`.
///
/// # Errors
///
/// - [`InjectionError::SourceDeleting`] if the source is being deleted
/// - [`InjectionError::NoExtractor`] if no extractor is registered for `K`
/// - extraction, secret and record failures, wrapped with context
///
/// A source without TLS is not an error: the pass logs it and returns `Ok(())`.
#[instrument(skip(ctx, cancel))]
pub async fn reconcile_source<K, S>(
    ctx: &Context<S>,
    namespace: &str,
    name: &str,
    cancel: &CancellationToken,
) -> Result<()>
where
    K: CertSource,
    S: ObjectStore + 'static,
{
    let kind = K::kind(&()).to_string();

    let Some(object) = ctx
        .store
        .get::<K>(namespace, name, cancel)
        .await
        .with_context(|| format!("failed to get {kind} {namespace}/{name}"))?
    else {
        debug!(kind = %kind, namespace = %namespace, name = %name, "Source not found, nothing to do");
        ctx.records.remove(&OwnerKey::new(namespace, &TypeIdentity::of::<K>(), name));
        return Ok(());
    };

    if object.meta().deletion_timestamp.is_some() {
        return Err(InjectionError::SourceDeleting {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
        .into());
    }
    if !is_injection_enabled(object.labels()) {
        debug!(kind = %kind, namespace = %namespace, name = %name, "Source is not opted in, skipping");
        return Ok(());
    }

    let source_owner_ref = object.controller_owner_ref(&());
    let mut cert_source = object.object_ref(&());
    cert_source.resource_version = None;
    let source = object.into_source();
    let identity = source.type_identity();

    let extractor =
        ctx.extractors
            .resolve(&identity)
            .ok_or_else(|| InjectionError::NoExtractor {
                type_identity: identity.to_string(),
            })?;

    let injection = match extractor.extract(&ctx.store, &source, cancel).await {
        Ok(injection) => injection,
        Err(e) if is_tls_not_enabled(&e) => {
            info!(kind = %kind, namespace = %namespace, name = %name, "TLS is not enabled, skipping CA injection");
            metrics::record_skip(&kind, "tls_not_enabled");
            return Ok(());
        }
        Err(e) => {
            return Err(e.context(format!("failed to extract CA from {kind} {namespace}/{name}")))
        }
    };
    debug!(kind = %kind, namespace = %namespace, name = %name, injection = ?injection, "Extracted CA");

    let owner = OwnerKey::new(namespace, &identity, name);
    let existing = find_record(&ctx.store, &ctx.records, &owner, cancel).await?;
    let persisted = existing.is_some();
    let record = existing.unwrap_or_else(|| {
        new_record(&owner, &identity, source_owner_ref, cert_source.clone())
    });

    let synced = ca_secret::create_or_update(&ctx.store, &record, &injection, cancel).await?;
    // An unchanged secret may still belong to a record that was lost or never fully
    // written, so the record is compared against its desired state either way.
    let secret_ref = synced.unwrap_or_else(|| SecretReference {
        name: ca_secret_name(&record.name_any()),
    });

    let mut desired = record.clone();
    desired.spec.external_dns = injection.external_dns().to_string();
    desired.spec.cert_secret = secret_ref.clone();
    let status = desired
        .status
        .get_or_insert_with(CertInjectionStatus::default);
    if status.cert_source.is_none() {
        status.cert_source = Some(cert_source);
    }
    upsert_condition(
        &mut status.conditions,
        CONDITION_TYPE_CA_READY,
        CONDITION_STATUS_TRUE,
        REASON_CA_EXTRACTED,
        &format!(
            "CA of {} stored in {}",
            injection.external_dns(),
            secret_ref.name
        ),
    );

    if persisted && desired.spec == record.spec {
        // Steady state: only ownership and status can have drifted.
        ca_secret::assign_owner(&ctx.store, &record, &secret_ref, cancel).await?;
        persist_status(ctx, &record, desired.status, cancel).await?;
        debug!(namespace = %namespace, record = %record.name_any(), "CertInjection is up to date");
        return Ok(());
    }

    let stored = if persisted {
        let updated = ctx
            .store
            .replace(namespace, &desired, cancel)
            .await
            .with_context(|| format!("failed to update record {namespace}/{}", desired.name_any()))?;
        info!(namespace = %namespace, record = %updated.name_any(), dns = %injection.external_dns(), "Updated CertInjection");
        metrics::record_resource_updated(KIND_CERT_INJECTION);
        updated
    } else {
        let created = ctx
            .store
            .create(namespace, &desired, cancel)
            .await
            .with_context(|| format!("failed to create record {namespace}/{}", desired.name_any()))?;
        ctx.records.insert(owner, created.name_any());
        info!(namespace = %namespace, record = %created.name_any(), dns = %injection.external_dns(), "Created CertInjection");
        metrics::record_resource_created(KIND_CERT_INJECTION);
        created
    };
    ca_secret::assign_owner(&ctx.store, &stored, &secret_ref, cancel).await?;

    persist_status(ctx, &stored, desired.status, cancel).await?;
    Ok(())
}

/// Write `desired` through the status subresource unless `stored` already carries it.
async fn persist_status<S: ObjectStore>(
    ctx: &Context<S>,
    stored: &CertInjection,
    desired: Option<CertInjectionStatus>,
    cancel: &CancellationToken,
) -> Result<()> {
    let Some(desired) = desired else {
        return Ok(());
    };
    if stored.status.as_ref() == Some(&desired) {
        return Ok(());
    }
    let namespace = stored.namespace().unwrap_or_default();
    let name = stored.name_any();
    let _: CertInjection = ctx
        .store
        .patch_status(
            &namespace,
            &name,
            stored.resource_version().as_deref(),
            serde_json::to_value(&desired)?,
            cancel,
        )
        .await
        .with_context(|| format!("failed to update status of record {namespace}/{name}"))?;
    debug!(namespace = %namespace, record = %name, "Persisted CertInjection status");
    Ok(())
}
