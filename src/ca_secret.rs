// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CA secret synchronization.
//!
//! Every record owns exactly one secret, `ca-secret-<record-name>`, holding the
//! injected CA under `ca.crt` and the registry host in the `registry.goharbor.io/uri`
//! annotation. The injector `DaemonSet` mounts this secret, so it is the only copy of
//! the CA the nodes ever see.
//!
//! [`create_or_update`] is idempotent: when the stored secret already holds the same
//! host and bytes it makes no write and returns `None`, which is how the source
//! reconcilers tell a steady-state pass from a real change.

#[cfg(test)]
#[path = "ca_secret_tests.rs"]
mod ca_secret_tests;

use crate::constants::{CA_KEY_IN_SECRET, CA_SECRET_NAME_PREFIX, KIND_SECRET};
use crate::crd::{CertInjection, SecretReference};
use crate::identity::OwnerKey;
use crate::injection::Injection;
use crate::labels::REGISTRY_URI_ANNOTATION;
use crate::metrics;
use crate::store::ObjectStore;
use anyhow::{anyhow, Context as _, Result};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Deterministic CA secret name of a record.
#[must_use]
pub fn ca_secret_name(record_name: &str) -> String {
    format!("{CA_SECRET_NAME_PREFIX}-{record_name}")
}

fn holds(secret: &Secret, injection: &Injection) -> bool {
    let uri = secret
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(REGISTRY_URI_ANNOTATION));
    let ca = secret
        .data
        .as_ref()
        .and_then(|d| d.get(CA_KEY_IN_SECRET));
    uri.map(String::as_str) == Some(injection.external_dns())
        && ca.map(|b| b.0.as_slice()) == Some(injection.ca_cert())
}

fn write_payload(secret: &mut Secret, owner: &CertInjection, injection: &Injection) {
    secret
        .metadata
        .labels
        .get_or_insert_with(BTreeMap::new)
        .extend(OwnerKey::of(owner).derived_labels());
    secret
        .metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(
            REGISTRY_URI_ANNOTATION.to_string(),
            injection.external_dns().to_string(),
        );
    secret.data.get_or_insert_with(BTreeMap::new).insert(
        CA_KEY_IN_SECRET.to_string(),
        ByteString(injection.ca_cert().to_vec()),
    );
}

/// Make the CA secret of `owner` hold `injection`.
///
/// # Arguments
///
/// * `store` - Object store
/// * `owner` - The record the secret belongs to; it does not need to be persisted yet
/// * `injection` - Host and CA to store
/// * `cancel` - Cancellation token
///
/// # Returns
///
/// * `Ok(Some(reference))` - The secret was created or updated
/// * `Ok(None)` - The secret already held the same host and CA bytes; nothing was written
///
/// # Errors
///
/// Returns an error if the secret cannot be read or written.
pub async fn create_or_update<S: ObjectStore>(
    store: &S,
    owner: &CertInjection,
    injection: &Injection,
    cancel: &CancellationToken,
) -> Result<Option<SecretReference>> {
    let namespace = owner.namespace().unwrap_or_default();
    let name = ca_secret_name(&owner.name_any());
    let reference = SecretReference { name: name.clone() };

    let existing: Option<Secret> = store
        .get(&namespace, &name, cancel)
        .await
        .with_context(|| format!("failed to get CA secret {namespace}/{name}"))?;

    match existing {
        None => {
            let mut secret = Secret {
                metadata: ObjectMeta {
                    name: Some(name.clone()),
                    namespace: Some(namespace.clone()),
                    ..ObjectMeta::default()
                },
                type_: Some("Opaque".to_string()),
                ..Secret::default()
            };
            write_payload(&mut secret, owner, injection);
            store
                .create(&namespace, &secret, cancel)
                .await
                .with_context(|| format!("failed to create CA secret {namespace}/{name}"))?;
            info!(namespace = %namespace, secret = %name, dns = %injection.external_dns(), "Created CA secret");
            metrics::record_resource_created(KIND_SECRET);
            Ok(Some(reference))
        }
        Some(secret) if holds(&secret, injection) => {
            debug!(namespace = %namespace, secret = %name, "CA secret unchanged");
            Ok(None)
        }
        Some(mut secret) => {
            write_payload(&mut secret, owner, injection);
            store
                .replace(&namespace, &secret, cancel)
                .await
                .with_context(|| format!("failed to update CA secret {namespace}/{name}"))?;
            info!(namespace = %namespace, secret = %name, dns = %injection.external_dns(), "Updated CA secret");
            metrics::record_resource_updated(KIND_SECRET);
            Ok(Some(reference))
        }
    }
}

/// Make the persisted record `owner` the controlling owner of the referenced secret.
///
/// Idempotent: when the secret already lists `owner` nothing is written and
/// `Ok(false)` is returned. A controller reference left by an earlier record of the
/// same kind is replaced.
///
/// # Errors
///
/// Returns an error if `owner` has no uid yet, if the reference is empty, if the
/// secret does not exist or if it cannot be updated.
pub async fn assign_owner<S: ObjectStore>(
    store: &S,
    owner: &CertInjection,
    reference: &SecretReference,
    cancel: &CancellationToken,
) -> Result<bool> {
    let namespace = owner.namespace().unwrap_or_default();
    if reference.name.is_empty() {
        return Err(anyhow!(
            "record {namespace}/{} has no CA secret to own",
            owner.name_any()
        ));
    }
    let owner_ref = owner.controller_owner_ref(&()).ok_or_else(|| {
        anyhow!(
            "record {namespace}/{} is not persisted and cannot own objects",
            owner.name_any()
        )
    })?;

    let mut secret: Secret = store
        .get(&namespace, &reference.name, cancel)
        .await
        .with_context(|| format!("failed to get CA secret {namespace}/{}", reference.name))?
        .ok_or_else(|| anyhow!("CA secret {namespace}/{} not found", reference.name))?;

    let refs = secret.metadata.owner_references.get_or_insert_with(Vec::new);
    if refs.iter().any(|r| r.uid == owner_ref.uid) {
        return Ok(false);
    }
    refs.retain(|r| !(r.kind == owner_ref.kind && r.controller == Some(true)));
    refs.push(owner_ref);

    store
        .replace(&namespace, &secret, cancel)
        .await
        .with_context(|| format!("failed to set owner of CA secret {namespace}/{}", reference.name))?;
    debug!(namespace = %namespace, secret = %reference.name, owner = %owner.name_any(), "Assigned CA secret owner");
    Ok(true)
}
