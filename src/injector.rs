// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Injector `DaemonSet` synthesis and lifecycle.
//!
//! One `DaemonSet`, `cert-injection-ds-<record-name>`, runs on every node for each
//! record. Its single container copies `ca.crt` from the record's CA secret into the
//! container runtime trust directory `<node-certs-dir>/<externalDNS>/` on the host and
//! keeps refreshing that copy until the pod is stopped.
//!
//! # Version gating
//!
//! The `DaemonSet` carries the resource version of the record it was built from in the
//! `injection.goharbor.io/version` annotation. [`sync`] rebuilds the spec only when
//! that stamp differs from the record's current resource version, so unchanged records
//! cause no writes.

#[cfg(test)]
#[path = "injector_tests.rs"]
mod injector_tests;

use crate::constants::{
    CA_KEY_IN_SECRET, DEFAULT_INJECTOR_IMAGE, DEFAULT_NODE_CERTS_DIR, INJECTOR_CA_MOUNT,
    INJECTOR_CONTAINER_NAME, INJECTOR_HOST_CERTS_MOUNT, INJECTOR_NAME_PREFIX,
    INJECTOR_TERMINATION_GRACE_PERIOD_SECS, KIND_DAEMON_SET,
};
use crate::crd::CertInjection;
use crate::identity::OwnerKey;
use crate::labels::{
    label_value, INJECTION_VERSION_ANNOTATION, INJECTOR_APP_LABEL, INJECTOR_APP_NAME,
    INJECTOR_SELECTOR_LABEL,
};
use crate::metrics;
use crate::reconcilers::status::upsert_condition;
use crate::status_reasons::{
    CONDITION_STATUS_TRUE, CONDITION_TYPE_INJECTOR_READY, CONDITION_TYPE_READY,
    REASON_INJECTOR_CREATED, REASON_RECONCILED,
};
use crate::store::ObjectStore;
use anyhow::{anyhow, Context as _, Result};
use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec};
use k8s_openapi::api::core::v1::{
    Container, HostPathVolumeSource, KeyToPath, ObjectReference, PodSpec, PodTemplateSpec,
    SecretVolumeSource, Toleration, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const HOST_CERTS_VOLUME: &str = "host-certs";
const CA_VOLUME: &str = "ca";
const INJECTOR_RECOPY_INTERVAL_SECS: u64 = 60;

/// Node-level settings of the injector pods.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InjectorSettings {
    /// Container image; must provide `/bin/sh`, `cp` and `sleep`.
    pub image: String,
    /// Host directory holding one trust directory per registry.
    pub node_certs_dir: String,
}

impl Default for InjectorSettings {
    fn default() -> Self {
        Self {
            image: DEFAULT_INJECTOR_IMAGE.to_string(),
            node_certs_dir: DEFAULT_NODE_CERTS_DIR.to_string(),
        }
    }
}

/// Deterministic injector name of a record.
#[must_use]
pub fn injector_name(record_name: &str) -> String {
    format!("{INJECTOR_NAME_PREFIX}-{record_name}")
}

/// Stable reference to an injector, without its resource version.
#[must_use]
pub fn injector_ref(daemonset: &DaemonSet) -> ObjectReference {
    let mut reference = daemonset.object_ref(&());
    reference.resource_version = None;
    reference
}

/// Resource version stamped on an injector, if any.
#[must_use]
pub fn version_stamp(daemonset: &DaemonSet) -> Option<&str> {
    daemonset
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(INJECTION_VERSION_ANNOTATION))
        .map(String::as_str)
}

fn set_version_stamp(daemonset: &mut DaemonSet, version: &str) {
    daemonset
        .metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(INJECTION_VERSION_ANNOTATION.to_string(), version.to_string());
}

/// Copies the CA onto the host, then re-copies it periodically so a rotated CA
/// reaches the node once the kubelet refreshes the secret volume.
fn install_script() -> String {
    format!(
        "trap 'exit 0' TERM; \
         while true; do \
         cp -f {INJECTOR_CA_MOUNT}/{CA_KEY_IN_SECRET} {INJECTOR_HOST_CERTS_MOUNT}/{CA_KEY_IN_SECRET}; \
         sleep {INJECTOR_RECOPY_INTERVAL_SECS} & wait $!; \
         done"
    )
}

/// Build the desired injector `DaemonSet` of `record`.
///
/// Pure: the result depends only on the record's identity, `spec.externalDNS`,
/// `spec.certSecret` and `settings`. Ownership and the version stamp are applied by
/// the callers.
#[must_use]
pub fn build_injector_daemonset(record: &CertInjection, settings: &InjectorSettings) -> DaemonSet {
    let name = injector_name(&record.name_any());
    let namespace = record.namespace().unwrap_or_default();

    let mut labels = OwnerKey::of(record).derived_labels();
    labels.insert(INJECTOR_APP_LABEL.to_string(), INJECTOR_APP_NAME.to_string());

    let mut selector = BTreeMap::new();
    selector.insert(INJECTOR_SELECTOR_LABEL.to_string(), label_value(&name));

    let mut pod_labels = selector.clone();
    pod_labels.insert(INJECTOR_APP_LABEL.to_string(), INJECTOR_APP_NAME.to_string());

    let host_dir = format!(
        "{}/{}",
        settings.node_certs_dir.trim_end_matches('/'),
        record.spec.external_dns
    );

    DaemonSet {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(namespace),
            labels: Some(labels),
            ..ObjectMeta::default()
        },
        spec: Some(DaemonSetSpec {
            selector: LabelSelector {
                match_labels: Some(selector),
                ..LabelSelector::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: INJECTOR_CONTAINER_NAME.to_string(),
                        image: Some(settings.image.clone()),
                        command: Some(vec![
                            "/bin/sh".to_string(),
                            "-c".to_string(),
                            install_script(),
                        ]),
                        volume_mounts: Some(vec![
                            VolumeMount {
                                name: HOST_CERTS_VOLUME.to_string(),
                                mount_path: INJECTOR_HOST_CERTS_MOUNT.to_string(),
                                ..VolumeMount::default()
                            },
                            VolumeMount {
                                name: CA_VOLUME.to_string(),
                                mount_path: INJECTOR_CA_MOUNT.to_string(),
                                read_only: Some(true),
                                ..VolumeMount::default()
                            },
                        ]),
                        ..Container::default()
                    }],
                    volumes: Some(vec![
                        Volume {
                            name: HOST_CERTS_VOLUME.to_string(),
                            host_path: Some(HostPathVolumeSource {
                                path: host_dir,
                                type_: Some("DirectoryOrCreate".to_string()),
                            }),
                            ..Volume::default()
                        },
                        Volume {
                            name: CA_VOLUME.to_string(),
                            secret: Some(SecretVolumeSource {
                                secret_name: Some(record.spec.cert_secret.name.clone()),
                                items: Some(vec![KeyToPath {
                                    key: CA_KEY_IN_SECRET.to_string(),
                                    path: CA_KEY_IN_SECRET.to_string(),
                                    ..KeyToPath::default()
                                }]),
                                ..SecretVolumeSource::default()
                            }),
                            ..Volume::default()
                        },
                    ]),
                    // Every node, control plane included.
                    tolerations: Some(vec![Toleration {
                        operator: Some("Exists".to_string()),
                        ..Toleration::default()
                    }]),
                    termination_grace_period_seconds: Some(INJECTOR_TERMINATION_GRACE_PERIOD_SECS),
                    ..PodSpec::default()
                }),
            },
            ..DaemonSetSpec::default()
        }),
        ..DaemonSet::default()
    }
}

/// Create the injector of a persisted `record` and record it in the record's status.
///
/// Creates the `DaemonSet` owned by the record, reads it back, stores a reference to it
/// in `status.injector`, marks `InjectorReady` and `Ready` and finally re-stamps the
/// `DaemonSet` with the record's post-status resource version so the next pass sees
/// them as in sync.
///
/// # Returns
///
/// The record as persisted after the status write.
///
/// # Errors
///
/// Returns an error if the record is not persisted, the `DaemonSet` already exists or
/// any store call fails.
pub async fn inject<S: ObjectStore>(
    store: &S,
    record: &CertInjection,
    settings: &InjectorSettings,
    cancel: &CancellationToken,
) -> Result<CertInjection> {
    let namespace = record.namespace().unwrap_or_default();
    let record_name = record.name_any();
    let owner_ref = record
        .controller_owner_ref(&())
        .ok_or_else(|| anyhow!("record {namespace}/{record_name} is not persisted"))?;

    let mut desired = build_injector_daemonset(record, settings);
    desired.metadata.owner_references = Some(vec![owner_ref]);
    if let Some(version) = record.resource_version() {
        set_version_stamp(&mut desired, &version);
    }
    let ds_name = desired.name_any();

    store
        .create(&namespace, &desired, cancel)
        .await
        .with_context(|| format!("failed to create injector {namespace}/{ds_name}"))?;
    info!(namespace = %namespace, daemonset = %ds_name, record = %record_name, "Created injector DaemonSet");
    metrics::record_resource_created(KIND_DAEMON_SET);

    let mut created: DaemonSet = store
        .get(&namespace, &ds_name, cancel)
        .await
        .with_context(|| format!("failed to read back injector {namespace}/{ds_name}"))?
        .ok_or_else(|| anyhow!("injector {namespace}/{ds_name} vanished after creation"))?;

    let mut status = record.status.clone().unwrap_or_default();
    status.injector = Some(injector_ref(&created));
    upsert_condition(
        &mut status.conditions,
        CONDITION_TYPE_INJECTOR_READY,
        CONDITION_STATUS_TRUE,
        REASON_INJECTOR_CREATED,
        &format!("DaemonSet {ds_name} created"),
    );
    upsert_condition(
        &mut status.conditions,
        CONDITION_TYPE_READY,
        CONDITION_STATUS_TRUE,
        REASON_RECONCILED,
        "CA injection is in place",
    );
    let updated: CertInjection = store
        .patch_status(
            &namespace,
            &record_name,
            record.resource_version().as_deref(),
            serde_json::to_value(&status)?,
            cancel,
        )
        .await
        .with_context(|| format!("failed to update status of record {namespace}/{record_name}"))?;

    restamp(store, &mut created, &updated, cancel).await?;
    Ok(updated)
}

/// Bring an existing injector in line with `record`, gated on the version stamp.
///
/// On a rebuild `daemonset` is replaced by the stored result.
///
/// # Returns
///
/// `true` if the `DaemonSet` spec was rebuilt, `false` if it was already in sync.
///
/// # Errors
///
/// Returns an error if the replace fails (for example on a concurrent modification).
pub async fn sync<S: ObjectStore>(
    store: &S,
    record: &CertInjection,
    daemonset: &mut DaemonSet,
    settings: &InjectorSettings,
    cancel: &CancellationToken,
) -> Result<bool> {
    let current = record.resource_version();
    if version_stamp(daemonset) == current.as_deref() {
        debug!(daemonset = %daemonset.name_any(), "Injector is in sync with its record");
        return Ok(false);
    }

    let mut rebuilt = daemonset.clone();
    rebuilt.spec = build_injector_daemonset(record, settings).spec;
    if let Some(version) = current.as_deref() {
        set_version_stamp(&mut rebuilt, version);
    }

    let namespace = rebuilt.namespace().unwrap_or_default();
    let name = rebuilt.name_any();
    *daemonset = store
        .replace(&namespace, &rebuilt, cancel)
        .await
        .with_context(|| format!("failed to update injector {namespace}/{name}"))?;
    info!(namespace = %namespace, daemonset = %name, version = ?current, "Rebuilt injector DaemonSet");
    metrics::record_resource_updated(KIND_DAEMON_SET);
    Ok(true)
}

/// Stamp `daemonset` with the resource version of `record` without touching its spec.
///
/// Used after the record's own status write, which advances its resource version
/// without changing anything the injector is built from.
///
/// # Errors
///
/// Returns an error if the replace fails.
pub async fn restamp<S: ObjectStore>(
    store: &S,
    daemonset: &mut DaemonSet,
    record: &CertInjection,
    cancel: &CancellationToken,
) -> Result<()> {
    let Some(version) = record.resource_version() else {
        return Ok(());
    };
    if version_stamp(daemonset) == Some(version.as_str()) {
        return Ok(());
    }
    set_version_stamp(daemonset, &version);
    let namespace = daemonset.namespace().unwrap_or_default();
    let name = daemonset.name_any();
    let stamped = store
        .replace(&namespace, &*daemonset, cancel)
        .await
        .with_context(|| format!("failed to stamp injector {namespace}/{name}"))?;
    *daemonset = stamped;
    Ok(())
}
