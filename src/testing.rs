// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory [`ObjectStore`] used by unit tests.
//!
//! Behaves like the API server in the ways the engine depends on: resource versions
//! advance on every write, stale writes conflict, `create` ignores status for kinds with
//! a status subresource and `replace` keeps the stored status for them. Every
//! successful write is counted so tests can assert a pass made zero writes.

use crate::constants::KIND_CERT_INJECTION;
use crate::crd::{
    CertInjection, CertInjectionSpec, HarborCluster, HarborClusterSpec, HarborComponentExpose, HarborExpose, HarborTls,
    PackageInstall, PackageInstallSpec, PackageInstallValues, PackageValuesSecretRef,
};
use crate::errors::StoreError;
use crate::labels::{CERT_INJECTION_ENABLED, CERT_INJECTION_LABEL, REGISTRY_URI_ANNOTATION};
use crate::store::{ObjectStore, StoreResource};
use async_trait::async_trait;
use base64::Engine as _;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use chrono::Utc;
use kube::ResourceExt;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

type Key = (String, String, String);

#[derive(Default)]
struct Inner {
    objects: BTreeMap<Key, Value>,
    next_version: u64,
    writes: Vec<String>,
    failing_kinds: HashSet<String>,
}

impl Inner {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }
}

/// Thread-safe in-memory object store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

fn key<K: StoreResource>(namespace: &str, name: &str) -> Key {
    (
        K::kind(&()).to_string(),
        namespace.to_string(),
        name.to_string(),
    )
}

fn has_status_subresource(kind: &str) -> bool {
    kind == KIND_CERT_INJECTION
}

fn conflict(key: &Key) -> StoreError {
    StoreError::Conflict {
        kind: key.0.clone(),
        namespace: key.1.clone(),
        name: key.2.clone(),
    }
}

fn not_found(key: &Key) -> StoreError {
    StoreError::NotFound {
        kind: key.0.clone(),
        namespace: key.1.clone(),
        name: key.2.clone(),
    }
}

fn metadata_str<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value.get("metadata")?.get(field)?.as_str()
}

fn set_metadata(value: &mut Value, field: &str, field_value: Value) {
    if let Some(meta) = value.get_mut("metadata").and_then(Value::as_object_mut) {
        meta.insert(field.to_string(), field_value);
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without counting a write. Assigns a uid and resource version.
    pub fn insert<K: StoreResource>(&self, object: &K) -> K {
        let mut inner = self.inner.lock().unwrap();
        let namespace = object.namespace().unwrap_or_default();
        let key = key::<K>(&namespace, &object.name_any());
        let mut value = serde_json::to_value(object).unwrap();
        let version = inner.bump();
        set_metadata(&mut value, "resourceVersion", Value::String(version.clone()));
        if metadata_str(&value, "uid").is_none() {
            set_metadata(&mut value, "uid", Value::String(format!("uid-{version}")));
        }
        inner.objects.insert(key, value.clone());
        serde_json::from_value(value).unwrap()
    }

    /// Current stored copy of an object.
    pub fn fetch<K: StoreResource>(&self, namespace: &str, name: &str) -> Option<K> {
        let inner = self.inner.lock().unwrap();
        inner
            .objects
            .get(&key::<K>(namespace, name))
            .map(|value| serde_json::from_value(value.clone()).unwrap())
    }

    /// All stored objects of one kind in a namespace.
    pub fn all<K: StoreResource>(&self, namespace: &str) -> Vec<K> {
        let kind = K::kind(&()).to_string();
        let inner = self.inner.lock().unwrap();
        inner
            .objects
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && ns == namespace)
            .map(|(_, value)| serde_json::from_value(value.clone()).unwrap())
            .collect()
    }

    /// Delete an object outright, bypassing ownership.
    pub fn remove<K: StoreResource>(&self, namespace: &str, name: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.objects.remove(&key::<K>(namespace, name));
    }

    /// Mark an object as being deleted.
    pub fn mark_deleting<K: StoreResource>(&self, namespace: &str, name: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(value) = inner.objects.get_mut(&key::<K>(namespace, name)) {
            set_metadata(
                value,
                "deletionTimestamp",
                Value::String(Utc::now().to_rfc3339()),
            );
        }
    }

    /// Make every subsequent write to `K` fail with a conflict.
    pub fn fail_writes<K: StoreResource>(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failing_kinds.insert(K::kind(&()).to_string());
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.inner.lock().unwrap().writes.len()
    }

    /// Successful writes so far, as `verb Kind/name`.
    pub fn writes(&self) -> Vec<String> {
        self.inner.lock().unwrap().writes.clone()
    }

    fn check_writable(inner: &Inner, key: &Key) -> Result<(), StoreError> {
        if inner.failing_kinds.contains(&key.0) {
            return Err(conflict(key));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get<K: StoreResource>(
        &self,
        namespace: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<K>, StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let inner = self.inner.lock().unwrap();
        inner
            .objects
            .get(&key::<K>(namespace, name))
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn list<K: StoreResource>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<Vec<K>, StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let kind = K::kind(&()).to_string();
        let inner = self.inner.lock().unwrap();
        let mut items = Vec::new();
        for ((k, ns, _), value) in &inner.objects {
            if *k != kind || ns != namespace {
                continue;
            }
            let object: K = serde_json::from_value(value.clone())?;
            let object_labels = object.labels();
            if labels
                .iter()
                .all(|(label, wanted)| object_labels.get(label) == Some(wanted))
            {
                items.push(object);
            }
        }
        Ok(items)
    }

    async fn create<K: StoreResource>(
        &self,
        namespace: &str,
        object: &K,
        cancel: &CancellationToken,
    ) -> Result<K, StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let mut inner = self.inner.lock().unwrap();
        let key = key::<K>(namespace, &object.name_any());
        Self::check_writable(&inner, &key)?;
        if inner.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: key.0,
                namespace: key.1,
                name: key.2,
            });
        }
        let mut value = serde_json::to_value(object)?;
        if has_status_subresource(&key.0) {
            if let Some(map) = value.as_object_mut() {
                map.remove("status");
            }
        }
        let version = inner.bump();
        set_metadata(&mut value, "namespace", Value::String(namespace.to_string()));
        set_metadata(&mut value, "resourceVersion", Value::String(version.clone()));
        set_metadata(&mut value, "uid", Value::String(format!("uid-{version}")));
        inner.writes.push(format!("create {}/{}", key.0, key.2));
        inner.objects.insert(key, value.clone());
        Ok(serde_json::from_value(value)?)
    }

    async fn replace<K: StoreResource>(
        &self,
        namespace: &str,
        object: &K,
        cancel: &CancellationToken,
    ) -> Result<K, StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let mut inner = self.inner.lock().unwrap();
        let key = key::<K>(namespace, &object.name_any());
        Self::check_writable(&inner, &key)?;
        let stored = inner.objects.get(&key).ok_or_else(|| not_found(&key))?.clone();
        let mut value = serde_json::to_value(object)?;
        if let Some(expected) = metadata_str(&value, "resourceVersion") {
            if Some(expected) != metadata_str(&stored, "resourceVersion") {
                return Err(conflict(&key));
            }
        }
        if has_status_subresource(&key.0) {
            if let Some(map) = value.as_object_mut() {
                match stored.get("status") {
                    Some(status) => map.insert("status".to_string(), status.clone()),
                    None => map.remove("status"),
                };
            }
        }
        if let Some(uid) = metadata_str(&stored, "uid") {
            set_metadata(&mut value, "uid", Value::String(uid.to_string()));
        }
        let version = inner.bump();
        set_metadata(&mut value, "resourceVersion", Value::String(version));
        inner.writes.push(format!("replace {}/{}", key.0, key.2));
        inner.objects.insert(key, value.clone());
        Ok(serde_json::from_value(value)?)
    }

    async fn patch_status<K: StoreResource>(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<&str>,
        status: Value,
        cancel: &CancellationToken,
    ) -> Result<K, StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let mut inner = self.inner.lock().unwrap();
        let key = key::<K>(namespace, name);
        Self::check_writable(&inner, &key)?;
        let mut value = inner.objects.get(&key).ok_or_else(|| not_found(&key))?.clone();
        if let Some(expected) = resource_version {
            if Some(expected) != metadata_str(&value, "resourceVersion") {
                return Err(conflict(&key));
            }
        }
        if let Some(map) = value.as_object_mut() {
            map.insert("status".to_string(), status);
        }
        let version = inner.bump();
        set_metadata(&mut value, "resourceVersion", Value::String(version));
        inner.writes.push(format!("status {}/{}", key.0, key.2));
        inner.objects.insert(key, value.clone());
        Ok(serde_json::from_value(value)?)
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub const TEST_NAMESPACE: &str = "harbor-system";
pub const TEST_CA: &[u8] = b"-----BEGIN CERTIFICATE-----\nMIIBtest\n-----END CERTIFICATE-----\n";

pub fn meta(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(TEST_NAMESPACE.to_string()),
        ..ObjectMeta::default()
    }
}

fn enabled_meta(name: &str) -> ObjectMeta {
    let mut metadata = meta(name);
    metadata.labels = Some(BTreeMap::from([(
        CERT_INJECTION_LABEL.to_string(),
        CERT_INJECTION_ENABLED.to_string(),
    )]));
    metadata
}

/// Secret holding `data` under the given keys.
pub fn secret_with(name: &str, data: &[(&str, &[u8])]) -> Secret {
    Secret {
        metadata: meta(name),
        data: Some(
            data.iter()
                .map(|(k, v)| ((*k).to_string(), ByteString(v.to_vec())))
                .collect(),
        ),
        ..Secret::default()
    }
}

/// Secret with the CA under `ca.crt`.
pub fn ca_secret(name: &str, ca: &[u8]) -> Secret {
    secret_with(name, &[("ca.crt", ca)])
}

/// Labelled source secret carrying its registry URI annotation.
pub fn source_secret(name: &str, uri: Option<&str>, ca: &[u8]) -> Secret {
    let mut secret = ca_secret(name, ca);
    secret.metadata = enabled_meta(name);
    if let Some(uri) = uri {
        secret.metadata.annotations = Some(BTreeMap::from([(
            REGISTRY_URI_ANNOTATION.to_string(),
            uri.to_string(),
        )]));
    }
    secret
}

pub fn harbor_cluster(name: &str, external_url: &str, certificate_ref: Option<&str>) -> HarborCluster {
    let mut cluster = HarborCluster::new(
        name,
        HarborClusterSpec {
            external_url: external_url.to_string(),
            expose: HarborExpose {
                core: HarborComponentExpose {
                    tls: certificate_ref.map(|r| HarborTls {
                        certificate_ref: r.to_string(),
                    }),
                },
            },
        },
    );
    cluster.metadata = enabled_meta(name);
    cluster
}

pub fn package_install(name: &str, refs: &[(&str, Option<&str>)]) -> PackageInstall {
    let mut package = PackageInstall::new(
        name,
        PackageInstallSpec {
            values: refs
                .iter()
                .map(|(secret, key)| PackageInstallValues {
                    secret_ref: Some(PackageValuesSecretRef {
                        name: (*secret).to_string(),
                        key: key.map(str::to_string),
                    }),
                })
                .collect(),
        },
    );
    package.metadata = enabled_meta(name);
    package
}

/// Values secret whose single entry `key` is the base64 encoding of `values`.
pub fn values_secret(name: &str, key: &str, values: &serde_json::Value) -> Secret {
    let encoded = base64::engine::general_purpose::STANDARD.encode(values.to_string());
    secret_with(name, &[(key, encoded.as_bytes())])
}

/// Unpersisted record with an empty spec.
pub fn record(name: &str) -> CertInjection {
    let mut record = CertInjection::new(name, CertInjectionSpec::default());
    record.metadata = meta(name);
    record
}
