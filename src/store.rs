// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Backing object store access.
//!
//! Every read and write the engine performs goes through [`ObjectStore`]. Production
//! code uses [`KubeStore`], which talks to the Kubernetes API; tests substitute an
//! in-memory store.
//!
//! # Concurrency
//!
//! All writes are optimistic. [`ObjectStore::replace`] and [`ObjectStore::patch_status`]
//! carry the resource version that was just read, and a concurrent modification comes
//! back as [`StoreError::Conflict`]. Nothing here retries; the controller requeues the
//! object and the next pass re-reads the latest version.
//!
//! # Cancellation
//!
//! Every call takes a [`CancellationToken`]. Once it is cancelled, in-flight calls
//! return [`StoreError::Cancelled`] instead of waiting for the API server.

#[cfg(test)]
#[path = "store_tests.rs"]
mod store_tests;

use crate::constants::FIELD_MANAGER;
use crate::errors::StoreError;
use async_trait::async_trait;
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A namespaced, statically typed resource the store can persist.
pub trait StoreResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<T> StoreResource for T where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Read and conditional-write access to namespaced objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object, `None` if it does not exist.
    async fn get<K: StoreResource>(
        &self,
        namespace: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<K>, StoreError>;

    /// List the objects in `namespace` carrying all of `labels`.
    async fn list<K: StoreResource>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<Vec<K>, StoreError>;

    /// Create an object. Fails with [`StoreError::AlreadyExists`] on a name clash.
    async fn create<K: StoreResource>(
        &self,
        namespace: &str,
        object: &K,
        cancel: &CancellationToken,
    ) -> Result<K, StoreError>;

    /// Replace an object, conditioned on the resource version it carries.
    async fn replace<K: StoreResource>(
        &self,
        namespace: &str,
        object: &K,
        cancel: &CancellationToken,
    ) -> Result<K, StoreError>;

    /// Replace the status of an object, conditioned on `resource_version`.
    async fn patch_status<K: StoreResource>(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<&str>,
        status: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<K, StoreError>;
}

/// Render a label map as a Kubernetes label selector (`k1=v1,k2=v2`).
#[must_use]
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// [`ObjectStore`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    /// Wrap a Kubernetes client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: StoreResource>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..PostParams::default()
    }
}

/// Race an API call against cancellation, mapping its failure to a [`StoreError`].
async fn cancellable<K, T, F>(
    cancel: &CancellationToken,
    namespace: &str,
    name: &str,
    call: F,
) -> Result<T, StoreError>
where
    K: StoreResource,
    F: Future<Output = Result<T, kube::Error>> + Send,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(StoreError::Cancelled),
        result = call => result.map_err(|e| classify::<K>(e, namespace, name)),
    }
}

/// Map an API failure to a [`StoreError`], recognizing not-found and conflicts.
fn classify<K: StoreResource>(err: kube::Error, namespace: &str, name: &str) -> StoreError {
    let kind = K::kind(&()).to_string();
    match err {
        kube::Error::Api(ref ae) if ae.code == 404 => StoreError::NotFound {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(ref ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
            StoreError::AlreadyExists {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            }
        }
        kube::Error::Api(ref ae) if ae.code == 409 => StoreError::Conflict {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        other => StoreError::Api(other),
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: StoreResource>(
        &self,
        namespace: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<K>, StoreError> {
        let api = self.api::<K>(namespace);
        cancellable::<K, _, _>(cancel, namespace, name, api.get_opt(name)).await
    }

    async fn list<K: StoreResource>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<Vec<K>, StoreError> {
        let api = self.api::<K>(namespace);
        let selector = label_selector(labels);
        debug!(kind = %K::kind(&()), namespace = %namespace, selector = %selector, "Listing objects");
        let params = ListParams::default().labels(&selector);
        let list = cancellable::<K, _, _>(cancel, namespace, "", api.list(&params)).await?;
        Ok(list.items)
    }

    async fn create<K: StoreResource>(
        &self,
        namespace: &str,
        object: &K,
        cancel: &CancellationToken,
    ) -> Result<K, StoreError> {
        let api = self.api::<K>(namespace);
        let name = object.name_any();
        let params = post_params();
        cancellable::<K, _, _>(cancel, namespace, &name, api.create(&params, object)).await
    }

    async fn replace<K: StoreResource>(
        &self,
        namespace: &str,
        object: &K,
        cancel: &CancellationToken,
    ) -> Result<K, StoreError> {
        let api = self.api::<K>(namespace);
        let name = object.name_any();
        let params = post_params();
        cancellable::<K, _, _>(cancel, namespace, &name, api.replace(&name, &params, object)).await
    }

    async fn patch_status<K: StoreResource>(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<&str>,
        status: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<K, StoreError> {
        let api = self.api::<K>(namespace);
        // A resourceVersion in a merge patch makes the API server reject stale writes.
        let body = match resource_version {
            Some(rv) => json!({ "metadata": { "resourceVersion": rv }, "status": status }),
            None => json!({ "status": status }),
        };
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PatchParams::default()
        };
        let patch = Patch::Merge(&body);
        cancellable::<K, _, _>(cancel, namespace, name, api.patch_status(name, &params, &patch))
            .await
    }
}
