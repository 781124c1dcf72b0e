// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CA extraction from source objects.
//!
//! Each supported source type has one [`Extractor`] that turns an object of that type
//! into an [`Injection`]. Extractors are looked up by [`TypeIdentity`] in an
//! [`ExtractorRegistry`] built once at startup and shared read-only by every reconciler.
//!
//! # Supported sources
//!
//! - [`HarborCluster`] - [`cluster::ClusterExtractor`]
//! - [`PackageInstall`] - [`package::PackageExtractor`]
//! - labelled `Secret` - [`secret::SecretExtractor`]

pub mod cluster;
pub mod package;
pub mod secret;


use crate::constants::CA_KEY_IN_SECRET;
use crate::crd::{HarborCluster, PackageInstall};
use crate::errors::InjectionError;
use crate::identity::TypeIdentity;
use crate::injection::Injection;
use crate::store::{ObjectStore, StoreResource};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A source object of one of the supported types.
#[derive(Clone, Debug)]
pub enum SourceObject {
    /// Harbor operator deployment.
    Cluster(HarborCluster),
    /// Carvel package installation.
    Package(PackageInstall),
    /// Secret carrying the CA directly.
    Secret(Secret),
}

impl SourceObject {
    /// Type identity of the wrapped object.
    #[must_use]
    pub fn type_identity(&self) -> TypeIdentity {
        match self {
            Self::Cluster(_) => TypeIdentity::of::<HarborCluster>(),
            Self::Package(_) => TypeIdentity::of::<PackageInstall>(),
            Self::Secret(_) => TypeIdentity::of::<Secret>(),
        }
    }

    /// Namespace of the wrapped object.
    #[must_use]
    pub fn namespace(&self) -> String {
        match self {
            Self::Cluster(o) => o.namespace(),
            Self::Package(o) => o.namespace(),
            Self::Secret(o) => o.namespace(),
        }
        .unwrap_or_default()
    }

    /// Name of the wrapped object.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Cluster(o) => o.name_any(),
            Self::Package(o) => o.name_any(),
            Self::Secret(o) => o.name_any(),
        }
    }

    /// `namespace/name` of the wrapped object, for messages.
    #[must_use]
    pub fn source_ref(&self) -> String {
        format!("{}/{}", self.namespace(), self.name())
    }

    fn kind_name(&self) -> String {
        self.type_identity().kind().to_string()
    }

    /// Error for an extractor handed a source of the wrong kind.
    pub(crate) fn unexpected(&self, expected: &str) -> InjectionError {
        InjectionError::UnexpectedSource {
            expected: expected.to_string(),
            actual: self.kind_name(),
        }
    }
}

/// A resource type that can act as a CA source.
pub trait CertSource: StoreResource {
    /// Wrap the object for dispatch to its extractor.
    fn into_source(self) -> SourceObject;
}

impl CertSource for HarborCluster {
    fn into_source(self) -> SourceObject {
        SourceObject::Cluster(self)
    }
}

impl CertSource for PackageInstall {
    fn into_source(self) -> SourceObject {
        SourceObject::Package(self)
    }
}

impl CertSource for Secret {
    fn into_source(self) -> SourceObject {
        SourceObject::Secret(self)
    }
}

/// Turns one type of source object into an [`Injection`].
#[async_trait]
pub trait Extractor<S>: Send + Sync {
    /// Extract the registry DNS name and CA from `source`.
    ///
    /// # Errors
    ///
    /// Returns an error chain containing an [`InjectionError`] when the source is
    /// misconfigured or its CA cannot be found, or a store error when a referenced
    /// secret cannot be read. [`InjectionError::TlsNotEnabled`] is reported for
    /// sources that do not serve TLS.
    async fn extract(
        &self,
        store: &S,
        source: &SourceObject,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Injection>;
}

/// Extractors keyed by the type identity they handle.
pub struct ExtractorRegistry<S> {
    extractors: HashMap<TypeIdentity, Arc<dyn Extractor<S>>>,
}

impl<S: ObjectStore + 'static> ExtractorRegistry<S> {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            extractors: HashMap::new(),
        }
    }

    /// A registry with the three built-in extractors.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new()
            .register(TypeIdentity::of::<HarborCluster>(), cluster::ClusterExtractor)
            .register(TypeIdentity::of::<PackageInstall>(), package::PackageExtractor)
            .register(TypeIdentity::of::<Secret>(), secret::SecretExtractor)
    }

    /// Register `extractor` for `identity`, replacing any previous registration.
    #[must_use]
    pub fn register(mut self, identity: TypeIdentity, extractor: impl Extractor<S> + 'static) -> Self {
        self.extractors.insert(identity, Arc::new(extractor));
        self
    }

    /// The extractor registered for `identity`.
    #[must_use]
    pub fn resolve(&self, identity: &TypeIdentity) -> Option<Arc<dyn Extractor<S>>> {
        self.extractors.get(identity).cloned()
    }
}

impl<S: ObjectStore + 'static> Default for ExtractorRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-empty `ca.crt` bytes of a secret.
pub(crate) fn ca_from_secret(secret: &Secret) -> Result<Vec<u8>, InjectionError> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(CA_KEY_IN_SECRET))
        .map(|bytes| bytes.0.clone())
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| InjectionError::MissingSecretKey {
            namespace: secret.namespace().unwrap_or_default(),
            name: secret.name_any(),
            key: CA_KEY_IN_SECRET.to_string(),
        })
}

/// Normalize a registry URL or bare host to the `host[:port]` form used as the node
/// trust directory name. Returns `None` when no host can be found.
#[must_use]
pub fn registry_host(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let parsed = url::Url::parse(&candidate).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}
