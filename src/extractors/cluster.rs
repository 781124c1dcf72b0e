// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CA extraction from Harbor operator `HarborCluster` objects.

use super::{ca_from_secret, registry_host, Extractor, SourceObject};
use crate::constants::KIND_HARBOR_CLUSTER;
use crate::errors::InjectionError;
use crate::injection::Injection;
use crate::store::ObjectStore;
use anyhow::Context as _;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Reads the registry host from `spec.externalURL` and the CA from the `ca.crt` key of
/// the core TLS certificate secret.
pub struct ClusterExtractor;

#[async_trait]
impl<S: ObjectStore> Extractor<S> for ClusterExtractor {
    async fn extract(
        &self,
        store: &S,
        source: &SourceObject,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Injection> {
        let SourceObject::Cluster(cluster) = source else {
            return Err(source.unexpected(KIND_HARBOR_CLUSTER).into());
        };
        let source_ref = source.source_ref();

        if cluster.spec.external_url.trim().is_empty() {
            return Err(InjectionError::Config {
                source_ref,
                reason: "spec.externalURL is not set".to_string(),
            }
            .into());
        }
        let external_dns =
            registry_host(&cluster.spec.external_url).ok_or_else(|| InjectionError::Config {
                source_ref: source_ref.clone(),
                reason: format!("spec.externalURL '{}' has no host", cluster.spec.external_url),
            })?;

        let tls = cluster
            .spec
            .expose
            .core
            .tls
            .as_ref()
            .ok_or_else(|| InjectionError::TlsNotEnabled {
                source_ref: source_ref.clone(),
            })?;
        if tls.certificate_ref.is_empty() {
            return Err(InjectionError::Config {
                source_ref,
                reason: "spec.expose.core.tls.certificateRef is not set".to_string(),
            }
            .into());
        }

        let namespace = cluster.namespace().unwrap_or_default();
        debug!(
            namespace = %namespace,
            secret = %tls.certificate_ref,
            "Reading HarborCluster certificate secret"
        );
        let secret: Secret = store
            .get(&namespace, &tls.certificate_ref, cancel)
            .await
            .with_context(|| {
                format!(
                    "failed to read certificate secret {namespace}/{}",
                    tls.certificate_ref
                )
            })?
            .ok_or_else(|| InjectionError::Extraction {
                source_ref: source_ref.clone(),
                reason: format!("certificate secret '{}' not found", tls.certificate_ref),
            })?;

        let ca = ca_from_secret(&secret)?;
        Ok(Injection::new(external_dns, ca))
    }
}
