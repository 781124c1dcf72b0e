// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CA extraction from labelled secrets.

use super::{ca_from_secret, registry_host, Extractor, SourceObject};
use crate::constants::KIND_SECRET;
use crate::errors::InjectionError;
use crate::injection::Injection;
use crate::labels::REGISTRY_URI_ANNOTATION;
use crate::store::ObjectStore;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Reads the CA from the secret's own `ca.crt` key and the registry host from its
/// `registry.goharbor.io/uri` annotation. Makes no store calls.
pub struct SecretExtractor;

#[async_trait]
impl<S: ObjectStore> Extractor<S> for SecretExtractor {
    async fn extract(
        &self,
        _store: &S,
        source: &SourceObject,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<Injection> {
        let SourceObject::Secret(secret) = source else {
            return Err(source.unexpected(KIND_SECRET).into());
        };

        let uri = secret
            .metadata
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(REGISTRY_URI_ANNOTATION))
            .map(String::as_str)
            .unwrap_or_default();
        let external_dns = registry_host(uri).ok_or_else(|| InjectionError::Config {
            source_ref: source.source_ref(),
            reason: format!("annotation {REGISTRY_URI_ANNOTATION} is missing or has no host"),
        })?;

        let ca = ca_from_secret(secret)?;
        Ok(Injection::new(external_dns, ca))
    }
}
