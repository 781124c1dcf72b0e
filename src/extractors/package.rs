// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CA extraction from Carvel `PackageInstall` objects.
//!
//! Harbor packages carry their configuration in a values secret referenced from
//! `spec.values`. Two packaging flavours exist:
//!
//! - the app catalog references the secret through the data key `inline-values`
//! - the TKG package uses a secret named `harbor-default-values` with an unfixed key
//!
//! The values payload is base64 encoded JSON (YAML is accepted too) with the fields
//! `hostname`, `namespace`, `tlsCertificate."ca.crt"` and `tlsCertificateSecretName`.
//!
//! # CA precedence
//!
//! 1. inline `tlsCertificate."ca.crt"` when non-empty
//! 2. `ca.crt` of the secret named by `tlsCertificateSecretName`
//! 3. `ca.crt` of the secret `harbor-ca-key-pair` written by cert-manager

use super::{ca_from_secret, registry_host, Extractor, SourceObject};
use crate::constants::{
    APP_CATALOG_VALUES_KEY, DEFAULT_CA_SECRET_NAME, KIND_PACKAGE_INSTALL, TKG_VALUES_SECRET_NAME,
};
use crate::crd::{PackageInstall, PackageValuesSecretRef};
use crate::errors::InjectionError;
use crate::injection::Injection;
use crate::store::ObjectStore;
use anyhow::Context as _;
use async_trait::async_trait;
use base64::Engine as _;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// The subset of the Harbor package values read here.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PackageValues {
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub tls_certificate: Option<TlsCertificate>,
    #[serde(default)]
    pub tls_certificate_secret_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TlsCertificate {
    #[serde(rename = "ca.crt", default)]
    pub ca_cert: String,
}

/// Where the CA of a package lives.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum CaLocation<'a> {
    Inline(&'a str),
    Secret(&'a str),
}

impl PackageValues {
    pub(crate) fn ca_location(&self) -> CaLocation<'_> {
        if let Some(inline) = self
            .tls_certificate
            .as_ref()
            .map(|tls| tls.ca_cert.as_str())
            .filter(|ca| !ca.is_empty())
        {
            return CaLocation::Inline(inline);
        }
        match self.tls_certificate_secret_name.as_deref() {
            Some(name) if !name.is_empty() => CaLocation::Secret(name),
            _ => CaLocation::Secret(DEFAULT_CA_SECRET_NAME),
        }
    }
}

/// First values reference matching either packaging flavour.
pub(crate) fn values_secret_ref(package: &PackageInstall) -> Option<&PackageValuesSecretRef> {
    package
        .spec
        .values
        .iter()
        .filter_map(|values| values.secret_ref.as_ref())
        .find(|secret_ref| {
            secret_ref.key.as_deref() == Some(APP_CATALOG_VALUES_KEY)
                || secret_ref.name == TKG_VALUES_SECRET_NAME
        })
}

/// Decode the values payload of a values secret.
///
/// The payload is the data entry named by `key` when present, otherwise the single
/// opaque entry the secret holds.
pub(crate) fn decode_values(
    secret: &Secret,
    key: Option<&str>,
) -> Result<PackageValues, InjectionError> {
    let what = format!(
        "values secret {}/{}",
        secret.namespace().unwrap_or_default(),
        secret.name_any()
    );
    let data = secret.data.as_ref();
    let payload = key
        .and_then(|k| data.and_then(|d| d.get(k)))
        .or_else(|| data.and_then(|d| d.values().next()))
        .ok_or_else(|| InjectionError::Decode {
            what: what.clone(),
            reason: "secret holds no data".to_string(),
        })?;

    let compact: Vec<u8> = payload
        .0
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| InjectionError::Decode {
            what: what.clone(),
            reason: format!("invalid base64: {e}"),
        })?;

    if let Ok(values) = serde_json::from_slice(&decoded) {
        return Ok(values);
    }
    serde_yaml::from_slice(&decoded).map_err(|e| InjectionError::Decode {
        what,
        reason: format!("invalid values document: {e}"),
    })
}

/// Reads the registry host and CA from the Harbor package values.
pub struct PackageExtractor;

#[async_trait]
impl<S: ObjectStore> Extractor<S> for PackageExtractor {
    async fn extract(
        &self,
        store: &S,
        source: &SourceObject,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Injection> {
        let SourceObject::Package(package) = source else {
            return Err(source.unexpected(KIND_PACKAGE_INSTALL).into());
        };
        let source_ref = source.source_ref();
        let namespace = package.namespace().unwrap_or_default();

        let values_ref = values_secret_ref(package).ok_or_else(|| InjectionError::Extraction {
            source_ref: source_ref.clone(),
            reason: format!(
                "no values secret with key '{APP_CATALOG_VALUES_KEY}' or name '{TKG_VALUES_SECRET_NAME}'"
            ),
        })?;

        let values_secret: Secret = store
            .get(&namespace, &values_ref.name, cancel)
            .await
            .with_context(|| format!("failed to read values secret {namespace}/{}", values_ref.name))?
            .ok_or_else(|| InjectionError::Extraction {
                source_ref: source_ref.clone(),
                reason: format!("values secret '{}' not found", values_ref.name),
            })?;
        let values = decode_values(&values_secret, values_ref.key.as_deref())?;

        let Some(host) = registry_host(&values.hostname) else {
            return Err(InjectionError::Config {
                source_ref,
                reason: format!("package values have no usable hostname: '{}'", values.hostname),
            }
            .into());
        };

        let ca = match values.ca_location() {
            CaLocation::Inline(pem) => pem.as_bytes().to_vec(),
            CaLocation::Secret(name) => {
                let ca_namespace = if values.namespace.is_empty() {
                    namespace.as_str()
                } else {
                    values.namespace.as_str()
                };
                debug!(namespace = %ca_namespace, secret = %name, "Reading package CA secret");
                let ca_secret: Secret = store
                    .get(ca_namespace, name, cancel)
                    .await
                    .with_context(|| format!("failed to read CA secret {ca_namespace}/{name}"))?
                    .ok_or_else(|| InjectionError::Extraction {
                        source_ref: source_ref.clone(),
                        reason: format!("CA secret {ca_namespace}/{name} not found"),
                    })?;
                ca_from_secret(&ca_secret)?
            }
        };

        Ok(Injection::new(host, ca))
    }
}
