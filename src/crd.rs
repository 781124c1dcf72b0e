// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions (CRDs) used by the cert-injector.
//!
//! # Resource Types
//!
//! ## Owned
//!
//! - [`CertInjection`] - The derived record tracking one source object's injection state
//!
//! ## Watched (defined by other operators, only the fields read here are modeled)
//!
//! - [`HarborCluster`] - Harbor registry deployed by the Harbor operator
//! - [`PackageInstall`] - Harbor installed as a Carvel package
//!
//! Labelled core `Secret`s are the third source kind and need no definition.
//!
//! # Example: A populated record
//!
//! ```rust,no_run
//! use cert_injector::crd::{CertInjectionSpec, SecretReference};
//!
//! let spec = CertInjectionSpec {
//!     external_dns: "reg.example.com".to_string(),
//!     cert_secret: SecretReference {
//!         name: "ca-secret-ca-injection-secret-harbor".to_string(),
//!     },
//! };
//! ```

use k8s_openapi::api::core::v1::ObjectReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to a secret in the same namespace as the referring object.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq, JsonSchema)]
pub struct SecretReference {
    /// Name of the secret.
    #[serde(default)]
    pub name: String,
}

/// Generic status condition.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition: `CAReady`, `InjectorReady` or `Ready`.
    pub r#type: String,

    /// Status of the condition: True or False.
    pub status: String,

    /// Last time the condition transitioned from one status to another (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,

    /// Brief CamelCase reason for the condition's last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message indicating details about the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `CertInjection` tracks the injection of one registry CA into every node.
///
/// Exactly one record exists per source object. The record is created by the
/// source reconcilers once the CA secret is in place and is garbage-collected
/// together with the source object.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[kube(
    group = "day2-operations.goharbor.io",
    version = "v1alpha1",
    kind = "CertInjection",
    namespaced,
    shortname = "ci",
    doc = "CertInjection injects a self-signed registry CA into the container runtime trust store of every node",
    printcolumn = r#"{"name":"DNS","type":"string","jsonPath":".spec.externalDNS"}"#,
    printcolumn = r#"{"name":"Secret","type":"string","jsonPath":".spec.certSecret.name"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type=='Ready')].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[kube(status = "CertInjectionStatus")]
#[serde(rename_all = "camelCase")]
pub struct CertInjectionSpec {
    /// External DNS name of the registry, used as the trust directory name on each node.
    #[serde(rename = "externalDNS")]
    pub external_dns: String,

    /// Secret holding the CA certificate under `ca.crt`.
    #[serde(default)]
    pub cert_secret: SecretReference,
}

/// `CertInjection` status
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CertInjectionStatus {
    /// Conditions of the injection, unique by type.
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// The source object the CA certificate was extracted from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_source: Option<ObjectReference>,

    /// The `DaemonSet` installing the CA on every node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub injector: Option<ObjectReference>,
}

impl CertInjection {
    /// Name of the referenced CA secret, `None` until the first successful secret sync.
    #[must_use]
    pub fn cert_secret_name(&self) -> Option<&str> {
        Some(self.spec.cert_secret.name.as_str()).filter(|name| !name.is_empty())
    }

    /// Conditions recorded so far (empty when no status exists).
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map_or(&[][..], |status| status.conditions.as_slice())
    }
}

// ============================================================================
// Harbor operator
// ============================================================================

/// The subset of a Harbor operator `HarborCluster` spec read by the cluster extractor.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[kube(
    group = "goharbor.io",
    version = "v1beta1",
    kind = "HarborCluster",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct HarborClusterSpec {
    /// Public URL of the registry, e.g. `https://reg.example.com`.
    #[serde(rename = "externalURL", default)]
    pub external_url: String,

    /// How the Harbor components are exposed.
    #[serde(default)]
    pub expose: HarborExpose,
}

/// Exposure settings of a `HarborCluster`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct HarborExpose {
    /// Exposure of the core component.
    #[serde(default)]
    pub core: HarborComponentExpose,
}

/// Exposure of a single Harbor component.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct HarborComponentExpose {
    /// TLS settings; absent when the component is served over plain HTTP.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<HarborTls>,
}

/// TLS settings of an exposed Harbor component.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HarborTls {
    /// Name of the secret holding the serving certificate and its CA.
    pub certificate_ref: String,
}

// ============================================================================
// Carvel kapp-controller
// ============================================================================

/// The subset of a Carvel `PackageInstall` spec read by the package extractor.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[kube(
    group = "packaging.carvel.dev",
    version = "v1alpha1",
    kind = "PackageInstall",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct PackageInstallSpec {
    /// Values supplied to the package templates.
    #[serde(default)]
    pub values: Vec<PackageInstallValues>,
}

/// One values source of a `PackageInstall`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PackageInstallValues {
    /// Secret the values are read from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<PackageValuesSecretRef>,
}

/// Secret reference of a `PackageInstall` values source.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct PackageValuesSecretRef {
    /// Secret name, in the namespace of the `PackageInstall`.
    #[serde(default)]
    pub name: String,

    /// Data key inside the secret; all keys are used when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}
