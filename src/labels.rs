// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label and annotation constants used across all reconcilers.
//!
//! This module defines standard Kubernetes labels and cert-injector labels/annotations
//! to ensure consistency across all resources created by the controller.

use crate::constants::{MAX_LABEL_VALUE_LEN, NAME_HASH_LEN};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Standard label for the name of a higher-level application this one is part of
pub const K8S_PART_OF: &str = "app.kubernetes.io/part-of";

/// Value for `app.kubernetes.io/managed-by` on every derived object
pub const MANAGED_BY_CERT_INJECTOR: &str = "cert-injector";

/// Value for `app.kubernetes.io/part-of`
pub const PART_OF_HARBOR: &str = "harbor";

// ============================================================================
// Source Selection
// ============================================================================

/// Only source objects carrying this label (with [`CERT_INJECTION_ENABLED`]) are watched
pub const CERT_INJECTION_LABEL: &str = "goharbor.io/cert-injection";

/// Value of [`CERT_INJECTION_LABEL`] that opts a source object in
pub const CERT_INJECTION_ENABLED: &str = "enabled";

// ============================================================================
// Ownership Index Labels
// ============================================================================

/// Kind, version and group of the object a derived object belongs to
pub const OWNER_GVK_LABEL: &str = "cert-injection.goharbor.io/owner-gvk";

/// Name of the object a derived object belongs to
pub const OWNER_NAME_LABEL: &str = "cert-injection.goharbor.io/owner-name";

// ============================================================================
// Annotations
// ============================================================================

/// Registry DNS name the CA belongs to (on CA secrets and on source secrets)
pub const REGISTRY_URI_ANNOTATION: &str = "registry.goharbor.io/uri";

/// Last `CertInjection` resource version applied to the injector workload
pub const INJECTION_VERSION_ANNOTATION: &str = "injection.goharbor.io/version";

// ============================================================================
// Injector Workload Labels
// ============================================================================

/// App label set on every injector `DaemonSet`
pub const INJECTOR_APP_LABEL: &str = "k8s-app";

/// Value of [`INJECTOR_APP_LABEL`]
pub const INJECTOR_APP_NAME: &str = "cert-auto-injector";

/// Pod selector label of an injector `DaemonSet`
pub const INJECTOR_SELECTOR_LABEL: &str = "name";

/// Label selector string matching source objects that opted in.
#[must_use]
pub fn enabled_selector() -> String {
    format!("{CERT_INJECTION_LABEL}={CERT_INJECTION_ENABLED}")
}

/// Returns `true` if the labels opt the object into cert injection.
#[must_use]
pub fn is_injection_enabled(labels: &BTreeMap<String, String>) -> bool {
    labels
        .get(CERT_INJECTION_LABEL)
        .is_some_and(|v| v == CERT_INJECTION_ENABLED)
}

/// `value` shortened to at most `max` characters.
///
/// Values that fit are returned unchanged. Longer values keep a prefix and end in
/// `-<hash>`, a hash of the full value, so distinct values sharing a long prefix stay
/// distinct. The result starts and ends like a DNS-1123 name if `value` does.
#[must_use]
pub fn bounded_name(value: &str, max: usize) -> String {
    if value.len() <= max {
        return value.to_string();
    }
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let keep = max.saturating_sub(NAME_HASH_LEN + 1);
    let end = value
        .char_indices()
        .nth(keep)
        .map_or(value.len(), |(i, _)| i);
    let prefix = value[..end].trim_end_matches(|c: char| !c.is_ascii_alphanumeric());
    if prefix.is_empty() {
        hash[..NAME_HASH_LEN.min(max)].to_string()
    } else {
        format!("{prefix}-{}", &hash[..NAME_HASH_LEN])
    }
}

/// `value` as a valid label value of at most 63 characters.
#[must_use]
pub fn label_value(value: &str) -> String {
    bounded_name(value, MAX_LABEL_VALUE_LEN)
}
