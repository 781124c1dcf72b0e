// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the cert-injector operator.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Kind Constants
// ============================================================================

/// Kind name for `CertInjection` resource
pub const KIND_CERT_INJECTION: &str = "CertInjection";

/// Kind name for `HarborCluster` resource
pub const KIND_HARBOR_CLUSTER: &str = "HarborCluster";

/// Kind name for `PackageInstall` resource
pub const KIND_PACKAGE_INSTALL: &str = "PackageInstall";

/// Kind name for core `Secret` resource
pub const KIND_SECRET: &str = "Secret";

/// Kind name for `DaemonSet` resource
pub const KIND_DAEMON_SET: &str = "DaemonSet";

// ============================================================================
// Secret Layout
// ============================================================================

/// Data key holding the raw CA bytes in every CA-bearing secret
pub const CA_KEY_IN_SECRET: &str = "ca.crt";

// ============================================================================
// Naming
// ============================================================================

/// Prefix of the derived `CertInjection` record name
pub const CERT_INJECTION_NAME_PREFIX: &str = "ca-injection";

/// Prefix of the CA secret owned by a `CertInjection`
pub const CA_SECRET_NAME_PREFIX: &str = "ca-secret";

/// Prefix of the injector `DaemonSet` owned by a `CertInjection`
pub const INJECTOR_NAME_PREFIX: &str = "cert-injection-ds";

/// Maximum length of a `CertInjection` record name.
///
/// Leaves room under the 253 character object name limit for the secret and
/// `DaemonSet` prefixes and the suffixes Kubernetes appends to `DaemonSet` children.
pub const MAX_RECORD_NAME_LEN: usize = 200;

/// Maximum length of a label value
pub const MAX_LABEL_VALUE_LEN: usize = 63;

/// Hex digits of the hash suffix appended to a shortened name
pub const NAME_HASH_LEN: usize = 10;

// ============================================================================
// Package Install Values
// ============================================================================

/// Secret reference key used by the app catalog for inline package values
pub const APP_CATALOG_VALUES_KEY: &str = "inline-values";

/// Secret name used by TKG packages for the default values
pub const TKG_VALUES_SECRET_NAME: &str = "harbor-default-values";

/// CA secret cert-manager populates when no explicit CA source is configured
pub const DEFAULT_CA_SECRET_NAME: &str = "harbor-ca-key-pair";

// ============================================================================
// Injector Workload Constants
// ============================================================================

/// Default image for the injector container (needs only `/bin/sh` and `cp`)
pub const DEFAULT_INJECTOR_IMAGE: &str = "busybox:1.36";

/// Default node directory holding containerd per-registry trust configuration
pub const DEFAULT_NODE_CERTS_DIR: &str = "/etc/containerd/certs.d";

/// Container name of the injector
pub const INJECTOR_CONTAINER_NAME: &str = "cert-injector";

/// Mount point of the node's per-registry trust directory inside the injector
pub const INJECTOR_HOST_CERTS_MOUNT: &str = "/host-certs";

/// Mount point of the CA secret inside the injector
pub const INJECTOR_CA_MOUNT: &str = "/ca";

/// Grace period for injector pods
pub const INJECTOR_TERMINATION_GRACE_PERIOD_SECS: i64 = 30;

// ============================================================================
// Controller Error Handling Constants
// ============================================================================

/// Requeue duration for controller errors (30 seconds)
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

/// Requeue duration for converged resources (5 minutes)
pub const READY_REQUEUE_DURATION_SECS: u64 = 300;

/// Default upper bound for a single reconcile pass
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 30;

/// Field manager name used for server-side writes
pub const FIELD_MANAGER: &str = "cert-injector";

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Default bind address for the metrics and probe HTTP server
pub const METRICS_SERVER_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";
