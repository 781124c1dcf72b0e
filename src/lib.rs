// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # cert-injector - Harbor registry CA injection for Kubernetes nodes
//!
//! A Kubernetes operator that makes every node's container runtime trust the
//! self-signed CA of a Harbor registry running in the cluster.
//!
//! ## Overview
//!
//! Harbor can be installed by the Harbor operator (`HarborCluster`), as a Carvel
//! package (`PackageInstall`) or by hand, in which case a labelled `Secret` carries the
//! CA. For each labelled source object the operator:
//!
//! - extracts the registry host and CA certificate with the extractor registered for
//!   the source type
//! - stores the CA in a CA secret owned by a `CertInjection` record
//! - runs a `DaemonSet` that copies the CA into `/etc/containerd/certs.d/<host>/ca.crt`
//!   on every node
//!
//! ## Modules
//!
//! - [`crd`] - `CertInjection` and the watched source resource types
//! - [`extractors`] - Per-source-type CA extraction and its registry
//! - [`ca_secret`] - CA secret synchronization
//! - [`injector`] - Injector `DaemonSet` synthesis
//! - [`reconcilers`] - Source and record reconciliation
//! - [`store`] - Object store abstraction over the Kubernetes API
//! - [`context`] - Shared controller context
//!
//! ## Example
//!
//! ```rust,no_run
//! use cert_injector::injection::Injection;
//!
//! let injection = Injection::new("reg.example.com", b"-----BEGIN CERTIFICATE-----".to_vec());
//! assert_eq!(injection.external_dns(), "reg.example.com");
//! ```

pub mod ca_secret;
pub mod config;
pub mod constants;
pub mod context;
pub mod crd;
pub mod errors;
pub mod extractors;
pub mod identity;
pub mod injection;
pub mod injector;
pub mod labels;
pub mod metrics;
pub mod reconcilers;
pub mod server;
pub mod status_reasons;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
mod crd_tests;
