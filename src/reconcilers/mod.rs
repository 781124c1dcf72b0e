// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation logic of the cert-injector controllers.
//!
//! # Reconciliation Architecture
//!
//! Two kinds of controllers cooperate through the `CertInjection` record:
//!
//! 1. **Source controllers** - one per source kind (`HarborCluster`, `PackageInstall`,
//!    labelled `Secret`), all running [`reconcile_source`]. They extract the registry
//!    CA, store it in a CA secret and create or update the record.
//! 2. **Record controller** - runs [`reconcile_certinjection`], which creates the
//!    injector `DaemonSet` of each record and rebuilds it when the record changes.
//!
//! Every pass is idempotent: once converged, a pass reads but does not write.
//!
//! # Example: Reconciling a labelled secret
//!
//! ```rust,no_run
//! use cert_injector::context::Context;
//! use cert_injector::reconcilers::reconcile_source;
//! use cert_injector::store::KubeStore;
//! use k8s_openapi::api::core::v1::Secret;
//!
//! async fn reconcile(ctx: &Context<KubeStore>) -> anyhow::Result<()> {
//!     let cancel = ctx.pass_token();
//!     reconcile_source::<Secret, _>(ctx, "harbor-system", "harbor-ca", &cancel).await
//! }
//! ```

pub mod certinjection;
pub mod certsource;
pub mod records;
pub mod status;

#[cfg(test)]
mod records_tests;

pub use certinjection::reconcile_certinjection;
pub use certsource::reconcile_source;
