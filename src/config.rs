// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Command-line and environment configuration of the operator.
//!
//! Every flag has an environment fallback so the operator can be configured from a
//! Deployment manifest without touching its arguments.
//!
//! ```bash
//! cert-injector --watch-namespace harbor-system --injector-image busybox:1.36
//! CERT_INJECTOR_NODE_CERTS_DIR=/etc/docker/certs.d cert-injector
//! ```

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;

use crate::constants::{
    DEFAULT_INJECTOR_IMAGE, DEFAULT_NODE_CERTS_DIR, DEFAULT_RECONCILE_TIMEOUT_SECS,
    METRICS_SERVER_BIND_ADDRESS,
};
use crate::injector::InjectorSettings;
use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Output format of the log lines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Compact human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Harbor registry CA injector for Kubernetes nodes
#[derive(Parser, Debug, Clone)]
#[command(name = "cert-injector", version, about, long_about = None)]
pub struct Config {
    /// Address the metrics and probe server listens on
    #[arg(
        long,
        env = "CERT_INJECTOR_METRICS_ADDR",
        default_value = METRICS_SERVER_BIND_ADDRESS
    )]
    pub metrics_bind_address: SocketAddr,

    /// Only watch sources in this namespace (defaults to all namespaces)
    #[arg(long, env = "CERT_INJECTOR_WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// Image of the injector pods; it needs `sh`, `cp` and `sleep`
    #[arg(
        long,
        env = "CERT_INJECTOR_IMAGE",
        default_value = DEFAULT_INJECTOR_IMAGE
    )]
    pub injector_image: String,

    /// Container runtime trust directory on the nodes
    #[arg(
        long,
        env = "CERT_INJECTOR_NODE_CERTS_DIR",
        default_value = DEFAULT_NODE_CERTS_DIR
    )]
    pub node_certs_dir: String,

    /// Upper bound on a single reconcile pass, in seconds
    #[arg(
        long,
        env = "CERT_INJECTOR_RECONCILE_TIMEOUT_SECS",
        default_value_t = DEFAULT_RECONCILE_TIMEOUT_SECS
    )]
    pub reconcile_timeout_secs: u64,

    /// Log output format
    #[arg(long, env = "RUST_LOG_FORMAT", value_enum, ignore_case = true, default_value_t)]
    pub log_format: LogFormat,
}

impl Config {
    /// Reject settings the operator cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error if the injector image is empty, the node trust directory is
    /// not absolute, or the reconcile timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.injector_image.trim().is_empty() {
            bail!("--injector-image must not be empty");
        }
        if !Path::new(&self.node_certs_dir).is_absolute() {
            bail!(
                "--node-certs-dir must be an absolute path, got {:?}",
                self.node_certs_dir
            );
        }
        if self.reconcile_timeout_secs == 0 {
            bail!("--reconcile-timeout-secs must be greater than zero");
        }
        Ok(())
    }

    /// Injector pod settings, with the trailing `/` of the certs dir removed.
    #[must_use]
    pub fn injector_settings(&self) -> InjectorSettings {
        InjectorSettings {
            image: self.injector_image.clone(),
            node_certs_dir: self.node_certs_dir.trim_end_matches('/').to_string(),
        }
    }

    /// Upper bound on a single reconcile pass.
    #[must_use]
    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }
}
