// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The normalized value every extractor produces.

use std::fmt;

/// A registry CA to inject, independent of the source object it came from.
///
/// Built fresh on every extraction and never mutated afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct Injection {
    external_dns: String,
    ca_cert: Vec<u8>,
}

impl Injection {
    /// Create an injection for the registry reachable at `external_dns`.
    #[must_use]
    pub fn new(external_dns: impl Into<String>, ca_cert: impl Into<Vec<u8>>) -> Self {
        Self {
            external_dns: external_dns.into(),
            ca_cert: ca_cert.into(),
        }
    }

    /// External DNS name (`host[:port]`) of the registry.
    #[must_use]
    pub fn external_dns(&self) -> &str {
        &self.external_dns
    }

    /// Raw PEM bytes of the CA certificate.
    #[must_use]
    pub fn ca_cert(&self) -> &[u8] {
        &self.ca_cert
    }
}

// CA bytes are long and noisy in logs, only their size is printed.
impl fmt::Debug for Injection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injection")
            .field("external_dns", &self.external_dns)
            .field("ca_cert_len", &self.ca_cert.len())
            .finish()
    }
}
