// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for cert injection.
//!
//! This module provides the structured errors raised while extracting a CA from a
//! source object and while talking to the backing object store:
//!
//! - [`InjectionError`] - Extraction, configuration and lifecycle errors
//! - [`StoreError`] - Object store failures (conflicts, cancellation, API errors)
//!
//! Reconcilers wrap these errors with `anyhow` context as they travel up the call
//! stack. [`is_tls_not_enabled`] and [`is_terminal`] inspect the whole cause chain,
//! so a classification survives any amount of wrapping.

use thiserror::Error;

/// Errors raised while turning a source object into an injection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InjectionError {
    /// The source object lacks a setting the extractor requires.
    #[error("configuration error on {source_ref}: {reason}")]
    Config {
        /// `namespace/name` of the source object
        source_ref: String,
        /// What is missing or invalid
        reason: String,
    },

    /// The registry is not exposed over TLS, so there is no CA to inject yet.
    ///
    /// This is a steady state, not a failure: reconcilers log it and finish the pass.
    #[error("TLS is not enabled for {source_ref}")]
    TlsNotEnabled {
        /// `namespace/name` of the source object
        source_ref: String,
    },

    /// CA material could not be located.
    #[error("failed to extract CA from {source_ref}: {reason}")]
    Extraction {
        /// `namespace/name` of the source object
        source_ref: String,
        /// Why extraction failed
        reason: String,
    },

    /// A secret does not carry the expected data key.
    #[error("secret {namespace}/{name} has no '{key}' data")]
    MissingSecretKey {
        /// Secret namespace
        namespace: String,
        /// Secret name
        name: String,
        /// Expected data key
        key: String,
    },

    /// A payload could not be decoded.
    #[error("failed to decode {what}: {reason}")]
    Decode {
        /// What was being decoded
        what: String,
        /// Decoder error
        reason: String,
    },

    /// No extractor is registered for the source type. This is a wiring bug.
    #[error("no extractor registered for {type_identity}")]
    NoExtractor {
        /// Rendered type identity of the source object
        type_identity: String,
    },

    /// The source object is being deleted; its derived state must not be rebuilt.
    #[error("{kind} {namespace}/{name} is being deleted")]
    SourceDeleting {
        /// Source kind
        kind: String,
        /// Source namespace
        namespace: String,
        /// Source name
        name: String,
    },

    /// An extractor was handed a source object of another kind.
    #[error("extractor for {expected} received a {actual}")]
    UnexpectedSource {
        /// Kind the extractor handles
        expected: String,
        /// Kind it received
        actual: String,
    },
}

impl InjectionError {
    /// Returns `true` for errors that re-delivery of the same event cannot fix.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::NoExtractor { .. } | Self::SourceDeleting { .. } | Self::UnexpectedSource { .. }
        )
    }

    /// Short, metric-friendly category name.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config_error",
            Self::TlsNotEnabled { .. } => "tls_not_enabled",
            Self::Extraction { .. } | Self::MissingSecretKey { .. } => "extraction_error",
            Self::Decode { .. } => "decode_error",
            Self::NoExtractor { .. } | Self::UnexpectedSource { .. } => "wiring_error",
            Self::SourceDeleting { .. } => "source_deleting",
        }
    }
}

/// Errors raised by the backing object store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The object does not exist.
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        /// Object kind
        kind: String,
        /// Object namespace
        namespace: String,
        /// Object name
        name: String,
    },

    /// An object with the same name already exists.
    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        /// Object kind
        kind: String,
        /// Object namespace
        namespace: String,
        /// Object name
        name: String,
    },

    /// The object changed since it was read (optimistic concurrency failure).
    #[error("{kind} {namespace}/{name} was modified concurrently, re-read required")]
    Conflict {
        /// Object kind
        kind: String,
        /// Object namespace
        namespace: String,
        /// Object name
        name: String,
    },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// An object could not be encoded or decoded.
    #[error("failed to serialize object: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other API failure (transport, authorization, server errors).
    #[error("kubernetes API error: {0}")]
    Api(#[from] kube::Error),
}

impl StoreError {
    /// Short, metric-friendly category name.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::AlreadyExists { .. } => "already_exists",
            Self::Conflict { .. } => "conflict",
            Self::Cancelled => "cancelled",
            Self::Serialization(_) => "serialization_error",
            Self::Api(_) => "api_error",
        }
    }
}

/// Returns `true` if anything in the cause chain is [`InjectionError::TlsNotEnabled`].
#[must_use]
pub fn is_tls_not_enabled(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<InjectionError>(),
            Some(InjectionError::TlsNotEnabled { .. })
        )
    })
}

/// Returns `true` if anything in the cause chain is a terminal [`InjectionError`].
#[must_use]
pub fn is_terminal(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<InjectionError>()
            .is_some_and(InjectionError::is_terminal)
    })
}

/// Metric category of the outermost classified error in the chain.
#[must_use]
pub fn error_category(err: &anyhow::Error) -> &'static str {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<InjectionError>() {
            return e.category();
        }
        if let Some(e) = cause.downcast_ref::<StoreError>() {
            return e.category();
        }
    }
    "unknown"
}
