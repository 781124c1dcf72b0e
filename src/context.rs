// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for all controllers.
//!
//! Every controller receives an `Arc<Context>` holding:
//! - the object store all reads and writes go through
//! - the extractor registry, built once and read-only afterwards
//! - the owner-to-record index used for uniqueness lookups
//! - injector settings and the per-pass timeout
//! - the process shutdown token every pass derives its cancellation from

use crate::extractors::ExtractorRegistry;
use crate::injector::InjectorSettings;
use crate::reconcilers::records::RecordIndex;
use crate::store::ObjectStore;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Shared context passed to all controllers.
pub struct Context<S> {
    /// Backing object store
    pub store: S,

    /// Extractors keyed by source type
    pub extractors: ExtractorRegistry<S>,

    /// Owner key to record name index
    pub records: RecordIndex,

    /// Settings of the injector pods
    pub injector: InjectorSettings,

    /// Upper bound on a single reconcile pass
    pub reconcile_timeout: Duration,

    /// Cancelled once on process shutdown
    pub shutdown: CancellationToken,
}

impl<S: ObjectStore + 'static> Context<S> {
    /// Context with the built-in extractors and an empty record index.
    #[must_use]
    pub fn new(store: S, injector: InjectorSettings, reconcile_timeout: Duration) -> Self {
        Self {
            store,
            extractors: ExtractorRegistry::with_defaults(),
            records: RecordIndex::default(),
            injector,
            reconcile_timeout,
            shutdown: CancellationToken::new(),
        }
    }

    /// Replace the extractor registry.
    #[must_use]
    pub fn with_extractors(mut self, extractors: ExtractorRegistry<S>) -> Self {
        self.extractors = extractors;
        self
    }

    /// Token for one reconcile pass; cancelled on shutdown.
    #[must_use]
    pub fn pass_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}
