// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status condition types and reasons for `CertInjection` records.
//!
//! Reasons are programmatic identifiers in CamelCase that explain why a condition has
//! a particular status.
//!
//! # Condition Types
//!
//! - `CAReady` - the CA secret holds the extracted CA (set by the source reconcilers)
//! - `InjectorReady` - the injector `DaemonSet` exists (set by the record reconciler)
//! - `Ready` - the record is fully reconciled
//!
//! # Example Status
//!
//! ```yaml
//! status:
//!   conditions:
//!     - type: CAReady
//!       status: "True"
//!       reason: CAExtracted
//!       message: "CA of reg.example.com stored in ca-secret-ca-injection-secret-registry-ca"
//!     - type: InjectorReady
//!       status: "True"
//!       reason: InjectorCreated
//!       message: "DaemonSet cert-injection-ds-ca-injection-secret-registry-ca created"
//!     - type: Ready
//!       status: "True"
//!       reason: Reconciled
//!       message: "CA injection is in place"
//! ```

// ============================================================================
// Condition Types
// ============================================================================

/// The CA secret holds the extracted CA.
pub const CONDITION_TYPE_CA_READY: &str = "CAReady";

/// The injector `DaemonSet` exists.
pub const CONDITION_TYPE_INJECTOR_READY: &str = "InjectorReady";

/// The record is fully reconciled.
pub const CONDITION_TYPE_READY: &str = "Ready";

/// Condition status `True`.
pub const CONDITION_STATUS_TRUE: &str = "True";

/// Condition status `False`.
pub const CONDITION_STATUS_FALSE: &str = "False";

// ============================================================================
// Reasons
// ============================================================================

/// The record was built in memory and the CA secret has not been synchronized yet.
pub const REASON_CA_PENDING: &str = "CAPending";

/// The CA was extracted and stored in the CA secret.
pub const REASON_CA_EXTRACTED: &str = "CAExtracted";

/// The injector `DaemonSet` was created.
pub const REASON_INJECTOR_CREATED: &str = "InjectorCreated";

/// The record and everything derived from it are in place.
pub const REASON_RECONCILED: &str = "Reconciled";
