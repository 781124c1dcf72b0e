// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status condition helpers for `CertInjection` records.
//!
//! Conditions are unique by type. They are updated in place by index, never appended
//! a second time, so repeated reconciliation can not grow the list.
//!
//! # Example
//!
//! ```rust,no_run
//! use cert_injector::reconcilers::status::{find_condition, upsert_condition};
//!
//! let mut conditions = Vec::new();
//! upsert_condition(&mut conditions, "Ready", "True", "Reconciled", "CA injection is in place");
//! assert!(find_condition(&conditions, "Ready").is_some());
//! ```

use crate::crd::Condition;
use crate::status_reasons::CONDITION_STATUS_TRUE;
use chrono::Utc;

/// Create a new condition with the current timestamp.
///
/// # Arguments
///
/// * `condition_type` - The type of condition (e.g., "Ready")
/// * `status` - "True" or "False"
/// * `reason` - A programmatic identifier in `CamelCase`
/// * `message` - A human-readable explanation
#[must_use]
pub fn create_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> Condition {
    Condition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        last_transition_time: Some(Utc::now().to_rfc3339()),
    }
}

/// Find a condition by type.
#[must_use]
pub fn find_condition<'a>(
    conditions: &'a [Condition],
    condition_type: &str,
) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}

/// Returns `true` if the condition of `condition_type` is present with status `True`.
#[must_use]
pub fn is_condition_true(conditions: &[Condition], condition_type: &str) -> bool {
    find_condition(conditions, condition_type).is_some_and(|c| c.status == CONDITION_STATUS_TRUE)
}

/// Insert a condition of `condition_type`, or flip the existing one to `status`.
///
/// An existing condition whose status already equals `status` is left untouched,
/// including its reason, message and transition time. On a flip the reason, message
/// and `lastTransitionTime` are refreshed.
///
/// # Returns
///
/// `true` if `conditions` changed.
pub fn upsert_condition(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> bool {
    match conditions.iter().position(|c| c.r#type == condition_type) {
        Some(idx) if conditions[idx].status == status => false,
        Some(idx) => {
            conditions[idx] = create_condition(condition_type, status, reason, message);
            true
        }
        None => {
            conditions.push(create_condition(condition_type, status, reason, message));
            true
        }
    }
}
