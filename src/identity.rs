// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Type identities and owner keys.
//!
//! A [`TypeIdentity`] names a resource type by group, version and kind and is the key of
//! the extractor registry. An [`OwnerKey`] names one concrete object and is rendered
//! into the owner labels carried by every derived object, which is what uniqueness
//! lookups and selective watches match on.

use crate::labels::{
    label_value, K8S_MANAGED_BY, K8S_PART_OF, MANAGED_BY_CERT_INJECTOR, OWNER_GVK_LABEL,
    OWNER_NAME_LABEL, PART_OF_HARBOR,
};
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use std::fmt;

/// Group, version and kind of a resource type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeIdentity {
    group: String,
    version: String,
    kind: String,
}

impl TypeIdentity {
    /// Create an identity; `group` is empty for the core API group.
    #[must_use]
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Identity of a statically typed resource.
    #[must_use]
    pub fn of<K: Resource<DynamicType = ()>>() -> Self {
        Self::new(K::group(&()), K::version(&()), K::kind(&()))
    }

    /// Kind name, e.g. `HarborCluster`.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// `group/version`, or just `version` for the core group.
    #[must_use]
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Label-safe rendering: `Kind.version.group`, or `Kind.version` for the core group.
    #[must_use]
    pub fn label_value(&self) -> String {
        if self.group.is_empty() {
            format!("{}.{}", self.kind, self.version)
        } else {
            format!("{}.{}.{}", self.kind, self.version, self.group)
        }
    }
}

impl fmt::Display for TypeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version(), self.kind)
    }
}

/// Identity of one owning object: namespace, type and name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OwnerKey {
    namespace: String,
    gvk: String,
    name: String,
}

impl OwnerKey {
    /// Owner key for the object `name` of type `identity` in `namespace`.
    #[must_use]
    pub fn new(namespace: impl Into<String>, identity: &TypeIdentity, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            gvk: identity.label_value(),
            name: name.into(),
        }
    }

    /// Owner key of a statically typed object.
    #[must_use]
    pub fn of<K: Resource<DynamicType = ()>>(object: &K) -> Self {
        Self::new(
            object.namespace().unwrap_or_default(),
            &TypeIdentity::of::<K>(),
            object.name_any(),
        )
    }

    /// Namespace shared by the owner and everything derived from it.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Owner name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The two owner labels identifying this owner.
    #[must_use]
    pub fn selector_labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert(OWNER_GVK_LABEL.to_string(), self.gvk.clone());
        labels.insert(OWNER_NAME_LABEL.to_string(), label_value(&self.name));
        labels
    }

    /// Full label set stamped on objects derived from this owner.
    #[must_use]
    pub fn derived_labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.selector_labels();
        labels.insert(K8S_MANAGED_BY.to_string(), MANAGED_BY_CERT_INJECTOR.to_string());
        labels.insert(K8S_PART_OF.to_string(), PART_OF_HARBOR.to_string());
        labels
    }

    /// Returns `true` if `labels` carry both owner labels of this key.
    ///
    /// Names longer than a label value are carried as a prefix plus a hash of the full
    /// name, so distinct owners never share labels.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        labels.get(OWNER_GVK_LABEL) == Some(&self.gvk)
            && labels.get(OWNER_NAME_LABEL) == Some(&label_value(&self.name))
    }
}

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.gvk, self.namespace, self.name)
    }
}
