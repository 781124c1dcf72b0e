// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `records.rs`

#[cfg(test)]
mod tests {
    use crate::crd::{CertInjection, CertInjectionStatus, HarborCluster};
    use crate::identity::{OwnerKey, TypeIdentity};
    use crate::reconcilers::records::{find_record, new_record, record_name, RecordIndex};
    use crate::reconcilers::status::is_condition_true;
    use crate::status_reasons::CONDITION_TYPE_CA_READY;
    use crate::testing::{record, MemoryStore, TEST_NAMESPACE};
    use k8s_openapi::api::core::v1::{ObjectReference, Secret};
    use kube::ResourceExt;
    use tokio_util::sync::CancellationToken;

    fn secret_owner(name: &str) -> OwnerKey {
        OwnerKey::new(TEST_NAMESPACE, &TypeIdentity::of::<Secret>(), name)
    }

    fn labelled_record(name: &str, owner: &OwnerKey) -> CertInjection {
        let mut record = record(name);
        record.metadata.labels = Some(owner.derived_labels());
        record
    }

    #[test]
    fn test_record_name_uses_lowercase_kind() {
        assert_eq!(
            record_name(&TypeIdentity::of::<HarborCluster>(), "harbor"),
            "ca-injection-harborcluster-harbor"
        );
        assert_eq!(
            record_name(&TypeIdentity::of::<Secret>(), "harbor-ca"),
            "ca-injection-secret-harbor-ca"
        );
    }

    #[test]
    fn test_record_name_is_bounded_for_long_sources() {
        let shared = "a".repeat(250);
        let alpha = record_name(&TypeIdentity::of::<Secret>(), &format!("{shared}-alpha"));
        let beta = record_name(&TypeIdentity::of::<Secret>(), &format!("{shared}-beta"));

        assert!(alpha.len() <= 200);
        assert!(alpha.starts_with("ca-injection-secret-aaaa"));
        assert_ne!(alpha, beta);
        // Every derived name stays within the object name limit.
        assert!(format!("cert-injection-ds-{alpha}").len() <= 253);
    }

    #[test]
    fn test_new_record_starts_pending() {
        let owner = secret_owner("harbor-ca");
        let cert_source = ObjectReference {
            kind: Some("Secret".to_string()),
            name: Some("harbor-ca".to_string()),
            ..ObjectReference::default()
        };

        let record = new_record(&owner, &TypeIdentity::of::<Secret>(), None, cert_source.clone());

        assert_eq!(record.name_any(), "ca-injection-secret-harbor-ca");
        assert_eq!(record.namespace().as_deref(), Some(TEST_NAMESPACE));
        assert!(owner.matches(record.labels()));
        assert!(record.cert_secret_name().is_none());
        assert!(!is_condition_true(record.conditions(), CONDITION_TYPE_CA_READY));
        assert_eq!(
            record.status.as_ref().and_then(|s| s.cert_source.clone()),
            Some(cert_source)
        );
    }

    #[tokio::test]
    async fn test_find_record_falls_back_to_labels_and_indexes() {
        let store = MemoryStore::new();
        let index = RecordIndex::default();
        let owner = secret_owner("harbor-ca");
        store.insert(&labelled_record("ca-injection-secret-harbor-ca", &owner));
        store.insert(&labelled_record("unrelated", &secret_owner("other")));

        let found = find_record(&store, &index, &owner, &CancellationToken::new())
            .await
            .unwrap()
            .expect("record should be found");

        assert_eq!(found.name_any(), "ca-injection-secret-harbor-ca");
        assert_eq!(index.get(&owner).as_deref(), Some("ca-injection-secret-harbor-ca"));
    }

    #[tokio::test]
    async fn test_find_record_drops_stale_index_entry() {
        let store = MemoryStore::new();
        let index = RecordIndex::default();
        let owner = secret_owner("harbor-ca");
        index.insert(owner.clone(), "deleted-record".to_string());

        let found = find_record(&store, &index, &owner, &CancellationToken::new())
            .await
            .unwrap();

        assert!(found.is_none());
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_find_record_ignores_index_hit_with_foreign_labels() {
        let store = MemoryStore::new();
        let index = RecordIndex::default();
        let owner = secret_owner("harbor-ca");
        store.insert(&labelled_record("borrowed", &secret_owner("other")));
        index.insert(owner.clone(), "borrowed".to_string());

        let found = find_record(&store, &index, &owner, &CancellationToken::new())
            .await
            .unwrap();

        assert!(found.is_none());
        assert_eq!(index.len(), 0);
    }

    #[tokio::test]
    async fn test_find_record_skips_record_of_another_source() {
        let store = MemoryStore::new();
        let index = RecordIndex::default();
        let owner = secret_owner("harbor-ca");
        let mut foreign = labelled_record("ca-injection-secret-harbor-ca-2", &owner);
        foreign.status = Some(CertInjectionStatus {
            cert_source: Some(ObjectReference {
                kind: Some("Secret".to_string()),
                name: Some("harbor-ca-2".to_string()),
                ..ObjectReference::default()
            }),
            ..CertInjectionStatus::default()
        });
        store.insert(&foreign);

        let found = find_record(&store, &index, &owner, &CancellationToken::new())
            .await
            .unwrap();

        assert!(found.is_none());
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_find_record_with_duplicates_picks_one_deterministically() {
        let store = MemoryStore::new();
        let index = RecordIndex::default();
        let owner = secret_owner("harbor-ca");
        store.insert(&labelled_record("b-record", &owner));
        store.insert(&labelled_record("a-record", &owner));

        let found = find_record(&store, &index, &owner, &CancellationToken::new())
            .await
            .unwrap()
            .expect("record should be found");

        assert_eq!(found.name_any(), "a-record");
    }

    #[tokio::test]
    async fn test_find_record_cancelled() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = find_record(&store, &RecordIndex::default(), &secret_owner("x"), &cancel).await;

        assert!(result.is_err());
    }
}
