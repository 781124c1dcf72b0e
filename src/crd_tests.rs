// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `crd.rs`

#[cfg(test)]
mod tests {
    use crate::crd::*;
    use kube::{CustomResourceExt, Resource};
    use serde_json::json;

    #[test]
    fn test_certinjection_crd_definition() {
        let crd = CertInjection::crd();

        assert_eq!(crd.spec.group, "day2-operations.goharbor.io");
        assert_eq!(crd.spec.names.kind, "CertInjection");
        assert_eq!(crd.spec.names.plural, "certinjections");
        assert_eq!(crd.spec.scope, "Namespaced");
        assert_eq!(
            crd.spec.names.short_names.as_deref(),
            Some(&["ci".to_string()][..])
        );

        let version = &crd.spec.versions[0];
        assert_eq!(version.name, "v1alpha1");
        assert!(version
            .subresources
            .as_ref()
            .and_then(|s| s.status.as_ref())
            .is_some());
    }

    #[test]
    fn test_certinjection_spec_wire_names() {
        let spec = CertInjectionSpec {
            external_dns: "reg.example.com".to_string(),
            cert_secret: SecretReference {
                name: "ca-secret-x".to_string(),
            },
        };

        let value = serde_json::to_value(&spec).unwrap();

        assert_eq!(
            value,
            json!({"externalDNS": "reg.example.com", "certSecret": {"name": "ca-secret-x"}})
        );
    }

    #[test]
    fn test_certinjection_status_omits_empty_references() {
        let status = CertInjectionStatus::default();

        let value = serde_json::to_value(&status).unwrap();

        assert_eq!(value, json!({"conditions": []}));
    }

    #[test]
    fn test_cert_secret_name_empty_is_none() {
        let mut record = CertInjection::new("r", CertInjectionSpec::default());
        assert!(record.cert_secret_name().is_none());
        assert!(record.conditions().is_empty());

        record.spec.cert_secret.name = "ca-secret-r".to_string();
        assert_eq!(record.cert_secret_name(), Some("ca-secret-r"));
    }

    #[test]
    fn test_harbor_cluster_parses_operator_manifest() {
        let cluster: HarborCluster = serde_json::from_value(json!({
            "apiVersion": "goharbor.io/v1beta1",
            "kind": "HarborCluster",
            "metadata": {"name": "harbor", "namespace": "harbor-system"},
            "spec": {
                "externalURL": "https://reg.example.com",
                "harborAdminPasswordRef": "admin",
                "expose": {"core": {"tls": {"certificateRef": "harbor-tls"}, "ingress": {}}}
            }
        }))
        .unwrap();

        assert_eq!(cluster.spec.external_url, "https://reg.example.com");
        assert_eq!(
            cluster.spec.expose.core.tls.map(|t| t.certificate_ref).as_deref(),
            Some("harbor-tls")
        );
        assert_eq!(HarborCluster::group(&()), "goharbor.io");
    }

    #[test]
    fn test_harbor_cluster_without_tls() {
        let spec: HarborClusterSpec =
            serde_json::from_value(json!({"externalURL": "http://reg.example.com"})).unwrap();

        assert!(spec.expose.core.tls.is_none());
    }

    #[test]
    fn test_package_install_values_refs() {
        let spec: PackageInstallSpec = serde_json::from_value(json!({
            "packageRef": {"refName": "harbor.tanzu.vmware.com"},
            "values": [
                {"secretRef": {"name": "harbor-default-values"}},
                {"secretRef": {"name": "harbor-values", "key": "inline-values"}}
            ]
        }))
        .unwrap();

        assert_eq!(spec.values.len(), 2);
        let second = spec.values[1].secret_ref.as_ref().unwrap();
        assert_eq!(second.name, "harbor-values");
        assert_eq!(second.key.as_deref(), Some("inline-values"));
        assert_eq!(PackageInstall::kind(&()), "PackageInstall");
    }
}
