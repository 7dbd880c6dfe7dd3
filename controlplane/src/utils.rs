use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::core::ObjectMeta;
use kube::ResourceExt;

use crate::consts::OWNER_NAMESPACE_LABEL;
use crate::*;

/// Identity of the custom resource that owns a set of dependent objects.
#[derive(Clone, Debug, PartialEq)]
pub struct Owner {
    pub name: String,
    pub namespace: String,
    pub reference: OwnerReference,
}

impl Owner {
    // Fails for objects the API server has not assigned an identity to yet.
    pub fn of<K: Object>(obj: &K) -> Result<Self> {
        let meta = obj.meta();
        let name = meta
            .name
            .clone()
            .ok_or(Error::InvalidConfigError("invalid name".to_string()))?;
        let namespace = meta
            .namespace
            .clone()
            .ok_or(Error::InvalidConfigError("invalid namespace".to_string()))?;
        let reference = obj
            .controller_owner_ref(&())
            .ok_or(Error::InvalidConfigError(format!("{name} has no uid")))?;
        Ok(Self {
            name,
            namespace,
            reference,
        })
    }

    /// Metadata of a dependent object; `namespace` is `None` for cluster-scoped kinds.
    pub fn object_meta(
        &self,
        name: impl Into<String>,
        namespace: Option<&str>,
        mut labels: BTreeMap<String, String>,
    ) -> ObjectMeta {
        labels.insert(OWNER_NAMESPACE_LABEL.to_string(), self.namespace.clone());
        ObjectMeta {
            name: Some(name.into()),
            namespace: namespace.map(str::to_string),
            labels: Some(labels),
            owner_references: Some(vec![self.reference.clone()]),
            ..Default::default()
        }
    }

    /// Whether `obj` names this owner as its controller.
    pub fn controls<K: Object>(&self, obj: &K) -> bool {
        obj.owner_references()
            .iter()
            .any(|r| r.controller == Some(true) && r.uid == self.reference.uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::{SandOpsIngress, SandOpsIngressSpec};
    use crate::testing::{edge_owner, sandops_ingress};
    use k8s_openapi::api::core::v1::ConfigMap;

    #[test]
    fn owner_reference_points_at_the_custom_resource() {
        let mut edge = SandOpsIngress::new("edge", SandOpsIngressSpec {});
        edge.metadata.namespace = Some("default".to_string());
        edge.metadata.uid = Some("uid-1".to_string());

        let owner = Owner::of(&edge).unwrap();
        assert_eq!(owner.namespace, "default");
        assert_eq!(owner.reference.kind, "SandOpsIngress");
        assert_eq!(owner.reference.api_version, "aasdev.sandtech.io/v1");
        assert_eq!(owner.reference.uid, "uid-1");
        assert_eq!(owner.reference.controller, Some(true));

        let meta = owner.object_meta("x", None, BTreeMap::new());
        assert_eq!(meta.namespace, None);
        assert_eq!(
            meta.labels,
            Some(BTreeMap::from([(
                "sandtech.io/owner-namespace".to_string(),
                "default".to_string()
            )]))
        );
        assert_eq!(meta.owner_references, Some(vec![owner.reference.clone()]));
    }

    #[test]
    fn only_the_controlling_owner_controls() {
        let owner = edge_owner();
        let owned = ConfigMap {
            metadata: owner.object_meta("settings", Some("default"), BTreeMap::new()),
            ..Default::default()
        };
        assert!(owner.controls(&owned));

        let other = Owner::of(&sandops_ingress("other", "default", 0)).unwrap();
        assert!(!other.controls(&owned));

        let mut referenced = owned.clone();
        referenced.metadata.owner_references = Some(vec![OwnerReference {
            controller: None,
            ..owner.reference.clone()
        }]);
        assert!(!owner.controls(&referenced));
        assert!(!owner.controls(&ConfigMap::default()));
    }

    #[test]
    fn owner_requires_an_identity() {
        let mut edge = SandOpsIngress::new("edge", SandOpsIngressSpec {});
        edge.metadata.namespace = Some("default".to_string());
        assert!(matches!(
            Owner::of(&edge),
            Err(Error::InvalidConfigError(_))
        ));
    }
}
