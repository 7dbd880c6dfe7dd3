/*
Copyright 2024 The Kubernetes Authors.

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Access control objects of the ingress-nginx stack.

use k8s_openapi::api::rbac::v1::{
    ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef, Subject,
};

use crate::consts::*;
use crate::naming::*;
use crate::utils::Owner;

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn rule(api_group: &str, resources: &[&str], verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: Some(vec![api_group.to_string()]),
        resources: Some(strings(resources)),
        verbs: strings(verbs),
        ..Default::default()
    }
}

const READ: &[&str] = &["get", "list", "watch"];

fn controller_rules() -> Vec<PolicyRule> {
    vec![
        rule("", &["namespaces"], &["get"]),
        rule("", &["configmaps", "pods", "secrets", "endpoints"], READ),
        rule("", &["services"], READ),
        rule("networking.k8s.io", &["ingresses"], READ),
        rule("networking.k8s.io", &["ingresses/status"], &["update"]),
        rule("networking.k8s.io", &["ingressclasses"], READ),
        PolicyRule {
            resource_names: Some(strings(&["ingress-nginx-leader"])),
            ..rule("coordination.k8s.io", &["leases"], &["get", "update"])
        },
        rule("coordination.k8s.io", &["leases"], &["create"]),
        rule("", &["events"], &["create", "patch"]),
        rule("discovery.k8s.io", &["endpointslices"], &["list", "watch", "get"]),
    ]
}

fn controller_cluster_rules() -> Vec<PolicyRule> {
    vec![
        rule(
            "",
            &["configmaps", "endpoints", "nodes", "pods", "secrets", "namespaces"],
            &["list", "watch"],
        ),
        rule("coordination.k8s.io", &["leases"], &["list", "watch"]),
        rule("", &["nodes"], &["get"]),
        rule("", &["services"], READ),
        rule("networking.k8s.io", &["ingresses"], READ),
        rule("", &["events"], &["create", "patch"]),
        rule("networking.k8s.io", &["ingresses/status"], &["update"]),
        rule("networking.k8s.io", &["ingressclasses"], READ),
        rule("discovery.k8s.io", &["endpointslices"], &["list", "watch", "get"]),
    ]
}

pub fn build_controller_role(owner: &Owner) -> Role {
    let scope = namespace_scope(&owner.name);
    Role {
        metadata: owner.object_meta(INGRESS_NGINX, Some(&scope), ingress_labels(CONTROLLER)),
        rules: Some(controller_rules()),
    }
}

pub fn build_admission_role(owner: &Owner) -> Role {
    let scope = namespace_scope(&owner.name);
    Role {
        metadata: owner.object_meta(
            INGRESS_NGINX_ADMISSION,
            Some(&scope),
            ingress_labels(ADMISSION_WEBHOOK),
        ),
        rules: Some(vec![rule("", &["secrets"], &["get", "create"])]),
    }
}

// Cluster roles are shared by every installation and keep their fixed names.
pub fn build_controller_cluster_role(owner: &Owner) -> ClusterRole {
    ClusterRole {
        metadata: owner.object_meta(INGRESS_NGINX, None, ingress_labels(CONTROLLER)),
        rules: Some(controller_cluster_rules()),
        ..Default::default()
    }
}

pub fn build_admission_cluster_role(owner: &Owner) -> ClusterRole {
    ClusterRole {
        metadata: owner.object_meta(
            INGRESS_NGINX_ADMISSION,
            None,
            ingress_labels(ADMISSION_WEBHOOK),
        ),
        rules: Some(vec![rule(
            "admissionregistration.k8s.io",
            &["validatingwebhookconfigurations"],
            &["get", "update"],
        )]),
        ..Default::default()
    }
}

// Binds the role or cluster role called `role` to the service account of the same name.
fn binding(scope: &str, role_kind: &str, role: &str) -> (RoleRef, Vec<Subject>) {
    let role_ref = RoleRef {
        api_group: RBAC_API_GROUP.to_string(),
        kind: role_kind.to_string(),
        name: role.to_string(),
    };
    let subject = Subject {
        kind: "ServiceAccount".to_string(),
        name: role.to_string(),
        namespace: Some(scope.to_string()),
        ..Default::default()
    };
    (role_ref, vec![subject])
}

pub fn build_controller_role_binding(owner: &Owner) -> RoleBinding {
    let scope = namespace_scope(&owner.name);
    let (role_ref, subjects) = binding(&scope, "Role", INGRESS_NGINX);
    RoleBinding {
        metadata: owner.object_meta(INGRESS_NGINX, Some(&scope), ingress_labels(CONTROLLER)),
        role_ref,
        subjects: Some(subjects),
    }
}

pub fn build_admission_role_binding(owner: &Owner) -> RoleBinding {
    let scope = namespace_scope(&owner.name);
    let (role_ref, subjects) = binding(&scope, "Role", INGRESS_NGINX_ADMISSION);
    RoleBinding {
        metadata: owner.object_meta(
            INGRESS_NGINX_ADMISSION,
            Some(&scope),
            ingress_labels(ADMISSION_WEBHOOK),
        ),
        role_ref,
        subjects: Some(subjects),
    }
}

pub fn build_controller_cluster_role_binding(owner: &Owner) -> ClusterRoleBinding {
    let scope = namespace_scope(&owner.name);
    let (role_ref, subjects) = binding(&scope, "ClusterRole", INGRESS_NGINX);
    ClusterRoleBinding {
        metadata: owner.object_meta(
            cluster_role_binding_name(&scope),
            None,
            ingress_labels(CONTROLLER),
        ),
        role_ref,
        subjects: Some(subjects),
    }
}

pub fn build_admission_cluster_role_binding(owner: &Owner) -> ClusterRoleBinding {
    let scope = namespace_scope(&owner.name);
    let (role_ref, subjects) = binding(&scope, "ClusterRole", INGRESS_NGINX_ADMISSION);
    ClusterRoleBinding {
        metadata: owner.object_meta(
            admission_cluster_role_binding_name(&scope),
            None,
            ingress_labels(ADMISSION_WEBHOOK),
        ),
        role_ref,
        subjects: Some(subjects),
    }
}
