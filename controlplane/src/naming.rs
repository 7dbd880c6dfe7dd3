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

//! Names and labels of every dependent object, derived from the identity of the custom
//! resource that owns it.

use std::collections::BTreeMap;

use crate::consts::*;

// Service fronting the workload of a FrontendDeploy.
pub fn frontend_service_name(name: &str) -> String {
    format!("{name}-frontend-svc")
}

// Namespace holding the ingress-nginx stack of a SandOpsIngress.
pub fn namespace_scope(name: &str) -> String {
    format!("{name}-ns")
}

// Shared routing object of a namespace.
pub fn routing_ingress_name(namespace: &str) -> String {
    format!("{namespace}-ingress-service")
}

pub fn ingress_class_name(scope: &str) -> String {
    format!("nginx-{scope}")
}

pub fn ingress_class_controller(scope: &str) -> String {
    format!("k8s.io/ingress-nginx-{scope}")
}

pub fn cluster_role_binding_name(scope: &str) -> String {
    format!("{INGRESS_NGINX}-{scope}")
}

pub fn admission_cluster_role_binding_name(scope: &str) -> String {
    format!("{INGRESS_NGINX_ADMISSION}-{scope}")
}

pub fn admission_webhook_name(scope: &str) -> String {
    format!("{INGRESS_NGINX_ADMISSION}-{scope}")
}

// `<namespace>/<configmap>` reference handed to the ingress-nginx controller.
pub fn tcp_services_configmap(name: &str) -> String {
    let scope = namespace_scope(name);
    format!("{scope}/{scope}-tcp-service-cm")
}

/// Path pattern owned by a frontend on the shared routing object. Host frontends own the
/// catch-all root pattern, everything else is served under its own name.
pub fn route_pattern(name: &str, is_host: bool) -> String {
    if is_host {
        HOST_ROUTE_PATTERN.to_string()
    } else {
        format!("/{name}/?(.*)")
    }
}

/// Any replica count below `default` collapses to `default`.
pub fn replicas_or_default(replicas: Option<i32>, default: i32) -> i32 {
    replicas.map_or(default, |r| r.max(default))
}

pub fn node_selector(node_name: Option<&str>) -> Option<BTreeMap<String, String>> {
    match node_name {
        Some(node) if !node.is_empty() => Some(BTreeMap::from([(
            HOSTNAME_LABEL.to_string(),
            node.to_string(),
        )])),
        _ => None,
    }
}

pub fn frontend_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL.to_string(), name.to_string())])
}

/// Full label set stamped on the ingress-nginx objects of the given component.
pub fn ingress_labels(component: &str) -> BTreeMap<String, String> {
    let mut labels = ingress_selector(component);
    labels.insert(PART_OF_LABEL.to_string(), INGRESS_NGINX.to_string());
    labels.insert(VERSION_LABEL.to_string(), INGRESS_NGINX_VERSION.to_string());
    labels
}

pub fn ingress_selector(component: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (COMPONENT_LABEL.to_string(), component.to_string()),
        (INSTANCE_LABEL.to_string(), INGRESS_NGINX.to_string()),
        (NAME_LABEL.to_string(), INGRESS_NGINX.to_string()),
    ])
}

pub fn namespace_labels(scope: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (INSTANCE_LABEL.to_string(), INGRESS_NGINX.to_string()),
        (NAME_LABEL.to_string(), INGRESS_NGINX.to_string()),
        ("namespace".to_string(), scope.to_string()),
    ])
}
