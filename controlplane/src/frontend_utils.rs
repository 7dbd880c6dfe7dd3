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

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec, ResourceRequirements, Service,
    ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::core::ObjectMeta;

use crate::consts::*;
use crate::crds::FrontendDeploySpec;
use crate::naming::*;
use crate::utils::Owner;
use crate::ObjectKey;

pub fn service_key(owner: &Owner) -> ObjectKey {
    ObjectKey::namespaced(&owner.namespace, frontend_service_name(&owner.name))
}

pub fn deployment_key(owner: &Owner) -> ObjectKey {
    ObjectKey::namespaced(&owner.namespace, &owner.name)
}

// ClusterIP service exposing the frontend port on itself.
pub fn build_service(owner: &Owner, spec: &FrontendDeploySpec) -> Service {
    Service {
        metadata: owner.object_meta(
            frontend_service_name(&owner.name),
            Some(&owner.namespace),
            frontend_labels(&owner.name),
        ),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(frontend_labels(&owner.name)),
            ports: Some(vec![ServicePort {
                protocol: Some("TCP".to_string()),
                port: spec.port,
                target_port: Some(IntOrString::Int(spec.port)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn build_deployment(owner: &Owner, spec: &FrontendDeploySpec) -> Deployment {
    let labels = frontend_labels(&owner.name);
    let env = spec
        .environment_variables
        .iter()
        .flatten()
        .map(|var| EnvVar {
            name: var.name.clone(),
            value: Some(var.value.clone()),
            ..Default::default()
        })
        .collect();

    let container = Container {
        name: FRONTEND_CONTAINER.to_string(),
        image: Some(spec.image_name.clone()),
        env: Some(env),
        ports: Some(vec![ContainerPort {
            container_port: spec.port,
            ..Default::default()
        }]),
        resources: Some(ResourceRequirements {
            requests: Some(BTreeMap::from([(
                "cpu".to_string(),
                Quantity(FRONTEND_CPU_REQUEST.to_string()),
            )])),
            limits: Some(BTreeMap::from([(
                "cpu".to_string(),
                Quantity(FRONTEND_CPU_LIMIT.to_string()),
            )])),
            ..Default::default()
        }),
        ..Default::default()
    };

    Deployment {
        metadata: owner.object_meta(&owner.name, Some(&owner.namespace), labels.clone()),
        spec: Some(DeploymentSpec {
            replicas: Some(replicas_or_default(spec.replicas, 1)),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    node_selector: node_selector(spec.node_name.as_deref()),
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}
