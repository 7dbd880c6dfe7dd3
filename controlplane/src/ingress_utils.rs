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

//! The ingress-nginx installation owned by a SandOpsIngress, scoped to the `<name>-ns`
//! namespace.

use std::collections::BTreeMap;

use k8s_openapi::api::admissionregistration::v1::{
    RuleWithOperations, ServiceReference, ValidatingWebhook, ValidatingWebhookConfiguration,
    WebhookClientConfig,
};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Capabilities, ConfigMap, Container, ContainerPort, EnvVar, EnvVarSource, ExecAction,
    HTTPGetAction, Lifecycle, LifecycleHandler, Namespace, ObjectFieldSelector, PodSpec,
    PodTemplateSpec, Probe, ResourceRequirements, SeccompProfile, SecretVolumeSource,
    SecurityContext, Service, ServiceAccount, ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::api::networking::v1::{IngressClass, IngressClassSpec};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::core::ObjectMeta;

use crate::consts::*;
use crate::finalizer::{DependentKind, TeardownStep};
use crate::naming::*;
use crate::utils::Owner;
use crate::ObjectKey;

const WEBHOOK_CERT_VOLUME: &str = "webhook-cert";
const WEBHOOK_CERT_PATH: &str = "/usr/local/certificates/";

/// One object of the installation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngressComponent {
    Namespace,
    ServiceAccount,
    AdmissionServiceAccount,
    Role,
    AdmissionRole,
    ClusterRole,
    AdmissionClusterRole,
    RoleBinding,
    AdmissionRoleBinding,
    ClusterRoleBinding,
    AdmissionClusterRoleBinding,
    ConfigMap,
    ControllerService,
    AdmissionService,
    ControllerDeployment,
    AdmissionCreateJob,
    AdmissionPatchJob,
    IngressClass,
    AdmissionWebhook,
}

/// The namespace comes first since everything else but the cluster-scoped objects lives in it.
pub const CREATION_ORDER: [IngressComponent; 19] = [
    IngressComponent::Namespace,
    IngressComponent::ServiceAccount,
    IngressComponent::AdmissionServiceAccount,
    IngressComponent::Role,
    IngressComponent::AdmissionRole,
    IngressComponent::ClusterRole,
    IngressComponent::AdmissionClusterRole,
    IngressComponent::RoleBinding,
    IngressComponent::AdmissionRoleBinding,
    IngressComponent::ClusterRoleBinding,
    IngressComponent::AdmissionClusterRoleBinding,
    IngressComponent::ConfigMap,
    IngressComponent::ControllerService,
    IngressComponent::AdmissionService,
    IngressComponent::ControllerDeployment,
    IngressComponent::AdmissionCreateJob,
    IngressComponent::AdmissionPatchJob,
    IngressComponent::IngressClass,
    IngressComponent::AdmissionWebhook,
];

impl IngressComponent {
    pub fn kind(self) -> DependentKind {
        match self {
            Self::Namespace => DependentKind::Namespace,
            Self::ServiceAccount | Self::AdmissionServiceAccount => DependentKind::ServiceAccount,
            Self::Role | Self::AdmissionRole => DependentKind::Role,
            Self::ClusterRole | Self::AdmissionClusterRole => DependentKind::ClusterRole,
            Self::RoleBinding | Self::AdmissionRoleBinding => DependentKind::RoleBinding,
            Self::ClusterRoleBinding | Self::AdmissionClusterRoleBinding => {
                DependentKind::ClusterRoleBinding
            }
            Self::ConfigMap => DependentKind::ConfigMap,
            Self::ControllerService | Self::AdmissionService => DependentKind::Service,
            Self::ControllerDeployment => DependentKind::Deployment,
            Self::AdmissionCreateJob | Self::AdmissionPatchJob => DependentKind::Job,
            Self::IngressClass => DependentKind::IngressClass,
            Self::AdmissionWebhook => DependentKind::ValidatingWebhookConfiguration,
        }
    }

    pub fn key(self, owner: &Owner) -> ObjectKey {
        let scope = namespace_scope(&owner.name);
        let scoped = |name: &str| ObjectKey::namespaced(&scope, name);
        match self {
            Self::Namespace => ObjectKey::cluster(&scope),
            Self::ServiceAccount | Self::Role | Self::RoleBinding => scoped(INGRESS_NGINX),
            Self::AdmissionServiceAccount | Self::AdmissionRole | Self::AdmissionRoleBinding => {
                scoped(INGRESS_NGINX_ADMISSION)
            }
            Self::ClusterRole => ObjectKey::cluster(INGRESS_NGINX),
            Self::AdmissionClusterRole => ObjectKey::cluster(INGRESS_NGINX_ADMISSION),
            Self::ClusterRoleBinding => ObjectKey::cluster(cluster_role_binding_name(&scope)),
            Self::AdmissionClusterRoleBinding => {
                ObjectKey::cluster(admission_cluster_role_binding_name(&scope))
            }
            Self::ConfigMap | Self::ControllerService | Self::ControllerDeployment => {
                scoped(INGRESS_NGINX_CONTROLLER)
            }
            Self::AdmissionService => scoped(INGRESS_NGINX_CONTROLLER_ADMISSION),
            Self::AdmissionCreateJob => scoped(ADMISSION_CREATE_JOB),
            Self::AdmissionPatchJob => scoped(ADMISSION_PATCH_JOB),
            Self::IngressClass => ObjectKey::cluster(ingress_class_name(&scope)),
            Self::AdmissionWebhook => ObjectKey::cluster(admission_webhook_name(&scope)),
        }
    }
}

// Routing object of the anchor's namespace, then the installation in reverse creation order.
pub fn teardown_plan(owner: &Owner) -> Vec<TeardownStep> {
    let routing = TeardownStep::new(
        DependentKind::Ingress,
        ObjectKey::namespaced(&owner.namespace, routing_ingress_name(&owner.namespace)),
    );
    std::iter::once(routing)
        .chain(
            CREATION_ORDER
                .iter()
                .rev()
                .map(|c| TeardownStep::new(c.kind(), c.key(owner))),
        )
        .collect()
}

fn linux_only() -> Option<BTreeMap<String, String>> {
    Some(BTreeMap::from([(
        "kubernetes.io/os".to_string(),
        "linux".to_string(),
    )]))
}

fn field_env(name: &str, field_path: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: field_path.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn healthz_probe(failure_threshold: i32) -> Probe {
    Probe {
        failure_threshold: Some(failure_threshold),
        http_get: Some(HTTPGetAction {
            path: Some(HEALTHZ_PATH.to_string()),
            port: IntOrString::Int(HEALTHZ_PORT),
            scheme: Some("HTTP".to_string()),
            ..Default::default()
        }),
        initial_delay_seconds: Some(10),
        period_seconds: Some(10),
        success_threshold: Some(1),
        timeout_seconds: Some(1),
        ..Default::default()
    }
}

fn tcp_port(name: &str, port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port: port,
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

pub fn build_namespace(owner: &Owner) -> Namespace {
    let scope = namespace_scope(&owner.name);
    Namespace {
        metadata: owner.object_meta(&scope, None, namespace_labels(&scope)),
        ..Default::default()
    }
}

pub fn build_service_account(owner: &Owner) -> ServiceAccount {
    let scope = namespace_scope(&owner.name);
    ServiceAccount {
        metadata: owner.object_meta(INGRESS_NGINX, Some(&scope), ingress_labels(CONTROLLER)),
        automount_service_account_token: Some(true),
        ..Default::default()
    }
}

pub fn build_admission_service_account(owner: &Owner) -> ServiceAccount {
    let scope = namespace_scope(&owner.name);
    ServiceAccount {
        metadata: owner.object_meta(
            INGRESS_NGINX_ADMISSION,
            Some(&scope),
            ingress_labels(ADMISSION_WEBHOOK),
        ),
        automount_service_account_token: Some(true),
        ..Default::default()
    }
}

pub fn build_config_map(owner: &Owner) -> ConfigMap {
    let scope = namespace_scope(&owner.name);
    ConfigMap {
        metadata: owner.object_meta(
            INGRESS_NGINX_CONTROLLER,
            Some(&scope),
            ingress_labels(CONTROLLER),
        ),
        data: Some(BTreeMap::from([(
            "allow-snippet-annotations".to_string(),
            "true".to_string(),
        )])),
        ..Default::default()
    }
}

fn service_port(name: &str, port: i32, target: &str, app_protocol: &str) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        protocol: Some("TCP".to_string()),
        target_port: Some(IntOrString::String(target.to_string())),
        app_protocol: Some(app_protocol.to_string()),
        ..Default::default()
    }
}

fn controller_service(owner: &Owner, name: &str, type_: &str, ports: Vec<ServicePort>) -> Service {
    let scope = namespace_scope(&owner.name);
    Service {
        metadata: owner.object_meta(name, Some(&scope), ingress_labels(CONTROLLER)),
        spec: Some(ServiceSpec {
            type_: Some(type_.to_string()),
            ip_families: Some(vec!["IPv4".to_string()]),
            ip_family_policy: Some("SingleStack".to_string()),
            ports: Some(ports),
            selector: Some(ingress_selector(CONTROLLER)),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn build_controller_service(owner: &Owner) -> Service {
    controller_service(
        owner,
        INGRESS_NGINX_CONTROLLER,
        "LoadBalancer",
        vec![
            service_port("http", 80, "http", "http"),
            service_port("https", 443, "https", "https"),
        ],
    )
}

pub fn build_admission_service(owner: &Owner) -> Service {
    controller_service(
        owner,
        INGRESS_NGINX_CONTROLLER_ADMISSION,
        "ClusterIP",
        vec![service_port("https-webhook", 443, "webhook", "https")],
    )
}

fn controller_args(owner: &Owner) -> Vec<String> {
    let scope = namespace_scope(&owner.name);
    vec![
        "/nginx-ingress-controller".to_string(),
        "--election-id=ingress-nginx-leader".to_string(),
        format!("--controller-class={}", ingress_class_controller(&scope)),
        format!("--ingress-class={}", ingress_class_name(&scope)),
        format!("--configmap=$(POD_NAMESPACE)/{INGRESS_NGINX_CONTROLLER}"),
        "--validating-webhook=:8443".to_string(),
        format!("--validating-webhook-certificate={WEBHOOK_CERT_PATH}cert"),
        format!("--validating-webhook-key={WEBHOOK_CERT_PATH}key"),
        format!("--tcp-services-configmap={}", tcp_services_configmap(&owner.name)),
    ]
}

pub fn build_controller_deployment(owner: &Owner) -> Deployment {
    let scope = namespace_scope(&owner.name);
    let container = Container {
        name: CONTROLLER.to_string(),
        image: Some(CONTROLLER_IMAGE.to_string()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        args: Some(controller_args(owner)),
        env: Some(vec![
            field_env("POD_NAME", "metadata.name"),
            field_env("POD_NAMESPACE", "metadata.namespace"),
            EnvVar {
                name: "LD_PRELOAD".to_string(),
                value: Some("/usr/local/lib/libmimalloc.so".to_string()),
                ..Default::default()
            },
        ]),
        lifecycle: Some(Lifecycle {
            pre_stop: Some(LifecycleHandler {
                exec: Some(ExecAction {
                    command: Some(vec!["/wait-shutdown".to_string()]),
                }),
                ..Default::default()
            }),
            ..Default::default()
        }),
        liveness_probe: Some(healthz_probe(5)),
        readiness_probe: Some(healthz_probe(3)),
        ports: Some(vec![
            tcp_port("http", 80),
            tcp_port("https", 443),
            tcp_port("webhook", 8443),
        ]),
        resources: Some(ResourceRequirements {
            requests: Some(BTreeMap::from([
                ("cpu".to_string(), Quantity("100m".to_string())),
                ("memory".to_string(), Quantity("90Mi".to_string())),
            ])),
            ..Default::default()
        }),
        security_context: Some(SecurityContext {
            allow_privilege_escalation: Some(true),
            capabilities: Some(Capabilities {
                add: Some(vec!["NET_BIND_SERVICE".to_string()]),
                drop: Some(vec!["ALL".to_string()]),
            }),
            run_as_user: Some(101),
            ..Default::default()
        }),
        volume_mounts: Some(vec![VolumeMount {
            name: WEBHOOK_CERT_VOLUME.to_string(),
            mount_path: WEBHOOK_CERT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        }]),
        ..Default::default()
    };

    Deployment {
        metadata: owner.object_meta(
            INGRESS_NGINX_CONTROLLER,
            Some(&scope),
            ingress_labels(CONTROLLER),
        ),
        spec: Some(DeploymentSpec {
            min_ready_seconds: Some(0),
            revision_history_limit: Some(10),
            selector: LabelSelector {
                match_labels: Some(ingress_selector(CONTROLLER)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(ingress_labels(CONTROLLER)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    automount_service_account_token: Some(true),
                    containers: vec![container],
                    dns_policy: Some("ClusterFirst".to_string()),
                    node_selector: linux_only(),
                    service_account_name: Some(INGRESS_NGINX.to_string()),
                    termination_grace_period_seconds: Some(TERMINATION_GRACE_PERIOD_SECONDS),
                    volumes: Some(vec![Volume {
                        name: WEBHOOK_CERT_VOLUME.to_string(),
                        secret: Some(SecretVolumeSource {
                            secret_name: Some(INGRESS_NGINX_ADMISSION.to_string()),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

// One-shot certgen job running as the admission service account.
fn certgen_job(owner: &Owner, name: &str, container: &str, args: &[&str]) -> Job {
    let scope = namespace_scope(&owner.name);
    let labels = ingress_labels(ADMISSION_WEBHOOK);
    let container = Container {
        name: container.to_string(),
        image: Some(CERTGEN_IMAGE.to_string()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        args: Some(args.iter().map(|a| a.to_string()).collect()),
        env: Some(vec![field_env("POD_NAMESPACE", "metadata.namespace")]),
        security_context: Some(SecurityContext {
            allow_privilege_escalation: Some(false),
            capabilities: Some(Capabilities {
                drop: Some(vec!["ALL".to_string()]),
                ..Default::default()
            }),
            read_only_root_filesystem: Some(true),
            run_as_non_root: Some(true),
            run_as_user: Some(65532),
            seccomp_profile: Some(SeccompProfile {
                type_: "RuntimeDefault".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    };

    Job {
        metadata: owner.object_meta(name, Some(&scope), labels.clone()),
        spec: Some(JobSpec {
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    name: Some(name.to_string()),
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    node_selector: linux_only(),
                    restart_policy: Some("OnFailure".to_string()),
                    service_account_name: Some(INGRESS_NGINX_ADMISSION.to_string()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn build_admission_create_job(owner: &Owner) -> Job {
    certgen_job(
        owner,
        ADMISSION_CREATE_JOB,
        "create",
        &[
            "create",
            "--host=ingress-nginx-controller-admission,ingress-nginx-controller-admission.$(POD_NAMESPACE).svc",
            "--namespace=$(POD_NAMESPACE)",
            "--secret-name=ingress-nginx-admission",
        ],
    )
}

pub fn build_admission_patch_job(owner: &Owner) -> Job {
    certgen_job(
        owner,
        ADMISSION_PATCH_JOB,
        "patch",
        &[
            "patch",
            "--webhook-name=ingress-nginx-admission",
            "--namespace=$(POD_NAMESPACE)",
            "--patch-mutating=false",
            "--secret-name=ingress-nginx-admission",
            "--patch-failure-policy=Fail",
        ],
    )
}

pub fn build_ingress_class(owner: &Owner) -> IngressClass {
    let scope = namespace_scope(&owner.name);
    IngressClass {
        metadata: owner.object_meta(ingress_class_name(&scope), None, ingress_labels(CONTROLLER)),
        spec: Some(IngressClassSpec {
            controller: Some(ingress_class_controller(&scope)),
            ..Default::default()
        }),
    }
}

pub fn build_admission_webhook(owner: &Owner) -> ValidatingWebhookConfiguration {
    let scope = namespace_scope(&owner.name);
    let webhook = ValidatingWebhook {
        name: "validate.nginx.ingress.kubernetes.io".to_string(),
        client_config: WebhookClientConfig {
            service: Some(ServiceReference {
                name: INGRESS_NGINX_CONTROLLER_ADMISSION.to_string(),
                namespace: scope.clone(),
                path: Some("/networking/v1/ingresses".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        },
        failure_policy: Some("Fail".to_string()),
        match_policy: Some("Equivalent".to_string()),
        rules: Some(vec![RuleWithOperations {
            operations: Some(vec!["CREATE".to_string(), "UPDATE".to_string()]),
            api_groups: Some(vec!["networking.k8s.io".to_string()]),
            api_versions: Some(vec!["v1".to_string()]),
            resources: Some(vec!["ingresses".to_string()]),
            ..Default::default()
        }]),
        side_effects: "None".to_string(),
        admission_review_versions: vec!["v1".to_string()],
        ..Default::default()
    };

    ValidatingWebhookConfiguration {
        metadata: owner.object_meta(
            admission_webhook_name(&scope),
            None,
            ingress_labels(ADMISSION_WEBHOOK),
        ),
        webhooks: Some(vec![webhook]),
    }
}
