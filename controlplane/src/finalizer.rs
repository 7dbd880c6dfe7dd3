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

//! Finalizer-gated teardown of the objects owned by a custom resource.
//!
//! The marker is added before anything is created and removed only after every step of
//! the teardown plan has been confirmed, so the API server cannot drop the custom resource
//! while dependents are still around.

use k8s_openapi::api::admissionregistration::v1::ValidatingWebhookConfiguration;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::{Ingress, IngressClass};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use kube::ResourceExt;
use tracing::{debug, info};

use crate::store::Failure;
use crate::utils::Owner;
use crate::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinalizerState {
    NoFinalizer,
    Registered,
    TearingDown,
    Removed,
}

pub fn state<K: Object>(obj: &K, finalizer: &str) -> FinalizerState {
    let marked = obj.finalizers().iter().any(|f| f == finalizer);
    match (obj.meta().deletion_timestamp.is_some(), marked) {
        (false, false) => FinalizerState::NoFinalizer,
        (false, true) => FinalizerState::Registered,
        (true, true) => FinalizerState::TearingDown,
        (true, false) => FinalizerState::Removed,
    }
}

/// Every kind of object a teardown plan can name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DependentKind {
    Namespace,
    ServiceAccount,
    Role,
    ClusterRole,
    RoleBinding,
    ClusterRoleBinding,
    ConfigMap,
    Service,
    Deployment,
    Job,
    IngressClass,
    ValidatingWebhookConfiguration,
    Ingress,
}

impl DependentKind {
    async fn remove<S: ObjectStore>(self, store: &S, owner: &Owner, key: &ObjectKey) -> Result<()> {
        match self {
            Self::Namespace => remove::<S, Namespace>(store, owner, key).await,
            Self::ServiceAccount => remove::<S, ServiceAccount>(store, owner, key).await,
            Self::Role => remove::<S, Role>(store, owner, key).await,
            Self::ClusterRole => remove::<S, ClusterRole>(store, owner, key).await,
            Self::RoleBinding => remove::<S, RoleBinding>(store, owner, key).await,
            Self::ClusterRoleBinding => remove::<S, ClusterRoleBinding>(store, owner, key).await,
            Self::ConfigMap => remove::<S, ConfigMap>(store, owner, key).await,
            Self::Service => remove::<S, Service>(store, owner, key).await,
            Self::Deployment => remove::<S, Deployment>(store, owner, key).await,
            Self::Job => remove::<S, Job>(store, owner, key).await,
            Self::IngressClass => remove::<S, IngressClass>(store, owner, key).await,
            Self::ValidatingWebhookConfiguration => {
                remove::<S, ValidatingWebhookConfiguration>(store, owner, key).await
            }
            Self::Ingress => remove::<S, Ingress>(store, owner, key).await,
        }
    }
}

fn pending<K: Object>(key: &ObjectKey) -> Error {
    Error::TeardownPendingError(K::kind(&()).to_string(), key.to_string())
}

// Deletes the object at `key` if `owner` controls it and waits for it to be gone. Objects
// controlled by someone else, or by nobody, are left in place.
async fn remove<S: ObjectStore, K: Object>(
    store: &S,
    owner: &Owner,
    key: &ObjectKey,
) -> Result<()> {
    let kind = K::kind(&());
    let Some(current) = store.get_opt::<K>(key).await? else {
        debug!(%kind, %key, "already deleted");
        return Ok(());
    };
    if !owner.controls(&current) {
        debug!(%kind, %key, "not controlled by the owner, leaving it");
        return Ok(());
    }
    if current.meta().deletion_timestamp.is_some() {
        return Err(pending::<K>(key));
    }

    match store.delete::<K>(key).await {
        Ok(()) => debug!(%kind, %key, "deleted"),
        Err(error) if error.failure() == Failure::NotFound => {
            debug!(%kind, %key, "already deleted");
            return Ok(());
        }
        Err(error) => return Err(error),
    }

    // Namespaces and objects with finalizers of their own linger after the delete call.
    match store.get_opt::<K>(key).await? {
        Some(_) => Err(pending::<K>(key)),
        None => Ok(()),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TeardownStep {
    pub kind: DependentKind,
    pub key: ObjectKey,
}

impl TeardownStep {
    pub fn new(kind: DependentKind, key: ObjectKey) -> Self {
        Self { kind, key }
    }
}

// Adds the marker, persisting with the resource version that was read. A concurrent write
// fails the call with a conflict.
pub async fn register<S: ObjectStore, K: Object>(
    store: &S,
    obj: &K,
    finalizer: &str,
) -> Result<K> {
    let mut marked = obj.clone();
    marked.finalizers_mut().push(finalizer.to_string());
    let updated = store.replace(&marked).await?;
    info!(name = %obj.name_any(), %finalizer, "added finalizer");
    Ok(updated)
}

// Removes every step in order, waiting for each object to be gone before moving on. Any
// failure stops the walk so the next pass resumes from the same plan.
pub async fn teardown<S: ObjectStore>(
    store: &S,
    owner: &Owner,
    plan: &[TeardownStep],
) -> Result<()> {
    for step in plan {
        step.kind.remove(store, owner, &step.key).await?;
    }
    Ok(())
}

pub async fn release<S: ObjectStore, K: Object>(
    store: &S,
    obj: &K,
    finalizer: &str,
) -> Result<K> {
    let mut released = obj.clone();
    released.finalizers_mut().retain(|f| f != finalizer);
    let updated = store.replace(&released).await?;
    info!(name = %obj.name_any(), %finalizer, "removed finalizer");
    Ok(updated)
}
