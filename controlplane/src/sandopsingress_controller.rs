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

use futures::StreamExt;
use std::{ops::Sub, sync::Arc, time::Instant};

use crate::*;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::{
    api::{Api, ListParams},
    runtime::{controller::Action, reflector::ObjectRef, watcher::Config, Controller},
    Resource, ResourceExt,
};

use consts::{INGRESS_FINALIZER, OWNER_NAMESPACE_LABEL};
use crds::SandOpsIngress;
use finalizer::FinalizerState;
use ingress_utils::*;
use materializer::{ensure, Outcome};
use rbac_utils::*;
use tracing::*;
use utils::Owner;

async fn ensure_component<S: ObjectStore>(
    store: &S,
    owner: &Owner,
    component: IngressComponent,
) -> Result<Outcome> {
    use IngressComponent as C;

    let key = component.key(owner);
    let outcome = match component {
        C::Namespace => ensure(store, &key, || build_namespace(owner)).await?.outcome,
        C::ServiceAccount => ensure(store, &key, || build_service_account(owner)).await?.outcome,
        C::AdmissionServiceAccount => {
            ensure(store, &key, || build_admission_service_account(owner))
                .await?
                .outcome
        }
        C::Role => ensure(store, &key, || build_controller_role(owner)).await?.outcome,
        C::AdmissionRole => ensure(store, &key, || build_admission_role(owner)).await?.outcome,
        C::ClusterRole => {
            ensure(store, &key, || build_controller_cluster_role(owner))
                .await?
                .outcome
        }
        C::AdmissionClusterRole => {
            ensure(store, &key, || build_admission_cluster_role(owner))
                .await?
                .outcome
        }
        C::RoleBinding => {
            ensure(store, &key, || build_controller_role_binding(owner))
                .await?
                .outcome
        }
        C::AdmissionRoleBinding => {
            ensure(store, &key, || build_admission_role_binding(owner))
                .await?
                .outcome
        }
        C::ClusterRoleBinding => {
            ensure(store, &key, || build_controller_cluster_role_binding(owner))
                .await?
                .outcome
        }
        C::AdmissionClusterRoleBinding => {
            ensure(store, &key, || build_admission_cluster_role_binding(owner))
                .await?
                .outcome
        }
        C::ConfigMap => ensure(store, &key, || build_config_map(owner)).await?.outcome,
        C::ControllerService => {
            ensure(store, &key, || build_controller_service(owner))
                .await?
                .outcome
        }
        C::AdmissionService => {
            ensure(store, &key, || build_admission_service(owner))
                .await?
                .outcome
        }
        C::ControllerDeployment => {
            ensure(store, &key, || build_controller_deployment(owner))
                .await?
                .outcome
        }
        C::AdmissionCreateJob => {
            ensure(store, &key, || build_admission_create_job(owner))
                .await?
                .outcome
        }
        C::AdmissionPatchJob => {
            ensure(store, &key, || build_admission_patch_job(owner))
                .await?
                .outcome
        }
        C::IngressClass => ensure(store, &key, || build_ingress_class(owner)).await?.outcome,
        C::AdmissionWebhook => {
            ensure(store, &key, || build_admission_webhook(owner))
                .await?
                .outcome
        }
    };
    Ok(outcome)
}

/// Runs one pass for the SandOpsIngress at `key`: installs its ingress-nginx stack, or tears
/// it down together with the routing object once deletion was requested.
pub async fn reconcile_ingress<S: ObjectStore>(store: &S, key: &ObjectKey) -> Result<PassOutcome> {
    let Some(ingress) = store.get_opt::<SandOpsIngress>(key).await? else {
        debug!(%key, "sandops ingress no longer exists");
        return Ok(PassOutcome::Removed);
    };

    let owner = match finalizer::state(&ingress, INGRESS_FINALIZER) {
        FinalizerState::Removed => return Ok(PassOutcome::Removed),
        FinalizerState::TearingDown => {
            let owner = Owner::of(&ingress)?;
            finalizer::teardown(store, &owner, &teardown_plan(&owner)).await?;
            finalizer::release(store, &ingress, INGRESS_FINALIZER).await?;
            return Ok(PassOutcome::TornDown);
        }
        FinalizerState::NoFinalizer => {
            let registered = finalizer::register(store, &ingress, INGRESS_FINALIZER).await?;
            Owner::of(&registered)?
        }
        FinalizerState::Registered => Owner::of(&ingress)?,
    };

    let mut created = 0;
    for component in CREATION_ORDER {
        if ensure_component(store, &owner, component).await? == Outcome::Created {
            created += 1;
        }
    }
    debug!(%key, created, "ingress stack in place");

    Ok(PassOutcome::Reconciled)
}

pub async fn reconcile(ingress: Arc<SandOpsIngress>, ctx: Arc<Context>) -> Result<Action> {
    let start = Instant::now();
    let key = ObjectKey::namespaced(
        ingress
            .namespace()
            .ok_or(Error::InvalidConfigError("missing namespace".to_string()))?,
        ingress.name_any(),
    );

    let outcome = reconcile_ingress(&ctx.store(), &key).await?;

    let duration = Instant::now().sub(start);
    info!(%key, ?outcome, "finished reconciling in {:?} ms", duration.as_millis());
    Ok(match outcome {
        PassOutcome::Reconciled => Action::requeue(ctx.config.resync()),
        PassOutcome::TornDown | PassOutcome::Removed => Action::await_change(),
    })
}

// Stack objects live in the `<name>-ns` namespace rather than next to their owner, so the
// owner's namespace comes from a label.
fn owning_ingress<K: Resource>(obj: K) -> Option<ObjectRef<SandOpsIngress>> {
    let namespace = obj.labels().get(OWNER_NAMESPACE_LABEL)?;
    let owner = obj
        .owner_references()
        .iter()
        .find(|r| r.controller == Some(true) && r.kind == SandOpsIngress::kind(&()))?;
    Some(ObjectRef::new(&owner.name).within(namespace))
}

pub async fn controller(ctx: Context) -> Result<()> {
    let ingresses = Api::<SandOpsIngress>::all(ctx.client.clone());
    ingresses
        .list(&ListParams::default().limit(1))
        .await
        .map_err(Error::CRDNotFoundError)?;

    let owned = Config::default().labels(OWNER_NAMESPACE_LABEL);
    Controller::new(ingresses, Config::default().any_semantic())
        .watches(
            Api::<Deployment>::all(ctx.client.clone()),
            owned.clone(),
            owning_ingress::<Deployment>,
        )
        .watches(
            Api::<Service>::all(ctx.client.clone()),
            owned.clone(),
            owning_ingress::<Service>,
        )
        .watches(
            Api::<ConfigMap>::all(ctx.client.clone()),
            owned,
            owning_ingress::<ConfigMap>,
        )
        .shutdown_on_signal()
        .run(reconcile, error_policy, Arc::new(ctx))
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

fn error_policy(ingress: Arc<SandOpsIngress>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!(name = %ingress.name_any(), "reconcile failed: {:?}", error);
    Action::requeue(ctx.retry_delay(error))
}
