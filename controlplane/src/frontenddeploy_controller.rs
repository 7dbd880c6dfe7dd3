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
use k8s_openapi::api::core::v1::Service;
use kube::{
    api::{Api, ListParams},
    runtime::{controller::Action, watcher::Config, Controller},
    ResourceExt,
};

use consts::FRONTEND_FINALIZER;
use crds::FrontendDeploy;
use finalizer::{DependentKind, FinalizerState, TeardownStep};
use frontend_utils::*;
use materializer::ensure;
use routing::ensure_route;
use tracing::*;
use utils::Owner;

// The routing entry stays behind on deletion; it belongs to the SandOpsIngress.
fn teardown_plan(owner: &Owner) -> Vec<TeardownStep> {
    vec![
        TeardownStep::new(DependentKind::Deployment, deployment_key(owner)),
        TeardownStep::new(DependentKind::Service, service_key(owner)),
    ]
}

/// Runs one pass for the FrontendDeploy at `key` against its current stored state.
pub async fn reconcile_frontend<S: ObjectStore>(
    store: &S,
    config: &ControllerConfig,
    key: &ObjectKey,
) -> Result<PassOutcome> {
    let Some(frontend) = store.get_opt::<FrontendDeploy>(key).await? else {
        debug!(%key, "frontend no longer exists");
        return Ok(PassOutcome::Removed);
    };

    let owner = match finalizer::state(&frontend, FRONTEND_FINALIZER) {
        FinalizerState::Removed => return Ok(PassOutcome::Removed),
        FinalizerState::TearingDown => {
            let owner = Owner::of(&frontend)?;
            finalizer::teardown(store, &owner, &teardown_plan(&owner)).await?;
            finalizer::release(store, &frontend, FRONTEND_FINALIZER).await?;
            return Ok(PassOutcome::TornDown);
        }
        FinalizerState::NoFinalizer => {
            let registered = finalizer::register(store, &frontend, FRONTEND_FINALIZER).await?;
            Owner::of(&registered)?
        }
        FinalizerState::Registered => Owner::of(&frontend)?,
    };

    let spec = &frontend.spec;
    ensure(store, &service_key(&owner), || build_service(&owner, spec)).await?;
    ensure(store, &deployment_key(&owner), || build_deployment(&owner, spec)).await?;
    ensure_route(store, &owner, spec, config.route_update_attempts).await?;

    Ok(PassOutcome::Reconciled)
}

pub async fn reconcile(frontend: Arc<FrontendDeploy>, ctx: Arc<Context>) -> Result<Action> {
    let start = Instant::now();
    let key = ObjectKey::namespaced(
        frontend
            .namespace()
            .ok_or(Error::InvalidConfigError("missing namespace".to_string()))?,
        frontend.name_any(),
    );

    let outcome = reconcile_frontend(&ctx.store(), &ctx.config, &key).await?;

    let duration = Instant::now().sub(start);
    info!(%key, ?outcome, "finished reconciling in {:?} ms", duration.as_millis());
    Ok(match outcome {
        PassOutcome::Reconciled => Action::requeue(ctx.config.resync()),
        PassOutcome::TornDown | PassOutcome::Removed => Action::await_change(),
    })
}

pub async fn controller(ctx: Context) -> Result<()> {
    let frontends = Api::<FrontendDeploy>::all(ctx.client.clone());
    frontends
        .list(&ListParams::default().limit(1))
        .await
        .map_err(Error::CRDNotFoundError)?;

    Controller::new(frontends, Config::default().any_semantic())
        .owns(Api::<Deployment>::all(ctx.client.clone()), Config::default())
        .owns(Api::<Service>::all(ctx.client.clone()), Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, Arc::new(ctx))
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

fn error_policy(frontend: Arc<FrontendDeploy>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!(name = %frontend.name_any(), "reconcile failed: {:?}", error);
    Action::requeue(ctx.retry_delay(error))
}
