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

use std::time::Duration;

use kube::Client;
use thiserror::Error;

pub use config::ControllerConfig;
pub use frontenddeploy_controller::controller as frontenddeploy_controller;
pub use sandopsingress_controller::controller as sandopsingress_controller;
pub use store::KubeStore;
pub use traits::{Object, ObjectStore};

pub mod config;
pub mod consts;
pub mod crds;
mod finalizer;
mod frontend_utils;
mod frontenddeploy_controller;
mod ingress_utils;
mod materializer;
pub mod naming;
mod rbac_utils;
mod routing;
mod sandopsingress_controller;
mod store;
#[cfg(test)]
mod testing;
mod traits;
mod utils;

// Context for our reconcilers
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Settings parsed at startup
    pub config: ControllerConfig,
}

impl Context {
    pub fn new(client: Client, config: ControllerConfig) -> Self {
        Self { client, config }
    }

    /// Object store used by a single reconciliation pass.
    pub fn store(&self) -> KubeStore {
        KubeStore::new(self.client.clone(), self.config.store_timeout())
    }

    // Failures expected to clear up on their own are retried sooner.
    pub fn retry_delay(&self, error: &Error) -> Duration {
        if error.is_transient() {
            self.config.transient_retry()
        } else {
            self.config.fatal_retry()
        }
    }
}

/// What a reconciliation pass did with its custom resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    /// Every dependent object is in place.
    Reconciled,
    /// Dependents were deleted and the finalizer released.
    TornDown,
    /// The custom resource is gone or no longer carries our finalizer.
    Removed,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("kube error: {0}")]
    KubeError(#[source] kube::Error),
    #[error("invalid configuration: `{0}`")]
    InvalidConfigError(String),
    #[error("error querying custom resource definitions: `{0}`; are the CRDs installed?")]
    CRDNotFoundError(#[source] kube::Error),
    #[error("object store call did not complete within {0:?}")]
    TimeoutError(Duration),
    #[error("no SandOpsIngress found in namespace `{0}` to anchor the routing object")]
    MissingAnchorError(String),
    #[error("routing object `{0}` still conflicting after {1} attempts")]
    RouteConflictError(String, u32),
    #[error("{0} `{1}` is still being deleted")]
    TeardownPendingError(String, String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Identifies a single object in the store; `namespace` is `None` for cluster-scoped kinds.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub name: String,
    pub namespace: Option<String>,
}

impl ObjectKey {
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }

    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}
