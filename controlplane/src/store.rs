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

use std::future::Future;
use std::time::Duration;

use kube::{
    api::{Api, DeleteParams, ListParams, PostParams},
    Client, ResourceExt,
};
use tracing::trace;

use crate::*;

/// How a failed store call must be treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Failure {
    NotFound,
    AlreadyExists,
    Conflict,
    Transient,
    Fatal,
}

// Classifies a failure reported by the API server or the transport underneath it.
pub fn classify(error: &kube::Error) -> Failure {
    match error {
        kube::Error::Api(response) => match response.code {
            404 => Failure::NotFound,
            409 if response.reason == "AlreadyExists" => Failure::AlreadyExists,
            409 => Failure::Conflict,
            429 | 500 | 502 | 503 | 504 => Failure::Transient,
            _ => Failure::Fatal,
        },
        kube::Error::HyperError(_) | kube::Error::Service(_) => Failure::Transient,
        _ => Failure::Fatal,
    }
}

impl Error {
    pub fn failure(&self) -> Failure {
        match self {
            Error::KubeError(error) => classify(error),
            Error::MissingAnchorError(_)
            | Error::RouteConflictError(..)
            | Error::TeardownPendingError(..) => Failure::Transient,
            _ => Failure::Fatal,
        }
    }

    /// Transient failures are expected to clear up on their own and are retried quickly.
    pub fn is_transient(&self) -> bool {
        matches!(self.failure(), Failure::Transient | Failure::Conflict)
    }
}

/// [`ObjectStore`] backed by the Kubernetes API server. Every call is bounded by `timeout`.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    timeout: Duration,
}

impl KubeStore {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn api<K: Object>(&self, namespace: Option<&str>) -> Api<K> {
        K::api(self.client.clone(), namespace)
    }

    async fn timed<T>(&self, call: impl Future<Output = kube::Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(Error::KubeError),
            Err(_) => Err(Error::TimeoutError(self.timeout)),
        }
    }
}

impl ObjectStore for KubeStore {
    async fn get_opt<K: Object>(&self, key: &ObjectKey) -> Result<Option<K>> {
        trace!(kind = %K::kind(&()), %key, "get");
        let api = self.api::<K>(key.namespace.as_deref());
        self.timed(api.get_opt(&key.name)).await
    }

    async fn list<K: Object>(&self, namespace: Option<&str>) -> Result<Vec<K>> {
        trace!(kind = %K::kind(&()), ?namespace, "list");
        let api = self.api::<K>(namespace);
        let list = self.timed(api.list(&ListParams::default())).await?;
        Ok(list.items)
    }

    async fn create<K: Object>(&self, obj: &K) -> Result<K> {
        trace!(kind = %K::kind(&()), name = %obj.name_any(), "create");
        let api = self.api::<K>(obj.namespace().as_deref());
        self.timed(api.create(&PostParams::default(), obj)).await
    }

    async fn replace<K: Object>(&self, obj: &K) -> Result<K> {
        trace!(kind = %K::kind(&()), name = %obj.name_any(), "replace");
        let api = self.api::<K>(obj.namespace().as_deref());
        let name = obj.name_any();
        self.timed(api.replace(&name, &PostParams::default(), obj))
            .await
    }

    async fn delete<K: Object>(&self, key: &ObjectKey) -> Result<()> {
        trace!(kind = %K::kind(&()), %key, "delete");
        let api = self.api::<K>(key.namespace.as_deref());
        self.timed(api.delete(&key.name, &DeleteParams::background()))
            .await
            .map(|_| ())
    }
}
