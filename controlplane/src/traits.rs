use std::fmt::Debug;
use std::future::Future;

use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::{Api, Client, Resource};
use serde::{de::DeserializeOwned, Serialize};

use crate::{ObjectKey, Result};

/// Builds the typed API handle for a kind, depending on how the kind is scoped.
pub trait ApiScope {
    fn api<K>(client: Client, namespace: Option<&str>) -> Api<K>
    where
        K: Resource<Scope = Self, DynamicType = ()>;
}

impl ApiScope for NamespaceResourceScope {
    fn api<K>(client: Client, namespace: Option<&str>) -> Api<K>
    where
        K: Resource<Scope = Self, DynamicType = ()>,
    {
        match namespace {
            Some(namespace) => Api::namespaced(client, namespace),
            None => Api::all(client),
        }
    }
}

impl ApiScope for ClusterResourceScope {
    fn api<K>(client: Client, _: Option<&str>) -> Api<K>
    where
        K: Resource<Scope = Self, DynamicType = ()>,
    {
        Api::all(client)
    }
}

/// Any typed object the operator reads or writes.
pub trait Object:
    Resource<DynamicType = ()>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    fn api(client: Client, namespace: Option<&str>) -> Api<Self>;
}

impl<K> Object for K
where
    K: Resource<DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
    K::Scope: ApiScope,
{
    fn api(client: Client, namespace: Option<&str>) -> Api<Self> {
        <K::Scope as ApiScope>::api(client, namespace)
    }
}

/// Typed access to the cluster object store.
///
/// Lookups report an absent object as `Ok(None)`; every other failure is surfaced as an
/// error for the caller to classify. `replace` carries the `resourceVersion` of the object
/// it was given, so a concurrent write makes it fail with a conflict.
pub trait ObjectStore: Send + Sync {
    fn get_opt<K: Object>(
        &self,
        key: &ObjectKey,
    ) -> impl Future<Output = Result<Option<K>>> + Send;

    fn list<K: Object>(
        &self,
        namespace: Option<&str>,
    ) -> impl Future<Output = Result<Vec<K>>> + Send;

    fn create<K: Object>(&self, obj: &K) -> impl Future<Output = Result<K>> + Send;

    fn replace<K: Object>(&self, obj: &K) -> impl Future<Output = Result<K>> + Send;

    fn delete<K: Object>(&self, key: &ObjectKey) -> impl Future<Output = Result<()>> + Send;
}
