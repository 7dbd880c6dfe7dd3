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

//! In-memory [`ObjectStore`] with the semantics of the API server that the reconcilers
//! depend on: resource versions, uid assignment, conflicts, finalizer-gated deletion.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{TimeZone, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::{core::ErrorResponse, Resource, ResourceExt};
use serde_json::Value;

use crate::crds::{FrontendDeploy, FrontendDeploySpec, SandOpsIngress, SandOpsIngressSpec};
use crate::store::Failure;
use crate::utils::Owner;
use crate::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verb {
    Get,
    List,
    Create,
    Replace,
    Delete,
}

pub fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("injected {reason}"),
        reason: reason.to_string(),
        code,
    })
}

// Fixed point in time, `seconds` after the epoch.
pub fn timestamp(seconds: i64) -> metav1::Time {
    metav1::Time(Utc.timestamp_opt(seconds, 0).unwrap())
}

pub fn frontend_spec(is_host: bool) -> FrontendDeploySpec {
    FrontendDeploySpec {
        image_name: "registry.local/frontend:1.0".to_string(),
        port: 8080,
        replicas: None,
        node_name: None,
        is_host,
        environment_variables: None,
    }
}

pub fn frontend(name: &str, namespace: &str, spec: FrontendDeploySpec) -> FrontendDeploy {
    let mut obj = FrontendDeploy::new(name, spec);
    obj.metadata.namespace = Some(namespace.to_string());
    obj
}

pub fn sandops_ingress(name: &str, namespace: &str, created: i64) -> SandOpsIngress {
    let mut obj = SandOpsIngress::new(name, SandOpsIngressSpec {});
    obj.metadata.namespace = Some(namespace.to_string());
    obj.metadata.creation_timestamp = Some(timestamp(created));
    obj.metadata.uid = Some(format!("uid-{name}"));
    obj
}

// Owner identity of a FrontendDeploy in the default namespace.
pub fn owner_of(name: &str) -> Owner {
    let mut obj = frontend(name, "default", frontend_spec(false));
    obj.metadata.uid = Some(format!("uid-{name}"));
    Owner::of(&obj).unwrap()
}

// Owner identity of the `edge` SandOpsIngress in the default namespace.
pub fn edge_owner() -> Owner {
    Owner::of(&sandops_ingress("edge", "default", 0)).unwrap()
}

struct Fault {
    verb: Verb,
    path: String,
    code: u16,
    reason: String,
    remaining: usize,
}

type Hook = Box<dyn FnOnce(&mut Value) + Send>;

#[derive(Default)]
struct State {
    objects: BTreeMap<String, Value>,
    revision: u64,
    faults: Vec<Fault>,
    hooks: BTreeMap<String, Vec<Hook>>,
    calls: Vec<(Verb, String)>,
}

impl State {
    fn record(&mut self, verb: Verb, path: &str) -> Result<()> {
        self.calls.push((verb, path.to_string()));
        let fault = self
            .faults
            .iter_mut()
            .find(|f| f.verb == verb && f.path == path && f.remaining > 0);
        if let Some(fault) = fault {
            fault.remaining -= 1;
            return Err(Error::KubeError(api_error(fault.code, &fault.reason)));
        }
        Ok(())
    }

    fn next_revision(&mut self) -> String {
        self.revision += 1;
        self.revision.to_string()
    }

    fn insert<K: Object>(&mut self, obj: &K) -> Result<K> {
        let path = path::<K>(&key_of(obj));
        if self.objects.contains_key(&path) {
            return Err(Error::KubeError(api_error(409, "AlreadyExists")));
        }
        let rev = self.next_revision();
        let mut created = obj.clone();
        let meta = created.meta_mut();
        meta.resource_version = Some(rev.clone());
        meta.uid.get_or_insert_with(|| format!("uid-{rev}"));
        meta.creation_timestamp
            .get_or_insert_with(|| metav1::Time(Utc::now()));
        self.objects.insert(path, encode(&created));
        Ok(created)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

fn path<K: Object>(key: &ObjectKey) -> String {
    format!("{}/{}", K::url_path(&(), key.namespace.as_deref()), key.name)
}

fn key_of<K: Object>(obj: &K) -> ObjectKey {
    ObjectKey {
        name: obj.name_any(),
        namespace: obj.namespace(),
    }
}

fn encode<K: Object>(obj: &K) -> Value {
    serde_json::to_value(obj).unwrap()
}

fn decode<K: Object>(value: &Value) -> K {
    serde_json::from_value(value.clone()).unwrap()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Stores `obj` as if it had been created by somebody else; not recorded as a call.
    pub fn seed<K: Object>(&self, obj: K) -> K {
        self.lock().insert(&obj).unwrap()
    }

    pub fn get<K: Object>(&self, key: &ObjectKey) -> Option<K> {
        self.lock().objects.get(&path::<K>(key)).map(decode)
    }

    pub fn contains<K: Object>(&self, key: &ObjectKey) -> bool {
        self.get::<K>(key).is_some()
    }

    /// Makes the next `times` calls of `verb` on `key` fail with the given API error.
    pub fn fail<K: Object>(
        &self,
        verb: Verb,
        key: &ObjectKey,
        code: u16,
        reason: &str,
        times: usize,
    ) {
        self.lock().faults.push(Fault {
            verb,
            path: path::<K>(key),
            code,
            reason: reason.to_string(),
            remaining: times,
        });
    }

    /// Runs `write` against the stored object right before the next replace of `key`, as a
    /// concurrent writer would. The stored resource version moves on.
    pub fn before_replace<K: Object>(
        &self,
        key: &ObjectKey,
        write: impl FnOnce(&mut K) + Send + 'static,
    ) {
        let hook: Hook = Box::new(move |value: &mut Value| {
            let mut obj: K = decode(value);
            write(&mut obj);
            *value = encode(&obj);
        });
        self.lock().hooks.entry(path::<K>(key)).or_default().push(hook);
    }

    /// Sets the deletion timestamp, as the API server does for an object with finalizers.
    pub fn mark_deleted<K: Object>(&self, key: &ObjectKey) {
        let mut state = self.lock();
        let path = path::<K>(key);
        let rev = state.next_revision();
        let value = state.objects.get_mut(&path).unwrap();
        let mut obj: K = decode(value);
        obj.meta_mut().deletion_timestamp = Some(metav1::Time(Utc::now()));
        obj.meta_mut().resource_version = Some(rev);
        *value = encode(&obj);
    }

    pub fn calls(&self, verb: Verb) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter(|(v, _)| *v == verb)
            .map(|(_, path)| path.clone())
            .collect()
    }

    pub fn count<K: Object>(&self, verb: Verb, key: &ObjectKey) -> usize {
        let path = path::<K>(key);
        self.calls(verb).iter().filter(|p| **p == path).count()
    }
}

impl ObjectStore for MemoryStore {
    async fn get_opt<K: Object>(&self, key: &ObjectKey) -> Result<Option<K>> {
        let mut state = self.lock();
        let path = path::<K>(key);
        match state.record(Verb::Get, &path) {
            Err(error) if error.failure() == Failure::NotFound => return Ok(None),
            result => result?,
        }
        Ok(state.objects.get(&path).map(decode))
    }

    async fn list<K: Object>(&self, namespace: Option<&str>) -> Result<Vec<K>> {
        let mut state = self.lock();
        let prefix = format!("{}/", K::url_path(&(), namespace));
        state.record(Verb::List, &prefix)?;
        Ok(state
            .objects
            .iter()
            .filter(|(path, _)| {
                path.strip_prefix(&prefix)
                    .is_some_and(|name| !name.contains('/'))
            })
            .map(|(_, value)| decode(value))
            .collect())
    }

    async fn create<K: Object>(&self, obj: &K) -> Result<K> {
        let mut state = self.lock();
        state.record(Verb::Create, &path::<K>(&key_of(obj)))?;
        state.insert(obj)
    }

    async fn replace<K: Object>(&self, obj: &K) -> Result<K> {
        let mut state = self.lock();
        let path = path::<K>(&key_of(obj));
        state.record(Verb::Replace, &path)?;

        let hook = state
            .hooks
            .get_mut(&path)
            .and_then(|hooks| (!hooks.is_empty()).then(|| hooks.remove(0)));
        if let Some(hook) = hook {
            let rev = state.next_revision();
            if let Some(current) = state.objects.get_mut(&path) {
                hook(current);
                current["metadata"]["resourceVersion"] = Value::String(rev);
            }
        }

        let current: K = match state.objects.get(&path) {
            Some(value) => decode(value),
            None => return Err(Error::KubeError(api_error(404, "NotFound"))),
        };
        if obj.meta().resource_version.is_some()
            && obj.meta().resource_version != current.meta().resource_version
        {
            return Err(Error::KubeError(api_error(409, "Conflict")));
        }

        let mut next = obj.clone();
        next.meta_mut().resource_version = Some(state.next_revision());
        next.meta_mut().uid.clone_from(&current.meta().uid);
        next.meta_mut()
            .creation_timestamp
            .clone_from(&current.meta().creation_timestamp);
        next.meta_mut()
            .deletion_timestamp
            .clone_from(&current.meta().deletion_timestamp);
        if next.meta().deletion_timestamp.is_some() && next.finalizers().is_empty() {
            state.objects.remove(&path);
        } else {
            state.objects.insert(path, encode(&next));
        }
        Ok(next)
    }

    async fn delete<K: Object>(&self, key: &ObjectKey) -> Result<()> {
        let mut state = self.lock();
        let path = path::<K>(key);
        state.record(Verb::Delete, &path)?;
        let mut current: K = match state.objects.get(&path) {
            Some(value) => decode(value),
            None => return Err(Error::KubeError(api_error(404, "NotFound"))),
        };
        if current.finalizers().is_empty() {
            state.objects.remove(&path);
        } else if current.meta().deletion_timestamp.is_none() {
            current.meta_mut().deletion_timestamp = Some(metav1::Time(Utc::now()));
            current.meta_mut().resource_version = Some(state.next_revision());
            state.objects.insert(path, encode(&current));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;

    fn config_map(name: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn replace_with_stale_version_conflicts() {
        let store = MemoryStore::new();
        let key = ObjectKey::namespaced("default", "settings");
        let created = store.create(&config_map("settings")).await.unwrap();
        assert!(created.metadata.uid.is_some());

        store.before_replace::<ConfigMap>(&key, |cm| {
            cm.data = Some(BTreeMap::from([("k".to_string(), "v".to_string())]));
        });
        let err = store.replace(&created).await.unwrap_err();
        assert_eq!(err.failure(), Failure::Conflict);

        let current: ConfigMap = store.get_opt(&key).await.unwrap().unwrap();
        assert!(current.data.is_some());
        store.replace(&current).await.unwrap();
    }

    #[tokio::test]
    async fn list_stays_within_the_namespace() {
        let store = MemoryStore::new();
        store.seed(config_map("a"));
        let mut other = config_map("b");
        other.metadata.namespace = Some("other".to_string());
        store.seed(other);

        let found: Vec<ConfigMap> = store.list(Some("default")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name_any(), "a");
    }
}
