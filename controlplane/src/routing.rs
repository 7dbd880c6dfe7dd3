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

//! The routing object shared by every frontend of a namespace.
//!
//! Each frontend owns exactly one path pattern. Entries are only ever appended, or have
//! their backend swapped in place, so contributions from other frontends survive any
//! number of concurrent passes.

use std::collections::BTreeMap;

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use kube::{Resource, ResourceExt};
use tracing::{debug, info};

use crate::consts::*;
use crate::crds::{FrontendDeploySpec, SandOpsIngress};
use crate::materializer::Outcome;
use crate::naming::*;
use crate::store::Failure;
use crate::utils::Owner;
use crate::*;

pub fn service_backend(service: &str, port: i32) -> IngressBackend {
    IngressBackend {
        service: Some(IngressServiceBackend {
            name: service.to_string(),
            port: Some(ServiceBackendPort {
                number: Some(port),
                ..Default::default()
            }),
        }),
        ..Default::default()
    }
}

fn route(pattern: &str, backend: IngressBackend) -> HTTPIngressPath {
    HTTPIngressPath {
        path: Some(pattern.to_string()),
        path_type: ROUTE_PATH_TYPE.to_string(),
        backend,
    }
}

/// Inserts or updates the entry for `pattern`. Returns true if `paths` changed.
pub fn merge_path(
    paths: &mut Vec<HTTPIngressPath>,
    pattern: &str,
    backend: &IngressBackend,
) -> bool {
    match paths.iter_mut().find(|p| p.path.as_deref() == Some(pattern)) {
        None => {
            paths.push(route(pattern, backend.clone()));
            true
        }
        Some(existing) if existing.backend != *backend => {
            existing.backend = backend.clone();
            true
        }
        Some(_) => false,
    }
}

// Only the first rule group of the routing object is managed.
fn first_rule_paths(ingress: &mut Ingress) -> &mut Vec<HTTPIngressPath> {
    let rules = ingress
        .spec
        .get_or_insert_with(IngressSpec::default)
        .rules
        .get_or_insert_with(Vec::new);
    if rules.is_empty() {
        rules.push(IngressRule::default());
    }
    &mut rules[0]
        .http
        .get_or_insert_with(HTTPIngressRuleValue::default)
        .paths
}

/// The oldest live SandOpsIngress of the namespace anchors its routing object.
pub async fn find_anchor<S: ObjectStore>(store: &S, namespace: &str) -> Result<SandOpsIngress> {
    let mut anchors: Vec<SandOpsIngress> = store
        .list::<SandOpsIngress>(Some(namespace))
        .await?
        .into_iter()
        .filter(|anchor| anchor.meta().deletion_timestamp.is_none())
        .collect();
    anchors.sort_by_key(|anchor| (anchor.creation_timestamp().map(|t| t.0), anchor.name_any()));
    anchors
        .into_iter()
        .next()
        .ok_or_else(|| Error::MissingAnchorError(namespace.to_string()))
}

pub fn build_routing_ingress(anchor: &Owner, first: HTTPIngressPath) -> Ingress {
    let scope = namespace_scope(&anchor.name);
    let mut metadata = anchor.object_meta(
        routing_ingress_name(&anchor.namespace),
        Some(&anchor.namespace),
        BTreeMap::new(),
    );
    metadata.annotations = Some(BTreeMap::from([
        (USE_REGEX_ANNOTATION.to_string(), "true".to_string()),
        (REWRITE_TARGET_ANNOTATION.to_string(), REWRITE_TARGET.to_string()),
        (PROXY_BODY_SIZE_ANNOTATION.to_string(), PROXY_BODY_SIZE.to_string()),
    ]));
    Ingress {
        metadata,
        spec: Some(IngressSpec {
            ingress_class_name: Some(ingress_class_name(&scope)),
            rules: Some(vec![IngressRule {
                http: Some(HTTPIngressRuleValue { paths: vec![first] }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Makes the routing object of the frontend's namespace send its pattern to its service.
///
/// Read, merge and write are retried when another writer got in between: a conflicting
/// resource version, a routing object created concurrently, or one deleted before the write.
pub async fn ensure_route<S: ObjectStore>(
    store: &S,
    frontend: &Owner,
    spec: &FrontendDeploySpec,
    attempts: u32,
) -> Result<Outcome> {
    let key = ObjectKey::namespaced(
        &frontend.namespace,
        routing_ingress_name(&frontend.namespace),
    );
    let pattern = route_pattern(&frontend.name, spec.is_host);
    let backend = service_backend(&frontend_service_name(&frontend.name), spec.port);

    for attempt in 1..=attempts {
        let written = match store.get_opt::<Ingress>(&key).await? {
            None => {
                let anchor = Owner::of(&find_anchor(store, &frontend.namespace).await?)?;
                let ingress = build_routing_ingress(&anchor, route(&pattern, backend.clone()));
                store.create(&ingress).await.map(|_| Outcome::Created)
            }
            Some(mut ingress) => {
                if !merge_path(first_rule_paths(&mut ingress), &pattern, &backend) {
                    debug!(%key, %pattern, "route already present");
                    return Ok(Outcome::AlreadySatisfied);
                }
                store.replace(&ingress).await.map(|_| Outcome::Updated)
            }
        };

        match written {
            Ok(outcome) => {
                info!(%key, %pattern, ?outcome, "route written");
                return Ok(outcome);
            }
            Err(error)
                if matches!(
                    error.failure(),
                    Failure::Conflict | Failure::AlreadyExists | Failure::NotFound
                ) =>
            {
                debug!(%key, attempt, %error, "routing object changed concurrently, retrying");
            }
            Err(error) => return Err(error),
        }
    }

    Err(Error::RouteConflictError(key.to_string(), attempts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{frontend_spec, owner_of, sandops_ingress, MemoryStore, Verb};

    fn routing_key() -> ObjectKey {
        ObjectKey::namespaced("default", "default-ingress-service")
    }

    fn entries(store: &MemoryStore) -> Vec<(String, String)> {
        let mut ingress = store.get::<Ingress>(&routing_key()).unwrap();
        first_rule_paths(&mut ingress)
            .iter()
            .map(|p| {
                (
                    p.path.clone().unwrap(),
                    p.backend.service.as_ref().unwrap().name.clone(),
                )
            })
            .collect()
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.seed(sandops_ingress("edge", "default", 100));
        store
    }

    #[test]
    fn merge_appends_unknown_patterns() {
        let mut paths = vec![];
        for name in ["a", "b", "c"] {
            let changed = merge_path(
                &mut paths,
                &route_pattern(name, false),
                &service_backend(&frontend_service_name(name), 80),
            );
            assert!(changed);
        }
        let patterns: Vec<_> = paths.iter().map(|p| p.path.clone().unwrap()).collect();
        assert_eq!(patterns, ["/a/?(.*)", "/b/?(.*)", "/c/?(.*)"]);
        assert!(paths.iter().all(|p| p.path_type == "ImplementationSpecific"));
    }

    #[test]
    fn merge_replaces_backend_in_place() {
        let mut paths = vec![];
        merge_path(&mut paths, "/a/?(.*)", &service_backend("a-frontend-svc", 80));
        merge_path(&mut paths, "/b/?(.*)", &service_backend("b-frontend-svc", 80));

        assert!(merge_path(&mut paths, "/a/?(.*)", &service_backend("a-frontend-svc", 81)));
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].backend, service_backend("a-frontend-svc", 81));
        assert_eq!(paths[1].backend, service_backend("b-frontend-svc", 80));
    }

    #[test]
    fn merge_of_identical_entry_is_a_no_op() {
        let mut paths = vec![];
        merge_path(&mut paths, "/a/?(.*)", &service_backend("a-frontend-svc", 80));
        let before = paths.clone();
        assert!(!merge_path(&mut paths, "/a/?(.*)", &service_backend("a-frontend-svc", 80)));
        assert_eq!(paths, before);
    }

    #[tokio::test]
    async fn host_then_named_frontend() {
        let store = seeded();
        let web = owner_of("web");
        let api = owner_of("api");

        let first = ensure_route(&store, &web, &frontend_spec(true), 5).await.unwrap();
        assert_eq!(first, Outcome::Created);
        let second = ensure_route(&store, &api, &frontend_spec(false), 5).await.unwrap();
        assert_eq!(second, Outcome::Updated);

        assert_eq!(
            entries(&store),
            [
                ("/?(.*)".to_string(), "web-frontend-svc".to_string()),
                ("/api/?(.*)".to_string(), "api-frontend-svc".to_string()),
            ]
        );

        let again = ensure_route(&store, &api, &frontend_spec(false), 5).await.unwrap();
        assert_eq!(again, Outcome::AlreadySatisfied);
        assert_eq!(store.count::<Ingress>(Verb::Replace, &routing_key()), 1);
    }

    #[tokio::test]
    async fn fresh_routing_object_is_anchored_and_annotated() {
        let store = seeded();
        ensure_route(&store, &owner_of("web"), &frontend_spec(true), 5)
            .await
            .unwrap();

        let ingress = store.get::<Ingress>(&routing_key()).unwrap();
        let annotations = ingress.annotations();
        assert_eq!(annotations[USE_REGEX_ANNOTATION], "true");
        assert_eq!(annotations[REWRITE_TARGET_ANNOTATION], "/$1");
        assert_eq!(annotations[PROXY_BODY_SIZE_ANNOTATION], "8m");
        assert_eq!(
            ingress.spec.as_ref().unwrap().ingress_class_name.as_deref(),
            Some("nginx-edge-ns")
        );
        let owner = &ingress.owner_references()[0];
        assert_eq!(owner.kind, "SandOpsIngress");
        assert_eq!(owner.name, "edge");
    }

    #[tokio::test]
    async fn oldest_live_anchor_owns_the_routing_object() {
        let store = MemoryStore::new();
        store.seed(sandops_ingress("newer", "default", 200));
        store.seed(sandops_ingress("older", "default", 100));
        store.seed(sandops_ingress("oldest", "other", 50));

        let anchor = find_anchor(&store, "default").await.unwrap();
        assert_eq!(anchor.name_any(), "older");

        store.mark_deleted::<SandOpsIngress>(&ObjectKey::namespaced("default", "older"));
        let anchor = find_anchor(&store, "default").await.unwrap();
        assert_eq!(anchor.name_any(), "newer");
    }

    #[tokio::test]
    async fn missing_anchor_is_retried_later() {
        let store = MemoryStore::new();
        let err = ensure_route(&store, &owner_of("web"), &frontend_spec(true), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingAnchorError(ref ns) if ns == "default"));
        assert!(err.is_transient());
        assert!(store.calls(Verb::Create).is_empty());
    }

    #[tokio::test]
    async fn concurrent_writer_is_not_clobbered() {
        let store = seeded();
        ensure_route(&store, &owner_of("web"), &frontend_spec(true), 5)
            .await
            .unwrap();

        // Another frontend lands its route between our read and our write.
        store.before_replace::<Ingress>(&routing_key(), |ingress| {
            merge_path(
                first_rule_paths(ingress),
                "/docs/?(.*)",
                &service_backend("docs-frontend-svc", 8080),
            );
        });
        let outcome = ensure_route(&store, &owner_of("api"), &frontend_spec(false), 5)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Updated);

        let patterns: Vec<String> = entries(&store).into_iter().map(|(p, _)| p).collect();
        assert_eq!(patterns, ["/?(.*)", "/docs/?(.*)", "/api/?(.*)"]);
        assert_eq!(store.count::<Ingress>(Verb::Replace, &routing_key()), 2);
    }

    #[tokio::test]
    async fn losing_the_creation_race_merges_into_the_winner() {
        let store = seeded();
        ensure_route(&store, &owner_of("web"), &frontend_spec(true), 5)
            .await
            .unwrap();
        // The first read misses the routing object another frontend just created.
        store.fail::<Ingress>(Verb::Get, &routing_key(), 404, "NotFound", 1);

        let outcome = ensure_route(&store, &owner_of("api"), &frontend_spec(false), 5)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Updated);
        assert_eq!(entries(&store).len(), 2);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let store = seeded();
        ensure_route(&store, &owner_of("web"), &frontend_spec(true), 5)
            .await
            .unwrap();
        store.fail::<Ingress>(Verb::Replace, &routing_key(), 409, "Conflict", 3);

        let err = ensure_route(&store, &owner_of("api"), &frontend_spec(false), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RouteConflictError(_, 3)));
        assert!(err.is_transient());
        assert_eq!(entries(&store).len(), 1);
    }

    #[tokio::test]
    async fn only_the_first_rule_group_is_touched() {
        let store = seeded();
        let anchor = owner_of_anchor(&store);
        let mut ingress = build_routing_ingress(
            &anchor,
            route("/?(.*)", service_backend("web-frontend-svc", 80)),
        );
        let other = IngressRule {
            host: Some("other.example.com".to_string()),
            http: Some(HTTPIngressRuleValue {
                paths: vec![route("/x", service_backend("x", 80))],
            }),
        };
        ingress.spec.as_mut().unwrap().rules.as_mut().unwrap().push(other.clone());
        store.seed(ingress);

        ensure_route(&store, &owner_of("api"), &frontend_spec(false), 5)
            .await
            .unwrap();
        let stored = store.get::<Ingress>(&routing_key()).unwrap();
        let rules = stored.spec.unwrap().rules.unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].http.as_ref().unwrap().paths.len(), 2);
        assert_eq!(rules[1], other);
    }

    fn owner_of_anchor(store: &MemoryStore) -> Owner {
        let anchor = store
            .get::<SandOpsIngress>(&ObjectKey::namespaced("default", "edge"))
            .unwrap();
        Owner::of(&anchor).unwrap()
    }
}
