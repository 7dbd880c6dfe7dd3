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

use crate::store::Failure;
use crate::*;

use tracing::{debug, info};

/// What a materialization step did to the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated,
    AlreadySatisfied,
}

#[derive(Clone, Debug)]
pub struct Ensured<K> {
    pub object: K,
    pub outcome: Outcome,
}

// Get-or-create for a single dependent object. An existing object is returned untouched;
// `build` only runs when the object is missing.
pub async fn ensure<S, K, F>(store: &S, key: &ObjectKey, build: F) -> Result<Ensured<K>>
where
    S: ObjectStore,
    K: Object,
    F: FnOnce() -> K,
{
    let kind = K::kind(&());
    if let Some(object) = store.get_opt::<K>(key).await? {
        debug!(%kind, %key, "already present");
        return Ok(Ensured {
            object,
            outcome: Outcome::AlreadySatisfied,
        });
    }

    match store.create(&build()).await {
        Ok(object) => {
            info!(%kind, %key, "created");
            Ok(Ensured {
                object,
                outcome: Outcome::Created,
            })
        }
        Err(error) if error.failure() == Failure::AlreadyExists => {
            // A concurrent pass created it first; its object wins.
            debug!(%kind, %key, "created concurrently");
            let object = store
                .get_opt::<K>(key)
                .await?
                .ok_or(error)?;
            Ok(Ensured {
                object,
                outcome: Outcome::AlreadySatisfied,
            })
        }
        Err(error) => Err(error),
    }
}
