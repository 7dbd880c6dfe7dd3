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

use clap::Parser;

/// Runtime settings of the controllers.
#[derive(Debug, Clone, Parser)]
#[command(version, about = "Operator for FrontendDeploy and SandOpsIngress resources")]
pub struct ControllerConfig {
    /// Deadline in seconds for every call to the API server
    #[arg(long, default_value_t = 10)]
    pub store_timeout_secs: u64,
    /// Delay in seconds before a successfully reconciled resource is checked again
    #[arg(long, default_value_t = 300)]
    pub resync_secs: u64,
    /// Retry delay in seconds after a transient failure (conflicts, server errors)
    #[arg(long, default_value_t = 5)]
    pub transient_retry_secs: u64,
    /// Retry delay in seconds after any other failure
    #[arg(long, default_value_t = 60)]
    pub fatal_retry_secs: u64,
    /// Read-merge-replace attempts on the shared routing object before giving up the pass
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u32).range(1..))]
    pub route_update_attempts: u32,
}

impl ControllerConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    pub fn resync(&self) -> Duration {
        Duration::from_secs(self.resync_secs)
    }

    pub fn transient_retry(&self) -> Duration {
        Duration::from_secs(self.transient_retry_secs)
    }

    pub fn fatal_retry(&self) -> Duration {
        Duration::from_secs(self.fatal_retry_secs)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::parse_from(["controller"])
    }
}
