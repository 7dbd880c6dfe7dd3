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

use sandops_controlplane::*;

use anyhow::Context as _;
use clap::Parser;
use kube::Client;
use tokio::try_join;
use tracing::*;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ControllerConfig::parse();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let client = Client::try_default()
        .await
        .context("failed to create kube Client")?;
    let ctx = Context::new(client, config);

    if let Err(error) = try_join!(
        frontenddeploy_controller(ctx.clone()),
        sandopsingress_controller(ctx),
    ) {
        error!("failed to start controllers: {error:?}");
        std::process::exit(1);
    }
    Ok(())
}
