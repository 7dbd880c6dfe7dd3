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

use std::{fs, path::PathBuf};

use anyhow::Context as _;
use clap::Parser;
use kube::CustomResourceExt;
use sandops_controlplane::crds::{FrontendDeploy, SandOpsIngress};

#[derive(Debug, Parser)]
pub struct Options {
    /// Write the manifests to this file instead of stdout
    #[clap(short, long)]
    pub output: Option<PathBuf>,
}

/// Renders the custom resource definitions as a multi-document YAML stream.
pub fn render() -> Result<String, anyhow::Error> {
    let docs = [FrontendDeploy::crd(), SandOpsIngress::crd()]
        .iter()
        .map(serde_yaml::to_string)
        .collect::<Result<Vec<_>, _>>()
        .context("Error while serializing CRDs")?;
    Ok(docs.join("---\n"))
}

pub fn crdgen(opts: Options) -> Result<(), anyhow::Error> {
    let manifests = render()?;
    match opts.output {
        Some(path) => fs::write(&path, manifests)
            .with_context(|| format!("Failed to write `{}`", path.display())),
        None => {
            print!("{manifests}");
            Ok(())
        }
    }
}
