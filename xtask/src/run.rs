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

use std::{os::unix::process::CommandExt, process::Command};

use anyhow::{bail, Context as _};
use clap::Parser;

#[derive(Debug, Parser)]
pub struct Options {
    /// Build and run the release target
    #[clap(long)]
    pub release: bool,
    /// Arguments to pass to the controller
    #[clap(name = "args", last = true)]
    pub run_args: Vec<String>,
}

/// Build the controlplane
fn build_controlplane(opts: &Options) -> Result<(), anyhow::Error> {
    let mut args = vec!["build", "--package", "sandops-controlplane"];
    if opts.release {
        args.push("--release")
    }
    let status = Command::new("cargo")
        .args(&args)
        .status()
        .context("failed to run cargo")?;
    if !status.success() {
        bail!("cargo build exited with {status}");
    }
    Ok(())
}

pub fn run_controlplane(opts: Options) -> Result<(), anyhow::Error> {
    build_controlplane(&opts).context("Error while building controlplane")?;

    // profile we are building (release or debug)
    let profile = if opts.release { "release" } else { "debug" };
    let bin_path = format!("target/{}/controller", profile);

    // spawn the command
    let err = Command::new(&bin_path)
        .args(&opts.run_args)
        .env("RUST_LOG", "info")
        .exec();

    // we shouldn't get here unless the command failed to spawn
    Err(anyhow::Error::from(err).context(format!("Failed to run `{}`", bin_path)))
}
