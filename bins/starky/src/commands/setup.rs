//! `starky setup`: record the deployed contracts of an ABI file.

use std::path::Path;

use anyhow::{Context, Result};
use starky::abi::AbiRegistry;
use starky::config::ProjectConfig;

use crate::config::SetupArgs;

#[derive(Debug, PartialEq, Eq)]
pub enum SetupOutcome {
    /// Contracts were written to the config.
    Updated { contracts: usize },
    /// The config already lists contracts and `--force` was not given.
    AlreadyConfigured { contracts: usize },
    /// The ABI declares no deployed contract (compiled class).
    NothingDeployed,
}

pub fn setup_project(config_path: &Path, abi_file: &Path, force: bool) -> Result<SetupOutcome> {
    let mut project = ProjectConfig::load(config_path)?;

    if project.has_contracts() && !force {
        return Ok(SetupOutcome::AlreadyConfigured {
            contracts: project.contracts().len(),
        });
    }

    let registry = AbiRegistry::from_file(abi_file)
        .with_context(|| format!("Failed to load ABI file {}", abi_file.display()))?;
    let summary = registry.summary();
    tracing::info!(
        target: "starky::setup",
        format = %summary.format,
        contracts = summary.contracts,
        events = summary.total_events,
        functions = summary.total_functions,
        manifest_events = summary.manifest_events,
        "ABI parsed"
    );

    let addresses = registry.deployable_addresses();
    if addresses.is_empty() {
        return Ok(SetupOutcome::NothingDeployed);
    }

    project.apply_setup(&abi_file.to_string_lossy(), &addresses);
    project.save(config_path)?;

    for contract in registry.contracts().iter().filter(|c| c.is_deployed()) {
        tracing::info!(
            target: "starky::setup",
            name = %contract.name,
            address = %contract.address_label(),
            class_hash = %contract.class_hash_label(),
            "Contract recorded"
        );
    }

    Ok(SetupOutcome::Updated {
        contracts: addresses.len(),
    })
}

pub fn run(config_path: &Path, args: SetupArgs) -> Result<()> {
    tracing::info!(
        target: "starky::setup",
        abi_file = %args.abi_file.display(),
        config = %config_path.display(),
        "Setting up contracts from ABI file"
    );

    match setup_project(config_path, &args.abi_file, args.force)? {
        SetupOutcome::Updated { contracts } => {
            tracing::info!(
                target: "starky::setup",
                contracts,
                "Configuration updated, ready to run `starky ingest`"
            );
        }
        SetupOutcome::AlreadyConfigured { contracts } => {
            tracing::warn!(
                target: "starky::setup",
                contracts,
                "Contracts already configured, use --force to overwrite"
            );
        }
        SetupOutcome::NothingDeployed => {
            tracing::info!(
                target: "starky::setup",
                "No deployed contracts in ABI file (contract class), add addresses to \"contracts\" manually"
            );
        }
    }
    Ok(())
}
