//! Contract deployment
//!
//! Deploys a compiled contract through the [`TransactionPipeline`]. Libraries
//! the contract links against are deployed first, recursively, through the
//! same pipeline; their addresses are then handed to a [`BytecodeFormatter`]
//! that assembles the creation bytecode.
//!
//! The whole link graph is checked, and every contract in it is run through
//! the formatter once with zero library addresses, before anything is
//! submitted. An unknown library, a runaway link chain or bytecode that does
//! not encode never leaves half a deployment behind.

mod linker;

pub use linker::{link_placeholder, SolcFormatter};

use crate::context::TransactionContext;
use crate::pipeline::{ConfirmationHooks, ExecutionResult, TransactionPipeline};
use crate::transaction::TransactionIntent;
use crate::{Error, Result};
use alloy::primitives::{Address, Bytes};
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Recursion limit for library linking
pub const DEFAULT_MAX_LINK_DEPTH: usize = 8;

/// Library addresses keyed by fully-qualified name (`file:Library`)
pub type LinkedLibraries = BTreeMap<String, Address>;

/// A library a contract must be linked against
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkReference {
    pub file: String,
    pub library: String,
}

impl LinkReference {
    pub fn new(file: impl Into<String>, library: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            library: library.into(),
        }
    }

    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.file, self.library)
    }
}

/// Compiler output for one contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractDescriptor {
    pub name: String,
    pub file: String,
    /// Hex creation bytecode, possibly containing link placeholders
    pub bytecode: String,
    #[serde(default)]
    pub abi: Value,
    #[serde(default)]
    pub link_references: Vec<LinkReference>,
}

impl ContractDescriptor {
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.file, self.name)
    }
}

/// Every contract produced by one compilation
#[derive(Debug, Clone, Default)]
pub struct CompilationUnit {
    contracts: BTreeMap<String, ContractDescriptor>,
}

impl CompilationUnit {
    pub fn new(contracts: impl IntoIterator<Item = ContractDescriptor>) -> Self {
        Self {
            contracts: contracts
                .into_iter()
                .map(|contract| (contract.qualified_name(), contract))
                .collect(),
        }
    }

    pub fn get(&self, qualified_name: &str) -> Option<&ContractDescriptor> {
        self.contracts.get(qualified_name)
    }

    pub fn library(&self, reference: &LinkReference) -> Result<&ContractDescriptor> {
        let name = reference.qualified_name();
        self.get(&name).ok_or(Error::UnknownLibrary(name))
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

/// Assembles creation bytecode from a compiled contract
pub trait BytecodeFormatter: Send + Sync {
    /// Link `libraries` into the bytecode and append the encoded constructor
    /// arguments
    fn encode_deploy_data(
        &self,
        contract: &ContractDescriptor,
        args: &[Value],
        libraries: &LinkedLibraries,
    ) -> std::result::Result<Bytes, String>;
}

/// A deployed contract and the libraries it was linked against
#[derive(Debug, Clone, Serialize)]
pub struct Deployment {
    pub contract: String,
    pub address: Address,
    pub libraries: LinkedLibraries,
    pub result: ExecutionResult,
}

pub struct DeploymentOrchestrator {
    pipeline: Arc<TransactionPipeline>,
    formatter: Arc<dyn BytecodeFormatter>,
    max_depth: usize,
}

impl DeploymentOrchestrator {
    pub fn new(pipeline: Arc<TransactionPipeline>, formatter: Arc<dyn BytecodeFormatter>) -> Self {
        Self {
            pipeline,
            formatter,
            max_depth: DEFAULT_MAX_LINK_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Deploy `contract`, first deploying every library it links against
    pub async fn deploy(
        &self,
        contract: &ContractDescriptor,
        args: &[Value],
        unit: &CompilationUnit,
        tx_context: &dyn TransactionContext,
        hooks: &dyn ConfirmationHooks,
    ) -> Result<Deployment> {
        let plan = self.plan(contract, unit)?;
        self.preflight(contract, args, &plan, unit)?;
        if !plan.is_empty() {
            info!(contract = %contract.name, libraries = ?plan, "Deploying linked libraries first");
        }

        let mut libraries = LinkedLibraries::new();
        self.deploy_linked(contract, args, unit, tx_context, hooks, 0, &mut libraries)
            .await
    }

    /// Deploy `contract` against libraries that are already on chain
    pub async fn deploy_with_links(
        &self,
        contract: &ContractDescriptor,
        args: &[Value],
        libraries: &LinkedLibraries,
        tx_context: &dyn TransactionContext,
        hooks: &dyn ConfirmationHooks,
    ) -> Result<Deployment> {
        for reference in &contract.link_references {
            let name = reference.qualified_name();
            if !libraries.contains_key(&name) {
                return Err(Error::UnknownLibrary(name));
            }
        }
        self.submit_creation(contract, args, libraries, tx_context, hooks)
            .await
    }

    /// Libraries `contract` needs, in deployment order
    ///
    /// Fails with `UnknownLibrary` or `LinkDepthExceeded` before anything is
    /// submitted.
    pub fn plan(&self, contract: &ContractDescriptor, unit: &CompilationUnit) -> Result<Vec<String>> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        self.visit(contract, unit, 0, &mut seen, &mut order)?;
        Ok(order)
    }

    /// Encode every planned contract against zero library addresses
    fn preflight(
        &self,
        contract: &ContractDescriptor,
        args: &[Value],
        plan: &[String],
        unit: &CompilationUnit,
    ) -> Result<()> {
        let stand_ins = |contract: &ContractDescriptor| -> LinkedLibraries {
            contract
                .link_references
                .iter()
                .map(|reference| (reference.qualified_name(), Address::ZERO))
                .collect()
        };

        for name in plan {
            let library = unit
                .get(name)
                .ok_or_else(|| Error::UnknownLibrary(name.clone()))?;
            self.formatter
                .encode_deploy_data(library, &[], &stand_ins(library))
                .map_err(Error::Formatter)?;
        }
        self.formatter
            .encode_deploy_data(contract, args, &stand_ins(contract))
            .map_err(Error::Formatter)?;
        Ok(())
    }

    fn visit(
        &self,
        contract: &ContractDescriptor,
        unit: &CompilationUnit,
        depth: usize,
        seen: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        if depth > self.max_depth {
            return Err(Error::LinkDepthExceeded(self.max_depth));
        }
        for reference in &contract.link_references {
            let name = reference.qualified_name();
            if seen.contains(&name) {
                continue;
            }
            let library = unit.library(reference)?;
            self.visit(library, unit, depth + 1, seen, order)?;
            seen.insert(name.clone());
            order.push(name);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn deploy_linked<'a>(
        &'a self,
        contract: &'a ContractDescriptor,
        args: &'a [Value],
        unit: &'a CompilationUnit,
        tx_context: &'a dyn TransactionContext,
        hooks: &'a dyn ConfirmationHooks,
        depth: usize,
        libraries: &'a mut LinkedLibraries,
    ) -> BoxFuture<'a, Result<Deployment>> {
        async move {
            if depth > self.max_depth {
                return Err(Error::LinkDepthExceeded(self.max_depth));
            }

            for reference in &contract.link_references {
                let name = reference.qualified_name();
                if libraries.contains_key(&name) {
                    continue;
                }
                let library = unit.library(reference)?;
                debug!(library = %name, depth = depth + 1, "Deploying library");
                let deployment = self
                    .deploy_linked(library, &[], unit, tx_context, hooks, depth + 1, libraries)
                    .await?;
                libraries.insert(name, deployment.address);
            }

            self.submit_creation(contract, args, libraries, tx_context, hooks)
                .await
        }
        .boxed()
    }

    async fn submit_creation(
        &self,
        contract: &ContractDescriptor,
        args: &[Value],
        libraries: &LinkedLibraries,
        tx_context: &dyn TransactionContext,
        hooks: &dyn ConfirmationHooks,
    ) -> Result<Deployment> {
        let data = self
            .formatter
            .encode_deploy_data(contract, args, libraries)
            .map_err(Error::Formatter)?;

        let intent = TransactionIntent::create(data).with_payload(json!({
            "contract": contract.name,
            "file": contract.file,
            "libraries": libraries,
        }));

        let errored = |source: Error| Error::CreationErrored {
            contract: contract.name.clone(),
            source: Box::new(source),
        };

        let result = match self.pipeline.submit(intent, tx_context, hooks).await {
            Ok(result) => result,
            Err(err) if err.is_cancellation() => return Err(err),
            Err(err) => {
                warn!(contract = %contract.name, error = %err, "Contract creation errored");
                return Err(errored(err));
            }
        };

        let address = result.created_address.ok_or_else(|| {
            errored(Error::CreationFailed(
                "no contract address was returned".to_string(),
            ))
        })?;
        info!(contract = %contract.name, %address, "Contract deployed");

        Ok(Deployment {
            contract: contract.name.clone(),
            address,
            libraries: libraries.clone(),
            result,
        })
    }
}
