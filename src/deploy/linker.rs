//! Solidity bytecode linking and constructor encoding

use super::{BytecodeFormatter, ContractDescriptor, LinkedLibraries};
use alloy::dyn_abi::{DynSolValue, Specifier};
use alloy::hex;
use alloy::json_abi::JsonAbi;
use alloy::primitives::{keccak256, Bytes};
use serde_json::Value;

/// Placeholder solc leaves in unlinked bytecode: `__$` + 34 hex chars of the
/// keccak hash of the qualified library name + `$__`
pub fn link_placeholder(qualified_name: &str) -> String {
    let hash = hex::encode(keccak256(qualified_name.as_bytes()));
    format!("__${}$__", &hash[..34])
}

/// Formatter for solc output: substitutes library placeholders and
/// ABI-encodes constructor arguments from their JSON form
#[derive(Debug, Default, Clone, Copy)]
pub struct SolcFormatter;

impl SolcFormatter {
    fn link(contract: &ContractDescriptor, libraries: &LinkedLibraries) -> Result<String, String> {
        let mut code = contract
            .bytecode
            .trim()
            .trim_start_matches("0x")
            .to_string();

        for reference in &contract.link_references {
            let name = reference.qualified_name();
            let address = libraries
                .get(&name)
                .ok_or_else(|| format!("library {} is not linked", name))?;
            code = code.replace(&link_placeholder(&name), &hex::encode(address));
        }

        if code.contains("__$") {
            return Err(format!(
                "bytecode of {} still contains unresolved link placeholders",
                contract.name
            ));
        }
        Ok(code)
    }

    fn encode_args(contract: &ContractDescriptor, args: &[Value]) -> Result<Vec<u8>, String> {
        if args.is_empty() && contract.abi.is_null() {
            return Ok(Vec::new());
        }
        let abi: JsonAbi = serde_json::from_value(contract.abi.clone())
            .map_err(|e| format!("invalid ABI for {}: {}", contract.name, e))?;
        let inputs = abi
            .constructor
            .map(|constructor| constructor.inputs)
            .unwrap_or_default();

        if inputs.len() != args.len() {
            return Err(format!(
                "{} expects {} constructor arguments, got {}",
                contract.name,
                inputs.len(),
                args.len()
            ));
        }
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let values = inputs
            .iter()
            .zip(args)
            .map(|(param, arg)| {
                let ty = param
                    .resolve()
                    .map_err(|e| format!("unsupported parameter type {}: {}", param.ty, e))?;
                let text = match arg {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                ty.coerce_str(&text)
                    .map_err(|e| format!("invalid value for {}: {}", param.name, e))
            })
            .collect::<Result<Vec<_>, String>>()?;

        Ok(DynSolValue::Tuple(values).abi_encode_params())
    }
}

impl BytecodeFormatter for SolcFormatter {
    fn encode_deploy_data(
        &self,
        contract: &ContractDescriptor,
        args: &[Value],
        libraries: &LinkedLibraries,
    ) -> Result<Bytes, String> {
        let code = Self::link(contract, libraries)?;
        let mut data = hex::decode(&code)
            .map_err(|e| format!("invalid bytecode for {}: {}", contract.name, e))?;
        data.extend(Self::encode_args(contract, args)?);
        Ok(data.into())
    }
}
