//! Compiled contract artifacts.
//!
//! Artifacts are read from the output directory of the contract toolchain. Both the hardhat
//! layout (`artifacts/contracts/Foo.sol/Foo.json` with a sibling `Foo.dbg.json`) and the foundry
//! layout (`out/Foo.sol/Foo.json`) are understood.

use std::path::{Path, PathBuf};

use alloy_core::{
    dyn_abi::{DynSolType, DynSolValue, Specifier},
    json_abi::JsonAbi,
    primitives::Bytes,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Compiler output needed to verify a contract on a block explorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    /// Full compiler version, e.g. `0.8.17+commit.8df45f5f`.
    pub solc_long_version: String,
    /// The standard-json input the contract was compiled from.
    pub input: Value,
}

/// A compiled contract.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub contract_name: String,
    /// Source unit the contract was declared in, e.g. `contracts/Foo.sol`.
    pub source_name: Option<String>,
    pub abi: JsonAbi,
    /// Creation bytecode, without constructor arguments.
    pub bytecode: Bytes,
    pub build_info: Option<BuildInfo>,
}

impl Artifact {
    /// ABI-encode constructor arguments given as strings.
    ///
    /// Each argument is coerced against the matching constructor input type, so `"42"`,
    /// `"0x70997970C51812dc3A010C7d01b50e0d17dc79C8"` and `"[1,2]"` are all valid for their
    /// respective types.
    pub fn encode_constructor_args(&self, args: &[String]) -> Result<Bytes> {
        let inputs = self
            .abi
            .constructor
            .as_ref()
            .map(|constructor| constructor.inputs.as_slice())
            .unwrap_or_default();

        if inputs.len() != args.len() {
            anyhow::bail!(
                "{} constructor expects {} argument(s), got {}",
                self.contract_name,
                inputs.len(),
                args.len()
            );
        }

        if inputs.is_empty() {
            return Ok(Bytes::new());
        }

        let values = inputs
            .iter()
            .zip(args)
            .map(|(param, raw)| {
                let ty: DynSolType = param
                    .resolve()
                    .with_context(|| format!("Unsupported constructor input type {}", param.ty))?;
                ty.coerce_str(raw).with_context(|| {
                    format!("Invalid value '{}' for constructor input {} {}", raw, param.ty, param.name)
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(DynSolValue::Tuple(values).abi_encode_params().into())
    }

    /// Build the deployment input: creation bytecode followed by the encoded arguments.
    pub fn init_code(&self, encoded_args: &Bytes) -> Bytes {
        let mut code = Vec::with_capacity(self.bytecode.len() + encoded_args.len());
        code.extend_from_slice(&self.bytecode);
        code.extend_from_slice(encoded_args);
        code.into()
    }
}

/// Supplies compiled artifacts by contract name.
pub trait ArtifactSource {
    fn artifact(&self, contract_name: &str) -> Result<Artifact>;
}

/// Bytecode as written by hardhat (plain hex) or foundry (`{ "object": "0x.." }`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    Hex(Bytes),
    Object { object: Bytes },
}

impl From<RawBytecode> for Bytes {
    fn from(raw: RawBytecode) -> Self {
        match raw {
            RawBytecode::Hex(bytes) | RawBytecode::Object { object: bytes } => bytes,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArtifact {
    #[serde(default)]
    contract_name: Option<String>,
    #[serde(default)]
    source_name: Option<String>,
    abi: JsonAbi,
    bytecode: RawBytecode,
}

/// Hardhat debug file pointing at the build info of an artifact.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebugFile {
    build_info: PathBuf,
}

/// Artifacts read from a compiler output directory.
#[derive(Debug, Clone)]
pub struct FsArtifacts {
    root: PathBuf,
}

impl FsArtifacts {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Find every `<name>.json` living in a `*.sol` directory below the root.
    fn find(&self, contract_name: &str) -> Result<Vec<PathBuf>> {
        let file_name = format!("{contract_name}.json");
        let mut found = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let entries = std::fs::read_dir(&dir)
                .with_context(|| format!("Failed to read artifacts directory {}", dir.display()))?;

            for entry in entries {
                let path = entry
                    .with_context(|| format!("Failed to list {}", dir.display()))?
                    .path();

                if path.is_dir() {
                    // build-info holds compiler inputs, never artifacts
                    if path.file_name().is_some_and(|name| name != "build-info") {
                        pending.push(path);
                    }
                } else if path.file_name().is_some_and(|name| name == file_name.as_str())
                    && dir.extension().is_some_and(|ext| ext == "sol")
                {
                    found.push(path);
                }
            }
        }

        found.sort();
        Ok(found)
    }

    fn load_build_info(artifact_path: &Path, contract_name: &str) -> Result<Option<BuildInfo>> {
        let dbg_path = artifact_path.with_file_name(format!("{contract_name}.dbg.json"));
        if !dbg_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&dbg_path)
            .with_context(|| format!("Failed to read {}", dbg_path.display()))?;
        let dbg: DebugFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", dbg_path.display()))?;

        let build_info_path = dbg_path
            .parent()
            .context("Debug file must have a parent directory")?
            .join(dbg.build_info);
        let content = std::fs::read_to_string(&build_info_path)
            .with_context(|| format!("Failed to read build info {}", build_info_path.display()))?;
        let build_info = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse build info {}", build_info_path.display()))?;

        Ok(Some(build_info))
    }
}

impl ArtifactSource for FsArtifacts {
    fn artifact(&self, contract_name: &str) -> Result<Artifact> {
        let mut candidates = self.find(contract_name)?;

        let path = match candidates.len() {
            0 => anyhow::bail!(
                "No artifact found for contract {} under {}. Was the project compiled?",
                contract_name,
                self.root.display()
            ),
            1 => candidates.remove(0),
            _ => anyhow::bail!(
                "Contract name {} is ambiguous, found artifacts: {}",
                contract_name,
                candidates
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read artifact {}", path.display()))?;
        let raw: RawArtifact = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse artifact {}", path.display()))?;

        let bytecode: Bytes = raw.bytecode.into();
        if bytecode.is_empty() {
            anyhow::bail!(
                "Artifact {} has no creation bytecode (abstract contract or interface?)",
                path.display()
            );
        }

        let build_info = Self::load_build_info(&path, contract_name)?;

        tracing::debug!(
            contract = %contract_name,
            path = %path.display(),
            bytecode_len = bytecode.len(),
            has_build_info = build_info.is_some(),
            "Artifact loaded"
        );

        Ok(Artifact {
            contract_name: raw.contract_name.unwrap_or_else(|| contract_name.to_string()),
            source_name: raw.source_name,
            abi: raw.abi,
            bytecode,
            build_info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempdir::TempDir;

    const COUNTER_BYTECODE: &str = "0x6080604052348015600f57600080fd5b50";

    fn write_json(path: &Path, value: &Value) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    }

    fn constructor_abi(inputs: Value) -> Value {
        json!([{ "type": "constructor", "stateMutability": "nonpayable", "inputs": inputs }])
    }

    #[test]
    fn test_hardhat_layout_with_build_info() {
        let dir = TempDir::new("emplace-artifacts").unwrap();
        let root = dir.path().join("artifacts");

        write_json(
            &root.join("contracts/Khafundme.sol/Khafundme.json"),
            &json!({
                "_format": "hh-sol-artifact-1",
                "contractName": "Khafundme",
                "sourceName": "contracts/Khafundme.sol",
                "abi": [],
                "bytecode": COUNTER_BYTECODE,
                "deployedBytecode": "0x6080",
            }),
        );
        write_json(
            &root.join("contracts/Khafundme.sol/Khafundme.dbg.json"),
            &json!({ "_format": "hh-sol-dbg-1", "buildInfo": "../../build-info/abc.json" }),
        );
        write_json(
            &root.join("build-info/abc.json"),
            &json!({ "solcLongVersion": "0.8.17+commit.8df45f5f", "input": { "language": "Solidity" } }),
        );

        let artifact = FsArtifacts::new(&root).artifact("Khafundme").unwrap();

        assert_eq!(artifact.contract_name, "Khafundme");
        assert_eq!(artifact.source_name.as_deref(), Some("contracts/Khafundme.sol"));
        assert_eq!(artifact.bytecode.to_string(), COUNTER_BYTECODE);
        let build_info = artifact.build_info.expect("build info should be loaded");
        assert_eq!(build_info.solc_long_version, "0.8.17+commit.8df45f5f");
        assert_eq!(build_info.input["language"], "Solidity");
    }

    #[test]
    fn test_foundry_layout() {
        let dir = TempDir::new("emplace-artifacts").unwrap();
        let root = dir.path().join("out");

        write_json(
            &root.join("Counter.sol/Counter.json"),
            &json!({
                "abi": [],
                "bytecode": { "object": COUNTER_BYTECODE, "linkReferences": {} },
            }),
        );

        let artifact = FsArtifacts::new(&root).artifact("Counter").unwrap();

        assert_eq!(artifact.contract_name, "Counter");
        assert_eq!(artifact.bytecode.to_string(), COUNTER_BYTECODE);
        assert!(artifact.build_info.is_none());
    }

    #[test]
    fn test_missing_artifact() {
        let dir = TempDir::new("emplace-artifacts").unwrap();
        let err = FsArtifacts::new(dir.path()).artifact("Nope").unwrap_err();
        assert!(err.to_string().contains("No artifact found"));
    }

    #[test]
    fn test_ambiguous_artifact() {
        let dir = TempDir::new("emplace-artifacts").unwrap();
        let artifact = json!({ "abi": [], "bytecode": COUNTER_BYTECODE });
        write_json(&dir.path().join("a/Token.sol/Token.json"), &artifact);
        write_json(&dir.path().join("b/Token.sol/Token.json"), &artifact);

        let err = FsArtifacts::new(dir.path()).artifact("Token").unwrap_err();
        assert!(err.to_string().contains("ambiguous"));
    }

    #[test]
    fn test_interface_without_bytecode_is_rejected() {
        let dir = TempDir::new("emplace-artifacts").unwrap();
        write_json(
            &dir.path().join("IToken.sol/IToken.json"),
            &json!({ "abi": [], "bytecode": "0x" }),
        );

        let err = FsArtifacts::new(dir.path()).artifact("IToken").unwrap_err();
        assert!(err.to_string().contains("no creation bytecode"));
    }

    #[test]
    fn test_encode_constructor_args() {
        let artifact = Artifact {
            contract_name: "Vault".to_string(),
            source_name: None,
            abi: serde_json::from_value(constructor_abi(json!([
                { "name": "owner", "type": "address", "internalType": "address" },
                { "name": "cap", "type": "uint256", "internalType": "uint256" },
            ])))
            .unwrap(),
            bytecode: COUNTER_BYTECODE.parse().unwrap(),
            build_info: None,
        };

        let encoded = artifact
            .encode_constructor_args(&[
                "0x70997970C51812dc3A010C7d01b50e0d17dc79C8".to_string(),
                "1000".to_string(),
            ])
            .unwrap();

        assert_eq!(encoded.len(), 64);
        assert_eq!(
            hex::encode(&encoded[..32]),
            "00000000000000000000000070997970c51812dc3a010c7d01b50e0d17dc79c8"
        );
        assert_eq!(encoded[63], 0xe8);
        assert_eq!(encoded[62], 0x03);

        let init_code = artifact.init_code(&encoded);
        assert_eq!(init_code.len(), artifact.bytecode.len() + 64);
        assert!(init_code.starts_with(&artifact.bytecode));
    }

    #[test]
    fn test_encode_rejects_wrong_arity_and_bad_values() {
        let artifact = Artifact {
            contract_name: "Vault".to_string(),
            source_name: None,
            abi: serde_json::from_value(constructor_abi(json!([
                { "name": "cap", "type": "uint256", "internalType": "uint256" },
            ])))
            .unwrap(),
            bytecode: COUNTER_BYTECODE.parse().unwrap(),
            build_info: None,
        };

        assert!(artifact.encode_constructor_args(&[]).is_err());
        assert!(artifact.encode_constructor_args(&["not-a-number".to_string()]).is_err());
    }

    #[test]
    fn test_no_constructor_encodes_empty() {
        let artifact = Artifact {
            contract_name: "Khafundme".to_string(),
            source_name: None,
            abi: JsonAbi::default(),
            bytecode: COUNTER_BYTECODE.parse().unwrap(),
            build_info: None,
        };

        assert!(artifact.encode_constructor_args(&[]).unwrap().is_empty());
        assert!(artifact.encode_constructor_args(&["1".to_string()]).is_err());
    }
}
