//! Schema of the module facts and global-reference JSON artifacts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::facts::FactsError;

/// A single function parameter as reported by the module analyzer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParamFact {
    pub name: String,
    /// Type descriptor (LLVM IR syntax).
    pub ty: String,
}

impl ParamFact {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self { name: name.into(), ty: ty.into() }
    }
}

/// Binary facts about one function.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionFact {
    pub name: String,
    pub start_addr: u64,
    pub end_addr: u64,
    pub return_type: String,
    pub parameters: Vec<ParamFact>,
}

impl FunctionFact {
    /// Convenience constructor for a function occupying `size` bytes at zero.
    pub fn sized(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            start_addr: 0,
            end_addr: size,
            return_type: "void".to_string(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: Vec<ParamFact>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Bytes of compiled code; zero if the address range is inverted.
    pub fn code_size(&self) -> u64 {
        self.end_addr.saturating_sub(self.start_addr)
    }
}

/// Binary facts about one global variable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GlobalFact {
    pub name: String,
    pub ty: String,
    pub storage: String,
    /// Read-only data; set by the IR scan.
    pub constant: bool,
}

impl GlobalFact {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self { name: name.into(), ty: ty.into(), storage: "global".to_string(), constant: false }
    }

    pub fn constant(mut self, constant: bool) -> Self {
        self.constant = constant;
        self
    }
}

// On-disk schema of `<obj>.config.json` as written by the decompiler.

#[derive(Debug, Deserialize)]
struct RawModule {
    #[serde(default)]
    functions: Vec<RawFunction>,
    #[serde(default)]
    globals: Vec<RawGlobal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFunction {
    name: String,
    start_addr: String,
    end_addr: String,
    #[serde(default)]
    return_type: Option<RawType>,
    #[serde(default)]
    parameters: Vec<RawParam>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawType {
    llvm_ir: String,
}

#[derive(Debug, Deserialize)]
struct RawParam {
    name: String,
    #[serde(rename = "type")]
    ty: RawType,
}

#[derive(Debug, Deserialize)]
struct RawGlobal {
    name: String,
    #[serde(rename = "type")]
    ty: RawType,
    #[serde(default)]
    storage: Option<serde_json::Value>,
    #[serde(default)]
    constant: bool,
}

// On-disk schema of the `<obj>.refs.json` sidecar written by the IR scan.
#[derive(Debug, Default, Deserialize)]
struct RawReferences {
    #[serde(default)]
    references: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    constants: Vec<String>,
}

fn parse_hex(function: &str, value: &str) -> Result<u64, FactsError> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u64::from_str_radix(digits, 16).map_err(|_| FactsError::BadAddress {
        function: function.to_string(),
        value: value.to_string(),
    })
}

fn storage_class(value: Option<serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Object(map)) => map
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or("global")
            .to_string(),
        _ => "global".to_string(),
    }
}

/// Parse a module facts document into function and global facts.
pub(crate) fn parse_module_json(
    body: &str,
) -> Result<(Vec<FunctionFact>, Vec<GlobalFact>), FactsError> {
    let raw: RawModule = serde_json::from_str(body)?;

    let functions = raw
        .functions
        .into_iter()
        .map(|f| {
            let start_addr = parse_hex(&f.name, &f.start_addr)?;
            let end_addr = parse_hex(&f.name, &f.end_addr)?;
            Ok(FunctionFact {
                start_addr,
                end_addr,
                return_type: f.return_type.map(|t| t.llvm_ir).unwrap_or_else(|| "void".into()),
                parameters: f
                    .parameters
                    .into_iter()
                    .map(|p| ParamFact { name: p.name, ty: p.ty.llvm_ir })
                    .collect(),
                name: f.name,
            })
        })
        .collect::<Result<Vec<_>, FactsError>>()?;

    let globals = raw
        .globals
        .into_iter()
        .map(|g| GlobalFact {
            name: g.name,
            ty: g.ty.llvm_ir,
            storage: storage_class(g.storage),
            constant: g.constant,
        })
        .collect();

    Ok((functions, globals))
}

/// Parse a global-reference sidecar into per-function reference lists and the
/// set of read-only globals.
pub(crate) fn parse_references_json(
    body: &str,
) -> Result<(BTreeMap<String, Vec<String>>, Vec<String>), FactsError> {
    let raw: RawReferences = serde_json::from_str(body)?;
    Ok((raw.references, raw.constants))
}
