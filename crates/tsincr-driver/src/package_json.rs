//! Package.json metadata used for package resolution

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ResolveError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageJson {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub main: Option<String>,
    #[serde(default)]
    pub types: Option<String>,
    /// Older alias of `types`
    #[serde(default)]
    pub typings: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub exports: Option<Value>,
    #[serde(default)]
    pub dependencies: HashMap<String, String>,
    #[serde(default)]
    pub dev_dependencies: HashMap<String, String>,
}

/// Entry points of the `"."` export
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageExports {
    pub types: Option<String>,
    pub default: Option<String>,
}

impl PackageJson {
    /// `types`, falling back to `typings`
    pub fn types_entry(&self) -> Option<&str> {
        self.types.as_deref().or(self.typings.as_deref())
    }

    /// The root export, from either `"exports": "./x.js"`,
    /// `"exports": { ".": ... }` or a bare condition object.
    pub fn root_export(&self) -> Option<PackageExports> {
        let exports = self.exports.as_ref()?;
        let root = match exports {
            Value::Object(map) if map.contains_key(".") => &map["."],
            other => other,
        };
        match root {
            Value::String(target) => Some(PackageExports {
                types: None,
                default: Some(target.clone()),
            }),
            Value::Object(conditions) => {
                let get = |key: &str| conditions.get(key).and_then(Value::as_str).map(str::to_string);
                Some(PackageExports {
                    types: get("types"),
                    default: get("default").or_else(|| get("import")).or_else(|| get("require")),
                })
            }
            _ => None,
        }
    }
}

/// Parse a package.json file
pub fn parse_package_json(path: &Path) -> Result<PackageJson, ResolveError> {
    let content = fs::read_to_string(path).map_err(|source| ResolveError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ResolveError::PackageJson {
        path: path.to_path_buf(),
        source,
    })
}
