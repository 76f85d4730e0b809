//! Rules document loading.
//!
//! # Document shape
//! ```hcl
//! identity "spiffe://example.org/web" {
//!   path "/api/*/items" {
//!     methods = ["GET", "POST"]
//!   }
//!   path "/health" { methods = ["*"] }
//! }
//! ```
//! The JSON encoding nests the same labels as object keys:
//! `{"identity": {"spiffe://…": {"path": {"/api/*/items": {"methods": ["GET"]}}}}}`.
//!
//! # Design Decisions
//! - Encoding is chosen by the source name's extension (`.hcl`/`.conf`/`.json`)
//! - Strict decode: unknown blocks or attributes are errors
//! - All-or-nothing: one bad entry rejects the whole document

use std::path::Path;

use serde_json::Value;
use thiserror::Error;

use crate::authz::route::{Route, RouteError};
use crate::authz::table::AuthorizationTable;
use crate::identity::{Identity, IdentityError};

const IDENTITY_BLOCK: &str = "identity";
const LEGACY_IDENTITY_BLOCK: &str = "spiffeid";
const PATH_BLOCK: &str = "path";
const METHODS_ATTR: &str = "methods";

/// A rules document could not be turned into a table.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read rules from {path}: {source}")]
    Io { path: String, source: std::io::Error },

    #[error("{0}: unsupported rules format (expected .hcl, .conf or .json)")]
    UnsupportedFormat(String),

    #[error("{source_name}: {source}")]
    Hcl { source_name: String, source: hcl::Error },

    #[error("{source_name}: {source}")]
    Json {
        source_name: String,
        source: serde_json::Error,
    },

    #[error("{source_name}: {message}")]
    Structure { source_name: String, message: String },

    #[error("{source_name}: invalid identity {identity:?}: {source}")]
    Identity {
        source_name: String,
        identity: String,
        source: IdentityError,
    },

    #[error("{source_name}: identity {identity}, path {pattern:?}: {source}")]
    Route {
        source_name: String,
        identity: String,
        pattern: String,
        source: RouteError,
    },
}

/// Textual encodings of the rules document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Hcl,
    Json,
}

impl DocumentFormat {
    /// Pick the encoding from a file name or path.
    pub fn from_source_name(source_name: &str) -> Result<Self, ConfigError> {
        let ext = Path::new(source_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match ext.as_deref() {
            Some("hcl") | Some("conf") => Ok(Self::Hcl),
            Some("json") => Ok(Self::Json),
            _ => Err(ConfigError::UnsupportedFormat(source_name.to_owned())),
        }
    }
}

struct IdentityBlock {
    label: String,
    paths: Vec<PathBlock>,
}

struct PathBlock {
    pattern: String,
    methods: Vec<String>,
}

/// Parse `document` into a table. `source_name` selects the encoding and labels errors.
pub fn parse(document: &str, source_name: &str) -> Result<AuthorizationTable, ConfigError> {
    let blocks = match DocumentFormat::from_source_name(source_name)? {
        DocumentFormat::Hcl => parse_hcl(document, source_name)?,
        DocumentFormat::Json => parse_json(document, source_name)?,
    };
    build_table(blocks, source_name)
}

/// Read and parse a rules file.
pub fn load_file(path: &Path) -> Result<AuthorizationTable, ConfigError> {
    let source_name = path.display().to_string();
    // Fail on the extension before touching the disk.
    DocumentFormat::from_source_name(&source_name)?;

    let document = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: source_name.clone(),
        source,
    })?;
    parse(&document, &source_name)
}

fn build_table(blocks: Vec<IdentityBlock>, source_name: &str) -> Result<AuthorizationTable, ConfigError> {
    let mut table = AuthorizationTable::new();

    for block in blocks {
        let identity = Identity::parse(&block.label).map_err(|source| ConfigError::Identity {
            source_name: source_name.to_owned(),
            identity: block.label.clone(),
            source,
        })?;

        let mut routes = Vec::with_capacity(block.paths.len());
        for path in block.paths {
            let route = Route::new(path.pattern.clone(), path.methods).map_err(|source| ConfigError::Route {
                source_name: source_name.to_owned(),
                identity: block.label.clone(),
                pattern: path.pattern,
                source,
            })?;
            routes.push(route);
        }

        table.extend_routes(identity, routes);
    }

    Ok(table)
}

fn structure_error(source_name: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Structure {
        source_name: source_name.to_owned(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// HCL
// ---------------------------------------------------------------------------

fn parse_hcl(document: &str, source_name: &str) -> Result<Vec<IdentityBlock>, ConfigError> {
    let body = hcl::parse(document).map_err(|source| ConfigError::Hcl {
        source_name: source_name.to_owned(),
        source,
    })?;

    let mut identities = Vec::new();
    for structure in body.iter() {
        let block = match structure {
            hcl::Structure::Block(block) => block,
            hcl::Structure::Attribute(attr) => {
                return Err(structure_error(
                    source_name,
                    format!("unexpected top-level attribute {:?}", attr.key.as_str()),
                ));
            }
        };

        let name = block.identifier.as_str();
        if name != IDENTITY_BLOCK && name != LEGACY_IDENTITY_BLOCK {
            return Err(structure_error(source_name, format!("unexpected block {name:?}")));
        }
        let label = single_label(block, source_name)?;

        let mut paths = Vec::new();
        for inner in block.body.iter() {
            match inner {
                hcl::Structure::Block(path) if path.identifier.as_str() == PATH_BLOCK => {
                    paths.push(parse_hcl_path(path, source_name)?);
                }
                hcl::Structure::Block(other) => {
                    return Err(structure_error(
                        source_name,
                        format!("identity {label:?}: unexpected block {:?}", other.identifier.as_str()),
                    ));
                }
                hcl::Structure::Attribute(attr) => {
                    return Err(structure_error(
                        source_name,
                        format!("identity {label:?}: unexpected attribute {:?}", attr.key.as_str()),
                    ));
                }
            }
        }

        identities.push(IdentityBlock { label, paths });
    }

    Ok(identities)
}

fn single_label(block: &hcl::Block, source_name: &str) -> Result<String, ConfigError> {
    match block.labels.as_slice() {
        [label] => Ok(label.as_str().to_owned()),
        labels => Err(structure_error(
            source_name,
            format!(
                "block {:?} needs exactly one label, found {}",
                block.identifier.as_str(),
                labels.len()
            ),
        )),
    }
}

fn parse_hcl_path(block: &hcl::Block, source_name: &str) -> Result<PathBlock, ConfigError> {
    let pattern = single_label(block, source_name)?;

    let mut methods = None;
    for structure in block.body.iter() {
        match structure {
            hcl::Structure::Attribute(attr) if attr.key.as_str() == METHODS_ATTR => {
                if methods.is_some() {
                    return Err(structure_error(
                        source_name,
                        format!("path {pattern:?}: \"methods\" is set twice"),
                    ));
                }
                methods = Some(hcl_string_list(&attr.expr).ok_or_else(|| {
                    structure_error(
                        source_name,
                        format!("path {pattern:?}: \"methods\" must be a list of strings"),
                    )
                })?);
            }
            hcl::Structure::Attribute(attr) => {
                return Err(structure_error(
                    source_name,
                    format!("path {pattern:?}: unexpected attribute {:?}", attr.key.as_str()),
                ));
            }
            hcl::Structure::Block(inner) => {
                return Err(structure_error(
                    source_name,
                    format!("path {pattern:?}: unexpected block {:?}", inner.identifier.as_str()),
                ));
            }
        }
    }

    let methods = methods.ok_or_else(|| {
        structure_error(source_name, format!("path {pattern:?}: missing \"methods\""))
    })?;
    Ok(PathBlock { pattern, methods })
}

fn hcl_string_list(expr: &hcl::Expression) -> Option<Vec<String>> {
    match expr {
        hcl::Expression::Array(items) => items
            .iter()
            .map(|item| match item {
                hcl::Expression::String(s) => Some(s.clone()),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

fn parse_json(document: &str, source_name: &str) -> Result<Vec<IdentityBlock>, ConfigError> {
    let root: Value = serde_json::from_str(document).map_err(|source| ConfigError::Json {
        source_name: source_name.to_owned(),
        source,
    })?;

    let root = root
        .as_object()
        .ok_or_else(|| structure_error(source_name, "document root must be an object"))?;

    let mut identities = Vec::new();
    for (key, value) in root {
        if key != IDENTITY_BLOCK && key != LEGACY_IDENTITY_BLOCK {
            return Err(structure_error(source_name, format!("unexpected key {key:?}")));
        }

        for (label, body) in labelled_objects(value, key, source_name)? {
            let body = body.as_object().ok_or_else(|| {
                structure_error(source_name, format!("identity {label:?} must be an object"))
            })?;

            let mut paths = Vec::new();
            for (inner_key, inner) in body {
                if inner_key != PATH_BLOCK {
                    return Err(structure_error(
                        source_name,
                        format!("identity {label:?}: unexpected key {inner_key:?}"),
                    ));
                }
                for (pattern, path_body) in labelled_objects(inner, inner_key, source_name)? {
                    paths.push(parse_json_path(pattern, path_body, source_name)?);
                }
            }

            identities.push(IdentityBlock {
                label: label.to_owned(),
                paths,
            });
        }
    }

    Ok(identities)
}

/// `{"label": {...}}` or `[{"label": {...}}, ...]`, flattened in order.
fn labelled_objects<'a>(
    value: &'a Value,
    block: &str,
    source_name: &str,
) -> Result<Vec<(&'a str, &'a Value)>, ConfigError> {
    let not_labelled = || structure_error(source_name, format!("{block:?} must map labels to objects"));

    match value {
        Value::Object(map) => Ok(map.iter().map(|(k, v)| (k.as_str(), v)).collect()),
        Value::Array(items) => {
            let mut out = Vec::new();
            for item in items {
                let map = item.as_object().ok_or_else(not_labelled)?;
                out.extend(map.iter().map(|(k, v)| (k.as_str(), v)));
            }
            Ok(out)
        }
        _ => Err(not_labelled()),
    }
}

fn parse_json_path(pattern: &str, body: &Value, source_name: &str) -> Result<PathBlock, ConfigError> {
    let body = body
        .as_object()
        .ok_or_else(|| structure_error(source_name, format!("path {pattern:?} must be an object")))?;

    if let Some(key) = body.keys().find(|k| k.as_str() != METHODS_ATTR) {
        return Err(structure_error(
            source_name,
            format!("path {pattern:?}: unexpected key {key:?}"),
        ));
    }

    let methods = body
        .get(METHODS_ATTR)
        .ok_or_else(|| structure_error(source_name, format!("path {pattern:?}: missing \"methods\"")))?
        .as_array()
        .and_then(|items| {
            items
                .iter()
                .map(|m| m.as_str().map(str::to_owned))
                .collect::<Option<Vec<_>>>()
        })
        .ok_or_else(|| {
            structure_error(
                source_name,
                format!("path {pattern:?}: \"methods\" must be a list of strings"),
            )
        })?;

    Ok(PathBlock {
        pattern: pattern.to_owned(),
        methods,
    })
}
