//! Placeholder resolution for the product template.
//!
//! String values of the base template may reference published artifacts:
//!
//! - `{{ModelBuild}}` / `{{ModelBuild.Key}}`: object key
//! - `{{ModelBuild.Bucket}}`: storage container
//! - `{{ModelBuild.Version}}`: object version (must exist)
//! - `{{ModelBuild.Uri}}`: `s3://bucket/key`
//!
//! The reserved name `workspace` addresses the seed workspace payload. Artifact
//! names are always PascalCase, so it cannot collide with a catalog entry.
//! Object keys are never rendered and must not contain placeholders.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{json, Map, Value};

use crate::contract::{ArtifactCatalog, ArtifactLocation};
use crate::error::RenderError;

pub const WORKSPACE_PLACEHOLDER: &str = "workspace";
pub const METADATA_SECTION: &str = "Metadata";
pub const PRODUCT_ARTIFACTS_METADATA: &str = "ProductArtifacts";
pub const SEED_WORKSPACE_METADATA: &str = "SeedWorkspace";

/// Any `{{...}}` token. Tokens that are not well-formed references fail to
/// resolve instead of being copied through.
static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([^{}]*)\}\}").expect("placeholder pattern is valid"));

static REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z][A-Za-z0-9]*)(?:\.([A-Za-z]+))?$").expect("reference pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocationField {
    Bucket,
    Key,
    Version,
    Uri,
}

impl LocationField {
    fn parse(raw: Option<&str>) -> Option<Self> {
        match raw {
            None | Some("Key") => Some(Self::Key),
            Some("Bucket") => Some(Self::Bucket),
            Some("Version") => Some(Self::Version),
            Some("Uri") => Some(Self::Uri),
            Some(_) => None,
        }
    }

    fn read(self, location: &ArtifactLocation) -> Option<String> {
        match self {
            Self::Bucket => Some(location.container.clone()),
            Self::Key => Some(location.key.clone()),
            Self::Version => location.version.clone(),
            Self::Uri => Some(location.uri()),
        }
    }
}

/// Parses a base template document. The root must be a JSON object.
pub fn parse_base_template(raw: &str) -> Result<Value, RenderError> {
    let document: Value = serde_json::from_str(raw)
        .map_err(|error| RenderError::InvalidBaseShape(format!("invalid JSON: {error}")))?;
    if !document.is_object() {
        return Err(RenderError::InvalidBaseShape(
            "template root must be a JSON object".to_string(),
        ));
    }
    Ok(document)
}

/// Resolves every placeholder of `base` and attaches the artifact metadata.
///
/// Pure: the same inputs always produce the same document.
pub fn render_document(
    base: &Value,
    catalog: &ArtifactCatalog,
    workspace: &ArtifactLocation,
) -> Result<Value, RenderError> {
    let mut document = resolve_value(base, catalog, workspace)?;
    let root = document.as_object_mut().ok_or_else(|| {
        RenderError::InvalidBaseShape("template root must be a JSON object".to_string())
    })?;

    let metadata = root
        .entry(METADATA_SECTION)
        .or_insert_with(|| Value::Object(Map::new()));
    let metadata = metadata.as_object_mut().ok_or_else(|| {
        RenderError::InvalidBaseShape(format!("'{METADATA_SECTION}' must be a JSON object"))
    })?;

    metadata.insert(
        PRODUCT_ARTIFACTS_METADATA.to_string(),
        Value::Array(
            catalog
                .iter()
                .map(|(name, location)| location_metadata(Some(name), location))
                .collect(),
        ),
    );
    metadata.insert(
        SEED_WORKSPACE_METADATA.to_string(),
        location_metadata(None, workspace),
    );

    Ok(document)
}

/// Serializes a rendered document in its distributable form.
pub fn to_template_bytes(document: &Value) -> Result<Vec<u8>, RenderError> {
    let mut bytes = serde_json::to_vec_pretty(document)?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn resolve_value(
    value: &Value,
    catalog: &ArtifactCatalog,
    workspace: &ArtifactLocation,
) -> Result<Value, RenderError> {
    match value {
        Value::String(text) => resolve_string(text, catalog, workspace).map(Value::String),
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_value(item, catalog, workspace))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(members) => {
            let mut resolved = Map::new();
            for (key, member) in members {
                if PLACEHOLDER.is_match(key) {
                    return Err(RenderError::InvalidBaseShape(format!(
                        "placeholders are not allowed in object keys: '{key}'"
                    )));
                }
                resolved.insert(key.clone(), resolve_value(member, catalog, workspace)?);
            }
            Ok(Value::Object(resolved))
        }
        other => Ok(other.clone()),
    }
}

fn resolve_string(
    text: &str,
    catalog: &ArtifactCatalog,
    workspace: &ArtifactLocation,
) -> Result<String, RenderError> {
    let mut unresolved: Option<String> = None;
    let resolved = PLACEHOLDER.replace_all(text, |captures: &Captures| {
        let token = captures.get(1).map_or("", |inner| inner.as_str().trim());
        match lookup(token, catalog, workspace) {
            Some(value) => value,
            None => {
                if unresolved.is_none() {
                    unresolved = Some(token.to_string());
                }
                String::new()
            }
        }
    });

    match unresolved {
        Some(placeholder) => Err(RenderError::UnresolvedPlaceholder { placeholder }),
        None => Ok(resolved.into_owned()),
    }
}

fn lookup(token: &str, catalog: &ArtifactCatalog, workspace: &ArtifactLocation) -> Option<String> {
    let reference = REFERENCE.captures(token)?;
    let name = reference.get(1)?.as_str();
    let field = LocationField::parse(reference.get(2).map(|m| m.as_str()))?;
    let location = if name == WORKSPACE_PLACEHOLDER {
        workspace
    } else {
        catalog.get(name)?
    };
    field.read(location)
}

fn location_metadata(name: Option<&str>, location: &ArtifactLocation) -> Value {
    let mut entry = json!({
        "Bucket": location.container,
        "Key": location.key,
    });
    if let Some(object) = entry.as_object_mut() {
        if let Some(name) = name {
            object.insert("Name".to_string(), Value::String(name.to_string()));
        }
        if let Some(version) = &location.version {
            object.insert("Version".to_string(), Value::String(version.clone()));
        }
    }
    entry
}
