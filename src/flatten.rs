use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// A flat, insertion-ordered mapping of column name to value
pub type Row = Map<String, Value>;

const BUILTIN_FIELDS: &str = include_str!("fields.yaml");

/// Child keys read from a nested object (or the first element of a nested array)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NestedFields {
    pub parent: String,
    pub fields: Vec<String>,
}

/// Which fields of one entity end up in its row
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FieldSpec {
    pub root: Vec<String>,
    #[serde(default)]
    pub objects: Vec<NestedFields>,
    #[serde(default)]
    pub arrays: Vec<NestedFields>,
}

/// Field specs for every entity the importer writes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FieldMap {
    pub collection: FieldSpec,
    pub feed: FieldSpec,
    pub board: FieldSpec,
    pub item: FieldSpec,
}

impl FieldMap {
    /// The field map compiled into the binary
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(BUILTIN_FIELDS)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let map: FieldMap = serde_yaml::from_str(yaml)?;
        map.validate()?;
        Ok(map)
    }

    /// Load a field map from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading field map from {}", path.display());
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    fn validate(&self) -> Result<()> {
        let entities = [
            ("collection", &self.collection),
            ("feed", &self.feed),
            ("board", &self.board),
            ("item", &self.item),
        ];
        for (name, spec) in entities {
            // Every entity is keyed by its id
            if !spec.root.iter().any(|k| k == "id") {
                return Err(Error::FieldMap(format!(
                    "'{}' must include 'id' in its root fields",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Flatten `source` into a single row according to `spec`.
///
/// Root keys missing from `source` become `null`. Nested parents that are
/// missing, not objects, or empty arrays contribute no columns at all.
pub fn flatten(source: &Value, spec: &FieldSpec) -> Row {
    let mut row = Row::new();

    for key in &spec.root {
        let value = source.get(key).cloned().unwrap_or(Value::Null);
        row.insert(key.clone(), value);
    }

    for nested in &spec.objects {
        match source.get(&nested.parent) {
            Some(Value::Object(child)) => extract_children(&mut row, nested, child),
            Some(_) | None => {}
        }
    }

    for nested in &spec.arrays {
        match source.get(&nested.parent) {
            Some(Value::Array(elements)) => match elements.first() {
                Some(Value::Object(child)) => extract_children(&mut row, nested, child),
                Some(_) => debug!("First '{}' element is not an object, skipping", nested.parent),
                None => debug!("'{}' is empty, skipping", nested.parent),
            },
            Some(_) | None => {}
        }
    }

    row
}

fn extract_children(row: &mut Row, nested: &NestedFields, child: &Map<String, Value>) {
    for key in &nested.fields {
        let value = child.get(key).cloned().unwrap_or(Value::Null);
        row.insert(format!("{}_{}", nested.parent, key), value);
    }
}
