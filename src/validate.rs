// src/validate.rs

//! Schema validation of listing documents
//!
//! Schemas use a subset of the Cerberus rule language: a schema maps field
//! names to rules (`type`, `required`, `empty`, `nullable`, `allowed`,
//! `schema`, `keysrules`, `valuesrules`, `minlength`, `maxlength`).
//! Validation never stops at the first problem; every failing field is
//! reported under its dotted path.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_yml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Schema compiled into the binary, used when no schema file is given
pub const BUILTIN_SCHEMA: &str = include_str!("../listing_schema.yaml");

/// Value types a rule can require
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Boolean,
    Integer,
    Float,
    Number,
    Dict,
    List,
}

impl FieldType {
    pub fn as_str(&self) -> &str {
        match self {
            FieldType::String => "string",
            FieldType::Boolean => "boolean",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Number => "number",
            FieldType::Dict => "dict",
            FieldType::List => "list",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldType::String, Value::String(_)) => true,
            (FieldType::Boolean, Value::Bool(_)) => true,
            (FieldType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (FieldType::Float, Value::Number(n)) => n.is_f64(),
            (FieldType::Number, Value::Number(_)) => true,
            (FieldType::Dict, Value::Mapping(_)) => true,
            (FieldType::List, Value::Sequence(_)) => true,
            _ => false,
        }
    }
}

/// Rules applying to one value
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rules {
    #[serde(default, rename = "type", deserialize_with = "one_or_many")]
    pub types: Vec<FieldType>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub empty: Option<bool>,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub allowed: Option<Vec<String>>,
    #[serde(default)]
    pub schema: Option<Nested>,
    #[serde(default)]
    pub keysrules: Option<Box<Rules>>,
    #[serde(default)]
    pub valuesrules: Option<Box<Rules>>,
    #[serde(default)]
    pub minlength: Option<usize>,
    #[serde(default)]
    pub maxlength: Option<usize>,
}

/// The `schema` rule: item rules for a list, or a field map for a dict
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Nested {
    Items(Box<Rules>),
    Fields(BTreeMap<String, Rules>),
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<FieldType>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(FieldType),
        Many(Vec<FieldType>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(kind) => vec![kind],
        OneOrMany::Many(kinds) => kinds,
    })
}

/// A top-level schema: field name to rules
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fields: BTreeMap<String, Rules>,
}

impl Schema {
    /// Parse a schema description from YAML text
    pub fn from_yaml_str(contents: &str, origin: &str) -> Result<Self> {
        serde_yml::from_str(contents)
            .map_err(|e| Error::Schema(format!("{}: {}", origin, e)))
    }

    /// Load a schema description from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading data validator from {}", path.display());
        let contents = fs::read_to_string(path)?;
        Self::from_yaml_str(&contents, &path.display().to_string())
    }

    /// The listing schema shipped with the tool
    pub fn builtin() -> Result<Self> {
        Self::from_yaml_str(BUILTIN_SCHEMA, "<builtin schema>")
    }

    /// Load `path` when given, otherwise the built-in schema
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::builtin(),
        }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Check a document, collecting every field-level error
    pub fn validate(&self, document: &Value) -> ValidationErrors {
        let mut errors = ValidationErrors::default();
        match document {
            Value::Mapping(mapping) => validate_fields(&self.fields, mapping, "", &mut errors),
            _ => errors.add("", "document must be a mapping"),
        }
        errors
    }

    /// Like [`Schema::validate`], failing with [`Error::InvalidListing`]
    pub fn check(&self, document: &Value) -> Result<()> {
        self.validate(document).into_result()
    }
}

/// Field-level validation errors keyed by dotted path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of paths with at least one error
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, path: &str) -> Option<&[String]> {
        self.0.get(path).map(Vec::as_slice)
    }

    pub fn add(&mut self, path: &str, message: impl Into<String>) {
        self.0.entry(path.to_string()).or_default().push(message.into());
    }

    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidListing(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (path, messages) in &self.0 {
            let path = if path.is_empty() { "<document>" } else { path };
            for message in messages {
                writeln!(f, "  {}: {}", path, message)?;
            }
        }
        Ok(())
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

fn key_name(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => format!("{:?}", other),
    }
}

fn validate_fields(
    fields: &BTreeMap<String, Rules>,
    mapping: &Mapping,
    path: &str,
    errors: &mut ValidationErrors,
) {
    for (key, value) in mapping {
        let name = key_name(key);
        let field_path = join(path, &name);
        match fields.get(&name) {
            Some(rules) => validate_value(rules, value, &field_path, errors),
            None => errors.add(&field_path, "unknown field"),
        }
    }

    for (name, rules) in fields {
        let present = mapping.iter().any(|(key, _)| key.as_str() == Some(name.as_str()));
        if rules.required && !present {
            errors.add(&join(path, name), "required field");
        }
    }
}

fn value_len(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Sequence(seq) => Some(seq.len()),
        Value::Mapping(map) => Some(map.len()),
        _ => None,
    }
}

fn validate_value(rules: &Rules, value: &Value, path: &str, errors: &mut ValidationErrors) {
    if value.is_null() {
        if !rules.nullable {
            errors.add(path, "null value not allowed");
        }
        return;
    }

    if !rules.types.is_empty() && !rules.types.iter().any(|kind| kind.matches(value)) {
        let names: Vec<&str> = rules.types.iter().map(FieldType::as_str).collect();
        errors.add(path, format!("must be of {} type", names.join(" or ")));
        return;
    }

    if let Some(len) = value_len(value) {
        if rules.empty == Some(false) && len == 0 {
            errors.add(path, "empty values not allowed");
        }
        if let Some(min) = rules.minlength {
            if len < min {
                errors.add(path, format!("min length is {}", min));
            }
        }
        if let Some(max) = rules.maxlength {
            if len > max {
                errors.add(path, format!("max length is {}", max));
            }
        }
    }

    if let Some(allowed) = &rules.allowed {
        check_allowed(allowed, value, path, errors);
    }

    match value {
        Value::Mapping(mapping) => {
            match &rules.schema {
                Some(Nested::Fields(fields)) => validate_fields(fields, mapping, path, errors),
                Some(Nested::Items(item_rules)) => {
                    for (key, item) in mapping {
                        validate_value(item_rules, item, &join(path, &key_name(key)), errors);
                    }
                }
                None => {}
            }
            if let Some(key_rules) = &rules.keysrules {
                for (key, _) in mapping {
                    validate_value(key_rules, key, &join(path, &key_name(key)), errors);
                }
            }
            if let Some(value_rules) = &rules.valuesrules {
                for (key, item) in mapping {
                    validate_value(value_rules, item, &join(path, &key_name(key)), errors);
                }
            }
        }
        Value::Sequence(items) => match &rules.schema {
            Some(Nested::Items(item_rules)) => {
                for (index, item) in items.iter().enumerate() {
                    validate_value(item_rules, item, &join(path, &index.to_string()), errors);
                }
            }
            Some(Nested::Fields(fields)) => {
                for (index, item) in items.iter().enumerate() {
                    let item_path = join(path, &index.to_string());
                    match item {
                        Value::Mapping(mapping) => validate_fields(fields, mapping, &item_path, errors),
                        _ => errors.add(&item_path, "must be of dict type"),
                    }
                }
            }
            None => {}
        },
        _ => {}
    }
}

fn check_allowed(allowed: &[String], value: &Value, path: &str, errors: &mut ValidationErrors) {
    let is_allowed = |v: &Value| v.as_str().is_some_and(|s| allowed.iter().any(|a| a == s));
    match value {
        Value::Sequence(items) => {
            let rejected: Vec<String> = items
                .iter()
                .filter(|item| !is_allowed(*item))
                .map(key_name)
                .collect();
            if !rejected.is_empty() {
                errors.add(path, format!("unallowed values {}", rejected.join(", ")));
            }
        }
        other if !is_allowed(other) => {
            errors.add(path, format!("unallowed value {}", key_name(other)));
        }
        _ => {}
    }
}
