//! Collection filter for parent-scoped listings
//!
//! Narrows the addresses of a subnet, or the subnets of a section, down to
//! the entries matching one filter. Output keeps listing order.

use std::collections::BTreeMap;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::api::CustomFieldCarrier;
use crate::error::{Error, Result};
use crate::model::{Address, CustomFields, Entity, Subnet};

/// Scalar attribute a scope filter can test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    Description,
    Hostname,
}

/// One filter applied to a parent-scoped listing
#[derive(Debug, Clone)]
pub enum ScopeFilter {
    /// Field equals a non-empty value
    Exact { field: FilterField, value: String },

    /// Field matches a regular expression anywhere
    Matches { field: FilterField, regex: Regex },

    /// Every named custom field exists and matches its expression
    CustomFields(BTreeMap<String, Regex>),
}

/// Entities that live inside a parent scope
pub trait Filterable: Entity {
    /// Name of the parent scope, used in error messages
    const SCOPE: &'static str;

    /// Value of a filterable attribute, `None` if this kind has no such field
    fn field(&self, field: FilterField) -> Option<&str>;

    /// Structural entries without custom fields of their own
    fn is_folder(&self) -> bool {
        false
    }
}

impl Filterable for Address {
    const SCOPE: &'static str = "subnet";

    fn field(&self, field: FilterField) -> Option<&str> {
        match field {
            FilterField::Description => Some(&self.description),
            FilterField::Hostname => Some(&self.hostname),
        }
    }
}

impl Filterable for Subnet {
    const SCOPE: &'static str = "section";

    fn field(&self, field: FilterField) -> Option<&str> {
        match field {
            FilterField::Description => Some(&self.description),
            FilterField::Hostname => None,
        }
    }

    fn is_folder(&self) -> bool {
        self.is_folder
    }
}

/// Filter a parent-scoped listing
///
/// An empty listing is an [`Error::EmptyScope`]; a non-empty listing with no
/// matches is an empty result. Custom field filters fetch the fields of each
/// candidate through `carrier` and skip folders.
pub async fn filter_in_scope<E, C>(listing: Vec<E>, filter: &ScopeFilter, carrier: &C) -> Result<Vec<E>>
where
    E: Filterable,
    C: CustomFieldCarrier + ?Sized,
{
    if listing.is_empty() {
        return Err(Error::empty_scope(format!(
            "no {} were found in the supplied {}",
            E::KIND,
            E::SCOPE
        )));
    }

    let total = listing.len();
    let mut matched = Vec::new();
    for candidate in listing {
        let hit = match filter {
            ScopeFilter::Exact { field, value } => {
                !value.is_empty() && candidate.field(*field) == Some(value.as_str())
            }
            ScopeFilter::Matches { field, regex } => {
                candidate.field(*field).is_some_and(|v| regex.is_match(v))
            }
            ScopeFilter::CustomFields(expressions) => {
                if candidate.is_folder() {
                    continue;
                }
                let fields = carrier.custom_fields(candidate.id()).await?;
                custom_fields_match(&fields, expressions)?
            }
        };
        if hit {
            matched.push(candidate);
        }
    }

    debug!("Scope filter matched {} of {} {}", matched.len(), total, E::KIND);
    Ok(matched)
}

/// Test one candidate's custom fields against a filter map
///
/// A key that is missing or null never matches. Values other than strings
/// and null are rejected with [`Error::FieldType`].
pub fn custom_fields_match(fields: &CustomFields, expressions: &BTreeMap<String, Regex>) -> Result<bool> {
    for (key, regex) in expressions {
        match fields.get(key) {
            None | Some(Value::Null) => return Ok(false),
            Some(Value::String(s)) => {
                if !regex.is_match(s) {
                    return Ok(false);
                }
            }
            Some(other) => return Err(Error::field_type(key.clone(), other)),
        }
    }
    Ok(true)
}

/// Compile a map of custom field expressions
pub fn compile_custom_filter(raw: &BTreeMap<String, String>) -> Result<BTreeMap<String, Regex>> {
    raw.iter()
        .map(|(key, pattern)| Ok((key.clone(), compile(pattern)?)))
        .collect()
}

/// Compile one filter expression
pub fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| Error::invalid_argument(format!("invalid expression {:?}: {}", pattern, e)))
}
