//! Custom field reconciliation
//!
//! phpIPAM has no notion of unsetting a custom field, only of setting it to
//! null. Writes therefore send the desired map plus an explicit `None` for
//! every field currently set remotely that the desired map no longer names.
//! An absent desired map clears every field.
//!
//! Reads hide zero values (`""`, `0`, `false`, null): a field holding its
//! zero value is reported as not set.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::api::CustomFieldCarrier;
use crate::error::{Error, Result};
use crate::model::{CustomFieldSchema, CustomFieldSet, CustomFields, EntityId, Kind};

/// Compute the write set that makes the remote state equal to `desired`
pub fn reconcile(desired: Option<&CustomFieldSet>, current: &CustomFields) -> CustomFieldSet {
    let mut result = desired.cloned().unwrap_or_default();
    for key in current.keys() {
        result.entry(key.clone()).or_insert(None);
    }
    result
}

/// Check that every key of `set` is declared by `schema`
pub fn validate(set: &CustomFieldSet, schema: &CustomFieldSchema, kind: Kind) -> Result<()> {
    match set.keys().find(|key| !schema.contains_key(*key)) {
        Some(key) => Err(Error::unknown_field(kind, key.clone())),
        None => Ok(()),
    }
}

/// Reconcile the custom fields of an existing entity against `desired`
///
/// Fetches the current values and the schema, validates the full write set
/// and only then sends it. Nothing is sent when validation fails or when
/// there is nothing to write.
pub async fn apply<C>(carrier: &C, id: EntityId, desired: Option<&CustomFieldSet>) -> Result<()>
where
    C: CustomFieldCarrier + ?Sized,
{
    let current = carrier.custom_fields(id).await?;
    let set = reconcile(desired, &current);
    if set.is_empty() {
        debug!("No custom fields to write for {} {}", carrier.kind(), id);
        return Ok(());
    }

    let schema = carrier.custom_field_schema().await?;
    validate(&set, &schema, carrier.kind())?;

    debug!(
        "Writing {} custom field(s) to {} {}",
        set.len(),
        carrier.kind(),
        id
    );
    carrier.update_custom_fields(id, &set).await
}

/// Check the desired custom fields of an entity that does not exist yet
///
/// Must run before the entity is created: a key rejected afterwards would
/// leave the new entity behind.
pub async fn check_initial<C>(carrier: &C, desired: Option<&CustomFieldSet>) -> Result<()>
where
    C: CustomFieldCarrier + ?Sized,
{
    match desired {
        Some(set) if !set.is_empty() => {
            let schema = carrier.custom_field_schema().await?;
            validate(set, &schema, carrier.kind())
        }
        _ => Ok(()),
    }
}

/// Write the custom fields of a freshly created entity
///
/// Nothing exists remotely yet, so only the desired keys are sent. Keys are
/// expected to have passed [`check_initial`].
pub async fn write_initial<C>(carrier: &C, id: EntityId, desired: &CustomFieldSet) -> Result<()>
where
    C: CustomFieldCarrier + ?Sized,
{
    if desired.is_empty() {
        return Ok(());
    }
    carrier.update_custom_fields(id, desired).await
}

/// Read the visible custom fields of an entity
///
/// Skips the value fetch entirely when the kind has no custom fields defined.
pub async fn read<C>(carrier: &C, id: EntityId) -> Result<BTreeMap<String, String>>
where
    C: CustomFieldCarrier + ?Sized,
{
    let schema = carrier.custom_field_schema().await?;
    if schema.is_empty() {
        return Ok(BTreeMap::new());
    }

    let raw = carrier.custom_fields(id).await?;
    Ok(trim(&raw))
}

/// Drop zero values and render the rest as strings
pub fn trim(raw: &CustomFields) -> BTreeMap<String, String> {
    raw.iter()
        .filter(|(_, value)| !is_zero(value))
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), rendered)
        })
        .collect()
}

fn is_zero(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::IpamBackend;
    use crate::memory::MemoryIpam;
    use crate::model::CustomFieldMeta;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn set(pairs: &[(&str, Option<&str>)]) -> CustomFieldSet {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
            .collect()
    }

    fn current(pairs: &[(&str, Value)]) -> CustomFields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn schema(keys: &[&str]) -> CustomFieldSchema {
        keys.iter()
            .map(|k| {
                (
                    k.to_string(),
                    CustomFieldMeta {
                        name: k.to_string(),
                        field_type: "varchar(255)".to_string(),
                        ..Default::default()
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_reconcile_nulls_removed_keys() {
        let desired = set(&[("a", Some("1")), ("c", Some("3"))]);
        let remote = current(&[("a", json!("old")), ("b", json!("2"))]);

        let result = reconcile(Some(&desired), &remote);

        assert_eq!(
            result,
            set(&[("a", Some("1")), ("b", None), ("c", Some("3"))])
        );
    }

    #[test]
    fn test_reconcile_covers_union_of_keys() {
        let desired = set(&[("x", Some("1")), ("y", None)]);
        let remote = current(&[("y", json!("2")), ("z", Value::Null)]);

        let result = reconcile(Some(&desired), &remote);

        for key in desired.keys().chain(remote.keys()) {
            assert!(result.contains_key(key), "missing {}", key);
        }
        assert_eq!(result["x"], Some("1".to_string()));
        assert_eq!(result["y"], None);
        assert_eq!(result["z"], None);
    }

    #[test]
    fn test_empty_desired_wipes_remote() {
        let remote = current(&[("a", json!("x")), ("b", json!("y"))]);

        assert_eq!(
            reconcile(Some(&CustomFieldSet::new()), &remote),
            set(&[("a", None), ("b", None)])
        );
        assert_eq!(reconcile(None, &remote), set(&[("a", None), ("b", None)]));
    }

    #[test]
    fn test_validate_rejects_unknown_key() {
        let err = validate(
            &set(&[("known", Some("1")), ("bogus", Some("2"))]),
            &schema(&["known"]),
            Kind::Address,
        )
        .unwrap_err();

        match err {
            Error::UnknownField { kind, field } => {
                assert_eq!(kind, Kind::Address);
                assert_eq!(field, "bogus");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_validate_accepts_schema_keys() {
        validate(
            &set(&[("a", Some("1")), ("b", None)]),
            &schema(&["a", "b", "c"]),
            Kind::Subnet,
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_check_initial_uses_remote_schema() {
        let ipam = MemoryIpam::new();
        ipam.define_custom_field(Kind::Vlan, "owner").await;

        check_initial(ipam.vlans(), None).await.unwrap();
        check_initial(ipam.vlans(), Some(&CustomFieldSet::new())).await.unwrap();
        check_initial(ipam.vlans(), Some(&set(&[("owner", Some("net"))])))
            .await
            .unwrap();

        let err = check_initial(ipam.vlans(), Some(&set(&[("colour", Some("blue"))])))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownField { kind: Kind::Vlan, .. }));
    }

    #[test]
    fn test_trim_hides_zero_values() {
        let raw = current(&[
            ("empty", json!("")),
            ("null", Value::Null),
            ("zero", json!(0)),
            ("no", json!(false)),
            ("text", json!("rack 4")),
            ("count", json!(3)),
            ("yes", json!(true)),
        ]);

        let trimmed = trim(&raw);

        let expected: BTreeMap<String, String> = [("count", "3"), ("text", "rack 4"), ("yes", "true")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(trimmed, expected);
    }
}
