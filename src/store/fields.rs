//! Field value lists, custom field definitions, and picker data
//!
//! The agent fills the form from per-field value lists kept in the store.
//! Absent lists fall back to the built-in tables below; an explicitly
//! configured empty list is respected and yields an empty value.

use super::{keys, KvStore, StoreError};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type FieldValues = BTreeMap<String, Vec<String>>;

/// A user-defined form field: a label for display plus the selector (or raw
/// element id) the agent should target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomField {
    pub label: String,
    #[serde(default)]
    pub selector: String,
}

/// Older store files kept custom fields as bare label strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum CustomFieldCompat {
    Label(String),
    Full(CustomField),
}

/// An entry in the "field to test" picker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestableField {
    pub key: String,
    pub label: String,
}

pub fn default_field_values() -> FieldValues {
    let table: &[(&str, &[&str])] = &[
        (
            "lastName",
            &[
                "Smith",
                "Johnson",
                "Williams",
                "Brown",
                "Jones",
                "Garcia",
                "Miller",
                "Davis",
                "Rodriguez",
                "Martinez",
            ],
        ),
        ("dayOfBirth", &["01", "05", "10", "15", "20", "25", "28"]),
        (
            "monthOfBirth",
            &[
                "01", "02", "03", "04", "05", "06", "07", "08", "09", "10", "11", "12",
            ],
        ),
        (
            "yearOfBirth",
            &["1980", "1985", "1990", "1995", "2000", "2005"],
        ),
        ("houseNumber", &["123", "456", "789", "1000", "2500"]),
        (
            "city",
            &[
                "Newfield",
                "Springfield",
                "Riverside",
                "Fairview",
                "Georgetown",
            ],
        ),
        (
            "streetName",
            &["Main Street", "High Street", "Market Street", "Oak Avenue"],
        ),
        (
            "firstName",
            &[
                "allMatch",
                "allMatchC",
                "allMatchA",
                "error500",
                "error200",
                "allDSMissing",
            ],
        ),
        (
            "stateProvince",
            &["CA", "NY", "TX", "FL", "IL", "PA", "OH"],
        ),
        (
            "postalCode",
            &["12345", "67890", "11111", "22222", "33333"],
        ),
        (
            "telephone",
            &["2001234567", "3001234567", "4001234567", "5001234567"],
        ),
        (
            "cellNumber",
            &["6001234567", "7001234567", "8001234567", "9001234567"],
        ),
        ("gender", &["M", "F"]),
        (
            "emailAddress",
            &[
                "test1@example.com",
                "test2@example.com",
                "test3@example.com",
            ],
        ),
    ];
    table
        .iter()
        .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
        .collect()
}

pub fn default_testable_fields() -> Vec<TestableField> {
    [
        ("CellNumber", "Cell Number"),
        ("Telephone", "Telephone"),
        ("PostalCode", "Postal Code"),
        ("EmailAddress", "Email Address"),
        ("Gender", "Gender"),
        ("StateProvince", "State Province"),
    ]
    .into_iter()
    .map(|(key, label)| TestableField {
        key: key.to_string(),
        label: label.to_string(),
    })
    .collect()
}

pub fn default_countries() -> Vec<String> {
    vec!["Netherlands".to_string(), "Portugal".to_string()]
}

/// Derive a storage key from a selector or raw element id
pub fn derive_key_from_selector(selector: &str) -> String {
    selector
        .trim()
        .trim_start_matches('#')
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

// ---------------------------------------------------------------------------
// Value lists

pub async fn load_field_values(store: &KvStore) -> FieldValues {
    store
        .get::<FieldValues>(keys::FIELD_VALUES)
        .await
        .unwrap_or_else(default_field_values)
}

/// Pick a random configured value for `field`, or use `fallback` when the
/// field was never configured. A configured-but-empty list yields "".
pub async fn random_value(store: &KvStore, field: &str, fallback: &str) -> String {
    if let Some(stored) = store.get::<FieldValues>(keys::FIELD_VALUES).await {
        if let Some(values) = stored.get(field) {
            return values
                .choose(&mut rand::thread_rng())
                .cloned()
                .unwrap_or_default();
        }
    }
    fallback.to_string()
}

pub async fn add_value(store: &KvStore, field: &str, value: &str) -> Result<Vec<String>, StoreError> {
    let mut all = load_field_values(store).await;
    let values = all.entry(field.to_string()).or_default();
    if !values.iter().any(|v| v == value) {
        values.push(value.to_string());
    }
    let out = values.clone();
    store.try_set(keys::FIELD_VALUES, &all).await?;
    Ok(out)
}

pub async fn remove_value(
    store: &KvStore,
    field: &str,
    value: &str,
) -> Result<Vec<String>, StoreError> {
    let mut all = load_field_values(store).await;
    if let Some(values) = all.get_mut(field) {
        values.retain(|v| v != value);
    }
    let out = all.get(field).cloned().unwrap_or_default();
    store.try_set(keys::FIELD_VALUES, &all).await?;
    Ok(out)
}

pub async fn reset_field(store: &KvStore, field: &str) -> Result<Vec<String>, StoreError> {
    let defaults = default_field_values();
    let mut all = load_field_values(store).await;
    let restored = defaults.get(field).cloned().unwrap_or_default();
    all.insert(field.to_string(), restored.clone());
    store.try_set(keys::FIELD_VALUES, &all).await?;
    Ok(restored)
}

// ---------------------------------------------------------------------------
// Custom field definitions

pub async fn load_custom_fields(store: &KvStore) -> BTreeMap<String, CustomField> {
    let raw = store
        .get::<BTreeMap<String, CustomFieldCompat>>(keys::CUSTOM_FIELDS)
        .await
        .unwrap_or_default();
    raw.into_iter()
        .map(|(key, compat)| {
            let field = match compat {
                CustomFieldCompat::Label(label) => CustomField {
                    label,
                    selector: String::new(),
                },
                CustomFieldCompat::Full(field) => field,
            };
            (key, field)
        })
        .collect()
}

pub async fn add_custom_field(
    store: &KvStore,
    key: &str,
    label: &str,
    selector: &str,
) -> Result<(), StoreError> {
    let mut fields = load_custom_fields(store).await;
    if key.is_empty() || label.is_empty() {
        log::warn!("custom field needs both key and label");
        return Ok(());
    }
    if fields.contains_key(key) {
        log::warn!("custom field '{key}' already exists");
        return Ok(());
    }
    fields.insert(
        key.to_string(),
        CustomField {
            label: label.to_string(),
            selector: selector.to_string(),
        },
    );
    store.try_set(keys::CUSTOM_FIELDS, &fields).await?;

    // make sure a value list exists for the new field
    let mut values = load_field_values(store).await;
    values.entry(key.to_string()).or_default();
    store.try_set(keys::FIELD_VALUES, &values).await?;
    Ok(())
}

pub async fn remove_custom_field(store: &KvStore, key: &str) -> Result<(), StoreError> {
    let mut fields = load_custom_fields(store).await;
    fields.remove(key);
    store.try_set(keys::CUSTOM_FIELDS, &fields).await?;

    let mut values = load_field_values(store).await;
    if values.remove(key).is_some() {
        store.try_set(keys::FIELD_VALUES, &values).await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Testable fields and countries

pub async fn load_testable_fields(store: &KvStore) -> Vec<TestableField> {
    store
        .get::<Vec<TestableField>>(keys::TESTABLE_FIELDS)
        .await
        .unwrap_or_else(default_testable_fields)
}

pub async fn add_testable_field(
    store: &KvStore,
    key: &str,
    label: &str,
) -> Result<Vec<TestableField>, StoreError> {
    let mut list = load_testable_fields(store).await;
    if !list.iter().any(|f| f.key == key) {
        list.push(TestableField {
            key: key.to_string(),
            label: label.to_string(),
        });
    }
    store.try_set(keys::TESTABLE_FIELDS, &list).await?;
    Ok(list)
}

pub async fn remove_testable_field(
    store: &KvStore,
    key: &str,
) -> Result<Vec<TestableField>, StoreError> {
    let mut list = load_testable_fields(store).await;
    list.retain(|f| f.key != key);
    store.try_set(keys::TESTABLE_FIELDS, &list).await?;
    Ok(list)
}

pub async fn load_countries(store: &KvStore) -> Vec<String> {
    store
        .get::<Vec<String>>(keys::COUNTRIES)
        .await
        .unwrap_or_else(default_countries)
}

pub async fn add_country(store: &KvStore, name: &str) -> Result<Vec<String>, StoreError> {
    let trimmed = name.trim();
    let mut list = load_countries(store).await;
    if !trimmed.is_empty() && !list.iter().any(|c| c == trimmed) {
        list.push(trimmed.to_string());
    }
    store.try_set(keys::COUNTRIES, &list).await?;
    Ok(list)
}

pub async fn remove_country(store: &KvStore, name: &str) -> Result<Vec<String>, StoreError> {
    let mut list = load_countries(store).await;
    list.retain(|c| c != name);
    store.try_set(keys::COUNTRIES, &list).await?;
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, KvStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::new(dir.path().join("store.json"));
        (dir, store)
    }

    #[tokio::test]
    async fn unconfigured_field_uses_fallback() {
        let (_dir, store) = temp_store();
        let v = random_value(&store, "postalCode", "12345").await;
        assert_eq!(v, "12345");
    }

    #[tokio::test]
    async fn configured_empty_list_yields_empty_value() {
        let (_dir, store) = temp_store();
        let mut values = FieldValues::new();
        values.insert("postalCode".to_string(), vec![]);
        store.set(keys::FIELD_VALUES, &values).await;

        let v = random_value(&store, "postalCode", "12345").await;
        assert_eq!(v, "");
    }

    #[tokio::test]
    async fn configured_list_is_sampled() {
        let (_dir, store) = temp_store();
        let mut values = FieldValues::new();
        values.insert("gender".to_string(), vec!["X".to_string()]);
        store.set(keys::FIELD_VALUES, &values).await;

        assert_eq!(random_value(&store, "gender", "M").await, "X");
    }

    #[tokio::test]
    async fn add_remove_reset_value_list() {
        let (_dir, store) = temp_store();
        let list = add_value(&store, "gender", "X").await.unwrap();
        assert!(list.contains(&"X".to_string()));
        // duplicate adds are ignored
        let list = add_value(&store, "gender", "X").await.unwrap();
        assert_eq!(list.iter().filter(|v| *v == "X").count(), 1);

        let list = remove_value(&store, "gender", "X").await.unwrap();
        assert!(!list.contains(&"X".to_string()));

        let restored = reset_field(&store, "gender").await.unwrap();
        assert_eq!(restored, vec!["M".to_string(), "F".to_string()]);
    }

    #[tokio::test]
    async fn custom_field_lifecycle_creates_value_slot() {
        let (_dir, store) = temp_store();
        add_custom_field(&store, "iban", "IBAN", "#textarea-field-IBAN")
            .await
            .unwrap();

        let fields = load_custom_fields(&store).await;
        assert_eq!(fields["iban"].selector, "#textarea-field-IBAN");
        let values = load_field_values(&store).await;
        assert_eq!(values["iban"], Vec::<String>::new());

        remove_custom_field(&store, "iban").await.unwrap();
        assert!(load_custom_fields(&store).await.is_empty());
        assert!(!load_field_values(&store).await.contains_key("iban"));
    }

    #[tokio::test]
    async fn legacy_string_custom_fields_are_normalized() {
        let (_dir, store) = temp_store();
        let mut raw = serde_json::Map::new();
        raw.insert("iban".to_string(), serde_json::json!("IBAN"));
        store.set(keys::CUSTOM_FIELDS, &raw).await;

        let fields = load_custom_fields(&store).await;
        assert_eq!(
            fields["iban"],
            CustomField {
                label: "IBAN".to_string(),
                selector: String::new(),
            }
        );
    }

    #[test]
    fn selector_key_derivation_strips_noise() {
        assert_eq!(derive_key_from_selector("#textarea-field-IBAN"), "textareafieldIBAN");
        assert_eq!(derive_key_from_selector("  plain "), "plain");
    }

    #[tokio::test]
    async fn countries_add_is_idempotent() {
        let (_dir, store) = temp_store();
        let list = add_country(&store, " Spain ").await.unwrap();
        assert!(list.contains(&"Spain".to_string()));
        let list = add_country(&store, "Spain").await.unwrap();
        assert_eq!(list.iter().filter(|c| *c == "Spain").count(), 1);
        let list = remove_country(&store, "Spain").await.unwrap();
        assert!(!list.contains(&"Spain".to_string()));
    }
}
