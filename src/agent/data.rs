//! Generated form data and override precedence
//!
//! Every submission starts from a full set of generated values, sampled from
//! the store's per-field value lists (falling back to built-in defaults).
//! The sandbox override and the per-case test value are then layered on top:
//! generated -> sandbox -> explicit test case. A blank test case never
//! overrides anything, so even empty slots submit well-formed data.

use crate::store::{fields, KvStore};
use chrono::Utc;
use fake::faker::address::en::CityName;
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::{FirstName, Name};
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use serde::Serialize;

/// One submission's worth of form values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormData {
    pub first_name: String,
    pub last_name: String,
    pub day: String,
    pub month: String,
    pub year: String,
    pub house_number: String,
    pub street_name: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub telephone: String,
    pub cell_number: String,
    pub gender: String,
    pub email: String,
}

/// Generate a full data set from the store's value lists
pub async fn generate(store: &KvStore) -> FormData {
    let email_fallback = format!("test{}@example.com", Utc::now().timestamp_millis());
    FormData {
        first_name: sample(store, "firstName", "allMatch").await,
        last_name: sample(store, "lastName", "Smith").await,
        day: sample(store, "dayOfBirth", "15").await,
        month: sample(store, "monthOfBirth", "06").await,
        year: sample(store, "yearOfBirth", "1990").await,
        house_number: sample(store, "houseNumber", "123").await,
        street_name: sample(store, "streetName", "Main Street").await,
        city: sample(store, "city", "Springfield").await,
        state: sample(store, "stateProvince", "CA").await,
        postal_code: sample(store, "postalCode", "12345").await,
        telephone: sample(store, "telephone", "3001234567").await,
        cell_number: sample(store, "cellNumber", "7001234567").await,
        gender: sample(store, "gender", "M").await,
        email: sample(store, "emailAddress", &email_fallback).await,
    }
}

async fn sample(store: &KvStore, field: &str, fallback: &str) -> String {
    resolve_value(&fields::random_value(store, field, fallback).await)
}

/// Expand `random:` placeholders in stored value lists into fresh fake data.
/// Anything else passes through unchanged.
pub fn resolve_value(raw: &str) -> String {
    let Some(kind) = raw.strip_prefix("random:") else {
        return raw.to_string();
    };
    match kind.to_lowercase().as_str() {
        "email" | "safeemail" => SafeEmail().fake(),
        "name" | "fullname" => Name().fake(),
        "firstname" => FirstName().fake(),
        "phone" | "phonenumber" => PhoneNumber().fake(),
        "city" => CityName().fake(),
        _ => raw.to_string(),
    }
}

impl FormData {
    /// Mutable access by data-field key (the store/sandbox naming)
    pub fn field_mut(&mut self, key: &str) -> Option<&mut String> {
        match key {
            "firstName" => Some(&mut self.first_name),
            "lastName" => Some(&mut self.last_name),
            "day" | "dayOfBirth" => Some(&mut self.day),
            "month" | "monthOfBirth" => Some(&mut self.month),
            "year" | "yearOfBirth" => Some(&mut self.year),
            "houseNumber" => Some(&mut self.house_number),
            "streetName" => Some(&mut self.street_name),
            "city" => Some(&mut self.city),
            "state" | "stateProvince" => Some(&mut self.state),
            "postalCode" => Some(&mut self.postal_code),
            "telephone" => Some(&mut self.telephone),
            "cellNumber" => Some(&mut self.cell_number),
            "gender" => Some(&mut self.gender),
            "email" | "emailAddress" => Some(&mut self.email),
            _ => None,
        }
    }

    /// Force a data field to the sandbox value. Unknown keys are left to the
    /// DOM-level sandbox pass and return `false` here.
    pub fn apply_sandbox(&mut self, key: &str, value: &str) -> bool {
        if key.is_empty() {
            return false;
        }
        match self.field_mut(key) {
            Some(slot) => {
                *slot = value.to_string();
                true
            }
            None => false,
        }
    }

    /// Apply the explicit test-case override for the field under test.
    /// Blank values are ignored so the generated value survives.
    pub fn apply_case_override(&mut self, field_to_test: &str, value: &str) -> bool {
        if value.trim().is_empty() {
            return false;
        }
        let slot = match field_to_test {
            "CellNumber" => &mut self.cell_number,
            "Telephone" => &mut self.telephone,
            "PostalCode" => &mut self.postal_code,
            "EmailAddress" => &mut self.email,
            "Gender" => &mut self.gender,
            "StateProvince" => &mut self.state,
            _ => return false,
        };
        *slot = value.to_string();
        true
    }
}

/// Selector for a built-in data field on the verification form
pub fn builtin_selector(key: &str) -> Option<&'static str> {
    match key {
        "firstName" => Some("#textarea-field-FirstName"),
        "lastName" => Some("#textarea-field-LastName"),
        "day" | "dayOfBirth" => Some("#number-range-field-DayOfBirth"),
        "month" | "monthOfBirth" => Some("#number-range-field-MonthOfBirth"),
        "year" | "yearOfBirth" => Some("#number-range-field-YearOfBirth"),
        "houseNumber" => Some("#textarea-field-HouseNumber"),
        "streetName" => Some("#textarea-field-StreetName"),
        "city" => Some("#textarea-field-City"),
        "postalCode" => Some("#textarea-field-PostalCode"),
        "telephone" => Some("#textarea-field-Telephone"),
        "cellNumber" => Some("#textarea-field-CellNumber"),
        "gender" => Some("#option-field-Gender"),
        "state" | "stateProvince" => Some("#option-field-StateProvince"),
        "email" | "emailAddress" => Some("#textarea-field-EmailAddress"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::keys;

    fn temp_store() -> (tempfile::TempDir, KvStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::new(dir.path().join("store.json"));
        (dir, store)
    }

    #[tokio::test]
    async fn generation_fills_every_field() {
        let (_dir, store) = temp_store();
        let data = generate(&store).await;
        assert_eq!(data.last_name, "Smith");
        assert_eq!(data.postal_code, "12345");
        assert!(data.email.starts_with("test"));
        assert!(data.email.ends_with("@example.com"));
    }

    #[tokio::test]
    async fn generation_respects_configured_lists() {
        let (_dir, store) = temp_store();
        let mut values = fields::FieldValues::new();
        values.insert("postalCode".to_string(), vec!["9999AB".to_string()]);
        store.set(keys::FIELD_VALUES, &values).await;

        let data = generate(&store).await;
        assert_eq!(data.postal_code, "9999AB");
    }

    #[test]
    fn blank_case_override_keeps_generated_value() {
        let mut data = FormData {
            postal_code: "12345".to_string(),
            ..Default::default()
        };
        assert!(!data.apply_case_override("PostalCode", ""));
        assert!(!data.apply_case_override("PostalCode", "   "));
        assert_eq!(data.postal_code, "12345");
    }

    #[test]
    fn explicit_case_override_wins() {
        let mut data = FormData {
            postal_code: "12345".to_string(),
            ..Default::default()
        };
        assert!(data.apply_case_override("PostalCode", "BADVALUE"));
        assert_eq!(data.postal_code, "BADVALUE");
    }

    #[test]
    fn sandbox_applies_only_to_known_keys() {
        let mut data = FormData::default();
        assert!(data.apply_sandbox("postalCode", "1111"));
        assert_eq!(data.postal_code, "1111");
        assert!(!data.apply_sandbox("notAField", "x"));
        assert!(!data.apply_sandbox("", "x"));
    }

    #[test]
    fn email_alias_maps_to_same_slot() {
        let mut data = FormData::default();
        data.apply_sandbox("emailAddress", "a@b.c");
        assert_eq!(data.email, "a@b.c");
        assert_eq!(
            builtin_selector("email"),
            builtin_selector("emailAddress")
        );
    }

    #[test]
    fn random_placeholders_expand() {
        let email = resolve_value("random:email");
        assert!(email.contains('@'));
        let name = resolve_value("random:firstname");
        assert!(!name.is_empty() && !name.starts_with("random:"));
        // unknown kinds and plain values pass through
        assert_eq!(resolve_value("random:zzz"), "random:zzz");
        assert_eq!(resolve_value("12345"), "12345");
    }
}
