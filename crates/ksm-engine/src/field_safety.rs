//! Field-safety rules applied to `create_secret`/`update_secret` payloads
//! before they reach the vault capability.

use ksm_types::record_types::{COMPLEX_FIELDS, STANDARD_SINGLE_VALUE_FIELDS};
use serde_json::Value;
use std::collections::BTreeMap;

/// For standard single-valued fields, if the caller supplied an array
/// with more than one element, keep only the first and emit a warning.
/// Complex fields pass through untouched. Returns the (possibly
/// unmodified) fields plus any warnings.
pub fn sanitize_fields(mut fields: BTreeMap<String, Value>) -> (BTreeMap<String, Value>, Vec<String>) {
    let mut warnings = Vec::new();

    for (key, value) in fields.iter_mut() {
        if COMPLEX_FIELDS.contains(&key.as_str()) {
            continue;
        }
        if !STANDARD_SINGLE_VALUE_FIELDS.contains(&key.as_str()) {
            continue;
        }
        if let Value::Array(items) = value {
            if items.len() > 1 {
                warnings.push(format!(
                    "field '{key}' accepts a single value; using the first of {} supplied",
                    items.len()
                ));
                *value = items[0].clone();
            } else if let Some(first) = items.first() {
                *value = first.clone();
            }
        }
    }

    (fields, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn multiple_values_on_standard_field_warns_and_keeps_first() {
        let mut fields = BTreeMap::new();
        fields.insert("password".to_string(), json!(["a", "b", "c"]));
        let (sanitized, warnings) = sanitize_fields(fields);
        assert_eq!(sanitized["password"], json!("a"));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn complex_field_passes_through_unchecked() {
        let mut fields = BTreeMap::new();
        fields.insert("bankAccount".to_string(), json!({"accountType": "checking"}));
        let (sanitized, warnings) = sanitize_fields(fields);
        assert_eq!(sanitized["bankAccount"], json!({"accountType": "checking"}));
        assert!(warnings.is_empty());
    }

    #[test]
    fn single_value_standard_field_unaffected() {
        let mut fields = BTreeMap::new();
        fields.insert("login".to_string(), json!("alice"));
        let (sanitized, warnings) = sanitize_fields(fields);
        assert_eq!(sanitized["login"], json!("alice"));
        assert!(warnings.is_empty());
    }
}
