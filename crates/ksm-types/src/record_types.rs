//! Read-only directory of vault record templates, consumed by the
//! `get_record_type_schema` tool. Not mutated at runtime — this is a
//! representative subset of Keeper's real record-type catalog, enough to
//! exercise the tool and the field-safety rules.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub field_type: String,
    pub label: String,
    #[serde(default)]
    pub sub_fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordTypeSchema {
    pub name: String,
    pub description: String,
    pub required_fields: Vec<FieldSpec>,
    pub optional_fields: Vec<FieldSpec>,
}

fn field(field_type: &str, label: &str) -> FieldSpec {
    FieldSpec {
        field_type: field_type.to_string(),
        label: label.to_string(),
        sub_fields: vec![],
    }
}

fn complex_field(field_type: &str, label: &str, sub_fields: &[&str]) -> FieldSpec {
    FieldSpec {
        field_type: field_type.to_string(),
        label: label.to_string(),
        sub_fields: sub_fields.iter().map(|s| s.to_string()).collect(),
    }
}

/// Single-valued field types where a caller supplying multiple values is
/// a non-fatal mistake the engine silently corrects.
pub const STANDARD_SINGLE_VALUE_FIELDS: &[&str] = &[
    "password",
    "login",
    "email",
    "oneTimeCode",
    "licenseNumber",
    "accountNumber",
    "pinCode",
    "securityCode",
    "cardNumber",
    "routingNumber",
];

/// Structured field types passed through unchecked: their schema already
/// requires multiple sub-values.
pub const COMPLEX_FIELDS: &[&str] = &[
    "bankAccount",
    "address",
    "phone",
    "keyPair",
    "securityQuestion",
    "passkey",
    "pamHostname",
    "pamResources",
];

pub fn catalog() -> Vec<RecordTypeSchema> {
    vec![
        RecordTypeSchema {
            name: "login".to_string(),
            description: "Username/password credential with an optional URL".to_string(),
            required_fields: vec![field("login", "Login"), field("password", "Password")],
            optional_fields: vec![
                field("url", "Website Address"),
                field("oneTimeCode", "Two Factor Code"),
                complex_field("securityQuestion", "Security Question & Answer", &["question", "answer"]),
            ],
        },
        RecordTypeSchema {
            name: "databaseCredentials".to_string(),
            description: "Database connection credential".to_string(),
            required_fields: vec![
                field("login", "Username"),
                field("password", "Password"),
                complex_field("pamHostname", "Host", &["hostName", "port"]),
            ],
            optional_fields: vec![field("text", "Database Name")],
        },
        RecordTypeSchema {
            name: "sshKeys".to_string(),
            description: "SSH key pair credential".to_string(),
            required_fields: vec![
                field("login", "Username"),
                complex_field("keyPair", "Key Pair", &["publicKey", "privateKey"]),
            ],
            optional_fields: vec![
                field("password", "Passphrase"),
                complex_field("pamHostname", "Host", &["hostName", "port"]),
            ],
        },
        RecordTypeSchema {
            name: "apiKey".to_string(),
            description: "Generic API key/token credential".to_string(),
            required_fields: vec![field("secret", "API Key")],
            optional_fields: vec![field("url", "API Endpoint"), field("text", "Key Name")],
        },
        RecordTypeSchema {
            name: "bankAccount".to_string(),
            description: "Bank account credential".to_string(),
            required_fields: vec![complex_field(
                "bankAccount",
                "Bank Account",
                &["accountType", "routingNumber", "accountNumber"],
            )],
            optional_fields: vec![field("name", "Account Holder Name")],
        },
        RecordTypeSchema {
            name: "contact".to_string(),
            description: "Contact information record (no secret fields)".to_string(),
            required_fields: vec![field("name", "Name")],
            optional_fields: vec![
                complex_field("phone", "Phone", &["number", "type"]),
                complex_field("address", "Address", &["street1", "city", "state", "zip"]),
                field("email", "Email"),
            ],
        },
    ]
}

pub fn lookup(name: &str) -> Option<RecordTypeSchema> {
    catalog().into_iter().find(|r| r.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_and_unknown() {
        assert!(lookup("login").is_some());
        assert!(lookup("not-a-real-type").is_none());
    }

    #[test]
    fn standard_and_complex_sets_disjoint() {
        for f in STANDARD_SINGLE_VALUE_FIELDS {
            assert!(!COMPLEX_FIELDS.contains(f));
        }
    }
}
