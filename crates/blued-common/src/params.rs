//! Strict JSON parameter parsing for RPC methods.
//!
//! Every method declares the parameters it accepts as a `Deserialize`
//! struct with `deny_unknown_fields`, plus a table of required fields
//! with the wire error to report when one is missing. Callers get the
//! most specific error the fixed table offers: a missing required field
//! maps to its dedicated code, anything else to `schemaValidationFail`,
//! and non-object payloads to `badJson`.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::ErrorCode;

/// A required field together with the error reported when it is absent.
pub type RequiredField = (&'static str, ErrorCode);

/// Parses `payload` into `T`, enforcing the required-field table first.
///
/// # Errors
///
/// Returns the matching [`ErrorCode`] for the first missing required
/// field, [`ErrorCode::BadJson`] for non-object payloads and
/// [`ErrorCode::SchemaValidationFail`] for payloads that do not match
/// the parameter schema.
pub fn parse<T: DeserializeOwned>(
    payload: &Value,
    required: &[RequiredField],
) -> Result<T, ErrorCode> {
    let Some(object) = payload.as_object() else {
        return Err(ErrorCode::BadJson);
    };

    for (field, code) in required {
        if !object.contains_key(*field) {
            return Err(*code);
        }
    }

    serde_json::from_value(payload.clone()).map_err(|_| ErrorCode::SchemaValidationFail)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::Address;

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase", deny_unknown_fields)]
    struct ConnectParams {
        address: Address,
        #[serde(default)]
        adapter_address: Option<Address>,
        #[serde(default)]
        subscribe: bool,
    }

    const REQUIRED: &[RequiredField] = &[("address", ErrorCode::AddrParamMissing)];

    #[test]
    fn accepts_valid_payload() {
        let params: ConnectParams = parse(
            &json!({"address": "aa:bb:cc:dd:ee:ff", "subscribe": true}),
            REQUIRED,
        )
        .expect("valid payload");
        assert_eq!(params.address.to_string(), "aa:bb:cc:dd:ee:ff");
        assert!(params.subscribe);
        assert!(params.adapter_address.is_none());
    }

    #[test]
    fn missing_required_field_maps_to_its_code() {
        let result: Result<ConnectParams, _> = parse(&json!({"subscribe": true}), REQUIRED);
        assert_eq!(result.expect_err("missing field"), ErrorCode::AddrParamMissing);
    }

    #[test]
    fn unknown_field_fails_schema_validation() {
        let result: Result<ConnectParams, _> = parse(
            &json!({"address": "aa:bb:cc:dd:ee:ff", "bogus": 1}),
            REQUIRED,
        );
        assert_eq!(
            result.expect_err("unknown field"),
            ErrorCode::SchemaValidationFail
        );
    }

    #[test]
    fn non_object_payload_is_bad_json() {
        let result: Result<ConnectParams, _> = parse(&json!([1, 2, 3]), REQUIRED);
        assert_eq!(result.expect_err("array payload"), ErrorCode::BadJson);
    }
}
