//! Conversion between plain JSON and Firestore's typed value encoding.
//!
//! Firestore REST documents look like
//! `{ "fields": { "name": { "stringValue": "x" }, "n": { "integerValue": "3" } } }`.

use serde_json::{json, Map, Value};

/// Encode one JSON value as a Firestore `Value`.
pub fn encode(v: &Value) -> Value {
    match v {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            // int64 travels as a decimal string
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            json!({ "arrayValue": { "values": items.iter().map(encode).collect::<Vec<_>>() } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

/// Encode a JSON object as a document `fields` map.
pub fn encode_fields(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter().map(|(k, v)| (k.clone(), encode(v))).collect()
}

/// Decode a Firestore `Value`. Unknown or malformed encodings become `null`.
pub fn decode(v: &Value) -> Value {
    let Some((kind, inner)) = v.as_object().and_then(|o| o.iter().next()) else {
        return Value::Null;
    };
    match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" => Value::Bool(inner.as_bool().unwrap_or_default()),
        "integerValue" => inner
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .or_else(|| inner.as_i64())
            .map(Value::from)
            .unwrap_or(Value::Null),
        "doubleValue" => inner.as_f64().map(Value::from).unwrap_or(Value::Null),
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner.clone(),
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|vals| vals.iter().map(decode).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => Value::Object(
            inner
                .get("fields")
                .and_then(Value::as_object)
                .map(decode_fields)
                .unwrap_or_default(),
        ),
        _ => Value::Null,
    }
}

pub fn decode_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields.iter().map(|(k, v)| (k.clone(), decode(v))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_nested_documents() {
        let doc = json!({
            "enabled": true,
            "count": 3,
            "ratio": 0.5,
            "name": "Turnos",
            "tags": ["a"],
            "inner": { "x": null }
        });
        let fields = encode_fields(doc.as_object().unwrap());
        assert_eq!(fields["enabled"], json!({ "booleanValue": true }));
        assert_eq!(fields["count"], json!({ "integerValue": "3" }));
        assert_eq!(fields["ratio"], json!({ "doubleValue": 0.5 }));
        assert_eq!(fields["name"], json!({ "stringValue": "Turnos" }));
        assert_eq!(
            fields["tags"],
            json!({ "arrayValue": { "values": [{ "stringValue": "a" }] } })
        );
        assert_eq!(
            fields["inner"],
            json!({ "mapValue": { "fields": { "x": { "nullValue": null } } } })
        );
        assert_eq!(Value::Object(decode_fields(&fields)), doc);
    }

    #[test]
    fn decodes_console_written_values() {
        // Documents edited in the console carry timestamps and empty arrays.
        let fields = json!({
            "autoSendTime": { "stringValue": "08:30" },
            "updatedAt": { "timestampValue": "2025-03-10T08:00:00Z" },
            "groups": { "arrayValue": {} },
            "weird": { "geoPointValue": { "latitude": 1 } }
        });
        let decoded = decode_fields(fields.as_object().unwrap());
        assert_eq!(decoded["autoSendTime"], json!("08:30"));
        assert_eq!(decoded["updatedAt"], json!("2025-03-10T08:00:00Z"));
        assert_eq!(decoded["groups"], json!([]));
        assert_eq!(decoded["weird"], Value::Null);
    }
}
