//! Conversion between plain JSON and Firestore's typed value encoding.

use serde_json::{json, Map, Value};

/// Top-level fields stored as `timestampValue` rather than strings.
const TIMESTAMP_FIELDS: &[&str] = &[
    "createdAt",
    "updatedAt",
    "startedAt",
    "completedAt",
    "lastUpdated",
];

/// Encode one JSON value as a Firestore `Value`.
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({ "integerValue": i.to_string() })
            } else if let Some(u) = n.as_u64() {
                json!({ "integerValue": u.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64().unwrap_or_default() })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            if items.is_empty() {
                json!({ "arrayValue": {} })
            } else {
                let values: Vec<Value> = items.iter().map(encode_value).collect();
                json!({ "arrayValue": { "values": values } })
            }
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_map(map) } }),
    }
}

fn encode_map(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(k, v)| (k.clone(), encode_value(v)))
        .collect()
}

/// Encode the top-level fields of a record, typing known timestamp fields.
pub fn encode_fields(record: &Map<String, Value>) -> Map<String, Value> {
    record
        .iter()
        .map(|(key, value)| {
            let encoded = match value {
                Value::String(s) if TIMESTAMP_FIELDS.contains(&key.as_str()) => {
                    json!({ "timestampValue": s })
                }
                other => encode_value(other),
            };
            (key.clone(), encoded)
        })
        .collect()
}

/// Decode a Firestore `Value` back into plain JSON.
pub fn decode_value(value: &Value) -> Result<Value, String> {
    let obj = value
        .as_object()
        .ok_or_else(|| format!("expected a typed value, got {value}"))?;
    let (kind, inner) = obj
        .iter()
        .next()
        .ok_or_else(|| "empty typed value".to_string())?;

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" => Ok(inner.clone()),
        "integerValue" => {
            let n: i64 = match inner {
                Value::String(s) => s
                    .parse()
                    .map_err(|e| format!("bad integerValue '{s}': {e}"))?,
                Value::Number(n) => n
                    .as_i64()
                    .ok_or_else(|| format!("bad integerValue {n}"))?,
                other => return Err(format!("bad integerValue {other}")),
            };
            Ok(Value::from(n))
        }
        "doubleValue" => Ok(inner.clone()),
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => Ok(inner.clone()),
        "arrayValue" => {
            let values = inner
                .get("values")
                .and_then(Value::as_array)
                .map(|items| items.iter().map(decode_value).collect::<Result<Vec<_>, _>>())
                .transpose()?
                .unwrap_or_default();
            Ok(Value::Array(values))
        }
        "mapValue" => {
            let fields = inner.get("fields").and_then(Value::as_object);
            Ok(Value::Object(match fields {
                Some(fields) => decode_fields(fields)?,
                None => Map::new(),
            }))
        }
        other => Err(format!("unsupported value type {other}")),
    }
}

fn decode_fields(fields: &Map<String, Value>) -> Result<Map<String, Value>, String> {
    fields
        .iter()
        .map(|(k, v)| decode_value(v).map(|decoded| (k.clone(), decoded)))
        .collect()
}

/// Decode a Firestore document into a JSON object with an `id` field taken
/// from the last segment of the document name.
pub fn decode_document(document: &Value) -> Result<Value, String> {
    let name = document
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| "document has no name".to_string())?;
    let id = name.rsplit('/').next().unwrap_or(name);

    let mut record = match document.get("fields").and_then(Value::as_object) {
        Some(fields) => decode_fields(fields)?,
        None => Map::new(),
    };
    record.insert("id".into(), Value::String(id.to_string()));
    Ok(Value::Object(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_use_firestore_types() {
        assert_eq!(encode_value(&json!(3)), json!({ "integerValue": "3" }));
        assert_eq!(encode_value(&json!(66.67)), json!({ "doubleValue": 66.67 }));
        assert_eq!(encode_value(&json!(true)), json!({ "booleanValue": true }));
        assert_eq!(encode_value(&json!(null)), json!({ "nullValue": null }));
        assert_eq!(encode_value(&json!([])), json!({ "arrayValue": {} }));
    }

    #[test]
    fn timestamps_are_typed_only_at_known_fields() {
        let record = json!({
            "createdAt": "2024-03-01T12:00:00Z",
            "title": "2024-03-01T12:00:00Z",
        });
        let fields = encode_fields(record.as_object().unwrap());
        assert!(fields["createdAt"].get("timestampValue").is_some());
        assert!(fields["title"].get("stringValue").is_some());
    }

    #[test]
    fn nested_values_survive_encoding() {
        let record = json!({
            "alternatives": [{ "id": "a", "text": "Sim" }, { "id": "b", "text": "Não" }],
            "totalAttempts": 4,
            "successRate": 50.0,
            "explanation": null,
        });
        let encoded = encode_value(&record);
        assert_eq!(decode_value(&encoded).unwrap(), record);
    }

    #[test]
    fn document_name_becomes_id() {
        let doc = json!({
            "name": "projects/p/databases/(default)/documents/questions/q-42",
            "fields": {
                "subject": { "stringValue": "Matemática" },
                "examYear": { "integerValue": "2023" }
            }
        });
        let decoded = decode_document(&doc).unwrap();
        assert_eq!(decoded["id"], "q-42");
        assert_eq!(decoded["examYear"], 2023);
    }

    #[test]
    fn rejects_unknown_value_types() {
        assert!(decode_value(&json!({ "geoPointValue": {} })).is_err());
        assert!(decode_value(&json!({ "integerValue": "abc" })).is_err());
    }
}
