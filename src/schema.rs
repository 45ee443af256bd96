// 10.0: oracle response intake. oracle output is free text that should contain
// JSON; this module extracts it, validates it against a declarative schema, and
// falls back to safe defaults when anything is off. the caller never sees a
// parse error: a garbled rebalance response degrades to HOLD.

use serde_json::{json, Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchemaError {
    #[error("missing required field '{0}'")]
    MissingField(String),
    #[error("field '{field}' should be {expected}")]
    WrongType {
        field: String,
        expected: &'static str,
    },
    #[error("field '{field}' value {value} outside [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("response is not a JSON object")]
    NotAnObject,
}

// 10.1: field kinds the schemas use. Actions items only need an "action" tag
// here; full parameter validation happens later in risk::validate_parameters.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Text {
        allowed: &'static [&'static str],
    },
    Number {
        min: f64,
        max: f64,
    },
    TextArray,
    Actions,
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub required: bool,
    pub kind: FieldKind,
    pub default: Value,
}

#[derive(Debug, Clone)]
pub struct Schema {
    pub fields: Vec<FieldSpec>,
}

impl Schema {
    /// Object built purely from defaults. Used whenever validation fails.
    pub fn fallback(&self) -> Value {
        let mut map = Map::new();
        for field in &self.fields {
            map.insert(field.name.to_string(), field.default.clone());
        }
        Value::Object(map)
    }

    /// Validate and normalize: checks required fields, types, and ranges;
    /// fills defaults for anything optional that is absent.
    pub fn validate(&self, value: &Value) -> Result<Value, SchemaError> {
        let obj = value.as_object().ok_or(SchemaError::NotAnObject)?;
        let mut out = Map::new();

        for field in &self.fields {
            let present = obj.get(field.name);
            let value = match present {
                None if field.required => {
                    return Err(SchemaError::MissingField(field.name.to_string()))
                }
                None => field.default.clone(),
                Some(v) => check_field(field, v)?,
            };
            out.insert(field.name.to_string(), value);
        }

        Ok(Value::Object(out))
    }
}

fn check_field(field: &FieldSpec, value: &Value) -> Result<Value, SchemaError> {
    match &field.kind {
        FieldKind::Text { allowed } => {
            let s = value.as_str().ok_or(SchemaError::WrongType {
                field: field.name.to_string(),
                expected: "a string",
            })?;
            if !allowed.is_empty() && !allowed.contains(&s) {
                // off-vocabulary labels degrade to the default rather than fail
                return Ok(field.default.clone());
            }
            Ok(Value::String(s.to_string()))
        }
        FieldKind::Number { min, max } => {
            let n = value.as_f64().ok_or(SchemaError::WrongType {
                field: field.name.to_string(),
                expected: "a number",
            })?;
            if n < *min || n > *max {
                return Err(SchemaError::OutOfRange {
                    field: field.name.to_string(),
                    value: n,
                    min: *min,
                    max: *max,
                });
            }
            Ok(value.clone())
        }
        FieldKind::TextArray => {
            let items = value.as_array().ok_or(SchemaError::WrongType {
                field: field.name.to_string(),
                expected: "an array of strings",
            })?;
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let s = item.as_str().ok_or(SchemaError::WrongType {
                    field: field.name.to_string(),
                    expected: "an array of strings",
                })?;
                out.push(Value::String(s.to_string()));
            }
            Ok(Value::Array(out))
        }
        FieldKind::Actions => {
            let items = value.as_array().ok_or(SchemaError::WrongType {
                field: field.name.to_string(),
                expected: "an array of actions",
            })?;
            for item in items {
                let ok = item
                    .get("action")
                    .map(|a| a.is_string())
                    .unwrap_or(false);
                if !ok {
                    return Err(SchemaError::WrongType {
                        field: field.name.to_string(),
                        expected: "objects with an 'action' tag",
                    });
                }
            }
            Ok(value.clone())
        }
    }
}

// 10.2: JSON extraction from free-form oracle text. fenced block first, then
// the widest brace/bracket span.
pub fn extract_json(text: &str) -> Option<&str> {
    if let Some(fenced) = extract_fenced(text) {
        return Some(fenced);
    }

    let obj = span(text, '{', '}');
    let arr = span(text, '[', ']');
    match (obj, arr) {
        (Some(o), Some(a)) => {
            // prefer whichever opens first
            if text.find('{') < text.find('[') {
                Some(o)
            } else {
                Some(a)
            }
        }
        (Some(o), None) => Some(o),
        (None, Some(a)) => Some(a),
        (None, None) => None,
    }
}

fn extract_fenced(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after = &text[open + 3..];
    // skip an optional language tag like "json"
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    let close = body.find("```")?;
    let inner = body[..close].trim();
    if inner.is_empty() {
        None
    } else {
        Some(inner)
    }
}

fn span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

/// Extract, parse, and validate an oracle response. Any failure yields the
/// schema's fallback object, so callers always get a well-formed value.
pub fn parse_response(text: &str, schema: &Schema) -> Value {
    let candidate = match extract_json(text) {
        Some(c) => c,
        None => return schema.fallback(),
    };
    let parsed: Value = match serde_json::from_str(candidate) {
        Ok(v) => v,
        Err(_) => return schema.fallback(),
    };
    schema.validate(&parsed).unwrap_or_else(|_| schema.fallback())
}

// 10.3: the three response schemas.

fn text(name: &'static str, default: &str) -> FieldSpec {
    FieldSpec {
        name,
        required: false,
        kind: FieldKind::Text { allowed: &[] },
        default: Value::String(default.to_string()),
    }
}

fn labeled(
    name: &'static str,
    allowed: &'static [&'static str],
    default: &'static str,
) -> FieldSpec {
    FieldSpec {
        name,
        required: false,
        kind: FieldKind::Text { allowed },
        default: Value::String(default.to_string()),
    }
}

fn text_array(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        required: false,
        kind: FieldKind::TextArray,
        default: json!([]),
    }
}

fn hold_actions() -> Value {
    json!([{ "action": "HOLD", "reason": "fallback: response could not be used" }])
}

/// Periodic rebalance decision.
pub fn rebalance_schema() -> Schema {
    Schema {
        fields: vec![
            text("analysis", ""),
            labeled(
                "market_direction",
                &["bullish", "bearish", "neutral"],
                "neutral",
            ),
            labeled("confidence_level", &["low", "medium", "high"], "medium"),
            labeled(
                "time_horizon",
                &["short_term", "medium_term", "long_term"],
                "short_term",
            ),
            FieldSpec {
                name: "actions",
                required: false,
                kind: FieldKind::Actions,
                default: hold_actions(),
            },
        ],
    }
}

/// Initial allocation when a session opens.
pub fn strategy_schema() -> Schema {
    Schema {
        fields: vec![
            text("analysis", ""),
            FieldSpec {
                name: "actions",
                required: false,
                kind: FieldKind::Actions,
                default: hold_actions(),
            },
        ],
    }
}

/// Post-settlement performance review.
pub fn performance_schema() -> Schema {
    Schema {
        fields: vec![
            text("analysis", ""),
            FieldSpec {
                name: "rating",
                required: false,
                kind: FieldKind::Number { min: 0.0, max: 10.0 },
                default: json!(5),
            },
            text_array("strengths"),
            text_array("weaknesses"),
            text_array("key_learnings"),
            text_array("suggestions"),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_json() {
        let text = "Here is my plan:\n```json\n{\"action\": \"HOLD\"}\n```\nGood luck!";
        assert_eq!(extract_json(text), Some("{\"action\": \"HOLD\"}"));
    }

    #[test]
    fn extracts_bare_object() {
        let text = "I think {\"analysis\": \"flat\"} covers it";
        assert_eq!(extract_json(text), Some("{\"analysis\": \"flat\"}"));
    }

    #[test]
    fn no_json_at_all() {
        assert_eq!(extract_json("nothing to see here"), None);
    }

    #[test]
    fn garbage_falls_back_to_hold() {
        let value = parse_response("total nonsense", &rebalance_schema());
        let actions = value["actions"].as_array().unwrap();
        assert_eq!(actions[0]["action"], "HOLD");
        assert_eq!(value["market_direction"], "neutral");
    }

    #[test]
    fn valid_rebalance_passes_through() {
        let text = r#"```json
{
  "analysis": "breakout forming",
  "market_direction": "bullish",
  "confidence_level": "high",
  "time_horizon": "medium_term",
  "actions": [{"action": "OPEN_LONG", "coin": "bitcoin", "percentage_of_cash": 10, "leverage": 5}]
}
```"#;
        let value = parse_response(text, &rebalance_schema());
        assert_eq!(value["market_direction"], "bullish");
        assert_eq!(value["actions"][0]["action"], "OPEN_LONG");
    }

    #[test]
    fn off_vocabulary_label_degrades_to_default() {
        let text = r#"{"market_direction": "moon", "actions": [{"action": "HOLD"}]}"#;
        let value = parse_response(text, &rebalance_schema());
        assert_eq!(value["market_direction"], "neutral");
    }

    #[test]
    fn action_without_tag_rejects_whole_response() {
        let text = r#"{"actions": [{"coin": "bitcoin"}]}"#;
        let value = parse_response(text, &rebalance_schema());
        // fallback, not the half-valid original
        assert_eq!(value["actions"][0]["action"], "HOLD");
    }

    #[test]
    fn rating_out_of_range_falls_back() {
        let text = r#"{"rating": 42}"#;
        let value = parse_response(text, &performance_schema());
        assert_eq!(value["rating"], 5);
    }

    #[test]
    fn strategy_defaults_to_hold() {
        let value = parse_response("{}", &strategy_schema());
        assert_eq!(value["actions"][0]["action"], "HOLD");
        assert_eq!(value["analysis"], "");
    }

    #[test]
    fn missing_required_field_fails_validation() {
        let schema = Schema {
            fields: vec![FieldSpec {
                name: "analysis",
                required: true,
                kind: FieldKind::Text { allowed: &[] },
                default: Value::String(String::new()),
            }],
        };
        assert_eq!(
            schema.validate(&json!({})),
            Err(SchemaError::MissingField("analysis".to_string()))
        );
    }
}
