use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::{DetectedItem, DetectionReport};
use crate::error::{ValidationError, Violation};

const SHELF_KEYS: [&str; 2] = ["shelf_id", "shelf_number"];
const ITEMS_KEYS: [&str; 2] = ["items", "items_detected"];
const NAME_KEYS: [&str; 3] = ["name", "product_name", "product"];
const LOCATION_KEYS: [&str; 2] = ["location", "rack"];

/// Validate a raw detection payload.
///
/// Collects every violated rule before failing. Unknown fields are ignored.
/// `now` stamps reports that carry no timestamp of their own.
pub fn validate_report(payload: &Value, now: DateTime<Utc>) -> Result<DetectionReport, ValidationError> {
    let mut violations = Vec::new();

    let Some(obj) = payload.as_object() else {
        return Err(ValidationError {
            violations: vec![Violation::new("$", "detection report must be a JSON object")],
        });
    };

    let shelf_id = validate_shelf_id(obj, &mut violations);
    let empty_percentage = validate_percentage(obj, &mut violations);
    let items = validate_items(obj, &mut violations);
    let timestamp = validate_timestamp(obj, &mut violations).unwrap_or(now);

    if !violations.is_empty() {
        return Err(ValidationError { violations });
    }

    // Both are Some when no violation was recorded.
    match (shelf_id, empty_percentage) {
        (Some(shelf_id), Some(empty_percentage)) => Ok(DetectionReport {
            shelf_id,
            empty_percentage,
            items,
            timestamp,
        }),
        _ => Err(ValidationError {
            violations: vec![Violation::new("$", "incomplete detection report")],
        }),
    }
}

fn first_present<'a>(obj: &'a Map<String, Value>, keys: &[&'static str]) -> Option<(&'static str, &'a Value)> {
    keys.iter()
        .find_map(|key| obj.get(*key).filter(|v| !v.is_null()).map(|v| (*key, v)))
}

fn validate_shelf_id(obj: &Map<String, Value>, violations: &mut Vec<Violation>) -> Option<String> {
    let Some((key, value)) = first_present(obj, &SHELF_KEYS) else {
        violations.push(Violation::new("shelf_id", "is required"));
        return None;
    };
    match value.as_str().map(str::trim) {
        Some(token) if !token.is_empty() && !token.chars().any(|c| c.is_whitespace() || c.is_control()) => {
            Some(token.to_string())
        }
        Some(_) => {
            violations.push(Violation::new(key, "must be a non-empty token without whitespace"));
            None
        }
        None => {
            violations.push(Violation::new(key, "must be a string"));
            None
        }
    }
}

fn validate_percentage(obj: &Map<String, Value>, violations: &mut Vec<Violation>) -> Option<f64> {
    let Some(value) = obj.get("empty_percentage").filter(|v| !v.is_null()) else {
        violations.push(Violation::new("empty_percentage", "is required"));
        return None;
    };
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(pct) if pct.is_finite() && (0.0..=100.0).contains(&pct) => Some(pct),
        Some(pct) => {
            violations.push(Violation::new(
                "empty_percentage",
                format!("must be between 0 and 100, got {pct}"),
            ));
            None
        }
        None => {
            violations.push(Violation::new("empty_percentage", "must be a number"));
            None
        }
    }
}

fn validate_items(obj: &Map<String, Value>, violations: &mut Vec<Violation>) -> Vec<DetectedItem> {
    let Some((key, value)) = first_present(obj, &ITEMS_KEYS) else {
        return Vec::new();
    };
    let Some(array) = value.as_array() else {
        violations.push(Violation::new(key, "must be an array"));
        return Vec::new();
    };

    let mut items = Vec::with_capacity(array.len());
    for (index, element) in array.iter().enumerate() {
        let path = format!("{key}[{index}]");
        let Some(item) = element.as_object() else {
            violations.push(Violation::new(path, "must be an object"));
            continue;
        };
        if let Some(parsed) = validate_item(item, &path, violations) {
            items.push(parsed);
        }
    }
    items
}

fn validate_item(
    item: &Map<String, Value>,
    path: &str,
    violations: &mut Vec<Violation>,
) -> Option<DetectedItem> {
    let before = violations.len();

    let name = match first_present(item, &NAME_KEYS) {
        Some((_, Value::String(s))) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some((key, _)) => {
            violations.push(Violation::new(format!("{path}.{key}"), "must be a non-empty string"));
            None
        }
        None => {
            violations.push(Violation::new(format!("{path}.name"), "is required"));
            None
        }
    };

    let quantity = match item.get("quantity").filter(|v| !v.is_null()) {
        Some(Value::Number(n)) => match (n.as_u64(), n.as_i64()) {
            (Some(q), _) => match u32::try_from(q) {
                Ok(q) => Some(q),
                Err(_) => {
                    violations.push(Violation::new(format!("{path}.quantity"), "is too large"));
                    None
                }
            },
            (None, Some(_)) => {
                violations.push(Violation::new(format!("{path}.quantity"), "must be >= 0"));
                None
            }
            _ => {
                violations.push(Violation::new(
                    format!("{path}.quantity"),
                    "must be a non-negative integer",
                ));
                None
            }
        },
        Some(_) => {
            violations.push(Violation::new(format!("{path}.quantity"), "must be a non-negative integer"));
            None
        }
        None => {
            violations.push(Violation::new(format!("{path}.quantity"), "is required"));
            None
        }
    };

    let location = match first_present(item, &LOCATION_KEYS) {
        Some((_, Value::String(s))) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some((_, Value::String(_))) => None,
        Some((key, _)) => {
            violations.push(Violation::new(format!("{path}.{key}"), "must be a string"));
            None
        }
        None => None,
    };

    let confidence = match item.get("confidence").filter(|v| !v.is_null()) {
        Some(Value::Number(n)) => match n.as_f64() {
            Some(c) if (0.0..=1.0).contains(&c) => Some(c),
            _ => {
                violations.push(Violation::new(format!("{path}.confidence"), "must be between 0 and 1"));
                None
            }
        },
        Some(_) => {
            violations.push(Violation::new(format!("{path}.confidence"), "must be a number"));
            None
        }
        None => None,
    };

    if violations.len() != before {
        return None;
    }
    Some(DetectedItem {
        name: name?,
        quantity: quantity?,
        location,
        confidence,
    })
}

fn validate_timestamp(obj: &Map<String, Value>, violations: &mut Vec<Violation>) -> Option<DateTime<Utc>> {
    let value = obj.get("timestamp").filter(|v| !v.is_null())?;
    match value.as_str().map(DateTime::parse_from_rfc3339) {
        Some(Ok(ts)) => Some(ts.with_timezone(&Utc)),
        _ => {
            violations.push(Violation::new("timestamp", "must be an RFC 3339 date-time string"));
            None
        }
    }
}
