//! Value transforms applied while binding a source column to a property.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Transform tag on a property mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transform {
    /// Any supported date or datetime text to `YYYY-MM-DD`.
    DateCast,
    /// Trimmed, lowercased.
    CaseFold,
    /// Trimmed, uppercased.
    Upper,
    Trim,
    /// Host part of a URL, lowercased, without a leading `www.`.
    Domain,
    /// Lookup table, exact match first, then case-insensitive.
    EnumRemap {
        mapping: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<String>,
    },
}

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%B %d, %Y", "%d %B %Y", "%b %d, %Y"];

impl Transform {
    pub fn name(&self) -> &'static str {
        match self {
            Transform::DateCast => "date_cast",
            Transform::CaseFold => "case_fold",
            Transform::Upper => "upper",
            Transform::Trim => "trim",
            Transform::Domain => "domain",
            Transform::EnumRemap { .. } => "enum_remap",
        }
    }

    /// Apply the transform. Nulls and blank text become null.
    pub fn apply(&self, value: &Value) -> Result<Value, String> {
        let text = match value {
            Value::Null => return Ok(Value::Null),
            Value::String(s) if s.trim().is_empty() => return Ok(Value::Null),
            Value::String(s) => s.as_str(),
            other if matches!(self, Transform::EnumRemap { .. }) => {
                return Ok(self.remap(&scalar_text(other)).unwrap_or_else(|| other.clone()));
            }
            other => {
                return Err(format!("{} expects text, got {}", self.name(), other));
            }
        };

        match self {
            Transform::DateCast => cast_date(text).map(Value::String),
            Transform::CaseFold => Ok(Value::String(text.trim().to_lowercase())),
            Transform::Upper => Ok(Value::String(text.trim().to_uppercase())),
            Transform::Trim => Ok(Value::String(text.trim().to_string())),
            Transform::Domain => extract_domain(text).map(Value::String),
            Transform::EnumRemap { .. } => {
                Ok(self.remap(text).unwrap_or_else(|| Value::String(text.to_string())))
            }
        }
    }

    fn remap(&self, text: &str) -> Option<Value> {
        let Transform::EnumRemap { mapping, default } = self else {
            return None;
        };
        mapping
            .get(text)
            .or_else(|| {
                mapping
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(text.trim()))
                    .map(|(_, v)| v)
            })
            .or(default.as_ref())
            .map(|v| Value::String(v.clone()))
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Normalize a date or datetime string to `YYYY-MM-DD`.
pub fn cast_date(text: &str) -> Result<String, String> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.date_naive().format("%Y-%m-%d").to_string());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(dt.date().format("%Y-%m-%d").to_string());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Ok(date.format("%Y-%m-%d").to_string());
        }
    }

    Err(format!("unrecognized date '{text}'"))
}

/// Host of a URL (or bare host), lowercased, `www.` stripped.
pub fn extract_domain(text: &str) -> Result<String, String> {
    let trimmed = text.trim();
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    // Drop credentials and port.
    let host = host.rsplit('@').next().unwrap_or_default();
    let host = host.split(':').next().unwrap_or_default().to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();

    if host.is_empty() || !host.contains('.') {
        Err(format!("no domain in '{text}'"))
    } else {
        Ok(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_date_cast() {
        let t = Transform::DateCast;
        assert_eq!(t.apply(&json!("2026-01-05")).unwrap(), json!("2026-01-05"));
        assert_eq!(t.apply(&json!("2026-01-05T23:30:00Z")).unwrap(), json!("2026-01-05"));
        assert_eq!(t.apply(&json!("2026-01-05 10:30:00")).unwrap(), json!("2026-01-05"));
        assert_eq!(t.apply(&json!("January 05, 2026")).unwrap(), json!("2026-01-05"));
        assert_eq!(t.apply(&Value::Null).unwrap(), Value::Null);
        assert!(t.apply(&json!("soon")).is_err());
        assert_eq!(t.apply(&json!("")).unwrap(), Value::Null);
        assert_eq!(t.apply(&json!("   ")).unwrap(), Value::Null);
        assert!(t.apply(&json!(20260105)).is_err());
    }

    #[test]
    fn test_case_transforms() {
        assert_eq!(Transform::CaseFold.apply(&json!("LuMoRa")).unwrap(), json!("lumora"));
        assert_eq!(Transform::Upper.apply(&json!("fda")).unwrap(), json!("FDA"));
        assert_eq!(Transform::Upper.apply(&json!(" fda ")).unwrap(), json!("FDA"));
        assert_eq!(Transform::CaseFold.apply(&json!("Recall ")).unwrap(), json!("recall"));
        assert_eq!(Transform::Trim.apply(&json!("  x ")).unwrap(), json!("x"));
    }

    #[test]
    fn test_domain() {
        assert_eq!(
            Transform::Domain.apply(&json!("https://www.FDA.gov/news/123?x=1")).unwrap(),
            json!("fda.gov")
        );
        assert_eq!(extract_domain("ema.europa.eu/en/news").unwrap(), "ema.europa.eu");
        assert_eq!(extract_domain("http://user@press.mhra.gov.uk:8443/a").unwrap(), "press.mhra.gov.uk");
        assert!(extract_domain("not a url").is_err());
        assert_eq!(Transform::Domain.apply(&json!("")).unwrap(), Value::Null);
    }

    #[test]
    fn test_enum_remap() {
        let t: Transform = serde_json::from_value(json!({
            "kind": "enum_remap",
            "mapping": {"approved": "APPROVAL", "refused": "REFUSAL"},
            "default": "OTHER"
        }))
        .unwrap();
        assert_eq!(t.apply(&json!("approved")).unwrap(), json!("APPROVAL"));
        assert_eq!(t.apply(&json!("Refused")).unwrap(), json!("REFUSAL"));
        assert_eq!(t.apply(&json!("withdrawn")).unwrap(), json!("OTHER"));

        let no_default = Transform::EnumRemap {
            mapping: BTreeMap::from([("1".to_string(), "PHASE_1".to_string())]),
            default: None,
        };
        assert_eq!(no_default.apply(&json!(1)).unwrap(), json!("PHASE_1"));
        assert_eq!(no_default.apply(&json!("4")).unwrap(), json!("4"));
    }
}
