//! External source records.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One organisational unit as delivered by the external source.
///
/// Identifiers are kept as strings regardless of how the source encodes
/// them, so `7` and `"7"` refer to the same record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalRecord {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_text")]
    pub title: String,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub parent_id: Option<String>,
    #[serde(default, alias = "children_id", deserialize_with = "de_children")]
    pub children_ids: Option<Vec<String>>,
    #[serde(default, alias = "url_website", deserialize_with = "de_opt_text")]
    pub url: Option<String>,
}

impl ExternalRecord {
    /// Convenience constructor used by tests and fixtures.
    pub fn new(id: impl Into<String>, title: impl Into<String>, parent_id: Option<&str>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            parent_id: parent_id.map(str::to_string),
            children_ids: None,
            url: None,
        }
    }

    #[must_use]
    pub fn with_children(mut self, children: &[&str]) -> Self {
        self.children_ids = Some(children.iter().map(|c| (*c).to_string()).collect());
        self
    }

    #[must_use]
    pub fn with_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    /// Parent reference with blanks and `nan` treated as absent.
    #[must_use]
    pub fn parent_ref(&self) -> Option<&str> {
        self.parent_id.as_deref().and_then(normalize_reference)
    }

    /// Declared children with blanks and `nan` dropped.
    pub fn declared_children(&self) -> impl Iterator<Item = &str> {
        self.children_ids
            .iter()
            .flatten()
            .filter_map(|c| normalize_reference(c))
    }

    /// Trimmed title, `None` when empty.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        let title = self.title.trim();
        (!title.is_empty()).then_some(title)
    }

    /// Non-empty URL, if any.
    #[must_use]
    pub fn external_url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }
}

/// Treat empty strings and the literal `nan` as an absent reference.
#[must_use]
pub fn normalize_reference(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        None
    } else {
        Some(trimmed)
    }
}

/// One page of records from the external source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordPage {
    #[serde(default)]
    pub results: Vec<ExternalRecord>,
    #[serde(default)]
    pub total_count: u64,
}

// ── Lenient field decoding ─────────────────────────────────────────

fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(
            n.as_i64()
                .map(|i| i.to_string())
                .or_else(|| n.as_u64().map(|u| u.to_string()))
                .unwrap_or_else(|| n.to_string()),
        ),
        _ => None,
    }
}

fn de_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    value_to_id(&value).ok_or_else(|| serde::de::Error::custom("record id must be a string or number"))
}

fn de_opt_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_to_id))
}

fn de_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn de_opt_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Option::<String>::deserialize(deserializer)
}

/// Children arrive either as a JSON list or as a comma-separated string.
fn de_children<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Vec<String>>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => Some(items.iter().filter_map(value_to_id).collect()),
        Some(Value::String(s)) => Some(
            s.split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        Some(other) => value_to_id(&other).map(|id| vec![id]),
    })
}
