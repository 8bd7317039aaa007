//! Core domain model for tender bookmarks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

pub const CRATE_NAME: &str = "tbm-core";

/// A bookmarked tender as persisted by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: i64,
    pub job_number: String,
    pub title: String,
    pub unit_name: String,
    pub url: String,
    pub api_url: String,
    #[serde(rename = "type")]
    pub tender_type: String,
    pub date: i64,
    pub note: String,
    pub priority: i64,
    pub created_at: DateTime<Utc>,
    /// Serialized tender record captured at bookmark time. Never parsed here.
    pub data: String,
}

/// Upsert input. Every field falls back to its zero value when absent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewBookmark {
    pub job_number: String,
    pub title: String,
    pub unit_name: String,
    pub url: String,
    pub api_url: String,
    #[serde(rename = "type")]
    pub tender_type: String,
    pub date: i64,
    pub note: String,
    pub priority: i64,
    #[serde(deserialize_with = "data_as_string")]
    pub data: String,
}

impl NewBookmark {
    pub fn new(job_number: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            job_number: job_number.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    /// Builds a bookmark from a pipeline tender, keeping the full record in `data`.
    pub fn from_tender(tender: &Tender) -> Result<Self, serde_json::Error> {
        Ok(Self {
            job_number: tender.job_number.clone(),
            title: tender.title.clone(),
            unit_name: tender.unit_name.clone(),
            url: tender.url.clone(),
            api_url: tender.api_url.clone(),
            tender_type: tender.tender_type.clone(),
            date: tender.date,
            note: String::new(),
            priority: 0,
            data: serde_json::to_string(tender)?,
        })
    }

    /// Materializes the stored row for a freshly assigned id.
    pub fn into_bookmark(self, id: i64, created_at: DateTime<Utc>) -> Bookmark {
        Bookmark {
            id,
            job_number: self.job_number,
            title: self.title,
            unit_name: self.unit_name,
            url: self.url,
            api_url: self.api_url,
            tender_type: self.tender_type,
            date: self.date,
            note: self.note,
            priority: self.priority,
            created_at,
            data: self.data,
        }
    }
}

/// The only mutation allowed on an existing bookmark.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationUpdate {
    pub job_number: String,
    pub note: String,
    pub priority: i64,
}

/// Tender record as emitted by the ingestion/classification pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Tender {
    pub date: i64,
    pub title: String,
    #[serde(rename = "type")]
    pub tender_type: String,
    pub unit_name: String,
    pub job_number: String,
    pub url: String,
    pub api_url: String,
    pub matched_categories: Vec<String>,
    pub matched_keywords: Vec<String>,
}

// Clients send `data` either pre-stringified or as a raw object.
fn data_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => s,
        Some(other) => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_bookmark_defaults_missing_fields() {
        let parsed: NewBookmark =
            serde_json::from_str(r#"{"job_number":"A1","title":"Road Repair"}"#).unwrap();
        assert_eq!(parsed.job_number, "A1");
        assert_eq!(parsed.priority, 0);
        assert_eq!(parsed.note, "");
        assert_eq!(parsed.data, "");
    }

    #[test]
    fn data_accepts_string_or_object() {
        let stringified: NewBookmark =
            serde_json::from_str(r#"{"job_number":"A1","data":"{\"k\":1}"}"#).unwrap();
        assert_eq!(stringified.data, r#"{"k":1}"#);

        let object: NewBookmark =
            serde_json::from_str(r#"{"job_number":"A1","data":{"k":1}}"#).unwrap();
        assert_eq!(object.data, r#"{"k":1}"#);

        let null: NewBookmark = serde_json::from_str(r#"{"job_number":"A1","data":null}"#).unwrap();
        assert_eq!(null.data, "");
    }

    #[test]
    fn type_field_uses_wire_name() {
        let parsed: NewBookmark =
            serde_json::from_str(r#"{"job_number":"A1","type":"工程類"}"#).unwrap();
        assert_eq!(parsed.tender_type, "工程類");

        let bookmark = parsed.into_bookmark(7, Utc::now());
        let value = serde_json::to_value(&bookmark).unwrap();
        assert_eq!(value["type"], "工程類");
        assert_eq!(value["id"], 7);
        assert!(value.get("tender_type").is_none());
    }

    #[test]
    fn from_tender_keeps_full_record_in_data() {
        let tender = Tender {
            date: 20260105,
            title: "Bridge Inspection".into(),
            tender_type: "勞務類".into(),
            unit_name: "Highway Bureau".into(),
            job_number: "1150105/B".into(),
            url: "https://example.test/t/1".into(),
            api_url: "https://example.test/api/1".into(),
            matched_categories: vec!["inspection".into()],
            matched_keywords: vec!["bridge".into()],
        };

        let bookmark = NewBookmark::from_tender(&tender).unwrap();
        assert_eq!(bookmark.job_number, "1150105/B");
        assert_eq!(bookmark.date, 20260105);
        assert_eq!(bookmark.note, "");

        let round: Tender = serde_json::from_str(&bookmark.data).unwrap();
        assert_eq!(round, tender);
    }
}
