//! Catalog records.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CatalogError;

/// A map as listed in the exchange catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MxMapInfo {
    /// Catalog site prefix, e.g. `tm` or `sm`
    pub prefix: String,
    pub id: u64,
    pub uid: String,
    pub name: String,
    pub author: String,
    pub uploaded: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub environment: String,
    pub map_type: String,
    pub title_pack: String,
    pub style: String,
    pub awards: u32,
    pub comments: u32,
}

impl MxMapInfo {
    /// Maps one entry of a search result.
    ///
    /// Track- and map-flavoured key names are both accepted.
    pub fn from_json(prefix: &str, value: &Value) -> Result<Self, CatalogError> {
        let id = first_of(value, &["TrackID", "MapID"])
            .and_then(Value::as_u64)
            .ok_or(CatalogError::MissingField("TrackID"))?;
        let uid = first_of(value, &["TrackUID", "MapUID"])
            .and_then(Value::as_str)
            .ok_or(CatalogError::MissingField("TrackUID"))?;

        Ok(Self {
            prefix: prefix.to_string(),
            id,
            uid: uid.to_string(),
            name: text(value, "Name"),
            author: text(value, "Username"),
            uploaded: value
                .get("UploadedAt")
                .and_then(Value::as_str)
                .and_then(parse_timestamp),
            updated: value
                .get("UpdatedAt")
                .and_then(Value::as_str)
                .and_then(parse_timestamp),
            environment: text(value, "EnvironmentName"),
            map_type: text(value, "MapType"),
            title_pack: text(value, "TitlePack"),
            style: text(value, "StyleName"),
            awards: count(value, "AwardCount"),
            comments: count(value, "CommentCount"),
        })
    }

    pub fn page_url(&self) -> String {
        format!("https://{}.mania-exchange.com/tracks/view/{}", self.prefix, self.id)
    }

    pub fn download_url(&self) -> String {
        format!(
            "https://{}.mania-exchange.com/tracks/download/{}",
            self.prefix, self.id
        )
    }
}

fn first_of<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| value.get(*key))
}

fn text(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn count(value: &Value, key: &str) -> u32 {
    value
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}

/// Parses RFC 3339 or a bare `YYYY-MM-DDTHH:MM:SS[.fff]`, read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
