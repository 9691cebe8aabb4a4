//! Maps as reported by the dedicated server.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CatalogError;
use crate::format::strip_format_codes;
use crate::mx::MxMapInfo;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Map {
    /// Position in the server's map list, `-1` when unknown
    pub index: i32,
    pub name: String,
    pub uid: String,
    pub file_name: String,
    pub environment: String,
    pub gold_time: i64,
    pub copper_price: i64,
    pub map_type: String,
    pub map_style: String,
    /// `-1` when the server did not report it
    pub nb_checkpoints: i64,
    pub author_login: String,
    pub author_nick: String,
    /// Unix seconds at which this record was created
    pub start_time: i64,
    /// Unix seconds of the local map file's last update
    pub last_update: i64,
    pub mx: Option<MxMapInfo>,
}

impl Map {
    /// Builds a map from a `GetMapInfo`-style struct.
    pub fn from_rpc(info: &Value) -> Result<Self, CatalogError> {
        let author_login = required_str(info, "Author")?;

        Ok(Self {
            index: -1,
            name: strip_format_codes(&required_str(info, "Name")?),
            uid: required_str(info, "UId")?,
            file_name: required_str(info, "FileName")?,
            environment: required_str(info, "Environnement")?,
            gold_time: required_i64(info, "GoldTime")?,
            copper_price: required_i64(info, "CopperPrice")?,
            map_type: required_str(info, "MapType")?,
            map_style: required_str(info, "MapStyle")?,
            nb_checkpoints: info
                .get("NbCheckpoints")
                .and_then(Value::as_i64)
                .unwrap_or(-1),
            author_nick: author_login.clone(),
            author_login,
            start_time: Utc::now().timestamp(),
            last_update: 0,
            mx: None,
        })
    }

    /// Catalog site prefix for this map's game, if the catalog covers it.
    pub fn game(&self) -> Option<&'static str> {
        match self.environment.as_str() {
            "Storm" => Some("sm"),
            "Canyon" | "Stadium" | "Valley" | "Lagoon" => Some("tm"),
            _ => None,
        }
    }

    /// True when the catalog holds a newer version of this map.
    pub fn update_available(&self) -> bool {
        let Some(mx) = &self.mx else {
            return false;
        };
        let newer = mx
            .updated
            .is_some_and(|updated| self.last_update < updated.timestamp());
        newer || self.uid != mx.uid
    }
}

fn required_str(info: &Value, key: &'static str) -> Result<String, CatalogError> {
    info.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(CatalogError::MissingField(key))
}

fn required_i64(info: &Value, key: &'static str) -> Result<i64, CatalogError> {
    info.get(key)
        .and_then(Value::as_i64)
        .ok_or(CatalogError::MissingField(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mx::parse_timestamp;
    use serde_json::json;

    fn rpc_info() -> Value {
        json!({
            "Name": "$o$f80Canyon $fffSprint",
            "UId": "3yQ1BrA0lN6wR8mTq9cYxz",
            "FileName": "Downloaded/CanyonSprint.Map.Gbx",
            "Author": "kremsy",
            "Environnement": "Canyon",
            "GoldTime": 41250,
            "CopperPrice": 1402,
            "MapType": "Race",
            "MapStyle": ""
        })
    }

    fn catalog_info(uid: &str, updated: &str) -> MxMapInfo {
        MxMapInfo::from_json(
            "tm",
            &json!({"TrackID": 1, "TrackUID": uid, "UpdatedAt": updated}),
        )
        .unwrap()
    }

    #[test]
    fn test_from_rpc() {
        let map = Map::from_rpc(&rpc_info()).unwrap();
        assert_eq!(map.name, "Canyon Sprint");
        assert_eq!(map.author_nick, "kremsy");
        assert_eq!(map.nb_checkpoints, -1);
        assert_eq!(map.gold_time, 41250);
        assert!(map.start_time > 0);
        assert_eq!(map.game(), Some("tm"));
    }

    #[test]
    fn test_missing_field() {
        let mut info = rpc_info();
        info.as_object_mut().unwrap().remove("UId");
        assert!(matches!(
            Map::from_rpc(&info),
            Err(CatalogError::MissingField("UId"))
        ));
    }

    #[test]
    fn test_update_available() {
        let mut map = Map::from_rpc(&rpc_info()).unwrap();
        assert!(!map.update_available());

        let updated = "2014-04-02T08:30:00Z";
        map.last_update = parse_timestamp(updated).unwrap().timestamp();
        map.mx = Some(catalog_info(&map.uid, updated));
        assert!(!map.update_available());

        map.last_update -= 60;
        assert!(map.update_available());

        map.last_update += 60;
        map.mx = Some(catalog_info("another-uid", updated));
        assert!(map.update_available());
    }
}
