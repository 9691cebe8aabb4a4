//! Catalog search.
//!
//! [`MapSearch`] collects search criteria, renders them into the catalog's
//! search URL and fetches the matching maps. Only criteria that were set
//! end up in the query.

use reqwest::Url;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::CatalogError;
use crate::mx::MxMapInfo;

/// Minimum game build requested for games other than Trackmania.
pub const MIN_EXE_BUILD: &str = "2014-04-01_00_00";

/// Result orderings (`priord` / `secord`).
pub mod order {
    pub const NONE: i32 = -1;
    pub const TRACK_NAME: i32 = 0;
    pub const AUTHOR: i32 = 1;
    pub const UPLOADED_NEWEST: i32 = 2;
    pub const UPLOADED_OLDEST: i32 = 3;
    pub const UPDATED_NEWEST: i32 = 4;
    pub const UPDATED_OLDEST: i32 = 5;
    pub const ACTIVITY_LATEST: i32 = 6;
    pub const ACTIVITY_OLDEST: i32 = 7;
    pub const AWARDS_MOST: i32 = 8;
    pub const AWARDS_LEAST: i32 = 9;
    pub const COMMENTS_MOST: i32 = 10;
    pub const COMMENTS_LEAST: i32 = 11;
    pub const DIFFICULTY_EASIEST: i32 = 12;
    pub const DIFFICULTY_HARDEST: i32 = 13;
    pub const LENGTH_SHORTEST: i32 = 14;
    pub const LENGTH_LONGEST: i32 = 15;
    pub const TRACK_VALUE_LTH: i32 = 24;
    pub const TRACK_VALUE_HTL: i32 = 25;
    pub const ONLINE_RATING_LTH: i32 = 26;
    pub const ONLINE_RATING_HTL: i32 = 27;
}

/// Special listings (`mode`).
pub mod mode {
    pub const DEFAULT: i32 = 0;
    pub const USER_TRACKS: i32 = 1;
    pub const LATEST_TRACKS: i32 = 2;
    pub const RECENTLY_AWARDED: i32 = 3;
    pub const BEST_OF_WEEK_AWARDS: i32 = 4;
    pub const BEST_OF_MONTH_AWARDS: i32 = 5;
    pub const SUPPORTER_TRACKS: i32 = 10;
    pub const DUO_ACCOUNT_TRACKS: i32 = 11;
    pub const MOST_COMPETITIVE_WEEK: i32 = 19;
    pub const MOST_COMPETITIVE_MONTH: i32 = 20;
    pub const BEST_ONLINE_RATING_WEEK: i32 = 21;
    pub const BEST_ONLINE_RATING_MONTH: i32 = 22;
}

/// Catalog environment number for a title id such as `TMCanyon@nadeo`.
pub fn environment_for_title(title_id: &str) -> Option<u32> {
    let game = title_id.split('@').next().unwrap_or_default();
    match game {
        "TMCanyon" => Some(1),
        "TMStadium" => Some(2),
        "TMValley" => Some(3),
        _ => None,
    }
}

/// Search criteria for the map catalog.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapSearch {
    prefix: String,
    base_url: String,
    mode: Option<i32>,
    map_name: Option<String>,
    author_name: Option<String>,
    mod_name: Option<String>,
    author_id: Option<u64>,
    script_type: Option<String>,
    title_pack: Option<String>,
    replay_type: Option<i32>,
    style: Option<i32>,
    length: Option<i32>,
    length_operator: Option<i32>,
    priority_order: Option<i32>,
    secondary_order: Option<i32>,
    environments: Option<String>,
    vehicles: Option<String>,
    page: Option<u32>,
    limit: Option<u32>,
    unreleased: Option<bool>,
    map_group: Option<u32>,
    comments_min_length: Option<u32>,
    custom_screenshot: Option<bool>,
    min_exe_build: Option<String>,
    env_mix: Option<bool>,
    ghost_blocks: Option<bool>,
    embedded_objects: Option<bool>,
}

macro_rules! criterion {
    ($(#[$doc:meta])* $name:ident: $field:ident, $ty:ty) => {
        $(#[$doc])*
        pub fn $name(mut self, value: impl Into<$ty>) -> Self {
            self.$field = Some(value.into());
            self
        }
    };
}

impl MapSearch {
    /// A search on the `<prefix>` catalog for a server running `title_id`.
    ///
    /// Defaults to 100 results ordered by most recent update. Trackmania
    /// titles also filter by their environment.
    pub fn new(prefix: &str, title_id: &str) -> Self {
        let mut search = Self {
            prefix: prefix.to_string(),
            base_url: format!("https://{prefix}.mania-exchange.com/tracksearch2/search"),
            limit: Some(100),
            priority_order: Some(order::UPDATED_NEWEST),
            environments: environment_for_title(title_id).map(|env| env.to_string()),
            ..Self::default()
        };
        if prefix != "tm" {
            search.min_exe_build = Some(MIN_EXE_BUILD.to_string());
        }
        search
    }

    /// Points the search at another endpoint. Query parameters are kept.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    criterion!(mode: mode, i32);
    criterion!(map_name: map_name, String);
    criterion!(author_name: author_name, String);
    criterion!(mod_name: mod_name, String);
    criterion!(author_id: author_id, u64);
    criterion!(
        /// Compatible map types of the running mode script.
        script_type: script_type, String
    );
    criterion!(title_pack: title_pack, String);
    criterion!(replay_type: replay_type, i32);
    criterion!(style: style, i32);
    criterion!(length: length, i32);
    criterion!(length_operator: length_operator, i32);
    criterion!(priority_order: priority_order, i32);
    criterion!(secondary_order: secondary_order, i32);
    criterion!(environments: environments, String);
    criterion!(vehicles: vehicles, String);
    criterion!(page: page, u32);
    criterion!(limit: limit, u32);
    criterion!(unreleased: unreleased, bool);
    criterion!(map_group: map_group, u32);
    criterion!(comments_min_length: comments_min_length, u32);
    criterion!(custom_screenshot: custom_screenshot, bool);
    criterion!(min_exe_build: min_exe_build, String);
    criterion!(env_mix: env_mix, bool);
    criterion!(ghost_blocks: ghost_blocks, bool);
    criterion!(embedded_objects: embedded_objects, bool);

    /// The complete search URL.
    pub fn url(&self) -> Result<Url, CatalogError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| CatalogError::InvalidUrl(e.to_string()))?;

        let flag = |value: bool| u8::from(value).to_string();
        let params: [(&str, Option<String>); 25] = [
            ("mode", self.mode.map(|v| v.to_string())),
            ("trackname", self.map_name.clone()),
            ("author", self.author_name.clone()),
            ("mod", self.mod_name.clone()),
            ("authorid", self.author_id.map(|v| v.to_string())),
            ("mtype", self.script_type.clone()),
            ("tpack", self.title_pack.clone()),
            ("rtype", self.replay_type.map(|v| v.to_string())),
            ("style", self.style.map(|v| v.to_string())),
            ("length", self.length.map(|v| v.to_string())),
            ("lengthop", self.length_operator.map(|v| v.to_string())),
            ("priord", self.priority_order.map(|v| v.to_string())),
            ("secord", self.secondary_order.map(|v| v.to_string())),
            ("environments", self.environments.clone()),
            ("vehicles", self.vehicles.clone()),
            ("page", self.page.map(|v| v.to_string())),
            ("limit", self.limit.map(|v| v.to_string())),
            ("unreleased", self.unreleased.map(flag)),
            ("mapgroup", self.map_group.map(|v| v.to_string())),
            ("commentsminlength", self.comments_min_length.map(|v| v.to_string())),
            ("customscreenshot", self.custom_screenshot.map(flag)),
            ("minexebuild", self.min_exe_build.clone()),
            ("envmix", self.env_mix.map(flag)),
            ("ghostblocks", self.ghost_blocks.map(flag)),
            ("embeddedobjects", self.embedded_objects.map(flag)),
        ];

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("api", "on");
            for (key, value) in &params {
                if let Some(value) = value {
                    query.append_pair(key, value);
                }
            }
        }
        Ok(url)
    }

    /// Runs the search.
    pub async fn fetch(&self, client: &reqwest::Client) -> Result<Vec<MxMapInfo>, CatalogError> {
        let url = self.url()?;
        debug!("Searching maps: {}", url);

        let response = client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status(status.as_u16()));
        }
        let body: Value = response.json().await?;
        self.map_results(&body)
    }

    /// Maps a raw search response body. See [`MapSearch::map_results`].
    pub fn parse_results(&self, body: &str) -> Result<Vec<MxMapInfo>, CatalogError> {
        let response: Value = serde_json::from_str(body)?;
        self.map_results(&response)
    }

    /// Maps a decoded search response. Empty entries are dropped and
    /// malformed ones skipped with a warning.
    ///
    /// # Returns
    /// * `Err(CatalogError::MissingResults)` - the response has no
    ///   `results` array
    pub fn map_results(&self, response: &Value) -> Result<Vec<MxMapInfo>, CatalogError> {
        let results = response
            .get("results")
            .and_then(Value::as_array)
            .ok_or(CatalogError::MissingResults)?;

        let mut maps = Vec::with_capacity(results.len());
        for entry in results {
            if is_empty(entry) {
                continue;
            }
            match MxMapInfo::from_json(&self.prefix, entry) {
                Ok(info) => maps.push(info),
                Err(e) => warn!("Skipping catalog entry: {}", e),
            }
        }
        debug!("Search returned {} maps", maps.len());
        Ok(maps)
    }
}

fn is_empty(entry: &Value) -> bool {
    match entry {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn query_of(url: &Url) -> Vec<(String, String)> {
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_environment_from_title() {
        assert_eq!(environment_for_title("TMCanyon@nadeo"), Some(1));
        assert_eq!(environment_for_title("TMStadium"), Some(2));
        assert_eq!(environment_for_title("SMStorm@nadeo"), None);
    }

    #[test]
    fn test_default_url() {
        let url = MapSearch::new("tm", "TMValley@nadeo").url().unwrap();
        assert_eq!(url.host_str(), Some("tm.mania-exchange.com"));
        assert_eq!(url.path(), "/tracksearch2/search");
        assert_eq!(
            query_of(&url),
            vec![
                ("api".to_string(), "on".to_string()),
                ("priord".to_string(), "4".to_string()),
                ("environments".to_string(), "3".to_string()),
                ("limit".to_string(), "100".to_string()),
            ]
        );
    }

    #[test]
    fn test_non_trackmania_gets_min_exe_build() {
        let url = MapSearch::new("sm", "SMStorm@nadeo").url().unwrap();
        let query = query_of(&url);
        assert!(query.contains(&("minexebuild".to_string(), MIN_EXE_BUILD.to_string())));
        assert!(!query.iter().any(|(key, _)| key == "environments"));
    }

    #[test]
    fn test_criteria_are_encoded() {
        let url = MapSearch::new("tm", "TMCanyon")
            .map_name("Sprint & Go")
            .author_name("kremsy")
            .unreleased(false)
            .page(2u32)
            .priority_order(order::AWARDS_MOST)
            .url()
            .unwrap();

        assert!(url.as_str().contains("trackname=Sprint+%26+Go"));
        let query = query_of(&url);
        assert!(query.contains(&("author".to_string(), "kremsy".to_string())));
        assert!(query.contains(&("unreleased".to_string(), "0".to_string())));
        assert!(query.contains(&("page".to_string(), "2".to_string())));
        assert!(query.contains(&("priord".to_string(), "8".to_string())));
    }

    #[test]
    fn test_parse_results() {
        let search = MapSearch::new("tm", "TMCanyon");
        let body = json!({
            "results": [
                {"TrackID": 1, "TrackUID": "a", "Name": "One"},
                {},
                null,
                {"Name": "no id"},
                {"TrackID": 2, "TrackUID": "b", "Name": "Two"}
            ],
            "totalItemCount": 5
        })
        .to_string();

        let maps = search.parse_results(&body).unwrap();
        assert_eq!(maps.len(), 2);
        assert_eq!(maps[1].name, "Two");
        assert_eq!(maps[0].prefix, "tm");

        assert!(matches!(
            search.parse_results("{\"error\": \"busy\"}"),
            Err(CatalogError::MissingResults)
        ));
        assert!(matches!(
            search.parse_results("<html>"),
            Err(CatalogError::Decode(_))
        ));
    }

    async fn serve_once(status_line: &'static str, body: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{addr}/tracksearch2/search")
    }

    #[tokio::test]
    async fn test_fetch_from_local_catalog() {
        let body = json!({"results": [{"TrackID": 9, "TrackUID": "x", "Name": "Nine"}]}).to_string();
        let base = serve_once("HTTP/1.1 200 OK", body).await;
        let client = reqwest::Client::builder().no_proxy().build().unwrap();

        let maps = MapSearch::new("tm", "TMCanyon")
            .with_base_url(base)
            .fetch(&client)
            .await
            .unwrap();

        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0].id, 9);
    }

    #[tokio::test]
    async fn test_fetch_reports_http_errors() {
        let base = serve_once("HTTP/1.1 503 Service Unavailable", String::new()).await;
        let client = reqwest::Client::builder().no_proxy().build().unwrap();

        let err = MapSearch::new("tm", "TMCanyon")
            .with_base_url(base)
            .fetch(&client)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Status(503)));
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_json_body() {
        let base = serve_once("HTTP/1.1 200 OK", "<html>busy</html>".to_string()).await;
        let client = reqwest::Client::builder().no_proxy().build().unwrap();

        let err = MapSearch::new("tm", "TMCanyon")
            .with_base_url(base)
            .fetch(&client)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Http(ref e) if e.is_decode()), "{err:?}");
    }
}
