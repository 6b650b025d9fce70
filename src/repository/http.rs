use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{Config, ConfigError};
use crate::model::*;

use super::{RepositoryError, ScheduleRepository};

/// Client for the house backend's `/time-blocks` REST endpoints.
#[derive(Debug, Clone)]
pub struct HttpRepository {
    client: reqwest::Client,
    base_url: String,
    house_id: String,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    house_id: &'a str,
    date: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct CreateRequest<'a> {
    house_id: &'a str,
    user_id: &'a str,
    location: &'a str,
    date: String,
    start_time: String,
    end_time: String,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    #[serde(default)]
    name: Option<String>,
}

/// A block as the server sends it. Times may carry seconds.
#[derive(Debug, Deserialize)]
struct WireBlock {
    id: String,
    user_id: String,
    location: String,
    date: String,
    start_time: String,
    end_time: String,
    #[serde(default)]
    user: Option<WireUser>,
}

impl WireBlock {
    fn into_block(self) -> Result<TimeBlock, RepositoryError> {
        let decode = |e: IntervalError| RepositoryError::Decode(format!("block {}: {e}", self.id));
        let interval = Interval::parse(
            &self.location,
            &self.date,
            &self.start_time,
            &self.end_time,
            &self.user_id,
        )
        .map_err(decode)?;
        let id = BlockId::parse(&self.id).map_err(decode)?;
        Ok(TimeBlock {
            id,
            interval,
            owner_name: self.user.and_then(|u| u.name),
        })
    }
}

/// Search answers either `{status, data: [...]}` or a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    Envelope {
        #[serde(default)]
        status: Option<String>,
        data: Vec<WireBlock>,
    },
    Bare(Vec<WireBlock>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CreateResponse {
    Envelope { data: WireBlock },
    Bare(WireBlock),
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpRepository {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let house_id = config.require_house_id()?.to_string();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = &config.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ConfigError::Invalid {
                    var: "HOUSESLOT_TOKEN",
                    value: "<redacted>".into(),
                    reason: e.to_string(),
                })?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            house_id,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(
        response: reqwest::Response,
        target: Option<&BlockId>,
    ) -> Result<reqwest::Response, RepositoryError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                debug!("reading {status} error body failed: {e}");
                String::new()
            }
        };
        let err = map_status(status, &body, target);
        warn!("time-blocks request failed: {err}");
        Err(err)
    }
}

fn transport(e: reqwest::Error) -> RepositoryError {
    if e.is_timeout() {
        RepositoryError::Transport(format!("request timed out: {e}"))
    } else if e.is_decode() {
        RepositoryError::Decode(e.to_string())
    } else {
        RepositoryError::Transport(e.to_string())
    }
}

fn map_status(status: StatusCode, body: &str, target: Option<&BlockId>) -> RepositoryError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .or(parsed.error)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());
    match (status, target) {
        (StatusCode::UNAUTHORIZED, _) => RepositoryError::Unauthorized,
        (StatusCode::NOT_FOUND, Some(id)) => RepositoryError::NotFound(id.clone()),
        (StatusCode::CONFLICT, _) => RepositoryError::Conflict(None),
        _ => RepositoryError::Server {
            status: status.as_u16(),
            message,
        },
    }
}

fn decode_search(body: &str, key: &ScheduleKey) -> Result<Vec<TimeBlock>, RepositoryError> {
    let response: SearchResponse =
        serde_json::from_str(body).map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let wire = match response {
        SearchResponse::Envelope { status, data } => {
            if let Some(status) = status.filter(|s| s != "success") {
                debug!("search answered with status {status:?}");
            }
            data
        }
        SearchResponse::Bare(data) => data,
    };
    // The server searches by house and day; location is filtered here.
    let mut blocks = Vec::with_capacity(wire.len());
    for raw in wire {
        if raw.location.trim() != key.resource.as_str() {
            continue;
        }
        blocks.push(raw.into_block()?);
    }
    blocks.sort_by_key(|b| b.start());
    Ok(blocks)
}

fn decode_created(body: &str) -> Result<TimeBlock, RepositoryError> {
    let response: CreateResponse =
        serde_json::from_str(body).map_err(|e| RepositoryError::Decode(e.to_string()))?;
    match response {
        CreateResponse::Envelope { data } | CreateResponse::Bare(data) => data.into_block(),
    }
}

#[async_trait]
impl ScheduleRepository for HttpRepository {
    async fn list(&self, key: &ScheduleKey) -> Result<Vec<TimeBlock>, RepositoryError> {
        let request = SearchRequest {
            house_id: &self.house_id,
            date: format_day(key.day),
        };
        debug!("searching time blocks for {key}");
        let response = self
            .client
            .post(self.url("/time-blocks/search"))
            .json(&request)
            .send()
            .await
            .map_err(transport)?;
        let body = Self::check(response, None).await?.text().await.map_err(transport)?;
        let blocks = decode_search(&body, key)?;
        debug!("fetched {} time blocks for {key}", blocks.len());
        Ok(blocks)
    }

    async fn create(&self, interval: &Interval) -> Result<TimeBlock, RepositoryError> {
        let request = create_request(&self.house_id, interval);
        let response = self
            .client
            .post(self.url("/time-blocks"))
            .json(&request)
            .send()
            .await
            .map_err(transport)?;
        let body = Self::check(response, None).await?.text().await.map_err(transport)?;
        let block = decode_created(&body)?;
        debug!("created time block {}", block.id);
        Ok(block)
    }

    async fn delete(&self, id: &BlockId) -> Result<(), RepositoryError> {
        let response = self
            .client
            .delete(self.url(&format!("/time-blocks/{id}")))
            .send()
            .await
            .map_err(transport)?;
        Self::check(response, Some(id)).await?;
        debug!("deleted time block {id}");
        Ok(())
    }
}

fn create_request<'a>(house_id: &'a str, interval: &'a Interval) -> CreateRequest<'a> {
    CreateRequest {
        house_id,
        user_id: interval.owner.as_str(),
        location: interval.resource.as_str(),
        date: format_day(interval.day),
        start_time: format_time(interval.span.start),
        end_time: format_time(interval.span.end),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(resource: &str, day: &str) -> ScheduleKey {
        ScheduleKey::new(ResourceId::parse(resource).unwrap(), parse_day(day).unwrap())
    }

    fn config() -> Config {
        Config {
            house_id: Some("h1".into()),
            api_url: "http://localhost:3000/api/".into(),
            ..Config::default()
        }
    }

    #[test]
    fn requires_house_id() {
        let err = HttpRepository::new(&Config::default()).unwrap_err();
        assert_eq!(err, ConfigError::Missing("HOUSESLOT_HOUSE_ID"));
    }

    #[test]
    fn url_building() {
        let repo = HttpRepository::new(&config()).unwrap();
        assert_eq!(repo.url("/time-blocks"), "http://localhost:3000/api/time-blocks");
    }

    #[test]
    fn create_payload_shape() {
        let interval = Interval::parse("Kitchen", "2024-03-01", "07:00", "08:30:00", "u1").unwrap();
        let json = serde_json::to_value(create_request("h1", &interval)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "house_id": "h1",
                "user_id": "u1",
                "location": "Kitchen",
                "date": "2024-03-01",
                "start_time": "07:00",
                "end_time": "08:30",
            })
        );
    }

    #[test]
    fn search_envelope_filtered_and_sorted() {
        let body = r#"{"status":"success","data":[
            {"id":"b2","user_id":"u2","location":"Kitchen","date":"2024-03-01",
             "start_time":"09:00:00","end_time":"10:00:00","user":{"id":"u2","name":"Bo"}},
            {"id":"b3","user_id":"u3","location":"Hall","date":"2024-03-01",
             "start_time":"06:00","end_time":"07:00"},
            {"id":"b1","user_id":"u1","location":"Kitchen","date":"2024-03-01",
             "start_time":"07:00","end_time":"08:00","created_at":"2024-02-28T10:00:00Z"}
        ]}"#;
        let blocks = decode_search(body, &key("Kitchen", "2024-03-01")).unwrap();
        let ids: Vec<_> = blocks.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, ["b1", "b2"]);
        assert_eq!(blocks[1].owner_name.as_deref(), Some("Bo"));
        assert_eq!(blocks[1].interval.owner.as_str(), "u2");
    }

    #[test]
    fn search_bare_array_accepted() {
        let body = r#"[{"id":"b1","user_id":"u1","location":"Hall","date":"2024-03-01",
                        "start_time":"07:00","end_time":"08:00"}]"#;
        let blocks = decode_search(body, &key("Hall", "2024-03-01")).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].owner_name, None);
    }

    #[test]
    fn malformed_block_is_a_decode_error() {
        let body = r#"{"data":[{"id":"b1","user_id":"u1","location":"Kitchen",
            "date":"2024-03-01","start_time":"08:00","end_time":"08:00"}]}"#;
        let err = decode_search(body, &key("Kitchen", "2024-03-01")).unwrap_err();
        assert!(matches!(err, RepositoryError::Decode(ref m) if m.contains("b1")));

        assert!(matches!(
            decode_search("{\"unexpected\":true}", &key("Kitchen", "2024-03-01")),
            Err(RepositoryError::Decode(_))
        ));
    }

    #[test]
    fn created_block_with_or_without_envelope() {
        let bare = r#"{"id":"n1","house_id":"h1","user_id":"u1","location":"Kitchen",
            "date":"2024-03-01","start_time":"08:00","end_time":"09:00"}"#;
        assert_eq!(decode_created(bare).unwrap().id.as_str(), "n1");

        let wrapped = format!(r#"{{"status":"success","data":{bare}}}"#);
        assert_eq!(decode_created(&wrapped).unwrap().id.as_str(), "n1");

        assert!(matches!(decode_created("{}"), Err(RepositoryError::Decode(_))));
    }

    #[test]
    fn status_mapping() {
        let id = BlockId::parse("b1").unwrap();
        assert_eq!(map_status(StatusCode::UNAUTHORIZED, "", None), RepositoryError::Unauthorized);
        assert_eq!(
            map_status(StatusCode::NOT_FOUND, "", Some(&id)),
            RepositoryError::NotFound(id.clone())
        );
        assert_eq!(map_status(StatusCode::CONFLICT, "{}", None), RepositoryError::Conflict(None));
        assert_eq!(
            map_status(StatusCode::INTERNAL_SERVER_ERROR, r#"{"message":"db down"}"#, None),
            RepositoryError::Server { status: 500, message: "db down".into() }
        );
        assert_eq!(
            map_status(StatusCode::NOT_FOUND, "not json", None),
            RepositoryError::Server { status: 404, message: "Not Found".into() }
        );
        // Unreadable body falls back to the canonical reason.
        assert_eq!(
            map_status(StatusCode::BAD_GATEWAY, "", None),
            RepositoryError::Server { status: 502, message: "Bad Gateway".into() }
        );
    }
}
