//! HTTP client for the room service.

use reqwest::{Method, StatusCode, Url};
use serde::{Deserialize, Serialize};

use super::{LogService, RoomKey, RoomService};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::models::{LogId, Snapshot};
use crate::util::compact_text;

const LOG_PATH: &str = "/api/log";
const ROOM_PATH: &str = "/api/room";

/// reqwest-backed implementation of [`LogService`] and [`RoomService`].
#[derive(Debug, Clone)]
pub struct HttpRoomClient {
    config: ClientConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct CreateLogBody<'a> {
    room_code: &'a str,
    username: &'a str,
    amount: i32,
    memo: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ModifyLogBody<'a> {
    room_code: &'a str,
    username: &'a str,
    log_id: LogId,
    amount: i32,
    memo: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct DeleteLogBody<'a> {
    room_code: &'a str,
    username: &'a str,
    log_id: LogId,
}

#[derive(Debug, Serialize)]
struct CreateRoomBody<'a> {
    username: &'a str,
}

#[derive(Debug, Serialize)]
struct JoinRoomBody<'a> {
    username: &'a str,
    room_code: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateRoomResponse {
    room_code: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

impl HttpRoomClient {
    /// Build a client from a validated config.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()?;
        Ok(Self { config, client })
    }

    /// The config this client was built with.
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn send_json<T: Serialize + std::fmt::Debug>(
        &self,
        method: Method,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response> {
        let url = self.config.endpoint(path);
        tracing::debug!("Request: {} {} body={:?}", method, url, body);

        let response = self
            .client
            .request(method, &url)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await
            .inspect_err(|error| tracing::debug!("Request to {} failed: {}", url, error))?;

        tracing::debug!("StatusCode: {}", response.status().as_u16());
        ensure_success(response).await
    }
}

impl LogService for HttpRoomClient {
    async fn find(&self, room: &RoomKey) -> Result<Snapshot> {
        let url = Url::parse_with_params(
            &self.config.endpoint(LOG_PATH),
            &[
                ("room_code", room.room_code.as_str()),
                ("username", room.username.as_str()),
            ],
        )
        .map_err(|error| Error::Config(format!("invalid log endpoint: {error}")))?;
        tracing::debug!("Request: GET {}", url);

        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await?;

        tracing::debug!("StatusCode: {}", response.status().as_u16());
        let body = ensure_success(response).await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn create(&self, room: &RoomKey, amount: i32, memo: Option<&str>) -> Result<()> {
        let body = CreateLogBody {
            room_code: &room.room_code,
            username: &room.username,
            amount,
            memo,
        };
        self.send_json(Method::POST, LOG_PATH, &body).await?;
        Ok(())
    }

    async fn modify(
        &self,
        room: &RoomKey,
        log_id: LogId,
        amount: i32,
        memo: Option<&str>,
    ) -> Result<()> {
        let body = ModifyLogBody {
            room_code: &room.room_code,
            username: &room.username,
            log_id,
            amount,
            memo,
        };
        self.send_json(Method::PUT, LOG_PATH, &body).await?;
        Ok(())
    }

    async fn delete(&self, room: &RoomKey, log_id: LogId) -> Result<()> {
        let body = DeleteLogBody {
            room_code: &room.room_code,
            username: &room.username,
            log_id,
        };
        self.send_json(Method::DELETE, LOG_PATH, &body).await?;
        Ok(())
    }
}

impl RoomService for HttpRoomClient {
    async fn create_room(&self, username: &str) -> Result<String> {
        let response = self
            .send_json(Method::POST, ROOM_PATH, &CreateRoomBody { username })
            .await?;
        let body = response.text().await?;
        let payload: CreateRoomResponse = serde_json::from_str(&body)?;
        Ok(payload.room_code)
    }

    async fn join_room(&self, room_code: &str, username: &str) -> Result<()> {
        self.send_json(
            Method::PUT,
            ROOM_PATH,
            &JoinRoomBody {
                username,
                room_code,
            },
        )
        .await?;
        Ok(())
    }
}

/// Turn a non-2xx response into `Error::Api`.
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Api {
        status: status.as_u16(),
        message: parse_api_error(status, &body),
    })
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return message.trim().to_string();
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        trimmed
    }
}
