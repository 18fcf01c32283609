use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use tracing::debug;

use super::error::ForwardError;
use super::line_protocol::StorageWriteRequest;
use super::StorageConfig;

const WRITE_PATH: &str = "/api/v2/write";
const LINE_PROTOCOL_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Successful write, the endpoint answered 204 No Content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack;

/// HTTP client for the InfluxDB v2 write API.
///
/// One call is one POST; retrying is left to the caller.
#[derive(Debug, Clone)]
pub struct InfluxWriter {
    client: reqwest::Client,
    write_url: String,
    org: String,
    bucket: String,
    token: String,
}

impl InfluxWriter {
    pub fn new(config: &StorageConfig) -> Result<Self, ForwardError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ForwardError::ClientSetup(e.to_string()))?;

        Ok(Self {
            client,
            write_url: format!("{}{}", config.base_url.trim_end_matches('/'), WRITE_PATH),
            org: config.org.clone(),
            bucket: config.bucket.clone(),
            token: config.token.clone(),
        })
    }

    pub fn write_url(&self) -> &str {
        &self.write_url
    }

    pub async fn write(&self, request: &StorageWriteRequest) -> Result<Ack, ForwardError> {
        let body = request.to_line();
        debug!("POST {} <- {}", self.write_url, body);

        let response = self
            .client
            .post(&self.write_url)
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", request.precision().as_str()),
            ])
            .header(AUTHORIZATION, format!("Token {}", self.token))
            .header(CONTENT_TYPE, LINE_PROTOCOL_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| ForwardError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(Ack);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ForwardError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
