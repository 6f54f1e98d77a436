use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};

use crate::config::ExfilConfig;
use crate::error::CarveError;
use crate::exfil::transport::{BeginRequest, BeginResponse, CarveTransport, ContinueRequest};

/// User agent sent with every carve upload request
pub const CARVER_USER_AGENT: &str = concat!("rs-carver/", env!("CARGO_PKG_VERSION"));

/// JSON body of a continue call.
#[derive(Serialize)]
struct ContinueBody<'a> {
    block_id: u64,
    session_id: &'a str,
    request_id: &'a str,
    carve_id: &'a str,
    data: String,
}

/// What the collection service answers to either call.
#[derive(Deserialize, Default, Debug)]
struct ServerReply {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    success: Option<bool>,
}

/// Carve upload over HTTP(S) with JSON bodies.
pub struct HttpTransport {
    client: reqwest::Client,
    start_url: String,
    continue_url: String,
}

impl HttpTransport {
    pub fn new(config: &ExfilConfig) -> Result<Self, CarveError> {
        let start_url = config
            .start_url()
            .ok_or_else(|| CarveError::Config("exfil.base_url is not set".into()))?;
        let continue_url = config
            .continue_url()
            .ok_or_else(|| CarveError::Config("exfil.base_url is not set".into()))?;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(CARVER_USER_AGENT));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| CarveError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            start_url,
            continue_url,
        })
    }

    async fn post<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<ServerReply, CarveError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| CarveError::Network(format!("POST {} failed: {}", url, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CarveError::Network(format!("reading reply from {} failed: {}", url, e)))?;

        if !status.is_success() {
            return Err(CarveError::Network(format!("POST {} returned {}", url, status)));
        }

        let reply = if text.trim().is_empty() {
            ServerReply::default()
        } else {
            serde_json::from_str::<ServerReply>(&text)
                .map_err(|e| CarveError::Network(format!("invalid reply from {}: {}", url, e)))?
        };

        if reply.success == Some(false) {
            return Err(CarveError::Network(format!("{} reported failure", url)));
        }
        Ok(reply)
    }
}

#[async_trait]
impl CarveTransport for HttpTransport {
    async fn begin(&self, request: &BeginRequest) -> Result<BeginResponse, CarveError> {
        let reply = self.post(&self.start_url, request).await?;
        debug!(
            "Carve {} accepted, session {:?}",
            request.carve_id, reply.session_id
        );
        Ok(BeginResponse {
            session_id: reply.session_id,
        })
    }

    async fn continue_chunk(&self, request: &ContinueRequest) -> Result<(), CarveError> {
        let body = ContinueBody {
            block_id: request.block_id,
            session_id: request.session_id.as_deref().unwrap_or_default(),
            request_id: &request.request_id,
            carve_id: &request.carve_id,
            data: BASE64.encode(&request.data),
        };
        self.post(&self.continue_url, &body).await?;
        Ok(())
    }
}
