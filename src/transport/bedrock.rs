use std::env;
use std::io;
use std::time::{Duration, Instant};

use futures::stream::StreamExt;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response};
use serde::Deserialize;
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;
use url::Url;

use super::{ChunkStream, InferenceTransport};
use crate::adapter::Payload;
use crate::catalog::ProviderSpec;
use crate::error::{Error, Result};
use crate::eventstream::{EventStreamCodec, exception_to_error};
use crate::observability::{
    TRANSPORT_REQUEST_DURATION, TRANSPORT_REQUEST_ERRORS, TRANSPORT_REQUESTS, TRANSPORT_STREAM_BYTES,
};

/// Environment variable holding the Bedrock API key, sent as a bearer token.
pub const BEARER_TOKEN_ENV: &str = "AWS_BEARER_TOKEN_BEDROCK";

/// Region used when none is configured.
pub const DEFAULT_REGION: &str = "us-east-1";

const EVENT_STREAM_MEDIA_TYPE: &str = "application/vnd.amazon.eventstream";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Streams responses from the Bedrock runtime `invoke-with-response-stream` API.
#[derive(Debug, Clone)]
pub struct BedrockTransport {
    token: String,
    client: ReqwestClient,
    endpoint: Url,
    connect_timeout: Duration,
}

impl BedrockTransport {
    /// Create a transport for the given region.
    ///
    /// The API key can be provided directly or read from the `AWS_BEARER_TOKEN_BEDROCK`
    /// environment variable.
    pub fn new(region: &str, token: Option<String>) -> Result<Self> {
        let endpoint = format!("https://bedrock-runtime.{region}.amazonaws.com/");
        Self::with_options(token, Some(endpoint), None)
    }

    /// Create a transport with a custom endpoint and connect timeout.
    pub fn with_options(
        token: Option<String>,
        endpoint: Option<String>,
        connect_timeout: Option<Duration>,
    ) -> Result<Self> {
        let token = match token {
            Some(token) => token,
            None => env::var(BEARER_TOKEN_ENV).map_err(|_| {
                Error::authentication(format!(
                    "API key not provided and {BEARER_TOKEN_ENV} environment variable not set"
                ))
            })?,
        };
        let endpoint = endpoint.unwrap_or_else(|| {
            format!("https://bedrock-runtime.{DEFAULT_REGION}.amazonaws.com/")
        });
        let endpoint = Url::parse(&endpoint)?;
        if endpoint.cannot_be_a_base() {
            return Err(Error::configuration(format!(
                "endpoint {endpoint} cannot be used as a base URL"
            )));
        }

        let connect_timeout = connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let client = ReqwestClient::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            token,
            client,
            endpoint,
            connect_timeout,
        })
    }

    /// The base endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The URL for one model's streaming invocation.
    pub fn stream_url(&self, model_id: &str) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| Error::configuration("endpoint cannot be used as a base URL"))?
            .pop_if_empty()
            .extend(["model", model_id, "invoke-with-response-stream"]);
        Ok(url)
    }

    fn headers(&self, spec: &ProviderSpec) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let invalid = |what: &str| Error::validation(format!("invalid {what} header"), None);
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_str(spec.content_type()).map_err(|_| invalid("content-type"))?,
        );
        headers.insert(
            "x-amzn-bedrock-accept",
            HeaderValue::from_str(spec.accept()).map_err(|_| invalid("accept"))?,
        );
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static(EVENT_STREAM_MEDIA_TYPE),
        );
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.token))
                .map_err(|_| invalid("authorization"))?,
        );
        Ok(headers)
    }

    /// Converts a non-success response into an error.
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();

        let request_id = response
            .headers()
            .get("x-amzn-requestid")
            .and_then(|val| val.to_str().ok())
            .map(String::from);
        let error_type = response
            .headers()
            .get("x-amzn-errortype")
            .and_then(|val| val.to_str().ok())
            .map(|val| val.split(':').next().unwrap_or(val).to_string());

        #[derive(Deserialize)]
        struct ErrorResponse {
            #[serde(alias = "Message")]
            message: Option<String>,
        }

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };
        let message = serde_json::from_str::<ErrorResponse>(&error_body)
            .ok()
            .and_then(|body| body.message)
            .unwrap_or(error_body);

        match status_code {
            400 => Error::bad_request(message),
            401 => Error::authentication(message),
            403 => Error::permission(message),
            408 => Error::timeout(message, None),
            429 => Error::rate_limit(message, None),
            503 => Error::service_unavailable(message, None),
            _ => match error_type {
                Some(kind) if status_code >= 500 => exception_to_error(&kind, message),
                _ => Error::api(status_code, error_type, message, request_id),
            },
        }
    }
}

#[async_trait::async_trait]
impl InferenceTransport for BedrockTransport {
    async fn open_stream(&self, spec: &ProviderSpec, payload: &Payload) -> Result<ChunkStream> {
        TRANSPORT_REQUESTS.click();
        let start = Instant::now();
        let url = self.stream_url(spec.model_id())?;
        tracing::debug!(%url, model_id = spec.model_id(), "opening response stream");

        let response = self
            .client
            .post(url)
            .headers(self.headers(spec)?)
            .body(payload.to_bytes()?)
            .send()
            .await
            .map_err(|e| {
                TRANSPORT_REQUEST_ERRORS.click();
                if e.is_connect() {
                    Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
                } else if e.is_timeout() {
                    Error::timeout(
                        format!("Request timed out: {e}"),
                        Some(self.connect_timeout.as_secs_f64()),
                    )
                } else {
                    Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
                }
            })?;
        TRANSPORT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        if !response.status().is_success() {
            TRANSPORT_REQUEST_ERRORS.click();
            return Err(Self::process_error_response(response).await);
        }

        let bytes = response.bytes_stream().map(|result| {
            result
                .inspect(|bytes| TRANSPORT_STREAM_BYTES.count(bytes.len() as u64))
                .map_err(io::Error::other)
        });
        let frames = FramedRead::new(StreamReader::new(bytes), EventStreamCodec);
        let chunks = frames.filter_map(|frame| async move {
            match frame {
                Ok(frame) => frame.into_chunk().transpose(),
                Err(Error::Io { message, .. }) => Some(Err(Error::streaming(
                    format!("Error in HTTP stream: {message}"),
                    None,
                ))),
                Err(err) => Some(Err(err)),
            }
        });
        Ok(Box::pin(chunks))
    }
}
