mod error;
mod payload;

pub use error::ClientError;
pub use payload::UpstreamPayload;

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::Url;
use std::fmt::Debug;
use std::time::Duration;
use tracing::instrument;

/// Body sent to the inference service.
#[derive(Debug, serde::Serialize)]
pub struct InferenceRequest<'a> {
    pub inputs: &'a str,
}

impl<'a> InferenceRequest<'a> {
    pub fn new(inputs: &'a str) -> Self {
        Self { inputs }
    }
}

#[derive(Clone)]
pub struct ClientConfig {
    pub url: String,
    /// Sent verbatim as the `Authorization` header, e.g. `Bearer hf_...`.
    pub authorization: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("authorization", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    url: Url,
    authorization: HeaderValue,
}

impl Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.url.as_str())
            .finish()
    }
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let url = Url::parse(&config.url).map_err(|e| {
            ClientError::InvalidConfiguration(format!("upstream url {:?}: {e}", config.url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::InvalidConfiguration(format!(
                "upstream url must be http or https, got {}",
                url.scheme()
            )));
        }

        let mut authorization = HeaderValue::from_str(&config.authorization).map_err(|_| {
            ClientError::InvalidConfiguration("authorization is not a valid header value".into())
        })?;
        authorization.set_sensitive(true);

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ClientError::InvalidConfiguration(e.to_string()))?;

        Ok(Self {
            http,
            url,
            authorization,
        })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Sends `inputs` to the inference service and parses whatever JSON comes back.
    #[instrument(skip_all, fields(inputs_len = inputs.len(), status))]
    pub async fn generate(&self, inputs: &str) -> Result<UpstreamPayload, ClientError> {
        let span = tracing::Span::current();

        let response = self
            .http
            .post(self.url.clone())
            .header(AUTHORIZATION, self.authorization.clone())
            .json(&InferenceRequest::new(inputs))
            .send()
            .await
            .map_err(ClientError::from_transport)?;

        let status = response.status();
        span.record("status", status.as_u16());

        let body = response
            .bytes()
            .await
            .map_err(ClientError::from_transport)?;

        if !status.is_success() {
            return Err(ClientError::status(status.as_u16(), &body));
        }

        let value: serde_json::Value = serde_json::from_slice(&body)?;
        let payload = UpstreamPayload::from(value);
        tracing::debug!("Upstream answered with a {} payload", payload.kind());
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str, authorization: &str) -> ClientConfig {
        ClientConfig {
            url: url.to_string(),
            authorization: authorization.to_string(),
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn request_body_carries_inputs_unchanged() {
        let body = serde_json::to_value(InferenceRequest::new("  Hola, ¿qué tal?\n")).unwrap();
        assert_eq!(body, serde_json::json!({"inputs": "  Hola, ¿qué tal?\n"}));
    }

    #[test]
    fn accepts_https_url() {
        let client = Client::new(config(
            "https://api-inference.huggingface.co/models/gpt2",
            "Bearer hf_test",
        ))
        .unwrap();
        assert_eq!(
            client.url(),
            "https://api-inference.huggingface.co/models/gpt2"
        );
    }

    #[test]
    fn rejects_unparsable_url() {
        let error = Client::new(config("not a url", "Bearer x")).unwrap_err();
        assert!(matches!(error, ClientError::InvalidConfiguration(_)));
    }

    #[test]
    fn rejects_non_http_scheme() {
        let error = Client::new(config("ftp://example.com/model", "Bearer x")).unwrap_err();
        assert!(matches!(error, ClientError::InvalidConfiguration(_)));
    }

    #[test]
    fn rejects_header_breaking_token() {
        let error =
            Client::new(config("http://127.0.0.1:1/", "Bearer x\nInjected: y")).unwrap_err();
        assert!(matches!(error, ClientError::InvalidConfiguration(_)));
    }

    #[test]
    fn debug_output_hides_token() {
        let config = config("http://127.0.0.1:1/", "Bearer secret-token");
        assert!(!format!("{config:?}").contains("secret-token"));

        let client = Client::new(config).unwrap();
        assert!(!format!("{client:?}").contains("secret-token"));
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = Client::new(config(&format!("http://{addr}/"), "Bearer x")).unwrap();
        let error = client.generate("hello").await.unwrap_err();
        assert!(
            matches!(error, ClientError::Unreachable(_)),
            "unexpected error: {error:?}"
        );
    }
}
