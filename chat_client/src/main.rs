use anyhow::Result;
use clap::Parser;
use std::fmt::Debug;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::instrument;
use tracing_subscriber::EnvFilter;

const QUIT: &str = "/quit";

#[derive(Parser, Debug)]
#[clap(about = "Terminal chat against a running relay")]
struct Args {
    #[clap(short, long, env = "RELAY_ADDRESS", default_value = "127.0.0.1:5000")]
    relay_address: String,
}

/// Success and error answers both carry `reply`; errors add `error`.
#[derive(serde::Deserialize, Debug)]
struct RelayResponse {
    reply: String,
    #[serde(default)]
    error: Option<String>,
}

impl RelayResponse {
    pub fn to_message(&self) -> String {
        match &self.error {
            Some(kind) => format!("[{}] {}", kind, self.reply),
            None => self.reply.clone(),
        }
    }
}

struct HttpClient {
    client: reqwest::Client,
    url: String,
}
impl Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("url", &self.url)
            .finish()
    }
}

impl HttpClient {
    fn new(address: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: chat_url(address),
        }
    }

    #[instrument(skip_all, fields(status))]
    async fn send_message(&self, message: &str) -> Result<RelayResponse> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "message": message }))
            .send()
            .await?;
        tracing::Span::current().record("status", response.status().as_u16());

        let response = response.json().await?;
        Ok(response)
    }
}

fn chat_url(address: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        format!("{}/chat", address.trim_end_matches('/'))
    } else {
        format!("http://{}/chat", address)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let client = HttpClient::new(&args.relay_address);
    tracing::info!("Chatting through {:?}", client);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim_end_matches('\r');
        if line.trim() == QUIT {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        let text = match client.send_message(line).await {
            Ok(response) => response.to_message(),
            Err(e) => {
                tracing::error!("Error sending message: {:?}", e);
                format!("[unavailable] {}", e)
            }
        };
        stdout.write_all(format!("{}\n", text).as_bytes()).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_url_from_address() {
        assert_eq!(chat_url("127.0.0.1:5000"), "http://127.0.0.1:5000/chat");
        assert_eq!(
            chat_url("https://relay.example.com/"),
            "https://relay.example.com/chat"
        );
    }

    #[test]
    fn reply_is_printed_as_is() {
        let response: RelayResponse = serde_json::from_str(r#"{"reply": "hola"}"#).unwrap();
        assert_eq!(response.to_message(), "hola");
    }

    #[test]
    fn error_kind_prefixes_reply() {
        let response: RelayResponse = serde_json::from_str(
            r#"{"reply": "could not obtain a response at this time", "error": "upstream_timeout", "message": "inference service timed out"}"#,
        )
        .unwrap();
        assert_eq!(
            response.to_message(),
            "[upstream_timeout] could not obtain a response at this time"
        );
    }
}
