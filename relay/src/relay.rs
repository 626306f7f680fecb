use inference_client::Client;
use tracing::instrument;

use crate::{RelayError, FALLBACK_REPLY};

/// Forwards one chat message to the inference service and picks the reply
/// out of whatever it answers.
#[derive(Clone, Debug)]
pub struct Relay {
    client: Client,
}

impl Relay {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    #[instrument(skip_all, fields(message_len = message.len()))]
    pub async fn reply_to(&self, message: &str) -> Result<String, RelayError> {
        let payload = self.client.generate(message).await?;

        match payload.generated_text() {
            Some(text) => Ok(text.to_owned()),
            None => {
                tracing::warn!(
                    "Unrecognized {} response from upstream, using fallback reply",
                    payload.kind()
                );
                Ok(FALLBACK_REPLY.to_owned())
            }
        }
    }
}
