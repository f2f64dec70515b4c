//! Chat backend for OpenAI-compatible `/chat/completions` endpoints.

use crate::{ChatBackend, ChatMessage, Error, Result};
use async_trait::async_trait;
use companion_context::ChatEndpointSettings;

pub struct HttpChatBackend {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpChatBackend {
    /// The API key, if any, is read from the environment variable named in
    /// the settings.
    pub fn new(settings: &ChatEndpointSettings) -> Result<Self> {
        let api_key = settings
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.is_empty());
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Backend(e.to_string()))?;
        Ok(Self {
            endpoint: settings.url.clone(),
            model: settings.model.clone(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Vec<String>> {
        #[derive(serde::Serialize)]
        struct ChatReq<'a> {
            model: &'a str,
            messages: &'a [ChatMessage],
            stream: bool,
        }

        #[derive(serde::Deserialize)]
        struct RespMessage {
            content: Option<String>,
        }
        #[derive(serde::Deserialize)]
        struct Choice {
            message: RespMessage,
        }
        #[derive(serde::Deserialize)]
        struct RespBody {
            choices: Vec<Choice>,
        }

        let req = ChatReq {
            model: &self.model,
            messages,
            stream: false,
        };

        let mut builder = self.client.post(&self.endpoint).json(&req);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let resp = builder
            .send()
            .await
            .map_err(|e| Error::Backend(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Error::Backend(format!("HTTP {}", resp.status())));
        }

        let body: RespBody = resp
            .json()
            .await
            .map_err(|e| Error::Backend(e.to_string()))?;

        Ok(body
            .choices
            .into_iter()
            .filter_map(|c| c.message.content)
            .collect())
    }
}
