use log::debug;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result};

pub const FEEDLY_API_URL: &str = "https://cloud.feedly.com";
/// Items fetched per board; there is no paging past this
pub const STREAM_PAGE_SIZE: u32 = 500;

/// Thin client for the three Feedly endpoints the importer uses
pub struct FeedlyClient {
    client: Client,
    base_url: String,
    token: String,
}

impl FeedlyClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// `GET /v3/collections`: collections with their feeds embedded
    pub async fn collections(&self) -> Result<Vec<Value>> {
        self.get_json(self.request("/v3/collections")).await
    }

    /// `GET /v3/boards`
    pub async fn boards(&self) -> Result<Vec<Value>> {
        self.get_json(self.request("/v3/boards")).await
    }

    /// Items of one stream (a board), oldest first.
    pub async fn stream_contents(&self, stream_id: &str) -> Result<Vec<Value>> {
        let count = STREAM_PAGE_SIZE.to_string();
        let request = self.request("/v3/streams/contents").query(&[
            ("streamId", stream_id),
            ("unreadOnly", "false"),
            ("ranked", "oldest"),
            ("count", count.as_str()),
        ]);
        let mut contents: Value = self.get_json(request).await?;

        match contents.get_mut("items").map(Value::take) {
            Some(Value::Array(items)) => Ok(items),
            _ => Ok(Vec::new()),
        }
    }

    fn request(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    async fn get_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let response = check_status(response)?;
        Ok(response.json().await?)
    }
}

fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    debug!("GET {} -> {}", response.url(), status);

    if !status.is_success() {
        return Err(Error::Http {
            status,
            url: response.url().to_string(),
        });
    }
    Ok(response)
}
