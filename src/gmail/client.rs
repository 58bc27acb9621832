use async_trait::async_trait;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use serde_json::json;

#[cfg(test)]
use mockall::automock;

const GMAIL_API_BASE: &str = "https://www.googleapis.com/gmail/v1";

#[derive(Debug, thiserror::Error)]
pub enum GmailError {
    #[error("no active Gmail connection")]
    NoConnection,
    #[error("token refresh failed: {0}")]
    TokenRefreshFailed(String),
    #[error("Gmail API error: {0}")]
    ApiError(String),
    #[error("failed to parse Gmail response: {0}")]
    ParseError(String),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

impl GmailError {
    // Handler-facing status mapping
    pub fn status_code(&self) -> StatusCode {
        match self {
            GmailError::NoConnection => StatusCode::BAD_REQUEST,
            GmailError::TokenRefreshFailed(_) => StatusCode::UNAUTHORIZED,
            GmailError::ApiError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GmailError::ParseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GmailError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageRef {
    pub id: String,
    #[serde(rename = "threadId")]
    pub thread_id: String,
}

#[derive(Debug, Deserialize)]
struct MessageListResponse {
    messages: Option<Vec<MessageRef>>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessageDetail {
    pub id: String,
    #[serde(rename = "threadId")]
    pub thread_id: String,
    pub snippet: Option<String>,
    pub payload: MessagePayload,
    #[serde(with = "internal_date_format", rename = "internalDate")]
    pub internal_date: DateTime<Utc>,
    #[serde(default, rename = "labelIds")]
    pub label_ids: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MessagePayload {
    #[serde(default)]
    pub headers: Vec<MessageHeader>,
    pub body: Option<MessageBody>,
    pub parts: Option<Vec<MessagePart>>,
    #[serde(rename = "mimeType", default = "default_mime_type")]
    pub mime_type: String,
}

#[derive(Debug, Deserialize)]
pub struct MessagePart {
    pub body: Option<MessageBody>,
    pub parts: Option<Vec<MessagePart>>,
    #[serde(rename = "mimeType", default = "default_mime_type")]
    pub mime_type: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageBody {
    pub data: Option<String>,
    pub size: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

fn default_mime_type() -> String {
    "text/plain".to_string()
}

// Gmail reports internalDate as epoch milliseconds in a string
mod internal_date_format {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{self, Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let timestamp_str = String::deserialize(deserializer)?;
        let timestamp_ms = timestamp_str.parse::<i64>()
            .map_err(|e| serde::de::Error::custom(format!("failed to parse timestamp: {}", e)))?;
        Utc.timestamp_millis_opt(timestamp_ms)
            .single()
            .ok_or_else(|| serde::de::Error::custom("invalid timestamp"))
    }
}

impl MessageDetail {
    pub fn header(&self, name: &str) -> Option<String> {
        self.payload
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.clone())
    }
}

#[derive(Debug, Deserialize)]
pub struct ThreadDetail {
    pub id: String,
    #[serde(default)]
    pub messages: Vec<MessageDetail>,
}

#[derive(Debug, Deserialize)]
struct HistoryListResponse {
    pub history: Option<Vec<HistoryRecord>>,
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryRecord {
    pub id: Option<String>,
    #[serde(default, rename = "messagesAdded")]
    pub messages_added: Vec<HistoryMessageAdded>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryMessageAdded {
    pub message: MessageRef,
}

#[derive(Debug, Deserialize)]
pub struct WatchResponse {
    #[serde(rename = "historyId")]
    pub history_id: String,
    pub expiration: Option<String>, // epoch milliseconds as a string
}

#[derive(Debug, Deserialize)]
pub struct SendMessageResponse {
    pub id: String,
    #[serde(rename = "threadId")]
    pub thread_id: String,
}

#[derive(Debug, Deserialize)]
pub struct GmailProfile {
    #[serde(rename = "emailAddress")]
    pub email_address: String,
    #[serde(rename = "historyId")]
    pub history_id: Option<String>,
}

/// The provider surface the reply pipeline depends on. Components hold this
/// behind an Arc so tests can substitute a mock.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GmailApi: Send + Sync {
    async fn profile(&self, access_token: &str) -> Result<GmailProfile, GmailError>;
    async fn list_history(&self, access_token: &str, start_history_id: &str) -> Result<Vec<HistoryRecord>, GmailError>;
    async fn get_message(&self, access_token: &str, message_id: &str) -> Result<MessageDetail, GmailError>;
    async fn list_messages(&self, access_token: &str, query: &str, max_results: u32) -> Result<Vec<MessageRef>, GmailError>;
    async fn get_thread(&self, access_token: &str, thread_id: &str) -> Result<ThreadDetail, GmailError>;
    async fn watch(&self, access_token: &str, topic_name: &str) -> Result<WatchResponse, GmailError>;
    async fn stop(&self, access_token: &str) -> Result<(), GmailError>;
    async fn send_message(&self, access_token: &str, raw_rfc822: &str) -> Result<SendMessageResponse, GmailError>;
}

pub struct GmailClient {
    client: reqwest::Client,
    base_url: String,
}

impl GmailClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: GMAIL_API_BASE.to_string(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        access_token: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, GmailError> {
        let response = self.client
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", access_token))
            .header(ACCEPT, "application/json")
            .query(query)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Gmail API request failed: {}", e);
                GmailError::ApiError(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            tracing::error!("Gmail API error {}: {}", status, error_body);
            return Err(GmailError::ApiError(format!(
                "Failed with status {}: {}",
                status, error_body
            )));
        }

        let response_text = response.text().await.map_err(|e| {
            tracing::error!("Failed to get response text: {}", e);
            GmailError::ParseError(e.to_string())
        })?;

        serde_json::from_str(&response_text).map_err(|e| {
            tracing::error!("Failed to parse Gmail response JSON: {}", e);
            tracing::error!("Response body: {}", response_text);
            GmailError::ParseError(format!(
                "Failed to parse Gmail response: {}. Response: {}",
                e, response_text
            ))
        })
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        access_token: &str,
        url: &str,
        body: serde_json::Value,
    ) -> Result<T, GmailError> {
        let response = self.client
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {}", access_token))
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Gmail API request failed: {}", e);
                GmailError::ApiError(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            tracing::error!("Gmail API error {}: {}", status, error_body);
            return Err(GmailError::ApiError(format!(
                "Failed with status {}: {}",
                status, error_body
            )));
        }

        let response_text = response.text().await.map_err(|e| {
            tracing::error!("Failed to get response text: {}", e);
            GmailError::ParseError(e.to_string())
        })?;

        serde_json::from_str(&response_text).map_err(|e| {
            tracing::error!("Failed to parse Gmail response JSON: {}", e);
            tracing::error!("Response body: {}", response_text);
            GmailError::ParseError(format!(
                "Failed to parse Gmail response: {}. Response: {}",
                e, response_text
            ))
        })
    }
}

#[async_trait]
impl GmailApi for GmailClient {
    async fn profile(&self, access_token: &str) -> Result<GmailProfile, GmailError> {
        let url = format!("{}/users/me/profile", self.base_url);
        self.get_json(access_token, &url, &[]).await
    }

    async fn list_history(&self, access_token: &str, start_history_id: &str) -> Result<Vec<HistoryRecord>, GmailError> {
        let url = format!("{}/users/me/history", self.base_url);
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("startHistoryId", start_history_id.to_string()),
                ("historyTypes", "messageAdded".to_string()),
                ("historyTypes", "messageDeleted".to_string()),
                ("historyTypes", "labelAdded".to_string()),
                ("historyTypes", "labelRemoved".to_string()),
                ("maxResults", "100".to_string()),
            ];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let page: HistoryListResponse = self.get_json(access_token, &url, &query).await?;
            if let Some(history) = page.history {
                records.extend(history);
            }
            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        tracing::debug!("Fetched {} history records from cursor {}", records.len(), start_history_id);
        Ok(records)
    }

    async fn get_message(&self, access_token: &str, message_id: &str) -> Result<MessageDetail, GmailError> {
        let url = format!(
            "{}/users/me/messages/{}?fields=id,threadId,snippet,payload(headers,body,parts,mimeType),internalDate,labelIds",
            self.base_url, message_id
        );
        self.get_json(access_token, &url, &[]).await
    }

    async fn list_messages(&self, access_token: &str, query: &str, max_results: u32) -> Result<Vec<MessageRef>, GmailError> {
        let url = format!("{}/users/me/messages", self.base_url);
        let mut all_refs: Vec<MessageRef> = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("q", query.to_string()),
                ("maxResults", max_results.to_string()),
            ];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }

            let page: MessageListResponse = self.get_json(access_token, &url, &params).await?;
            if let Some(messages) = page.messages {
                all_refs.extend(messages);
            }
            page_token = page.next_page_token;
            if page_token.is_none() || all_refs.len() >= max_results as usize {
                break;
            }
        }

        all_refs.truncate(max_results as usize);
        Ok(all_refs)
    }

    async fn get_thread(&self, access_token: &str, thread_id: &str) -> Result<ThreadDetail, GmailError> {
        let url = format!(
            "{}/users/me/threads/{}?fields=id,messages(id,threadId,snippet,payload(headers,body,parts,mimeType),internalDate,labelIds)",
            self.base_url, thread_id
        );
        self.get_json(access_token, &url, &[]).await
    }

    async fn watch(&self, access_token: &str, topic_name: &str) -> Result<WatchResponse, GmailError> {
        let url = format!("{}/users/me/watch", self.base_url);
        let body = json!({
            "topicName": topic_name,
            "labelIds": ["INBOX", "SENT"],
            "labelFilterBehavior": "include",
        });
        self.post_json(access_token, &url, body).await
    }

    async fn stop(&self, access_token: &str) -> Result<(), GmailError> {
        let url = format!("{}/users/me/stop", self.base_url);
        let response = self.client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", access_token))
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Gmail API request failed: {}", e);
                GmailError::ApiError(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            tracing::error!("Gmail stop call failed {}: {}", status, error_body);
            return Err(GmailError::ApiError(format!(
                "Failed with status {}: {}",
                status, error_body
            )));
        }
        Ok(())
    }

    async fn send_message(&self, access_token: &str, raw_rfc822: &str) -> Result<SendMessageResponse, GmailError> {
        let url = format!("{}/users/me/messages/send", self.base_url);
        let body = json!({ "raw": raw_rfc822 });
        self.post_json(access_token, &url, body).await
    }
}
