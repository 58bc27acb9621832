use base64::{Engine as _, engine::general_purpose::{STANDARD as BASE64, URL_SAFE}};
use chrono::TimeZone;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use diesel_migrations::MigrationHarness;
use oauth2::{AuthUrl, ClientId, ClientSecret, TokenUrl, basic::BasicClient};

use crate::{DbPool, GoogleOAuthClient, MIGRATIONS};
use crate::gmail::client::{MessageBody, MessageDetail, MessageHeader, MessagePayload};
use crate::models::campaign_models::{Campaign, JobListing, NewCampaign, NewClient, NewJobListing};
use crate::models::integration_models::{GmailIntegration, NewGmailIntegration, NewGmailWatch};
use crate::repositories::campaign_repository::CampaignRepository;
use crate::repositories::client_repository::ClientRepository;
use crate::repositories::integration_repository::IntegrationRepository;
use crate::utils::encryption::encrypt_token;

pub const ACCESS_TOKEN: &str = "test-access-token";

/// In-memory SQLite with the embedded migrations applied. Capped to a single
/// connection so every query shares the one database.
pub fn test_pool() -> DbPool {
    let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
    let pool = r2d2::Pool::builder()
        .max_size(1)
        .build(manager)
        .expect("Failed to create test pool");
    {
        let mut conn = pool.get().expect("Failed to get DB connection");
        conn.run_pending_migrations(MIGRATIONS).expect("Failed to run migrations");
    }
    pool
}

pub fn set_test_encryption_key() {
    if std::env::var("ENCRYPTION_KEY").is_err() {
        std::env::set_var("ENCRYPTION_KEY", BASE64.encode([7u8; 32]));
    }
}

/// OAuth client pointed at a dead endpoint; exchanges fail fast.
pub fn test_oauth_client() -> GoogleOAuthClient {
    BasicClient::new(ClientId::new("test-client".to_string()))
        .set_client_secret(ClientSecret::new("test-secret".to_string()))
        .set_auth_uri(AuthUrl::new("http://127.0.0.1:1/auth".to_string()).expect("auth url"))
        .set_token_uri(TokenUrl::new("http://127.0.0.1:1/token".to_string()).expect("token url"))
}

pub fn seed_gmail_integration(
    pool: &DbPool,
    user_id: i32,
    email_address: &str,
    token_expires_at: i32,
) -> GmailIntegration {
    set_test_encryption_key();
    let repo = IntegrationRepository::new(pool.clone());
    repo.create_gmail_integration(NewGmailIntegration {
        user_id,
        email_address: email_address.to_string(),
        access_token: encrypt_token(ACCESS_TOKEN).expect("encrypt"),
        refresh_token: encrypt_token("test-refresh-token").expect("encrypt"),
        token_expires_at,
        active: true,
        created_at: chrono::Utc::now().timestamp() as i32,
    })
    .expect("seed integration")
}

/// Client plus one open listing for it, keyed by company name.
pub fn seed_job_listing(pool: &DbPool, user_id: i32, company_name: &str) -> JobListing {
    let repo = ClientRepository::new(pool.clone());
    let client = repo
        .create_client(NewClient {
            user_id,
            name: format!("{} account", company_name),
            contact_email: "contact@client.example".to_string(),
            contact_name: None,
            notes: None,
            created_at: chrono::Utc::now().timestamp() as i32,
        })
        .expect("seed client");
    repo.create_job_listing(NewJobListing {
        client_id: client.id,
        title: "Senior Engineer".to_string(),
        company_name: company_name.to_string(),
        location: None,
        description: None,
        status: "open".to_string(),
        created_at: chrono::Utc::now().timestamp() as i32,
    })
    .expect("seed listing")
}

pub fn seed_campaign(
    pool: &DbPool,
    job_listing_id: i32,
    gmail_integration_id: i32,
    recipient_email: &str,
    thread_id: Option<&str>,
    sent_at: Option<i32>,
) -> Campaign {
    let repo = CampaignRepository::new(pool.clone());
    repo.create_campaign(NewCampaign {
        job_listing_id,
        gmail_integration_id,
        recipient_email: recipient_email.to_string(),
        subject: "Opportunity at Acme Corp".to_string(),
        body: "Hi, I came across your profile...".to_string(),
        thread_id: thread_id.map(str::to_string),
        message_id: thread_id.map(|t| format!("outbound-{}", t)),
        status: "sent".to_string(),
        reply_status: "pending".to_string(),
        sent_at,
        created_at: sent_at.unwrap_or_else(|| chrono::Utc::now().timestamp() as i32),
    })
    .expect("seed campaign")
}

pub fn seed_watch(pool: &DbPool, gmail_integration_id: i32, expiration: i32) {
    let repo = IntegrationRepository::new(pool.clone());
    repo.upsert_watch(NewGmailWatch {
        gmail_integration_id,
        history_id: Some("1".to_string()),
        expiration,
        topic_name: "projects/test/topics/gmail-push".to_string(),
        active: true,
        last_synced_at: None,
    })
    .expect("seed watch");
}

/// Inbound provider message with a plain-text body.
pub fn inbound_message(
    id: &str,
    thread_id: &str,
    from: &str,
    internal_epoch_secs: i64,
    body: &str,
) -> MessageDetail {
    MessageDetail {
        id: id.to_string(),
        thread_id: thread_id.to_string(),
        snippet: None,
        payload: MessagePayload {
            headers: vec![MessageHeader {
                name: "From".to_string(),
                value: from.to_string(),
            }],
            body: Some(MessageBody {
                data: Some(URL_SAFE.encode(body.as_bytes())),
                size: None,
            }),
            parts: None,
            mime_type: "text/plain".to_string(),
        },
        internal_date: chrono::Utc.timestamp_opt(internal_epoch_secs, 0).single().expect("timestamp"),
        label_ids: vec!["INBOX".to_string()],
    }
}
