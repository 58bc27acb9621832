use diesel::prelude::*;
use crate::schema::{gmail_integrations, drive_integrations, gmail_watches, gmail_notification_history};

#[derive(Queryable, Selectable, Clone)]
#[diesel(table_name = gmail_integrations)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct GmailIntegration {
    pub id: i32,
    pub user_id: i32,
    pub email_address: String,
    pub access_token: String, // encrypted at rest
    pub refresh_token: String, // encrypted at rest
    pub token_expires_at: i32,
    pub active: bool,
    pub created_at: i32,
}

#[derive(Insertable)]
#[diesel(table_name = gmail_integrations)]
pub struct NewGmailIntegration {
    pub user_id: i32,
    pub email_address: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_expires_at: i32,
    pub active: bool,
    pub created_at: i32,
}

#[derive(Queryable, Selectable, Clone)]
#[diesel(table_name = drive_integrations)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DriveIntegration {
    pub id: i32,
    pub user_id: i32,
    pub access_token: String, // encrypted at rest
    pub refresh_token: String, // encrypted at rest
    pub token_expires_at: i32,
    pub active: bool,
    pub created_at: i32,
}

#[derive(Insertable)]
#[diesel(table_name = drive_integrations)]
pub struct NewDriveIntegration {
    pub user_id: i32,
    pub access_token: String,
    pub refresh_token: String,
    pub token_expires_at: i32,
    pub active: bool,
    pub created_at: i32,
}

#[derive(Queryable, Selectable, Clone)]
#[diesel(table_name = gmail_watches)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct GmailWatch {
    pub id: i32,
    pub gmail_integration_id: i32,
    pub history_id: Option<String>, // last known history cursor
    pub expiration: i32, // epoch seconds; provider stops notifying past this
    pub topic_name: String,
    pub active: bool,
    pub last_synced_at: Option<i32>,
}

#[derive(Insertable)]
#[diesel(table_name = gmail_watches)]
pub struct NewGmailWatch {
    pub gmail_integration_id: i32,
    pub history_id: Option<String>,
    pub expiration: i32,
    pub topic_name: String,
    pub active: bool,
    pub last_synced_at: Option<i32>,
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = gmail_notification_history)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct GmailNotificationHistory {
    pub id: i32,
    pub gmail_integration_id: i32,
    pub history_id: String,
    pub processed_at: i32,
}

#[derive(Insertable)]
#[diesel(table_name = gmail_notification_history)]
pub struct NewGmailNotificationHistory {
    pub gmail_integration_id: i32,
    pub history_id: String,
    pub processed_at: i32,
}
