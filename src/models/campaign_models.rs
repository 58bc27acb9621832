use diesel::prelude::*;
use serde::Serialize;
use crate::schema::{clients, job_listings, email_templates, campaigns};

#[derive(Queryable, Selectable, Serialize)]
#[diesel(table_name = clients)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Client {
    pub id: i32,
    pub user_id: i32,
    pub name: String,
    pub contact_email: String,
    pub contact_name: Option<String>,
    pub notes: Option<String>,
    pub created_at: i32, // epoch timestamp
}

#[derive(Insertable)]
#[diesel(table_name = clients)]
pub struct NewClient {
    pub user_id: i32,
    pub name: String,
    pub contact_email: String,
    pub contact_name: Option<String>,
    pub notes: Option<String>,
    pub created_at: i32,
}

#[derive(Queryable, Selectable, Serialize)]
#[diesel(table_name = job_listings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct JobListing {
    pub id: i32,
    pub client_id: i32,
    pub title: String,
    pub company_name: String, // used by the subject-heuristic reply search
    pub location: Option<String>,
    pub description: Option<String>,
    pub status: String, // open or closed
    pub created_at: i32,
}

#[derive(Insertable)]
#[diesel(table_name = job_listings)]
pub struct NewJobListing {
    pub client_id: i32,
    pub title: String,
    pub company_name: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub status: String,
    pub created_at: i32,
}

#[derive(Queryable, Selectable, Serialize)]
#[diesel(table_name = email_templates)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct EmailTemplate {
    pub id: i32,
    pub user_id: i32,
    pub name: String,
    pub subject: String,
    pub body: String,
    pub created_at: i32,
    pub updated_at: i32,
}

#[derive(Insertable)]
#[diesel(table_name = email_templates)]
pub struct NewEmailTemplate {
    pub user_id: i32,
    pub name: String,
    pub subject: String,
    pub body: String,
    pub created_at: i32,
    pub updated_at: i32,
}

#[derive(Queryable, Selectable, Serialize, Clone)]
#[diesel(table_name = campaigns)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Campaign {
    pub id: i32,
    pub job_listing_id: i32,
    pub gmail_integration_id: i32,
    pub recipient_email: String,
    pub subject: String,
    pub body: String,
    pub thread_id: Option<String>, // provider thread id, may be unknown at send time
    pub message_id: Option<String>,
    pub status: String, // sent, replied or done
    pub reply_status: String, // pending, sent or replied
    pub sent_at: Option<i32>,
    pub replied_at: Option<i32>,
    pub reply_sender: Option<String>,
    pub reply_content: Option<String>,
    pub reply_message_id: Option<String>,
    pub created_at: i32,
}

#[derive(Insertable)]
#[diesel(table_name = campaigns)]
pub struct NewCampaign {
    pub job_listing_id: i32,
    pub gmail_integration_id: i32,
    pub recipient_email: String,
    pub subject: String,
    pub body: String,
    pub thread_id: Option<String>,
    pub message_id: Option<String>,
    pub status: String,
    pub reply_status: String,
    pub sent_at: Option<i32>,
    pub created_at: i32,
}
