use dotenvy::dotenv;
use axum::{
    routing::{get, post, put, delete},
    Router,
};
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use oauth2::{
    basic::BasicClient,
    AuthUrl, ClientId, ClientSecret, EndpointNotSet, EndpointSet, RedirectUrl, TokenUrl,
};
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{TraceLayer, DefaultMakeSpan, DefaultOnResponse};
use tower_sessions::MemoryStore;
use tracing::Level;
use std::sync::Arc;

mod handlers {
    pub mod auth_handlers;
    pub mod auth_dtos;
    pub mod auth_middleware;
    pub mod client_handlers;
    pub mod job_handlers;
    pub mod template_handlers;
    pub mod campaign_handlers;
    pub mod gmail_auth;
    pub mod drive_auth;
    pub mod gmail_watch;
}
mod api {
    pub mod gmail_webhook;
    pub mod gmail_fallback;
}
mod gmail {
    pub mod client;
    pub mod token;
    pub mod extract;
    pub mod matcher;
    pub mod notifications;
    pub mod watch;
    pub mod fallback;
}

mod models {
    pub mod user_models;
    pub mod campaign_models;
    pub mod integration_models;
}
mod repositories {
    pub mod user_repository;
    pub mod client_repository;
    pub mod template_repository;
    pub mod campaign_repository;
    pub mod integration_repository;
}
mod schema;
mod jobs {
    pub mod scheduler;
}
mod utils {
    pub mod encryption;
}
#[cfg(test)]
mod test_support;

use gmail::client::{GmailApi, GmailClient};
use gmail::fallback::FallbackScanner;
use gmail::matcher::CampaignMatcher;
use gmail::notifications::NotificationTracker;
use gmail::token::TokenRefresher;
use gmail::watch::WatchManager;
use repositories::campaign_repository::CampaignRepository;
use repositories::client_repository::ClientRepository;
use repositories::integration_repository::IntegrationRepository;
use repositories::template_repository::TemplateRepository;
use repositories::user_repository::UserRepository;

use handlers::auth_handlers;
use handlers::client_handlers;
use handlers::job_handlers;
use handlers::template_handlers;
use handlers::campaign_handlers;
use handlers::gmail_auth;
use handlers::drive_auth;
use handlers::gmail_watch;
use api::gmail_webhook;
use api::gmail_fallback;

pub type DbPool = r2d2::Pool<ConnectionManager<SqliteConnection>>;

pub type GoogleOAuthClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

async fn health_check() -> &'static str {
    "OK"
}

pub struct AppState {
    pub db_pool: DbPool,
    pub user_repository: Arc<UserRepository>,
    pub client_repository: Arc<ClientRepository>,
    pub template_repository: Arc<TemplateRepository>,
    pub campaign_repository: Arc<CampaignRepository>,
    pub integration_repository: Arc<IntegrationRepository>,
    pub session_store: MemoryStore,
    pub gmail_oauth_client: GoogleOAuthClient,
    pub drive_oauth_client: GoogleOAuthClient,
    pub gmail_api: Arc<dyn GmailApi>,
    pub token_refresher: Arc<TokenRefresher>,
    pub campaign_matcher: Arc<CampaignMatcher>,
    pub notification_tracker: Arc<NotificationTracker>,
    pub watch_manager: Arc<WatchManager>,
    pub fallback_scanner: Arc<FallbackScanner>,
}

pub fn validate_env() {
    let _ = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set");
    let _ = std::env::var("JWT_SECRET_KEY")
        .expect("JWT_SECRET_KEY must be set");
    let _ = std::env::var("ENCRYPTION_KEY")
        .expect("ENCRYPTION_KEY must be set");
    let _ = std::env::var("GOOGLE_CLIENT_ID")
        .expect("GOOGLE_CLIENT_ID must be set");
    let _ = std::env::var("GOOGLE_CLIENT_SECRET")
        .expect("GOOGLE_CLIENT_SECRET must be set");
    let _ = std::env::var("GMAIL_PUBSUB_TOPIC")
        .expect("GMAIL_PUBSUB_TOPIC must be set");
    let _ = std::env::var("SERVER_URL")
        .expect("SERVER_URL must be set");
    let _ = std::env::var("FRONTEND_URL")
        .expect("FRONTEND_URL must be set");
    let _ = std::env::var("ENVIRONMENT") // for dev its 'development' and for prod anything else
        .expect("ENVIRONMENT must be set");
}

fn google_oauth_client(redirect_path: &str) -> GoogleOAuthClient {
    let server_url = std::env::var("SERVER_URL").expect("SERVER_URL must be set");
    BasicClient::new(ClientId::new(
        std::env::var("GOOGLE_CLIENT_ID").expect("GOOGLE_CLIENT_ID must be set"),
    ))
    .set_client_secret(ClientSecret::new(
        std::env::var("GOOGLE_CLIENT_SECRET").expect("GOOGLE_CLIENT_SECRET must be set"),
    ))
    .set_auth_uri(
        AuthUrl::new("https://accounts.google.com/o/oauth2/v2/auth".to_string())
            .expect("Invalid auth endpoint URL"),
    )
    .set_token_uri(
        TokenUrl::new("https://oauth2.googleapis.com/token".to_string())
            .expect("Invalid token endpoint URL"),
    )
    .set_redirect_uri(
        RedirectUrl::new(format!("{}{}", server_url, redirect_path))
            .expect("Invalid redirect URL"),
    )
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    validate_env();

    let _sentry_guard = std::env::var("SENTRY_DSN").ok().map(|dsn| {
        sentry::init((dsn, sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        }))
    });

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    // Set up database connection pool
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = r2d2::Pool::builder()
        .build(manager)
        .expect("Failed to create pool");

    {
        let mut conn = pool.get().expect("Failed to get DB connection");
        conn.run_pending_migrations(MIGRATIONS).expect("Failed to run migrations");
    }

    let user_repository = Arc::new(UserRepository::new(pool.clone()));
    let client_repository = Arc::new(ClientRepository::new(pool.clone()));
    let template_repository = Arc::new(TemplateRepository::new(pool.clone()));
    let campaign_repository = Arc::new(CampaignRepository::new(pool.clone()));
    let integration_repository = Arc::new(IntegrationRepository::new(pool.clone()));

    let gmail_oauth_client = google_oauth_client("/api/auth/gmail/callback");
    let drive_oauth_client = google_oauth_client("/api/auth/drive/callback");

    // The reply pipeline is wired up once here and shared through AppState
    let gmail_api: Arc<dyn GmailApi> = Arc::new(GmailClient::new());
    let token_refresher = Arc::new(TokenRefresher::new(
        integration_repository.clone(),
        gmail_oauth_client.clone(),
    ));
    let campaign_matcher = Arc::new(CampaignMatcher::new(campaign_repository.clone()));
    let notification_tracker = Arc::new(NotificationTracker::new(
        integration_repository.clone(),
        campaign_matcher.clone(),
        token_refresher.clone(),
        gmail_api.clone(),
    ));
    let watch_manager = Arc::new(WatchManager::new(
        integration_repository.clone(),
        token_refresher.clone(),
        gmail_api.clone(),
        std::env::var("GMAIL_PUBSUB_TOPIC").expect("GMAIL_PUBSUB_TOPIC must be set"),
    ));
    let fallback_scanner = Arc::new(FallbackScanner::new(
        campaign_repository.clone(),
        client_repository.clone(),
        campaign_matcher.clone(),
        token_refresher.clone(),
        gmail_api.clone(),
    ));

    let state = Arc::new(AppState {
        db_pool: pool,
        user_repository,
        client_repository,
        template_repository,
        campaign_repository,
        integration_repository,
        session_store: MemoryStore::default(),
        gmail_oauth_client,
        drive_oauth_client,
        gmail_api,
        token_refresher,
        campaign_matcher,
        notification_tracker,
        watch_manager,
        fallback_scanner,
    });

    // Create router with CORS
    let app = Router::new()
        .route("/api/health", get(health_check))
        .route("/api/login", post(auth_handlers::login))
        .route("/api/register", post(auth_handlers::register))

        .route("/api/clients", get(client_handlers::list_clients).post(client_handlers::create_client))
        .route("/api/clients/{client_id}", get(client_handlers::get_client))
        .route("/api/clients/{client_id}", put(client_handlers::update_client))
        .route("/api/clients/{client_id}", delete(client_handlers::delete_client))

        .route("/api/job-listings", get(job_handlers::list_job_listings).post(job_handlers::create_job_listing))
        .route("/api/job-listings/{listing_id}", put(job_handlers::update_job_listing))
        .route("/api/job-listings/{listing_id}", delete(job_handlers::delete_job_listing))

        .route("/api/templates", get(template_handlers::list_templates).post(template_handlers::create_template))
        .route("/api/templates/{template_id}", put(template_handlers::update_template))
        .route("/api/templates/{template_id}", delete(template_handlers::delete_template))

        .route("/api/campaigns", get(campaign_handlers::list_campaigns))
        .route("/api/campaigns/send", post(campaign_handlers::send_campaign))
        .route("/api/campaigns/{campaign_id}/simulate-reply", post(campaign_handlers::simulate_reply))

        .route("/api/auth/gmail/login", get(gmail_auth::gmail_login))
        .route("/api/auth/gmail/callback", get(gmail_auth::gmail_callback))
        .route("/api/auth/gmail/status", get(gmail_auth::gmail_status))
        .route("/api/gmail/disconnect", post(gmail_auth::gmail_disconnect))

        .route("/api/auth/drive/login", get(drive_auth::drive_login))
        .route("/api/auth/drive/callback", get(drive_auth::drive_callback))
        .route("/api/auth/drive/status", get(drive_auth::drive_status))
        .route("/api/drive/disconnect", post(drive_auth::drive_disconnect))

        .route("/api/gmail/watch", get(gmail_watch::list_watches)
            .post(gmail_watch::register_watch)
            .put(gmail_watch::renew_watches))
        .route("/api/gmail/webhook", post(gmail_webhook::gmail_webhook))
        .route("/api/gmail/check-replies-fallback", post(gmail_fallback::check_replies_fallback))

        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO))
        )
        .layer(
            CorsLayer::new()
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PUT,
                    axum::http::Method::OPTIONS,
                    axum::http::Method::DELETE,
                ])
                .allow_origin(Any) // Be cautious with `Any` in production; restrict to your frontend origin
                .allow_headers([axum::http::header::CONTENT_TYPE, axum::http::header::AUTHORIZATION])
                .expose_headers([axum::http::header::CONTENT_TYPE])
        )
        .with_state(state.clone());

    // Spawn the scheduler
    let state_for_scheduler = state.clone();
    tokio::spawn(async move {
        jobs::scheduler::start_scheduler(state_for_scheduler).await;
    });

    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
    axum::serve(listener, app.into_make_service()).await.unwrap();
}
