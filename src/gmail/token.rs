use std::sync::Arc;

use oauth2::{RefreshToken, TokenResponse};

use crate::{
    GoogleOAuthClient,
    gmail::client::GmailError,
    models::integration_models::GmailIntegration,
    repositories::integration_repository::IntegrationRepository,
    utils::encryption::{encrypt_token, decrypt_token},
};

/// Safety margin used on the watch-management path so a token cannot lapse
/// mid-registration.
pub const WATCH_TOKEN_MARGIN_SECS: i64 = 300;

/// Exchanges refresh tokens just-in-time and persists the result. Callers
/// decide what a failed exchange means for the integration row.
pub struct TokenRefresher {
    integrations: Arc<IntegrationRepository>,
    oauth_client: GoogleOAuthClient,
    http_client: reqwest::Client,
}

impl TokenRefresher {
    pub fn new(integrations: Arc<IntegrationRepository>, oauth_client: GoogleOAuthClient) -> Self {
        let http_client = reqwest::ClientBuilder::new()
            // Following redirects opens the client up to SSRF vulnerabilities.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("Client should build");
        Self { integrations, oauth_client, http_client }
    }

    /// Returns a usable access token for the integration, refreshing it first
    /// when the stored one has expired or lapses within `margin_secs`.
    pub async fn ensure_fresh(
        &self,
        integration: &GmailIntegration,
        margin_secs: i64,
    ) -> Result<String, GmailError> {
        let now = chrono::Utc::now().timestamp();
        if i64::from(integration.token_expires_at) > now + margin_secs {
            return decrypt_token(&integration.access_token)
                .map_err(|e| GmailError::TokenRefreshFailed(format!("stored token unreadable: {}", e)));
        }

        tracing::info!(
            "Access token for integration {} expired or expiring, refreshing",
            integration.id
        );

        let refresh_token = decrypt_token(&integration.refresh_token)
            .map_err(|e| GmailError::TokenRefreshFailed(format!("stored token unreadable: {}", e)))?;

        let token = self.oauth_client
            .exchange_refresh_token(&RefreshToken::new(refresh_token))
            .request_async(&self.http_client)
            .await
            .map_err(|e| {
                tracing::error!("Refresh token exchange failed for integration {}: {}", integration.id, e);
                GmailError::TokenRefreshFailed(e.to_string())
            })?;

        let new_access_token = token.access_token().secret().to_string();
        let expires_in = token.expires_in().unwrap_or_default().as_secs() as i64;
        let encrypted = encrypt_token(&new_access_token)
            .map_err(GmailError::TokenRefreshFailed)?;
        self.integrations.update_gmail_access_token(
            integration.id,
            &encrypted,
            (now + expires_in) as i32,
        )?;

        Ok(new_access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_gmail_integration, test_oauth_client, test_pool, ACCESS_TOKEN};
    use crate::repositories::integration_repository::IntegrationRepository;

    #[tokio::test]
    async fn returns_stored_token_when_not_expired() {
        let pool = test_pool();
        let integrations = Arc::new(IntegrationRepository::new(pool.clone()));
        let integration = seed_gmail_integration(&pool, 1, "me@example.com", chrono::Utc::now().timestamp() as i32 + 3600);

        let refresher = TokenRefresher::new(integrations, test_oauth_client());
        let token = refresher.ensure_fresh(&integration, 0).await.expect("token");
        assert_eq!(token, ACCESS_TOKEN);
    }

    #[tokio::test]
    async fn margin_forces_refresh_attempt() {
        let pool = test_pool();
        let integrations = Arc::new(IntegrationRepository::new(pool.clone()));
        // Valid for two more minutes, but the five-minute margin must reject it
        let integration = seed_gmail_integration(&pool, 1, "me@example.com", chrono::Utc::now().timestamp() as i32 + 120);

        let refresher = TokenRefresher::new(integrations, test_oauth_client());
        let result = refresher
            .ensure_fresh(&integration, WATCH_TOKEN_MARGIN_SECS)
            .await;
        // The dummy token endpoint is unreachable, so the attempt surfaces as
        // a refresh failure rather than the stale stored token
        assert!(matches!(result, Err(GmailError::TokenRefreshFailed(_))));
    }
}
