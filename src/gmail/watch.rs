use std::sync::Arc;

use crate::{
    gmail::client::{GmailApi, GmailError},
    gmail::token::{TokenRefresher, WATCH_TOKEN_MARGIN_SECS},
    models::integration_models::NewGmailWatch,
    repositories::integration_repository::IntegrationRepository,
};

// Provider subscriptions lapse after seven days; renew anything inside the
// final day
const WATCH_LIFETIME_SECS: i64 = 7 * 24 * 3600;
const RENEWAL_WINDOW_SECS: i64 = 24 * 3600;

/// Registers, renews and cancels the provider push subscription per mailbox
/// integration. Every operation logs and reports rather than throwing;
/// callers treat a false return as "try again later".
pub struct WatchManager {
    integrations: Arc<IntegrationRepository>,
    tokens: Arc<TokenRefresher>,
    gmail: Arc<dyn GmailApi>,
    topic_name: String,
}

impl WatchManager {
    pub fn new(
        integrations: Arc<IntegrationRepository>,
        tokens: Arc<TokenRefresher>,
        gmail: Arc<dyn GmailApi>,
        topic_name: String,
    ) -> Self {
        Self { integrations, tokens, gmail, topic_name }
    }

    pub async fn register_watch(&self, integration_id: i32) -> bool {
        let integration = match self.integrations.find_gmail_by_id(integration_id) {
            Ok(Some(integration)) if integration.active => integration,
            Ok(_) => {
                tracing::warn!("No active integration {} to register a watch for", integration_id);
                return false;
            }
            Err(e) => {
                tracing::error!("Failed to load integration {}: {}", integration_id, e);
                return false;
            }
        };

        let access_token = match self.tokens.ensure_fresh(&integration, WATCH_TOKEN_MARGIN_SECS).await {
            Ok(token) => token,
            Err(GmailError::TokenRefreshFailed(e)) => {
                tracing::error!(
                    "Token refresh failed registering watch for integration {}: {}; deactivating",
                    integration_id,
                    e
                );
                // Repeated failed refreshes mean the user must reconnect
                if let Err(e) = self.integrations.deactivate_gmail_integration(integration_id) {
                    tracing::error!("Failed to deactivate integration {}: {}", integration_id, e);
                }
                return false;
            }
            Err(e) => {
                tracing::error!("Failed to obtain token for integration {}: {}", integration_id, e);
                return false;
            }
        };

        let response = match self.gmail.watch(&access_token, &self.topic_name).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Watch registration failed for integration {}: {}", integration_id, e);
                return false;
            }
        };

        let now = chrono::Utc::now().timestamp();
        let expiration = response
            .expiration
            .as_deref()
            .and_then(|ms| ms.parse::<i64>().ok())
            .map(|ms| ms / 1000)
            .unwrap_or(now + WATCH_LIFETIME_SECS);

        let watch = NewGmailWatch {
            gmail_integration_id: integration_id,
            history_id: Some(response.history_id.clone()),
            expiration: expiration as i32,
            topic_name: self.topic_name.clone(),
            active: true,
            last_synced_at: None,
        };
        if let Err(e) = self.integrations.upsert_watch(watch) {
            tracing::error!("Failed to persist watch for integration {}: {}", integration_id, e);
            return false;
        }

        tracing::info!(
            "Registered watch for integration {} (cursor {}, expires {})",
            integration_id,
            response.history_id,
            expiration
        );
        true
    }

    /// Re-registers every active watch that lapses within the next day.
    /// Scheduled; at-least-once is fine since registration is an upsert.
    pub async fn renew_expiring_watches(&self) -> usize {
        let cutoff = (chrono::Utc::now().timestamp() + RENEWAL_WINDOW_SECS) as i32;
        let expiring = match self.integrations.watches_expiring_before(cutoff) {
            Ok(watches) => watches,
            Err(e) => {
                tracing::error!("Failed to list expiring watches: {}", e);
                return 0;
            }
        };

        tracing::info!("{} watches due for renewal", expiring.len());
        let mut renewed = 0;
        for watch in expiring {
            if self.register_watch(watch.gmail_integration_id).await {
                renewed += 1;
            } else {
                tracing::warn!(
                    "Failed to renew watch for integration {}",
                    watch.gmail_integration_id
                );
            }
        }
        renewed
    }

    /// Stops the provider-side subscription. The local row is marked inactive
    /// even when the remote stop call fails; disconnect must never leave a
    /// watch locally active.
    pub async fn cancel_watch(&self, integration_id: i32) -> bool {
        let mut remote_ok = false;

        match self.integrations.find_gmail_by_id(integration_id) {
            Ok(Some(integration)) => {
                match self.tokens.ensure_fresh(&integration, WATCH_TOKEN_MARGIN_SECS).await {
                    Ok(access_token) => match self.gmail.stop(&access_token).await {
                        Ok(()) => {
                            remote_ok = true;
                            tracing::info!("Stopped provider watch for integration {}", integration_id);
                        }
                        Err(e) => {
                            tracing::error!("Provider stop call failed for integration {}: {}", integration_id, e);
                        }
                    },
                    Err(GmailError::TokenRefreshFailed(e)) => {
                        tracing::error!(
                            "Token refresh failed cancelling watch for integration {}: {}; deactivating",
                            integration_id,
                            e
                        );
                        if let Err(e) = self.integrations.deactivate_gmail_integration(integration_id) {
                            tracing::error!("Failed to deactivate integration {}: {}", integration_id, e);
                        }
                    }
                    Err(e) => {
                        tracing::error!("Failed to obtain token for integration {}: {}", integration_id, e);
                    }
                }
            }
            Ok(None) => {
                tracing::warn!("No integration {} found while cancelling watch", integration_id);
            }
            Err(e) => {
                tracing::error!("Failed to load integration {}: {}", integration_id, e);
            }
        }

        if let Err(e) = self.integrations.deactivate_watch(integration_id) {
            tracing::error!("Failed to deactivate watch row for integration {}: {}", integration_id, e);
        }
        remote_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmail::client::{MockGmailApi, WatchResponse};
    use crate::test_support::{seed_gmail_integration, seed_watch, test_oauth_client, test_pool};

    fn manager_with(pool: &crate::DbPool, gmail: MockGmailApi) -> WatchManager {
        let integrations = Arc::new(IntegrationRepository::new(pool.clone()));
        let tokens = Arc::new(TokenRefresher::new(integrations.clone(), test_oauth_client()));
        WatchManager::new(integrations, tokens, Arc::new(gmail), "projects/test/topics/gmail-push".to_string())
    }

    #[tokio::test]
    async fn register_watch_upserts_row() {
        let pool = test_pool();
        let now = chrono::Utc::now().timestamp();
        let integration = seed_gmail_integration(&pool, 1, "recruiter@agency.com", (now + 86_400) as i32);

        let mut gmail = MockGmailApi::new();
        gmail.expect_watch().times(1).returning(move |_, _| {
            Ok(WatchResponse {
                history_id: "5000".to_string(),
                expiration: Some(((now + WATCH_LIFETIME_SECS) * 1000).to_string()),
            })
        });

        let manager = manager_with(&pool, gmail);
        assert!(manager.register_watch(integration.id).await);

        let integrations = IntegrationRepository::new(pool);
        let watch = integrations.find_watch(integration.id).unwrap().expect("watch row");
        assert!(watch.active);
        assert_eq!(watch.history_id.as_deref(), Some("5000"));
        assert!(i64::from(watch.expiration) > now + WATCH_LIFETIME_SECS - 60);
    }

    // A watch 12 hours from expiry is renewed; one 10 days out is left alone
    #[tokio::test]
    async fn renewal_only_touches_expiring_watches() {
        let pool = test_pool();
        let now = chrono::Utc::now().timestamp();
        let near = seed_gmail_integration(&pool, 1, "near@agency.com", (now + 86_400) as i32);
        let far = seed_gmail_integration(&pool, 2, "far@agency.com", (now + 86_400) as i32);
        seed_watch(&pool, near.id, (now + 12 * 3600) as i32);
        seed_watch(&pool, far.id, (now + 10 * 24 * 3600) as i32);

        let mut gmail = MockGmailApi::new();
        // Exactly one registration call: the nearly-expired watch
        gmail.expect_watch().times(1).returning(|_, _| {
            Ok(WatchResponse { history_id: "6000".to_string(), expiration: None })
        });

        let manager = manager_with(&pool, gmail);
        assert_eq!(manager.renew_expiring_watches().await, 1);
    }

    #[tokio::test]
    async fn cancel_watch_deactivates_locally_even_when_remote_fails() {
        let pool = test_pool();
        let now = chrono::Utc::now().timestamp();
        let integration = seed_gmail_integration(&pool, 1, "recruiter@agency.com", (now + 86_400) as i32);
        seed_watch(&pool, integration.id, (now + 86_400) as i32);

        let mut gmail = MockGmailApi::new();
        gmail.expect_stop()
            .times(1)
            .returning(|_| Err(GmailError::ApiError("remote unavailable".to_string())));

        let manager = manager_with(&pool, gmail);
        assert!(!manager.cancel_watch(integration.id).await);

        let integrations = IntegrationRepository::new(pool);
        let watch = integrations.find_watch(integration.id).unwrap().expect("watch row");
        assert!(!watch.active);
    }

    #[tokio::test]
    async fn cancel_watch_reports_remote_success() {
        let pool = test_pool();
        let now = chrono::Utc::now().timestamp();
        let integration = seed_gmail_integration(&pool, 1, "recruiter@agency.com", (now + 86_400) as i32);
        seed_watch(&pool, integration.id, (now + 86_400) as i32);

        let mut gmail = MockGmailApi::new();
        gmail.expect_stop().times(1).returning(|_| Ok(()));

        let manager = manager_with(&pool, gmail);
        assert!(manager.cancel_watch(integration.id).await);
    }
}
