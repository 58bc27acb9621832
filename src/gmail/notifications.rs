use std::sync::Arc;

use crate::{
    gmail::client::{GmailApi, GmailError},
    gmail::matcher::CampaignMatcher,
    gmail::token::TokenRefresher,
    repositories::integration_repository::IntegrationRepository,
};

#[derive(Debug, PartialEq)]
pub enum NotificationOutcome {
    /// Mailbox is not connected or was disconnected; nothing to do.
    UntrackedMailbox,
    /// This history cursor was already handled.
    AlreadyProcessed,
    Processed { messages_seen: usize, replies_recorded: usize },
}

/// Consumes provider history-change notifications: deduplicates them against
/// the ledger, fetches the change set, and fans message-added events out to
/// the Campaign Matcher.
pub struct NotificationTracker {
    integrations: Arc<IntegrationRepository>,
    matcher: Arc<CampaignMatcher>,
    tokens: Arc<TokenRefresher>,
    gmail: Arc<dyn GmailApi>,
}

impl NotificationTracker {
    pub fn new(
        integrations: Arc<IntegrationRepository>,
        matcher: Arc<CampaignMatcher>,
        tokens: Arc<TokenRefresher>,
        gmail: Arc<dyn GmailApi>,
    ) -> Self {
        Self { integrations, matcher, tokens, gmail }
    }

    pub async fn handle_notification(
        &self,
        mailbox_address: &str,
        history_id: &str,
    ) -> Result<NotificationOutcome, GmailError> {
        let integration = match self.integrations.find_active_gmail_by_email(&mailbox_address.to_lowercase())? {
            Some(integration) => integration,
            None => {
                tracing::info!("No active integration for mailbox {}, ignoring notification", mailbox_address);
                return Ok(NotificationOutcome::UntrackedMailbox);
            }
        };

        if self.integrations.notification_seen(integration.id, history_id)? {
            tracing::info!(
                "History {} for integration {} already processed, skipping",
                history_id,
                integration.id
            );
            return Ok(NotificationOutcome::AlreadyProcessed);
        }

        let access_token = self.tokens.ensure_fresh(&integration, 0).await?;

        // A failed fetch leaves the ledger untouched so a redelivered
        // notification gets a fresh attempt
        let history = self.gmail.list_history(&access_token, history_id).await?;

        // The cursor is marked processed before its messages are examined:
        // never re-processing the same cursor wins over never missing a reply
        let now = chrono::Utc::now().timestamp() as i32;
        self.integrations.record_notification(integration.id, history_id, now)?;

        let mut messages_seen = 0;
        let mut replies_recorded = 0;
        for record in &history {
            for added in &record.messages_added {
                messages_seen += 1;
                let detail = match self.gmail.get_message(&access_token, &added.message.id).await {
                    Ok(detail) => detail,
                    Err(e) => {
                        tracing::error!(
                            "Failed to fetch message {} from history {}: {}",
                            added.message.id,
                            history_id,
                            e
                        );
                        continue;
                    }
                };
                match self.matcher.match_and_record_reply(&integration, &detail) {
                    Ok(result) if result.matched => {
                        replies_recorded += 1;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!("Failed to match message {}: {}", detail.id, e);
                    }
                }
            }
        }

        if let Err(e) = self.integrations.touch_watch_sync(integration.id, history_id, now) {
            tracing::error!("Failed to advance watch cursor for integration {}: {}", integration.id, e);
        }

        tracing::info!(
            "Processed history {} for integration {}: {} messages, {} replies",
            history_id,
            integration.id,
            messages_seen,
            replies_recorded
        );
        Ok(NotificationOutcome::Processed { messages_seen, replies_recorded })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmail::client::{HistoryMessageAdded, HistoryRecord, MessageRef, MockGmailApi};
    use crate::repositories::campaign_repository::CampaignRepository;
    use crate::test_support::{
        inbound_message, seed_campaign, seed_gmail_integration, seed_job_listing, test_oauth_client,
        test_pool,
    };

    const SENT_AT: i32 = 1_700_000_000;

    fn history_with_message(message_id: &str, thread_id: &str) -> Vec<HistoryRecord> {
        vec![HistoryRecord {
            id: Some("90001".to_string()),
            messages_added: vec![HistoryMessageAdded {
                message: MessageRef { id: message_id.to_string(), thread_id: thread_id.to_string() },
            }],
        }]
    }

    fn tracker_with(pool: &crate::DbPool, gmail: MockGmailApi) -> NotificationTracker {
        let integrations = Arc::new(IntegrationRepository::new(pool.clone()));
        let campaigns = Arc::new(CampaignRepository::new(pool.clone()));
        let matcher = Arc::new(CampaignMatcher::new(campaigns));
        let tokens = Arc::new(TokenRefresher::new(integrations.clone(), test_oauth_client()));
        NotificationTracker::new(integrations, matcher, tokens, Arc::new(gmail))
    }

    // The end-to-end scenario: notification for a new message in a campaign
    // thread records the reply and leaves a ledger row
    #[tokio::test]
    async fn notification_records_reply_and_ledger_row() {
        let pool = test_pool();
        let integration = seed_gmail_integration(&pool, 1, "recruiter@agency.com", chrono::Utc::now().timestamp() as i32 + 3600);
        let listing = seed_job_listing(&pool, 1, "Acme Corp");
        let campaign = seed_campaign(&pool, listing.id, integration.id, "candidate@example.com", Some("T1"), Some(SENT_AT));

        let mut gmail = MockGmailApi::new();
        gmail.expect_list_history()
            .times(1)
            .returning(|_, _| Ok(history_with_message("m1", "T1")));
        gmail.expect_get_message()
            .times(1)
            .returning(|_, _| {
                Ok(inbound_message("m1", "T1", "Candidate <candidate@example.com>", SENT_AT as i64 + 600, "Thanks, I'm in!"))
            });

        let tracker = tracker_with(&pool, gmail);
        let outcome = tracker
            .handle_notification("recruiter@agency.com", "90001")
            .await
            .expect("notification");
        assert_eq!(outcome, NotificationOutcome::Processed { messages_seen: 1, replies_recorded: 1 });

        let campaigns = CampaignRepository::new(pool.clone());
        let updated = campaigns.find_by_id(campaign.id).unwrap().unwrap();
        assert_eq!(updated.reply_status, "replied");
        assert!(updated.reply_message_id.is_some());
        assert_eq!(updated.reply_content.as_deref(), Some("Thanks, I'm in!"));

        let integrations = IntegrationRepository::new(pool);
        assert!(integrations.notification_seen(integration.id, "90001").unwrap());
    }

    // Replaying the same history cursor must not touch the provider or the
    // campaign a second time
    #[tokio::test]
    async fn duplicate_notification_is_dropped() {
        let pool = test_pool();
        let integration = seed_gmail_integration(&pool, 1, "recruiter@agency.com", chrono::Utc::now().timestamp() as i32 + 3600);
        let listing = seed_job_listing(&pool, 1, "Acme Corp");
        let campaign = seed_campaign(&pool, listing.id, integration.id, "candidate@example.com", Some("T1"), Some(SENT_AT));

        let mut gmail = MockGmailApi::new();
        gmail.expect_list_history()
            .times(1)
            .returning(|_, _| Ok(history_with_message("m1", "T1")));
        gmail.expect_get_message()
            .times(1)
            .returning(|_, _| {
                Ok(inbound_message("m1", "T1", "Candidate <candidate@example.com>", SENT_AT as i64 + 600, "First reply"))
            });

        let tracker = tracker_with(&pool, gmail);
        let first = tracker.handle_notification("recruiter@agency.com", "90001").await.unwrap();
        assert!(matches!(first, NotificationOutcome::Processed { .. }));

        let second = tracker.handle_notification("recruiter@agency.com", "90001").await.unwrap();
        assert_eq!(second, NotificationOutcome::AlreadyProcessed);

        let campaigns = CampaignRepository::new(pool);
        let updated = campaigns.find_by_id(campaign.id).unwrap().unwrap();
        assert_eq!(updated.reply_content.as_deref(), Some("First reply"));
    }

    #[tokio::test]
    async fn unknown_mailbox_is_a_noop() {
        let pool = test_pool();
        let gmail = MockGmailApi::new();
        let tracker = tracker_with(&pool, gmail);

        let outcome = tracker
            .handle_notification("stranger@nowhere.com", "123")
            .await
            .expect("notification");
        assert_eq!(outcome, NotificationOutcome::UntrackedMailbox);
    }

    // A failed history fetch must leave the notification unmarked so a
    // redelivery can retry it
    #[tokio::test]
    async fn failed_history_fetch_is_not_marked_processed() {
        let pool = test_pool();
        let integration = seed_gmail_integration(&pool, 1, "recruiter@agency.com", chrono::Utc::now().timestamp() as i32 + 3600);

        let mut gmail = MockGmailApi::new();
        gmail.expect_list_history()
            .times(1)
            .returning(|_, _| Err(GmailError::ApiError("boom".to_string())));

        let tracker = tracker_with(&pool, gmail);
        let result = tracker.handle_notification("recruiter@agency.com", "90002").await;
        assert!(result.is_err());

        let integrations = IntegrationRepository::new(pool);
        assert!(!integrations.notification_seen(integration.id, "90002").unwrap());
    }

    // One unfetchable message does not abort the rest of the batch
    #[tokio::test]
    async fn partial_batch_failure_continues() {
        let pool = test_pool();
        seed_gmail_integration(&pool, 1, "recruiter@agency.com", chrono::Utc::now().timestamp() as i32 + 3600);
        let listing = seed_job_listing(&pool, 1, "Acme Corp");
        let campaign = seed_campaign(&pool, listing.id, 1, "candidate@example.com", Some("T1"), Some(SENT_AT));

        let mut gmail = MockGmailApi::new();
        gmail.expect_list_history().times(1).returning(|_, _| {
            Ok(vec![HistoryRecord {
                id: Some("90003".to_string()),
                messages_added: vec![
                    HistoryMessageAdded { message: MessageRef { id: "bad".to_string(), thread_id: "T9".to_string() } },
                    HistoryMessageAdded { message: MessageRef { id: "m1".to_string(), thread_id: "T1".to_string() } },
                ],
            }])
        });
        gmail.expect_get_message().times(2).returning(|_, message_id| {
            if message_id == "bad" {
                Err(GmailError::ApiError("gone".to_string()))
            } else {
                Ok(inbound_message("m1", "T1", "Candidate <candidate@example.com>", SENT_AT as i64 + 600, "Still here"))
            }
        });

        let tracker = tracker_with(&pool, gmail);
        let outcome = tracker.handle_notification("recruiter@agency.com", "90003").await.unwrap();
        assert_eq!(outcome, NotificationOutcome::Processed { messages_seen: 2, replies_recorded: 1 });

        let campaigns = CampaignRepository::new(pool);
        let updated = campaigns.find_by_id(campaign.id).unwrap().unwrap();
        assert_eq!(updated.reply_status, "replied");
    }
}
