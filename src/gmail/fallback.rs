use std::sync::Arc;

use serde::Serialize;

use crate::{
    gmail::client::{GmailApi, GmailError},
    gmail::matcher::CampaignMatcher,
    gmail::token::TokenRefresher,
    models::campaign_models::Campaign,
    models::integration_models::GmailIntegration,
    repositories::campaign_repository::CampaignRepository,
    repositories::client_repository::ClientRepository,
};

pub const METHOD_THREAD_RECHECK: &str = "thread_recheck";
pub const METHOD_RECENT_INBOX: &str = "recent_inbox";
pub const METHOD_SUBJECT: &str = "subject_matching";

const RECENT_INBOX_QUERY: &str = "in:inbox newer_than:1d";
const RECENT_INBOX_LIMIT: u32 = 100;
const SUBJECT_SEARCH_LIMIT: u32 = 25;

/// Per-unit result of one fallback check, kept uniform across strategies for
/// observability.
#[derive(Debug, Serialize)]
pub struct ScanOutcome {
    pub method: String,
    pub campaign_id: Option<i32>,
    pub reply_found: bool,
    pub reason: String,
}

impl ScanOutcome {
    fn new(method: &str, campaign_id: Option<i32>, reply_found: bool, reason: impl Into<String>) -> Self {
        Self { method: method.to_string(), campaign_id, reply_found, reason: reason.into() }
    }
}

/// Safety net for replies that push notifications missed. Three independent
/// strategies run in sequence; no strategy's failure aborts the others.
pub struct FallbackScanner {
    campaigns: Arc<CampaignRepository>,
    clients: Arc<ClientRepository>,
    matcher: Arc<CampaignMatcher>,
    tokens: Arc<TokenRefresher>,
    gmail: Arc<dyn GmailApi>,
}

impl FallbackScanner {
    pub fn new(
        campaigns: Arc<CampaignRepository>,
        clients: Arc<ClientRepository>,
        matcher: Arc<CampaignMatcher>,
        tokens: Arc<TokenRefresher>,
        gmail: Arc<dyn GmailApi>,
    ) -> Self {
        Self { campaigns, clients, matcher, tokens, gmail }
    }

    pub async fn scan(
        &self,
        integration: &GmailIntegration,
        campaign_id: Option<i32>,
    ) -> Result<Vec<ScanOutcome>, GmailError> {
        let access_token = self.tokens.ensure_fresh(integration, 0).await?;

        let candidates: Vec<Campaign> = match campaign_id {
            Some(id) => self
                .campaigns
                .find_by_id(id)?
                .into_iter()
                .filter(|c| c.gmail_integration_id == integration.id)
                .filter(|c| c.reply_status == "pending" || c.reply_status == "sent")
                .collect(),
            None => self.campaigns.awaiting_reply_for_integration(integration.id)?,
        };

        tracing::info!(
            "Fallback scan for integration {} over {} campaigns",
            integration.id,
            candidates.len()
        );

        let mut outcomes = Vec::new();
        outcomes.extend(self.recheck_threads(integration, &access_token, &candidates).await);
        outcomes.extend(self.scan_recent_inbox(integration, &access_token).await);
        outcomes.extend(self.match_by_subject(integration, &access_token, &candidates).await);
        Ok(outcomes)
    }

    // Strategy 1: re-fetch each campaign's stored thread and look at the
    // newest message in it
    async fn recheck_threads(
        &self,
        integration: &GmailIntegration,
        access_token: &str,
        candidates: &[Campaign],
    ) -> Vec<ScanOutcome> {
        let mut outcomes = Vec::new();
        for campaign in candidates {
            let thread_id = match &campaign.thread_id {
                Some(thread_id) => thread_id,
                None => continue,
            };

            let thread = match self.gmail.get_thread(access_token, thread_id).await {
                Ok(thread) => thread,
                Err(e) => {
                    outcomes.push(ScanOutcome::new(
                        METHOD_THREAD_RECHECK,
                        Some(campaign.id),
                        false,
                        format!("thread fetch failed: {}", e),
                    ));
                    continue;
                }
            };

            let newest = match thread.messages.last() {
                Some(newest) => newest,
                None => {
                    outcomes.push(ScanOutcome::new(
                        METHOD_THREAD_RECHECK,
                        Some(campaign.id),
                        false,
                        "thread has no messages",
                    ));
                    continue;
                }
            };

            let sender = match CampaignMatcher::sender_address(newest) {
                Some(sender) => sender,
                None => {
                    outcomes.push(ScanOutcome::new(
                        METHOD_THREAD_RECHECK,
                        Some(campaign.id),
                        false,
                        "newest message has no sender",
                    ));
                    continue;
                }
            };

            if CampaignMatcher::is_self_sent(integration, &sender) {
                outcomes.push(ScanOutcome::new(
                    METHOD_THREAD_RECHECK,
                    Some(campaign.id),
                    false,
                    "newest message is self-sent",
                ));
                continue;
            }
            if CampaignMatcher::predates_campaign(campaign, newest) {
                outcomes.push(ScanOutcome::new(
                    METHOD_THREAD_RECHECK,
                    Some(campaign.id),
                    false,
                    "no messages newer than the send time",
                ));
                continue;
            }

            match self.matcher.record_reply(campaign, newest, &sender) {
                Ok(()) => outcomes.push(ScanOutcome::new(
                    METHOD_THREAD_RECHECK,
                    Some(campaign.id),
                    true,
                    format!("reply found in thread {}", thread_id),
                )),
                Err(e) => outcomes.push(ScanOutcome::new(
                    METHOD_THREAD_RECHECK,
                    Some(campaign.id),
                    false,
                    format!("failed to record reply: {}", e),
                )),
            }
        }
        outcomes
    }

    // Strategy 2: sweep the last day of inbox mail through the thread-only
    // matcher
    async fn scan_recent_inbox(
        &self,
        integration: &GmailIntegration,
        access_token: &str,
    ) -> Vec<ScanOutcome> {
        let refs = match self.gmail.list_messages(access_token, RECENT_INBOX_QUERY, RECENT_INBOX_LIMIT).await {
            Ok(refs) => refs,
            Err(e) => {
                return vec![ScanOutcome::new(
                    METHOD_RECENT_INBOX,
                    None,
                    false,
                    format!("inbox scan failed: {}", e),
                )];
            }
        };

        let scanned = refs.len();
        let mut outcomes = Vec::new();
        for message_ref in refs {
            let detail = match self.gmail.get_message(access_token, &message_ref.id).await {
                Ok(detail) => detail,
                Err(e) => {
                    outcomes.push(ScanOutcome::new(
                        METHOD_RECENT_INBOX,
                        None,
                        false,
                        format!("message {} fetch failed: {}", message_ref.id, e),
                    ));
                    continue;
                }
            };
            match self.matcher.match_thread_reply(integration, &detail) {
                Ok(result) if result.matched => {
                    outcomes.push(ScanOutcome::new(
                        METHOD_RECENT_INBOX,
                        result.campaign_id,
                        true,
                        format!("thread {} matched a pending campaign", detail.thread_id),
                    ));
                }
                Ok(_) => {}
                Err(e) => {
                    outcomes.push(ScanOutcome::new(
                        METHOD_RECENT_INBOX,
                        None,
                        false,
                        format!("matching failed: {}", e),
                    ));
                }
            }
        }

        if outcomes.is_empty() {
            outcomes.push(ScanOutcome::new(
                METHOD_RECENT_INBOX,
                None,
                false,
                format!("no campaign replies among {} recent messages", scanned),
            ));
        }
        outcomes
    }

    // Strategy 3: campaigns with no thread id are searched for by the job
    // listing's company name in the subject line
    async fn match_by_subject(
        &self,
        integration: &GmailIntegration,
        access_token: &str,
        candidates: &[Campaign],
    ) -> Vec<ScanOutcome> {
        let mut outcomes = Vec::new();
        for campaign in candidates {
            if campaign.thread_id.is_some() {
                continue;
            }

            // An earlier strategy may already have recorded this campaign
            let fresh = match self.campaigns.find_by_id(campaign.id) {
                Ok(Some(fresh)) if fresh.reply_status != "replied" => fresh,
                Ok(_) => continue,
                Err(e) => {
                    outcomes.push(ScanOutcome::new(
                        METHOD_SUBJECT,
                        Some(campaign.id),
                        false,
                        format!("campaign reload failed: {}", e),
                    ));
                    continue;
                }
            };

            let listing = match self.clients.find_job_listing(fresh.job_listing_id) {
                Ok(Some(listing)) => listing,
                Ok(None) => {
                    outcomes.push(ScanOutcome::new(
                        METHOD_SUBJECT,
                        Some(fresh.id),
                        false,
                        "job listing missing",
                    ));
                    continue;
                }
                Err(e) => {
                    outcomes.push(ScanOutcome::new(
                        METHOD_SUBJECT,
                        Some(fresh.id),
                        false,
                        format!("job listing lookup failed: {}", e),
                    ));
                    continue;
                }
            };

            let mut query = format!("subject:\"{}\"", listing.company_name);
            if let Some(sent_at) = fresh.sent_at {
                let after = chrono::DateTime::from_timestamp(i64::from(sent_at), 0)
                    .map(|dt| dt.format("%Y/%m/%d").to_string());
                if let Some(after) = after {
                    query.push_str(&format!(" after:{}", after));
                }
            }

            let refs = match self.gmail.list_messages(access_token, &query, SUBJECT_SEARCH_LIMIT).await {
                Ok(refs) => refs,
                Err(e) => {
                    outcomes.push(ScanOutcome::new(
                        METHOD_SUBJECT,
                        Some(fresh.id),
                        false,
                        format!("subject search failed: {}", e),
                    ));
                    continue;
                }
            };

            let mut found = false;
            for message_ref in refs {
                let detail = match self.gmail.get_message(access_token, &message_ref.id).await {
                    Ok(detail) => detail,
                    Err(e) => {
                        tracing::warn!("Failed to fetch subject match {}: {}", message_ref.id, e);
                        continue;
                    }
                };
                let sender = match CampaignMatcher::sender_address(&detail) {
                    Some(sender) => sender,
                    None => continue,
                };
                if CampaignMatcher::is_self_sent(integration, &sender) {
                    continue;
                }
                if CampaignMatcher::predates_campaign(&fresh, &detail) {
                    continue;
                }

                // First non-self match wins; the thread id is backfilled so
                // later notifications match directly
                let recorded = self.campaigns
                    .set_thread_id(fresh.id, &detail.thread_id)
                    .and_then(|_| self.matcher.record_reply(&fresh, &detail, &sender));
                match recorded {
                    Ok(()) => {
                        outcomes.push(ScanOutcome::new(
                            METHOD_SUBJECT,
                            Some(fresh.id),
                            true,
                            format!("subject matched company '{}'", listing.company_name),
                        ));
                        found = true;
                    }
                    Err(e) => {
                        outcomes.push(ScanOutcome::new(
                            METHOD_SUBJECT,
                            Some(fresh.id),
                            false,
                            format!("failed to record reply: {}", e),
                        ));
                    }
                }
                break;
            }

            if !found && outcomes.last().map(|o| o.campaign_id != Some(fresh.id)).unwrap_or(true) {
                outcomes.push(ScanOutcome::new(
                    METHOD_SUBJECT,
                    Some(fresh.id),
                    false,
                    "no subject match",
                ));
            }
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmail::client::{MessageRef, MockGmailApi};
    use crate::repositories::campaign_repository::CampaignRepository;
    use crate::test_support::{
        inbound_message, seed_campaign, seed_gmail_integration, seed_job_listing, test_oauth_client,
        test_pool,
    };

    const SENT_AT: i32 = 1_700_000_000;

    fn scanner_with(pool: &crate::DbPool, gmail: MockGmailApi) -> FallbackScanner {
        let integrations = Arc::new(crate::repositories::integration_repository::IntegrationRepository::new(pool.clone()));
        let campaigns = Arc::new(CampaignRepository::new(pool.clone()));
        let clients = Arc::new(ClientRepository::new(pool.clone()));
        let matcher = Arc::new(CampaignMatcher::new(campaigns.clone()));
        let tokens = Arc::new(TokenRefresher::new(integrations, test_oauth_client()));
        FallbackScanner::new(campaigns, clients, matcher, tokens, gmail_arc(gmail))
    }

    fn gmail_arc(gmail: MockGmailApi) -> Arc<dyn GmailApi> {
        Arc::new(gmail)
    }

    // A campaign only findable through the subject heuristic yields exactly
    // one reply_found outcome, attributed to it
    #[tokio::test]
    async fn subject_only_campaign_is_found_once() {
        let pool = test_pool();
        let now = chrono::Utc::now().timestamp();
        let integration = seed_gmail_integration(&pool, 1, "recruiter@agency.com", (now + 86_400) as i32);
        let listing = seed_job_listing(&pool, 1, "Acme Corp");
        let campaign = seed_campaign(&pool, listing.id, integration.id, "candidate@example.com", None, Some(SENT_AT));

        let mut gmail = MockGmailApi::new();
        // Strategy 2 sees an empty inbox; strategy 3's subject search hits
        gmail.expect_list_messages().returning(|_, query, _| {
            if query.starts_with("in:inbox") {
                Ok(vec![])
            } else {
                assert!(query.contains("subject:\"Acme Corp\""));
                Ok(vec![MessageRef { id: "m1".to_string(), thread_id: "T-new".to_string() }])
            }
        });
        gmail.expect_get_message().returning(|_, _| {
            Ok(inbound_message("m1", "T-new", "Candidate <candidate@example.com>", SENT_AT as i64 + 600, "Saw your note about Acme"))
        });

        let scanner = scanner_with(&pool, gmail);
        let outcomes = scanner.scan(&integration, None).await.expect("scan");

        let found: Vec<_> = outcomes.iter().filter(|o| o.reply_found).collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].method, METHOD_SUBJECT);
        assert_eq!(found[0].campaign_id, Some(campaign.id));

        let campaigns = CampaignRepository::new(pool);
        let updated = campaigns.find_by_id(campaign.id).unwrap().unwrap();
        assert_eq!(updated.reply_status, "replied");
        assert_eq!(updated.thread_id.as_deref(), Some("T-new"));
    }

    #[tokio::test]
    async fn thread_recheck_records_newest_external_message() {
        let pool = test_pool();
        let now = chrono::Utc::now().timestamp();
        let integration = seed_gmail_integration(&pool, 1, "recruiter@agency.com", (now + 86_400) as i32);
        let listing = seed_job_listing(&pool, 1, "Acme Corp");
        let campaign = seed_campaign(&pool, listing.id, integration.id, "candidate@example.com", Some("T1"), Some(SENT_AT));

        let mut gmail = MockGmailApi::new();
        gmail.expect_get_thread().times(1).returning(|_, _| {
            Ok(crate::gmail::client::ThreadDetail {
                id: "T1".to_string(),
                messages: vec![
                    inbound_message("m0", "T1", "Me <recruiter@agency.com>", SENT_AT as i64, "original outreach"),
                    inbound_message("m1", "T1", "Candidate <candidate@example.com>", SENT_AT as i64 + 900, "Happy to connect"),
                ],
            })
        });
        gmail.expect_list_messages().returning(|_, _, _| Ok(vec![]));

        let scanner = scanner_with(&pool, gmail);
        let outcomes = scanner.scan(&integration, Some(campaign.id)).await.expect("scan");

        let found: Vec<_> = outcomes.iter().filter(|o| o.reply_found).collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].method, METHOD_THREAD_RECHECK);

        let campaigns = CampaignRepository::new(pool);
        let updated = campaigns.find_by_id(campaign.id).unwrap().unwrap();
        assert_eq!(updated.reply_content.as_deref(), Some("Happy to connect"));
    }

    #[tokio::test]
    async fn self_sent_newest_message_is_not_a_reply() {
        let pool = test_pool();
        let now = chrono::Utc::now().timestamp();
        let integration = seed_gmail_integration(&pool, 1, "recruiter@agency.com", (now + 86_400) as i32);
        let listing = seed_job_listing(&pool, 1, "Acme Corp");
        let campaign = seed_campaign(&pool, listing.id, integration.id, "candidate@example.com", Some("T1"), Some(SENT_AT));

        let mut gmail = MockGmailApi::new();
        gmail.expect_get_thread().times(1).returning(|_, _| {
            Ok(crate::gmail::client::ThreadDetail {
                id: "T1".to_string(),
                messages: vec![
                    inbound_message("m0", "T1", "Me <recruiter@agency.com>", SENT_AT as i64 + 60, "follow-up nudge"),
                ],
            })
        });
        gmail.expect_list_messages().returning(|_, _, _| Ok(vec![]));

        let scanner = scanner_with(&pool, gmail);
        let outcomes = scanner.scan(&integration, Some(campaign.id)).await.expect("scan");
        assert!(outcomes.iter().all(|o| !o.reply_found));

        let campaigns = CampaignRepository::new(pool);
        let unchanged = campaigns.find_by_id(campaign.id).unwrap().unwrap();
        assert_eq!(unchanged.reply_status, "pending");
    }

    // One strategy failing must not silence the others
    #[tokio::test]
    async fn strategy_failures_are_isolated() {
        let pool = test_pool();
        let now = chrono::Utc::now().timestamp();
        let integration = seed_gmail_integration(&pool, 1, "recruiter@agency.com", (now + 86_400) as i32);
        let listing = seed_job_listing(&pool, 1, "Acme Corp");
        seed_campaign(&pool, listing.id, integration.id, "candidate@example.com", Some("T1"), Some(SENT_AT));

        let mut gmail = MockGmailApi::new();
        gmail.expect_get_thread()
            .returning(|_, _| Err(GmailError::ApiError("thread gone".to_string())));
        gmail.expect_list_messages().returning(|_, _, _| Ok(vec![]));

        let scanner = scanner_with(&pool, gmail);
        let outcomes = scanner.scan(&integration, None).await.expect("scan");

        // Thread recheck reported its failure and the inbox sweep still ran
        assert!(outcomes.iter().any(|o| o.method == METHOD_THREAD_RECHECK && o.reason.contains("thread gone")));
        assert!(outcomes.iter().any(|o| o.method == METHOD_RECENT_INBOX));
    }
}
