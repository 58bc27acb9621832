use std::sync::Arc;

use diesel::result::Error as DieselError;

use crate::{
    gmail::client::MessageDetail,
    gmail::extract,
    models::campaign_models::Campaign,
    models::integration_models::GmailIntegration,
    repositories::campaign_repository::CampaignRepository,
};

#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    pub campaign_id: Option<i32>,
}

impl MatchResult {
    fn matched(campaign_id: i32) -> Self {
        Self { matched: true, campaign_id: Some(campaign_id) }
    }

    fn no_match() -> Self {
        Self { matched: false, campaign_id: None }
    }
}

/// Decides whether an inbound message is a reply to a known campaign and
/// records it. Both the push-notification path and the fallback scanner go
/// through this component so the matching rules exist exactly once.
pub struct CampaignMatcher {
    campaigns: Arc<CampaignRepository>,
}

impl CampaignMatcher {
    pub fn new(campaigns: Arc<CampaignRepository>) -> Self {
        Self { campaigns }
    }

    /// Bare address from a From header, e.g. "Jane <jane@x.com>" -> jane@x.com
    pub fn sender_address(message: &MessageDetail) -> Option<String> {
        let from = message.header("from")?;
        if let Some(start) = from.find('<') {
            if let Some(end) = from.find('>') {
                if end > start {
                    return Some(from[start + 1..end].trim().to_lowercase());
                }
            }
        }
        let trimmed = from.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_lowercase())
        }
    }

    /// Echoes of our own outbound mail show up in history; anything sent from
    /// the integration's own mailbox is never a reply.
    pub fn is_self_sent(integration: &GmailIntegration, sender: &str) -> bool {
        sender
            .to_lowercase()
            .contains(&integration.email_address.to_lowercase())
    }

    /// A message dated at or before the campaign's send time predates it.
    pub fn predates_campaign(campaign: &Campaign, message: &MessageDetail) -> bool {
        match campaign.sent_at {
            Some(sent_at) => message.internal_date.timestamp() <= i64::from(sent_at),
            None => false,
        }
    }

    /// Full matching precedence: thread identity first, sender fallback second.
    pub fn match_and_record_reply(
        &self,
        integration: &GmailIntegration,
        message: &MessageDetail,
    ) -> Result<MatchResult, DieselError> {
        let sender = match Self::sender_address(message) {
            Some(sender) => sender,
            None => {
                tracing::debug!("Message {} has no usable From header, skipping", message.id);
                return Ok(MatchResult::no_match());
            }
        };

        if Self::is_self_sent(integration, &sender) {
            tracing::debug!("Message {} is self-sent by {}, skipping", message.id, sender);
            return Ok(MatchResult::no_match());
        }

        if let Some(campaign) = self.campaigns.find_by_thread(integration.id, &message.thread_id)? {
            if Self::predates_campaign(&campaign, message) {
                tracing::debug!(
                    "Message {} predates campaign {} send time, skipping",
                    message.id,
                    campaign.id
                );
                return Ok(MatchResult::no_match());
            }
            if campaign.reply_status == "replied" {
                tracing::debug!("Campaign {} already has a recorded reply", campaign.id);
                return Ok(MatchResult::no_match());
            }
            self.record_reply(&campaign, message, &sender)?;
            return Ok(MatchResult::matched(campaign.id));
        }

        // No thread match: fall back to the most recent still-pending campaign
        // addressed to this sender
        if let Some(campaign) = self.campaigns.find_latest_pending_for_sender(integration.id, &sender)? {
            tracing::info!(
                "Message {} matched campaign {} by sender address {}",
                message.id,
                campaign.id,
                sender
            );
            self.record_reply(&campaign, message, &sender)?;
            return Ok(MatchResult::matched(campaign.id));
        }

        Ok(MatchResult::no_match())
    }

    /// Thread-identity-only variant used by the fallback inbox sweep.
    pub fn match_thread_reply(
        &self,
        integration: &GmailIntegration,
        message: &MessageDetail,
    ) -> Result<MatchResult, DieselError> {
        let sender = match Self::sender_address(message) {
            Some(sender) => sender,
            None => return Ok(MatchResult::no_match()),
        };
        if Self::is_self_sent(integration, &sender) {
            return Ok(MatchResult::no_match());
        }

        let campaign = match self.campaigns.find_by_thread(integration.id, &message.thread_id)? {
            Some(campaign) => campaign,
            None => return Ok(MatchResult::no_match()),
        };
        if campaign.reply_status == "replied" || Self::predates_campaign(&campaign, message) {
            return Ok(MatchResult::no_match());
        }

        self.record_reply(&campaign, message, &sender)?;
        Ok(MatchResult::matched(campaign.id))
    }

    /// Records an observed reply on the campaign row.
    pub fn record_reply(
        &self,
        campaign: &Campaign,
        message: &MessageDetail,
        sender: &str,
    ) -> Result<(), DieselError> {
        let content = extract::extract_reply_text(&message.payload);
        self.campaigns.mark_replied(
            campaign.id,
            message.internal_date.timestamp() as i32,
            sender,
            &content,
            &message.id,
        )?;
        tracing::info!(
            "Recorded reply to campaign {} from {} (message {})",
            campaign.id,
            sender,
            message.id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::campaign_repository::CampaignRepository;
    use crate::test_support::{
        inbound_message, seed_campaign, seed_gmail_integration, seed_job_listing, test_pool,
    };

    const SENT_AT: i32 = 1_700_000_000;

    fn setup() -> (crate::DbPool, CampaignMatcher, GmailIntegration, Campaign) {
        let pool = test_pool();
        let integration = seed_gmail_integration(&pool, 1, "recruiter@agency.com", SENT_AT + 86_400);
        let listing = seed_job_listing(&pool, 1, "Acme Corp");
        let campaign = seed_campaign(
            &pool,
            listing.id,
            integration.id,
            "candidate@example.com",
            Some("T1"),
            Some(SENT_AT),
        );
        let matcher = CampaignMatcher::new(Arc::new(CampaignRepository::new(pool.clone())));
        (pool, matcher, integration, campaign)
    }

    #[test]
    fn thread_match_records_reply() {
        let (pool, matcher, integration, campaign) = setup();
        let message = inbound_message("m1", "T1", "Candidate <candidate@example.com>", SENT_AT as i64 + 600, "Sounds great, let's talk!");

        let result = matcher.match_and_record_reply(&integration, &message).expect("match");
        assert!(result.matched);
        assert_eq!(result.campaign_id, Some(campaign.id));

        let campaigns = CampaignRepository::new(pool);
        let updated = campaigns.find_by_id(campaign.id).unwrap().unwrap();
        assert_eq!(updated.reply_status, "replied");
        assert_eq!(updated.status, "replied");
        assert_eq!(updated.reply_sender.as_deref(), Some("candidate@example.com"));
        assert_eq!(updated.reply_message_id.as_deref(), Some("m1"));
        assert_eq!(updated.reply_content.as_deref(), Some("Sounds great, let's talk!"));
    }

    #[test]
    fn self_sent_message_never_matches() {
        let (pool, matcher, integration, campaign) = setup();
        // Thread id matches, but the sender is the integration's own mailbox
        let message = inbound_message("m2", "T1", "Me <recruiter@agency.com>", SENT_AT as i64 + 600, "echo of outbound");

        let result = matcher.match_and_record_reply(&integration, &message).expect("match");
        assert!(!result.matched);

        let campaigns = CampaignRepository::new(pool);
        let unchanged = campaigns.find_by_id(campaign.id).unwrap().unwrap();
        assert_eq!(unchanged.reply_status, "pending");
    }

    #[test]
    fn message_predating_send_is_rejected() {
        let (pool, matcher, integration, campaign) = setup();
        let message = inbound_message("m3", "T1", "Candidate <candidate@example.com>", SENT_AT as i64, "old message");

        let result = matcher.match_and_record_reply(&integration, &message).expect("match");
        assert!(!result.matched);

        let campaigns = CampaignRepository::new(pool);
        let unchanged = campaigns.find_by_id(campaign.id).unwrap().unwrap();
        assert_eq!(unchanged.reply_status, "pending");
    }

    #[test]
    fn sender_fallback_matches_without_thread() {
        let (pool, matcher, integration, _) = setup();
        let listing = seed_job_listing(&pool, 1, "Beta Inc");
        // Campaign sent without a known thread id
        let threadless = seed_campaign(
            &pool,
            listing.id,
            integration.id,
            "other@example.com",
            None,
            Some(SENT_AT),
        );
        let message = inbound_message("m4", "T-unknown", "Other <other@example.com>", SENT_AT as i64 + 600, "Interested!");

        let result = matcher.match_and_record_reply(&integration, &message).expect("match");
        assert!(result.matched);
        assert_eq!(result.campaign_id, Some(threadless.id));
    }

    #[test]
    fn unrelated_mail_is_a_normal_miss() {
        let (_, matcher, integration, _) = setup();
        let message = inbound_message("m5", "T-other", "Ads <ads@spam.example>", SENT_AT as i64 + 600, "buy stuff");

        let result = matcher.match_and_record_reply(&integration, &message).expect("match");
        assert!(!result.matched);
        assert_eq!(result.campaign_id, None);
    }

    #[test]
    fn second_reply_in_thread_does_not_overwrite_first() {
        let (pool, matcher, integration, campaign) = setup();
        let first = inbound_message("m6", "T1", "Candidate <candidate@example.com>", SENT_AT as i64 + 600, "First reply");
        let second = inbound_message("m7", "T1", "Candidate <candidate@example.com>", SENT_AT as i64 + 1200, "Second reply");

        assert!(matcher.match_and_record_reply(&integration, &first).unwrap().matched);
        assert!(!matcher.match_and_record_reply(&integration, &second).unwrap().matched);

        let campaigns = CampaignRepository::new(pool);
        let updated = campaigns.find_by_id(campaign.id).unwrap().unwrap();
        assert_eq!(updated.reply_message_id.as_deref(), Some("m6"));
        assert_eq!(updated.reply_content.as_deref(), Some("First reply"));
    }
}
