use diesel::prelude::*;
use diesel::result::Error as DieselError;
use crate::{
    models::campaign_models::{Campaign, NewCampaign},
    schema::{campaigns, gmail_integrations},
    DbPool,
};

pub struct CampaignRepository {
    pool: DbPool
}

impl CampaignRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn create_campaign(&self, new_campaign: NewCampaign) -> Result<Campaign, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::insert_into(campaigns::table)
            .values(&new_campaign)
            .execute(&mut conn)?;
        campaigns::table
            .order(campaigns::id.desc())
            .first::<Campaign>(&mut conn)
    }

    pub fn find_by_id(&self, campaign_id: i32) -> Result<Option<Campaign>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        campaigns::table
            .find(campaign_id)
            .first::<Campaign>(&mut conn)
            .optional()
    }

    // Thread-identity lookup used by the matcher's primary path
    pub fn find_by_thread(&self, integration_id: i32, thread_id: &str) -> Result<Option<Campaign>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        campaigns::table
            .filter(campaigns::gmail_integration_id.eq(integration_id))
            .filter(campaigns::thread_id.eq(thread_id))
            .first::<Campaign>(&mut conn)
            .optional()
    }

    // Most recently sent campaign for this integration whose recipient matches
    // the sender and which is still awaiting its first reply
    pub fn find_latest_pending_for_sender(
        &self,
        integration_id: i32,
        sender_email: &str,
    ) -> Result<Option<Campaign>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        campaigns::table
            .filter(campaigns::gmail_integration_id.eq(integration_id))
            .filter(campaigns::recipient_email.eq(sender_email))
            .filter(campaigns::reply_status.eq("pending"))
            .order(campaigns::sent_at.desc())
            .first::<Campaign>(&mut conn)
            .optional()
    }

    // Campaigns that were sent but have not recorded a reply yet
    pub fn awaiting_reply_for_integration(&self, integration_id: i32) -> Result<Vec<Campaign>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        campaigns::table
            .filter(campaigns::gmail_integration_id.eq(integration_id))
            .filter(campaigns::status.eq("sent"))
            .filter(campaigns::reply_status.eq_any(vec!["pending", "sent"]))
            .order(campaigns::sent_at.desc())
            .load::<Campaign>(&mut conn)
    }

    pub fn campaigns_for_user(&self, user_id: i32) -> Result<Vec<Campaign>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        campaigns::table
            .inner_join(gmail_integrations::table)
            .filter(gmail_integrations::user_id.eq(user_id))
            .select(Campaign::as_select())
            .order(campaigns::created_at.desc())
            .load::<Campaign>(&mut conn)
    }

    pub fn campaigns_for_job_listing(&self, listing_id: i32) -> Result<Vec<Campaign>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        campaigns::table
            .filter(campaigns::job_listing_id.eq(listing_id))
            .order(campaigns::created_at.desc())
            .load::<Campaign>(&mut conn)
    }

    // Single update that records an observed reply; the notification ledger
    // keeps this from running twice for the same history cursor
    pub fn mark_replied(
        &self,
        campaign_id: i32,
        replied_at: i32,
        reply_sender: &str,
        reply_content: &str,
        reply_message_id: &str,
    ) -> Result<(), DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::update(campaigns::table.find(campaign_id))
            .set((
                campaigns::status.eq("replied"),
                campaigns::reply_status.eq("replied"),
                campaigns::replied_at.eq(replied_at),
                campaigns::reply_sender.eq(reply_sender),
                campaigns::reply_content.eq(reply_content),
                campaigns::reply_message_id.eq(reply_message_id),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    // Backfill the provider thread id once the subject heuristic pins one down
    pub fn set_thread_id(&self, campaign_id: i32, thread_id: &str) -> Result<(), DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::update(campaigns::table.find(campaign_id))
            .set(campaigns::thread_id.eq(thread_id))
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn set_status(&self, campaign_id: i32, status: &str) -> Result<(), DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::update(campaigns::table.find(campaign_id))
            .set(campaigns::status.eq(status))
            .execute(&mut conn)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_campaign, seed_gmail_integration, seed_job_listing, test_pool};

    #[test]
    fn sender_fallback_prefers_most_recent_pending_campaign() {
        let pool = test_pool();
        let integration = seed_gmail_integration(&pool, 1, "me@agency.com", 2_000_000_000);
        let listing = seed_job_listing(&pool, 1, "Acme Corp");
        seed_campaign(&pool, listing.id, integration.id, "jane@example.com", None, Some(1_700_000_000));
        let newer = seed_campaign(&pool, listing.id, integration.id, "jane@example.com", None, Some(1_700_050_000));

        let repo = CampaignRepository::new(pool);
        let found = repo
            .find_latest_pending_for_sender(integration.id, "jane@example.com")
            .unwrap()
            .unwrap();
        assert_eq!(found.id, newer.id);
    }

    #[test]
    fn replied_campaigns_leave_the_awaiting_set() {
        let pool = test_pool();
        let integration = seed_gmail_integration(&pool, 1, "me@agency.com", 2_000_000_000);
        let listing = seed_job_listing(&pool, 1, "Acme Corp");
        let campaign = seed_campaign(&pool, listing.id, integration.id, "jane@example.com", Some("T1"), Some(1_700_000_000));

        let repo = CampaignRepository::new(pool);
        assert_eq!(repo.awaiting_reply_for_integration(integration.id).unwrap().len(), 1);

        repo.mark_replied(campaign.id, 1_700_000_600, "jane@example.com", "Sounds good", "m1").unwrap();
        assert!(repo.awaiting_reply_for_integration(integration.id).unwrap().is_empty());
        assert!(repo.find_latest_pending_for_sender(integration.id, "jane@example.com").unwrap().is_none());
    }
}
