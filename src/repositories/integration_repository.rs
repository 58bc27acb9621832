use diesel::prelude::*;
use diesel::result::Error as DieselError;
use crate::{
    models::integration_models::{
        GmailIntegration, NewGmailIntegration,
        DriveIntegration, NewDriveIntegration,
        GmailWatch, NewGmailWatch,
        NewGmailNotificationHistory,
    },
    schema::{gmail_integrations, drive_integrations, gmail_watches, gmail_notification_history},
    DbPool,
};

pub struct IntegrationRepository {
    pool: DbPool
}

impl IntegrationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    // Reconnecting replaces the previous connection: prior active rows for the
    // user are deactivated in the same transaction as the insert
    pub fn create_gmail_integration(&self, new_integration: NewGmailIntegration) -> Result<GmailIntegration, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        conn.transaction(|conn| {
            diesel::update(
                gmail_integrations::table
                    .filter(gmail_integrations::user_id.eq(new_integration.user_id))
                    .filter(gmail_integrations::active.eq(true)),
            )
            .set(gmail_integrations::active.eq(false))
            .execute(conn)?;
            diesel::insert_into(gmail_integrations::table)
                .values(&new_integration)
                .execute(conn)?;
            gmail_integrations::table
                .order(gmail_integrations::id.desc())
                .first::<GmailIntegration>(conn)
        })
    }

    pub fn find_gmail_by_id(&self, integration_id: i32) -> Result<Option<GmailIntegration>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        gmail_integrations::table
            .find(integration_id)
            .first::<GmailIntegration>(&mut conn)
            .optional()
    }

    pub fn active_gmail_for_user(&self, user_id: i32) -> Result<Option<GmailIntegration>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        gmail_integrations::table
            .filter(gmail_integrations::user_id.eq(user_id))
            .filter(gmail_integrations::active.eq(true))
            .first::<GmailIntegration>(&mut conn)
            .optional()
    }

    // Webhook notifications carry only the mailbox address
    pub fn find_active_gmail_by_email(&self, email_address: &str) -> Result<Option<GmailIntegration>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        gmail_integrations::table
            .filter(gmail_integrations::email_address.eq(email_address))
            .filter(gmail_integrations::active.eq(true))
            .first::<GmailIntegration>(&mut conn)
            .optional()
    }

    pub fn list_active_gmail_integrations(&self) -> Result<Vec<GmailIntegration>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        gmail_integrations::table
            .filter(gmail_integrations::active.eq(true))
            .load::<GmailIntegration>(&mut conn)
    }

    pub fn gmail_integrations_for_user(&self, user_id: i32) -> Result<Vec<GmailIntegration>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        gmail_integrations::table
            .filter(gmail_integrations::user_id.eq(user_id))
            .order(gmail_integrations::created_at.desc())
            .load::<GmailIntegration>(&mut conn)
    }

    pub fn update_gmail_access_token(
        &self,
        integration_id: i32,
        encrypted_access_token: &str,
        token_expires_at: i32,
    ) -> Result<(), DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::update(gmail_integrations::table.find(integration_id))
            .set((
                gmail_integrations::access_token.eq(encrypted_access_token),
                gmail_integrations::token_expires_at.eq(token_expires_at),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    // Integrations are deactivated, never deleted
    pub fn deactivate_gmail_integration(&self, integration_id: i32) -> Result<(), DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::update(gmail_integrations::table.find(integration_id))
            .set(gmail_integrations::active.eq(false))
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn create_drive_integration(&self, new_integration: NewDriveIntegration) -> Result<DriveIntegration, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        conn.transaction(|conn| {
            diesel::update(
                drive_integrations::table
                    .filter(drive_integrations::user_id.eq(new_integration.user_id))
                    .filter(drive_integrations::active.eq(true)),
            )
            .set(drive_integrations::active.eq(false))
            .execute(conn)?;
            diesel::insert_into(drive_integrations::table)
                .values(&new_integration)
                .execute(conn)?;
            drive_integrations::table
                .order(drive_integrations::id.desc())
                .first::<DriveIntegration>(conn)
        })
    }

    pub fn active_drive_for_user(&self, user_id: i32) -> Result<Option<DriveIntegration>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        drive_integrations::table
            .filter(drive_integrations::user_id.eq(user_id))
            .filter(drive_integrations::active.eq(true))
            .first::<DriveIntegration>(&mut conn)
            .optional()
    }

    pub fn deactivate_drive_integration(&self, integration_id: i32) -> Result<(), DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::update(drive_integrations::table.find(integration_id))
            .set(drive_integrations::active.eq(false))
            .execute(&mut conn)?;
        Ok(())
    }

    // One watch row per integration; re-registration overwrites it
    pub fn upsert_watch(&self, new_watch: NewGmailWatch) -> Result<(), DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::insert_into(gmail_watches::table)
            .values(&new_watch)
            .on_conflict(gmail_watches::gmail_integration_id)
            .do_update()
            .set((
                gmail_watches::history_id.eq(new_watch.history_id.clone()),
                gmail_watches::expiration.eq(new_watch.expiration),
                gmail_watches::topic_name.eq(new_watch.topic_name.clone()),
                gmail_watches::active.eq(new_watch.active),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn find_watch(&self, integration_id: i32) -> Result<Option<GmailWatch>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        gmail_watches::table
            .filter(gmail_watches::gmail_integration_id.eq(integration_id))
            .first::<GmailWatch>(&mut conn)
            .optional()
    }

    // Active watches that lapse before the cutoff; the renewal job re-registers these
    pub fn watches_expiring_before(&self, cutoff: i32) -> Result<Vec<GmailWatch>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        gmail_watches::table
            .filter(gmail_watches::active.eq(true))
            .filter(gmail_watches::expiration.lt(cutoff))
            .load::<GmailWatch>(&mut conn)
    }

    pub fn deactivate_watch(&self, integration_id: i32) -> Result<(), DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::update(
            gmail_watches::table.filter(gmail_watches::gmail_integration_id.eq(integration_id)),
        )
        .set(gmail_watches::active.eq(false))
        .execute(&mut conn)?;
        Ok(())
    }

    // Advance the stored cursor after a notification has been processed
    pub fn touch_watch_sync(
        &self,
        integration_id: i32,
        history_id: &str,
        synced_at: i32,
    ) -> Result<(), DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::update(
            gmail_watches::table.filter(gmail_watches::gmail_integration_id.eq(integration_id)),
        )
        .set((
            gmail_watches::history_id.eq(history_id),
            gmail_watches::last_synced_at.eq(synced_at),
        ))
        .execute(&mut conn)?;
        Ok(())
    }

    pub fn notification_seen(&self, integration_id: i32, history_id: &str) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        let count: i64 = gmail_notification_history::table
            .filter(gmail_notification_history::gmail_integration_id.eq(integration_id))
            .filter(gmail_notification_history::history_id.eq(history_id))
            .count()
            .get_result(&mut conn)?;
        Ok(count > 0)
    }

    pub fn record_notification(&self, integration_id: i32, history_id: &str, processed_at: i32) -> Result<(), DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::insert_into(gmail_notification_history::table)
            .values(NewGmailNotificationHistory {
                gmail_integration_id: integration_id,
                history_id: history_id.to_string(),
                processed_at,
            })
            .execute(&mut conn)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_gmail_integration, seed_watch, test_pool};

    // Reconnecting a mailbox leaves exactly one active integration
    #[test]
    fn reconnect_deactivates_prior_integration() {
        let pool = test_pool();
        let first = seed_gmail_integration(&pool, 1, "old@agency.com", 2_000_000_000);
        let second = seed_gmail_integration(&pool, 1, "new@agency.com", 2_000_000_000);

        let repo = IntegrationRepository::new(pool);
        let old = repo.find_gmail_by_id(first.id).unwrap().unwrap();
        assert!(!old.active);

        let active = repo.active_gmail_for_user(1).unwrap().unwrap();
        assert_eq!(active.id, second.id);
        assert_eq!(active.email_address, "new@agency.com");
    }

    #[test]
    fn watch_upsert_overwrites_existing_row() {
        let pool = test_pool();
        let integration = seed_gmail_integration(&pool, 1, "me@agency.com", 2_000_000_000);
        seed_watch(&pool, integration.id, 1_000);
        seed_watch(&pool, integration.id, 2_000);

        let repo = IntegrationRepository::new(pool);
        let watch = repo.find_watch(integration.id).unwrap().unwrap();
        assert_eq!(watch.expiration, 2_000);
    }

    #[test]
    fn notification_ledger_tracks_processed_cursors() {
        let pool = test_pool();
        let integration = seed_gmail_integration(&pool, 1, "me@agency.com", 2_000_000_000);

        let repo = IntegrationRepository::new(pool);
        assert!(!repo.notification_seen(integration.id, "777").unwrap());
        repo.record_notification(integration.id, "777", 1_700_000_000).unwrap();
        assert!(repo.notification_seen(integration.id, "777").unwrap());
        // A different cursor for the same integration is unseen
        assert!(!repo.notification_seen(integration.id, "778").unwrap());
    }

    #[test]
    fn deactivated_integration_is_invisible_to_webhook_lookup() {
        let pool = test_pool();
        let integration = seed_gmail_integration(&pool, 1, "me@agency.com", 2_000_000_000);

        let repo = IntegrationRepository::new(pool);
        assert!(repo.find_active_gmail_by_email("me@agency.com").unwrap().is_some());
        repo.deactivate_gmail_integration(integration.id).unwrap();
        assert!(repo.find_active_gmail_by_email("me@agency.com").unwrap().is_none());
    }
}
