use diesel::prelude::*;
use diesel::result::Error as DieselError;
use crate::{
    models::campaign_models::{Client, NewClient, JobListing, NewJobListing},
    schema::{clients, job_listings},
    DbPool,
};

pub struct ClientRepository {
    pool: DbPool
}

impl ClientRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn create_client(&self, new_client: NewClient) -> Result<Client, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::insert_into(clients::table)
            .values(&new_client)
            .execute(&mut conn)?;
        clients::table
            .order(clients::id.desc())
            .first::<Client>(&mut conn)
    }

    pub fn clients_for_user(&self, user_id: i32) -> Result<Vec<Client>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        clients::table
            .filter(clients::user_id.eq(user_id))
            .order(clients::created_at.desc())
            .load::<Client>(&mut conn)
    }

    pub fn find_client(&self, client_id: i32) -> Result<Option<Client>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        clients::table
            .find(client_id)
            .first::<Client>(&mut conn)
            .optional()
    }

    pub fn update_client(
        &self,
        client_id: i32,
        name: &str,
        contact_email: &str,
        contact_name: Option<&str>,
        notes: Option<&str>,
    ) -> Result<(), DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::update(clients::table.find(client_id))
            .set((
                clients::name.eq(name),
                clients::contact_email.eq(contact_email),
                clients::contact_name.eq(contact_name),
                clients::notes.eq(notes),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn delete_client(&self, client_id: i32) -> Result<(), DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::delete(job_listings::table.filter(job_listings::client_id.eq(client_id)))
            .execute(&mut conn)?;
        diesel::delete(clients::table.find(client_id))
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn create_job_listing(&self, new_listing: NewJobListing) -> Result<JobListing, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::insert_into(job_listings::table)
            .values(&new_listing)
            .execute(&mut conn)?;
        job_listings::table
            .order(job_listings::id.desc())
            .first::<JobListing>(&mut conn)
    }

    pub fn job_listings_for_client(&self, client_id: i32) -> Result<Vec<JobListing>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        job_listings::table
            .filter(job_listings::client_id.eq(client_id))
            .order(job_listings::created_at.desc())
            .load::<JobListing>(&mut conn)
    }

    // Listings across all of a user's clients
    pub fn job_listings_for_user(&self, user_id: i32) -> Result<Vec<JobListing>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        job_listings::table
            .inner_join(clients::table)
            .filter(clients::user_id.eq(user_id))
            .select(JobListing::as_select())
            .order(job_listings::created_at.desc())
            .load::<JobListing>(&mut conn)
    }

    pub fn find_job_listing(&self, listing_id: i32) -> Result<Option<JobListing>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        job_listings::table
            .find(listing_id)
            .first::<JobListing>(&mut conn)
            .optional()
    }

    pub fn update_job_listing(
        &self,
        listing_id: i32,
        title: &str,
        company_name: &str,
        location: Option<&str>,
        description: Option<&str>,
        status: &str,
    ) -> Result<(), DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::update(job_listings::table.find(listing_id))
            .set((
                job_listings::title.eq(title),
                job_listings::company_name.eq(company_name),
                job_listings::location.eq(location),
                job_listings::description.eq(description),
                job_listings::status.eq(status),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn delete_job_listing(&self, listing_id: i32) -> Result<(), DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::delete(job_listings::table.find(listing_id))
            .execute(&mut conn)?;
        Ok(())
    }
}
