use diesel::prelude::*;
use diesel::result::Error as DieselError;
use crate::{
    models::campaign_models::{EmailTemplate, NewEmailTemplate},
    schema::email_templates,
    DbPool,
};

pub struct TemplateRepository {
    pool: DbPool
}

impl TemplateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn create_template(&self, new_template: NewEmailTemplate) -> Result<EmailTemplate, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::insert_into(email_templates::table)
            .values(&new_template)
            .execute(&mut conn)?;
        email_templates::table
            .order(email_templates::id.desc())
            .first::<EmailTemplate>(&mut conn)
    }

    pub fn templates_for_user(&self, user_id: i32) -> Result<Vec<EmailTemplate>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        email_templates::table
            .filter(email_templates::user_id.eq(user_id))
            .order(email_templates::updated_at.desc())
            .load::<EmailTemplate>(&mut conn)
    }

    pub fn find_template(&self, template_id: i32) -> Result<Option<EmailTemplate>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        email_templates::table
            .find(template_id)
            .first::<EmailTemplate>(&mut conn)
            .optional()
    }

    pub fn update_template(
        &self,
        template_id: i32,
        name: &str,
        subject: &str,
        body: &str,
        updated_at: i32,
    ) -> Result<(), DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::update(email_templates::table.find(template_id))
            .set((
                email_templates::name.eq(name),
                email_templates::subject.eq(subject),
                email_templates::body.eq(body),
                email_templates::updated_at.eq(updated_at),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn delete_template(&self, template_id: i32) -> Result<(), DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        diesel::delete(email_templates::table.find(template_id))
            .execute(&mut conn)?;
        Ok(())
    }
}
