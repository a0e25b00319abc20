// Database models for Diesel
use diesel::prelude::*;
use uuid::Uuid;

/// Insertable struct for new users
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUser<'a> {
    pub id: Uuid,
    pub email: &'a str,
    pub full_name: Option<&'a str>,
    pub is_active: bool,
}

impl<'a> NewUser<'a> {
    /// A fresh, active user with a newly generated id.
    pub fn new(email: &'a str, full_name: Option<&'a str>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            full_name,
            is_active: true,
        }
    }
}
