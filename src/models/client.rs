use crate::error::AppError;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

/// A coached person. Photos are owned by the client's uuid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Client {
    pub id: Option<i64>,
    pub uuid: String,
    pub name: String,
}

impl Client {
    /// Create a new client with a generated uuid
    pub fn new(name: String) -> Self {
        Self {
            id: None,
            uuid: uuid::Uuid::new_v4().to_string(),
            name,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("Name must not be empty".to_string()));
        }

        if self.name.len() > 100 {
            return Err(AppError::Validation(
                "Name must be at most 100 characters".to_string(),
            ));
        }

        Ok(())
    }
}

impl<'r> TryFrom<&Row<'r>> for Client {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'r>) -> Result<Self, Self::Error> {
        Ok(Client {
            id: Some(row.get(0)?),
            uuid: row.get(1)?,
            name: row.get(2)?,
        })
    }
}
