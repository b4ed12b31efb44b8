//! Route handlers organized by resource

use serde::{Deserialize, Serialize};

pub mod health;
pub mod pool;
pub mod tasks;
pub mod users;

/// Body of a 201 response: the identifier assigned by the store
#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub id: i64,
}
