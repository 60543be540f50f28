use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database request for persisting a new ticket
#[derive(Debug, Clone)]
pub struct TicketCreateDBRequest {
    pub id: String,
    pub value: Vec<u8>,
    pub last_activity: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

/// Database request for replacing a live ticket's payload. Rows whose `expires` is not after
/// `now` are treated as gone and left untouched.
#[derive(Debug, Clone)]
pub struct TicketUpdateDBRequest {
    pub value: Vec<u8>,
    pub last_activity: DateTime<Utc>,
    pub expires: DateTime<Utc>,
    pub now: DateTime<Utc>,
}

/// Database response for a ticket row
#[derive(Debug, Clone, FromRow)]
pub struct TicketDBResponse {
    pub id: String,
    pub value: Vec<u8>,
    pub last_activity: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}
