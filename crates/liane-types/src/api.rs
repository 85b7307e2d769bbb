use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::WeekDays;

// -- JWT Claims --

/// JWT claims shared across liane-api (REST middleware) and liane-gateway
/// (WebSocket authentication). Canonical definition lives here in liane-types
/// to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub pseudo: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub pseudo: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub pseudo: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub pseudo: String,
    pub token: String,
}

// -- Liane requests --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateLianeRequest {
    pub id: Option<Uuid>,
    pub name: String,
    pub way_points: Vec<Uuid>,
    pub round_trip: bool,
    pub arrive_before: NaiveTime,
    pub return_after: NaiveTime,
    pub can_drive: bool,
    pub week_days: WeekDays,
}

/// Post-creation mutation surface. Waypoint or time changes require a new
/// request, so only these three fields are patchable.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateLianeRequest {
    pub name: Option<String>,
    pub is_enabled: Option<bool>,
    pub round_trip: Option<bool>,
}

// -- Trips --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateTripRequest {
    pub liane_id: Uuid,
    /// Rallying point ids in travel order.
    pub way_points: Vec<Uuid>,
    pub departure_time: DateTime<Utc>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    pub timestamp: Option<DateTime<Utc>>,
}

// -- Pagination --

/// Cursor over (created_at, id), encoded as "<rfc3339>/<uuid>".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl Cursor {
    pub fn encode(&self) -> String {
        format!("{}/{}", self.created_at.to_rfc3339(), self.id)
    }

    pub fn decode(raw: &str) -> Option<Cursor> {
        let (ts, id) = raw.rsplit_once('/')?;
        Some(Cursor {
            created_at: DateTime::parse_from_rfc3339(ts).ok()?.with_timezone(&Utc),
            id: id.parse().ok()?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pagination {
    pub cursor: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { cursor: None, limit: default_limit() }
    }
}

fn default_limit() -> usize {
    25
}

impl Pagination {
    pub fn decoded_cursor(&self) -> Option<Cursor> {
        self.cursor.as_deref().and_then(Cursor::decode)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub page_size: usize,
    pub next_cursor: Option<String>,
    pub data: Vec<T>,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_round_trip() {
        let cursor = Cursor { created_at: Utc::now(), id: Uuid::new_v4() };
        let decoded = Cursor::decode(&cursor.encode()).unwrap();
        assert_eq!(decoded.id, cursor.id);
        assert_eq!(decoded.created_at, cursor.created_at);
    }

    #[test]
    fn cursor_rejects_garbage() {
        assert!(Cursor::decode("not-a-cursor").is_none());
        assert!(Cursor::decode("2024-01-01T00:00:00Z/not-a-uuid").is_none());
    }
}
