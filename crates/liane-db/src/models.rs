//! Database row types — these map directly to SQLite rows.
//! Distinct from the liane-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub pseudo: String,
    pub password: String,
    pub created_at: String,
}

pub struct RallyingPointRow {
    pub id: String,
    pub label: String,
    pub lat: f64,
    pub lng: f64,
}

pub struct LianeRequestRow {
    pub id: String,
    pub name: String,
    /// JSON array of rallying point ids, also the routes-cache key.
    pub way_points: String,
    pub round_trip: bool,
    pub arrive_before: String,
    pub return_after: String,
    pub can_drive: bool,
    pub week_days: u8,
    pub is_enabled: bool,
    pub created_by: String,
    pub created_at: String,
}

pub struct MemberRow {
    pub liane_request_id: String,
    pub liane_id: String,
    pub requested_at: String,
    pub joined_at: Option<String>,
    pub last_read_at: Option<String>,
}

pub struct MessageRow {
    pub id: String,
    pub liane_id: String,
    /// JSON-encoded MessageContent.
    pub content: String,
    pub created_by: String,
    pub created_at: String,
}

pub struct RouteRow {
    pub way_points: String,
    /// JSON array of [lat, lng] pairs.
    pub geometry: String,
    pub distance: f64,
    pub duration: f64,
}

pub struct TripRow {
    pub id: String,
    pub liane_id: String,
    pub driver_id: String,
    pub way_points: String,
    pub departure_time: String,
}
