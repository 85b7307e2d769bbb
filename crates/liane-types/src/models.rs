use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub pseudo: String,
    pub created_at: DateTime<Utc>,
}

/// A WGS84 coordinate. Stored and compared as plain degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RallyingPoint {
    pub id: Uuid,
    pub label: String,
    pub location: LatLng,
}

/// Days of the week a recurring trip runs on, packed as a Monday-first bitset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekDays(pub u8);

impl WeekDays {
    pub const EMPTY: WeekDays = WeekDays(0);

    pub fn single(day: Weekday) -> Self {
        WeekDays(1 << day.num_days_from_monday())
    }

    pub fn from_days(days: &[Weekday]) -> Self {
        days.iter().fold(Self::EMPTY, |acc, d| acc | Self::single(*d))
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for WeekDays {
    type Output = WeekDays;

    fn bitor(self, rhs: WeekDays) -> WeekDays {
        WeekDays(self.0 | rhs.0)
    }
}

/// One user's standing intent for a recurring carpool trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LianeRequest {
    pub id: Uuid,
    pub name: String,
    /// Ordered rallying points the trip passes through. At least two, distinct.
    pub way_points: Vec<RallyingPoint>,
    pub round_trip: bool,
    pub arrive_before: NaiveTime,
    pub return_after: NaiveTime,
    pub can_drive: bool,
    pub week_days: WeekDays,
    pub is_enabled: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A resolved membership: the join relation between a request and a liane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LianeMember {
    pub user: User,
    pub liane_request: LianeRequest,
    pub requested_at: DateTime<Utc>,
    /// None while the membership is still pending.
    pub joined_at: Option<DateTime<Utc>>,
    pub last_read_at: Option<DateTime<Utc>>,
}

/// A carpool group. Its id is reused from the request that rooted it;
/// there is no separate group-creation step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Liane {
    pub id: Uuid,
    /// Confirmed members, ordered by joined_at.
    pub members: Vec<LianeMember>,
    /// Join requests awaiting a decision, ordered by requested_at.
    pub pending_members: Vec<LianeMember>,
}

impl Liane {
    pub fn member(&self, user: Uuid) -> Option<&LianeMember> {
        self.members.iter().find(|m| m.user.id == user)
    }

    /// Membership check; `include_pending` also accepts a pending row.
    pub fn is_member(&self, user: Uuid, include_pending: bool) -> bool {
        self.member(user).is_some()
            || (include_pending && self.pending_members.iter().any(|m| m.user.id == user))
    }
}

/// A pairwise route overlap with another unattached request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleMatch {
    pub liane_request: Uuid,
    pub user: User,
    pub pickup: RallyingPoint,
    pub deposit: RallyingPoint,
    /// Overlap length divided by the caller's route length, in (0, 1].
    pub score: f64,
}

/// Route overlaps with requests that already share a liane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMatch {
    pub liane: Liane,
    pub matches: Vec<SingleMatch>,
    pub pickup: RallyingPoint,
    pub deposit: RallyingPoint,
    pub score: f64,
}

/// A computed, non-persisted matching candidate for one liane request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Match {
    Single(SingleMatch),
    Group(GroupMatch),
}

impl Match {
    pub fn score(&self) -> f64 {
        match self {
            Match::Single(m) => m.score,
            Match::Group(m) => m.score,
        }
    }

    /// Group size used by the ranking chain: a single counts as 1.
    pub fn group_size(&self) -> usize {
        match self {
            Match::Single(_) => 1,
            Match::Group(m) => m.liane.members.len(),
        }
    }

    /// Lowest underlying request id, the deterministic tie-break.
    pub fn min_request_id(&self) -> Uuid {
        match self {
            Match::Single(m) => m.liane_request,
            Match::Group(m) => m
                .matches
                .iter()
                .map(|s| s.liane_request)
                .min()
                .unwrap_or(m.liane.id),
        }
    }
}

/// Where a liane request stands relative to matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state")]
pub enum LianeState {
    /// Not linked to any liane; carries the ranked candidate matches.
    Detached { matches: Vec<Match> },
    /// Linked through a membership row whose joined_at is still null.
    Pending { liane: Liane },
    /// Linked through a confirmed membership row.
    Attached { liane: Liane },
}

/// One of the current user's requests together with its match state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LianeMatch {
    pub liane_request: LianeRequest,
    pub state: LianeState,
}

/// Structured content of a conversation message. Text is user-authored;
/// every other variant is engine-generated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MessageContent {
    Text { text: String },
    MemberRequested { text: String, user: Uuid, liane_request: Uuid },
    MemberAdded { text: String, user: Uuid, liane_request: Uuid },
    MemberRejected { text: String, user: Uuid },
    MemberLeft { text: String, user: Uuid },
    MemberJoinedTrip { text: String, user: Uuid, trip: Uuid },
    MemberLeftTrip { text: String, user: Uuid, trip: Uuid },
    MemberHasStarted { text: String, trip: Uuid },
    LianeRequestModified { text: String, liane_request: Uuid },
    TripAdded { text: String, trip: Uuid },
}

impl MessageContent {
    pub fn text(&self) -> &str {
        match self {
            MessageContent::Text { text }
            | MessageContent::MemberRequested { text, .. }
            | MessageContent::MemberAdded { text, .. }
            | MessageContent::MemberRejected { text, .. }
            | MessageContent::MemberLeft { text, .. }
            | MessageContent::MemberJoinedTrip { text, .. }
            | MessageContent::MemberLeftTrip { text, .. }
            | MessageContent::MemberHasStarted { text, .. }
            | MessageContent::LianeRequestModified { text, .. }
            | MessageContent::TripAdded { text, .. } => text,
        }
    }

    pub fn with_text(self, value: String) -> Self {
        match self {
            MessageContent::Text { .. } => MessageContent::Text { text: value },
            MessageContent::MemberRequested { user, liane_request, .. } => {
                MessageContent::MemberRequested { text: value, user, liane_request }
            }
            MessageContent::MemberAdded { user, liane_request, .. } => {
                MessageContent::MemberAdded { text: value, user, liane_request }
            }
            MessageContent::MemberRejected { user, .. } => {
                MessageContent::MemberRejected { text: value, user }
            }
            MessageContent::MemberLeft { user, .. } => {
                MessageContent::MemberLeft { text: value, user }
            }
            MessageContent::MemberJoinedTrip { user, trip, .. } => {
                MessageContent::MemberJoinedTrip { text: value, user, trip }
            }
            MessageContent::MemberLeftTrip { user, trip, .. } => {
                MessageContent::MemberLeftTrip { text: value, user, trip }
            }
            MessageContent::MemberHasStarted { trip, .. } => {
                MessageContent::MemberHasStarted { text: value, trip }
            }
            MessageContent::LianeRequestModified { liane_request, .. } => {
                MessageContent::LianeRequestModified { text: value, liane_request }
            }
            MessageContent::TripAdded { trip, .. } => {
                MessageContent::TripAdded { text: value, trip }
            }
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, MessageContent::Text { .. })
    }
}

/// Immutable event in a liane's conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LianeMessage {
    pub id: Uuid,
    pub liane_id: Uuid,
    pub content: MessageContent,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A scheduled trip instance. Only the slice JoinTrip needs: the owning
/// liane, the driver and the ordered waypoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: Uuid,
    pub liane_id: Uuid,
    pub driver: Uuid,
    pub way_points: Vec<Uuid>,
    pub departure_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_days_bitset() {
        let wd = WeekDays::from_days(&[Weekday::Mon, Weekday::Fri]);
        assert!(wd.contains(Weekday::Mon));
        assert!(wd.contains(Weekday::Fri));
        assert!(!wd.contains(Weekday::Sun));
        assert!(!wd.is_empty());
        assert!(WeekDays::EMPTY.is_empty());

        let merged = wd | WeekDays::single(Weekday::Sun);
        assert!(merged.contains(Weekday::Sun));
    }

    #[test]
    fn message_content_text_replacement() {
        let content = MessageContent::MemberLeft { text: String::new(), user: Uuid::new_v4() };
        let content = content.with_text("gone".into());
        assert_eq!(content.text(), "gone");
        assert!(!content.is_text());
    }
}
