//! Liane conversations: one append-only message ledger per group, with
//! per-membership read markers.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use liane_db::{Database, fmt_ts, models::MessageRow, queries};
use liane_types::api::{Cursor, Paginated, Pagination};
use liane_types::models::{LianeMessage, MessageContent};

use crate::dispatch::Dispatch;
use crate::error::{EngineError, Result};
use crate::request_store::{parse_dt, parse_uuid};

const MAX_PAGE_SIZE: usize = 100;

#[derive(Clone)]
pub struct LianeMessageService {
    db: Arc<Database>,
    dispatch: Arc<dyn Dispatch>,
}

impl LianeMessageService {
    pub fn new(db: Arc<Database>, dispatch: Arc<dyn Dispatch>) -> Self {
        Self { db, dispatch }
    }

    /// One page of the conversation, newest first. Opening the conversation
    /// counts as reading it, so the read marker moves before the page is
    /// assembled.
    pub fn get_messages(
        &self,
        user: Uuid,
        liane_id: Uuid,
        page: &Pagination,
    ) -> Result<Paginated<LianeMessage>> {
        let limit = page.limit.clamp(1, MAX_PAGE_SIZE);
        let cursor = page.decoded_cursor();

        self.db.with_tx(|conn| {
            let member = queries::member_row_for_user(conn, &liane_id.to_string(), &user.to_string())?
                .ok_or(EngineError::Unauthorized)?;
            queries::set_last_read(
                conn,
                &member.liane_request_id,
                &member.liane_id,
                &fmt_ts(Utc::now()),
            )?;

            // Members only see the conversation from the moment they joined;
            // pending members from the moment they asked.
            let floor = member.joined_at.clone().unwrap_or_else(|| member.requested_at.clone());

            let encoded = cursor.map(|c| (fmt_ts(c.created_at), c.id.to_string()));
            let rows = queries::messages_page(
                conn,
                &liane_id.to_string(),
                &floor,
                encoded.as_ref().map(|(ts, id)| (ts.as_str(), id.as_str())),
                limit,
            )?;
            let total = queries::count_messages(conn, &liane_id.to_string(), &floor)?;

            let data = rows.into_iter().map(row_to_message).collect::<Result<Vec<_>>>()?;
            let next_cursor = if data.len() == limit {
                data.last().map(|m| Cursor { created_at: m.created_at, id: m.id }.encode())
            } else {
                None
            };
            Ok(Paginated { page_size: limit, next_cursor, data, total })
        })
    }

    /// Appends a user message. Whitespace-only text is silently dropped,
    /// which the caller sees as `None`.
    pub fn send_message(
        &self,
        user: Uuid,
        liane_id: Uuid,
        text: &str,
    ) -> Result<Option<LianeMessage>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let message = self.db.with_tx(|conn| {
            let member = queries::member_row_for_user(conn, &liane_id.to_string(), &user.to_string())?
                .ok_or(EngineError::Unauthorized)?;
            if member.joined_at.is_none() {
                return Err(EngineError::Unauthorized);
            }
            insert(
                conn,
                liane_id,
                MessageContent::Text { text: text.to_string() },
                user,
                Utc::now(),
            )
        })?;

        self.dispatch.push_message(liane_id, &message);
        Ok(Some(message))
    }

    pub fn mark_as_read(
        &self,
        user: Uuid,
        liane_id: Uuid,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.db.with_tx(|conn| {
            let member = queries::member_row_for_user(conn, &liane_id.to_string(), &user.to_string())?
                .ok_or(EngineError::Unauthorized)?;
            let at = fmt_ts(timestamp.unwrap_or_else(Utc::now));
            queries::set_last_read(conn, &member.liane_request_id, &member.liane_id, &at)?;
            Ok(())
        })
    }

    /// Per-liane unread counters, summed from three sources: join requests
    /// pending on lianes the user roots, the user's own outstanding join
    /// requests, and unread conversation messages from other members.
    pub fn unread_counts(&self, user: Uuid) -> Result<HashMap<Uuid, u32>> {
        self.db.with_conn(|conn| {
            let user_id = user.to_string();
            let mut out: HashMap<Uuid, u32> = HashMap::new();
            for source in [
                queries::owned_pending_counts(conn, &user_id)?,
                queries::sent_pending_counts(conn, &user_id)?,
                queries::unread_message_counts(conn, &user_id)?,
            ] {
                for (liane_id, count) in source {
                    *out.entry(parse_uuid(&liane_id)?).or_default() += count as u32;
                }
            }
            Ok(out)
        })
    }
}

/// Appends a message inside the caller's transaction. Membership orchestration
/// uses this to record transitions in the same commit that performs them.
pub(crate) fn insert(
    conn: &Connection,
    liane_id: Uuid,
    content: MessageContent,
    by: Uuid,
    at: DateTime<Utc>,
) -> Result<LianeMessage> {
    let message = LianeMessage {
        id: Uuid::new_v4(),
        liane_id,
        content,
        created_by: by,
        created_at: at,
    };
    queries::insert_message(
        conn,
        &MessageRow {
            id: message.id.to_string(),
            liane_id: liane_id.to_string(),
            content: serde_json::to_string(&message.content)?,
            created_by: by.to_string(),
            created_at: fmt_ts(at),
        },
    )?;
    Ok(message)
}

pub(crate) fn row_to_message(row: MessageRow) -> Result<LianeMessage> {
    Ok(LianeMessage {
        id: parse_uuid(&row.id)?,
        liane_id: parse_uuid(&row.liane_id)?,
        content: serde_json::from_str(&row.content)?,
        created_by: parse_uuid(&row.created_by)?,
        created_at: parse_dt(&row.created_at)?,
    })
}

// System message templates, in the product's locale.

pub(crate) fn member_requested(pseudo: &str, user: Uuid, liane_request: Uuid) -> MessageContent {
    MessageContent::MemberRequested {
        text: format!("{pseudo} souhaite rejoindre la liane"),
        user,
        liane_request,
    }
}

pub(crate) fn member_added(pseudo: &str, user: Uuid, liane_request: Uuid) -> MessageContent {
    MessageContent::MemberAdded {
        text: format!("{pseudo} a rejoint la liane"),
        user,
        liane_request,
    }
}

pub(crate) fn member_rejected(pseudo: &str, user: Uuid) -> MessageContent {
    MessageContent::MemberRejected {
        text: format!("La demande de {pseudo} a été refusée"),
        user,
    }
}

pub(crate) fn member_left(pseudo: &str, user: Uuid) -> MessageContent {
    MessageContent::MemberLeft {
        text: format!("{pseudo} a quitté la liane"),
        user,
    }
}

pub(crate) fn member_joined_trip(pseudo: &str, user: Uuid, trip: Uuid) -> MessageContent {
    MessageContent::MemberJoinedTrip {
        text: format!("{pseudo} a rejoint le trajet"),
        user,
        trip,
    }
}

pub(crate) fn trip_added(trip: Uuid) -> MessageContent {
    MessageContent::TripAdded {
        text: "Un nouveau trajet a été proposé".to_string(),
        trip,
    }
}
