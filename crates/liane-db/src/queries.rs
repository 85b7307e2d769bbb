use rusqlite::{Connection, OptionalExtension, Result, params, params_from_iter};

use crate::models::{
    LianeRequestRow, MemberRow, MessageRow, RallyingPointRow, RouteRow, TripRow, UserRow,
};

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

// -- Users --

pub fn insert_user(
    conn: &Connection,
    id: &str,
    pseudo: &str,
    password_hash: &str,
    created_at: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO users (id, pseudo, password, created_at) VALUES (?1, ?2, ?3, ?4)",
        (id, pseudo, password_hash, created_at),
    )?;
    Ok(())
}

fn map_user(row: &rusqlite::Row<'_>) -> Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        pseudo: row.get(1)?,
        password: row.get(2)?,
        created_at: row.get(3)?,
    })
}

pub fn user_by_pseudo(conn: &Connection, pseudo: &str) -> Result<Option<UserRow>> {
    conn.query_row(
        "SELECT id, pseudo, password, created_at FROM users WHERE pseudo = ?1",
        [pseudo],
        map_user,
    )
    .optional()
}

pub fn user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    conn.query_row(
        "SELECT id, pseudo, password, created_at FROM users WHERE id = ?1",
        [id],
        map_user,
    )
    .optional()
}

pub fn users_by_ids(conn: &Connection, ids: &[String]) -> Result<Vec<UserRow>> {
    if ids.is_empty() {
        return Ok(vec![]);
    }
    let sql = format!(
        "SELECT id, pseudo, password, created_at FROM users WHERE id IN ({})",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(ids.iter()), map_user)?;
    rows.collect()
}

// -- Rallying points --

pub fn insert_rallying_point(conn: &Connection, point: &RallyingPointRow) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO rallying_points (id, label, lat, lng) VALUES (?1, ?2, ?3, ?4)",
        params![point.id, point.label, point.lat, point.lng],
    )?;
    Ok(())
}

fn map_rallying_point(row: &rusqlite::Row<'_>) -> Result<RallyingPointRow> {
    Ok(RallyingPointRow {
        id: row.get(0)?,
        label: row.get(1)?,
        lat: row.get(2)?,
        lng: row.get(3)?,
    })
}

pub fn rallying_points_by_ids(conn: &Connection, ids: &[String]) -> Result<Vec<RallyingPointRow>> {
    if ids.is_empty() {
        return Ok(vec![]);
    }
    let sql = format!(
        "SELECT id, label, lat, lng FROM rallying_points WHERE id IN ({})",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(ids.iter()), map_rallying_point)?;
    rows.collect()
}

pub fn all_rallying_points(conn: &Connection) -> Result<Vec<RallyingPointRow>> {
    let mut stmt = conn.prepare("SELECT id, label, lat, lng FROM rallying_points")?;
    let rows = stmt.query_map([], map_rallying_point)?;
    rows.collect()
}

// -- Liane requests --

pub fn insert_liane_request(conn: &Connection, row: &LianeRequestRow) -> Result<()> {
    conn.execute(
        "INSERT INTO liane_requests
            (id, name, way_points, round_trip, arrive_before, return_after,
             can_drive, week_days, is_enabled, created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            row.id,
            row.name,
            row.way_points,
            row.round_trip,
            row.arrive_before,
            row.return_after,
            row.can_drive,
            row.week_days,
            row.is_enabled,
            row.created_by,
            row.created_at
        ],
    )?;
    Ok(())
}

const REQUEST_COLUMNS: &str = "id, name, way_points, round_trip, arrive_before, return_after, \
                               can_drive, week_days, is_enabled, created_by, created_at";

fn map_request(row: &rusqlite::Row<'_>) -> Result<LianeRequestRow> {
    Ok(LianeRequestRow {
        id: row.get(0)?,
        name: row.get(1)?,
        way_points: row.get(2)?,
        round_trip: row.get(3)?,
        arrive_before: row.get(4)?,
        return_after: row.get(5)?,
        can_drive: row.get(6)?,
        week_days: row.get(7)?,
        is_enabled: row.get(8)?,
        created_by: row.get(9)?,
        created_at: row.get(10)?,
    })
}

pub fn liane_request_by_id(conn: &Connection, id: &str) -> Result<Option<LianeRequestRow>> {
    conn.query_row(
        &format!("SELECT {REQUEST_COLUMNS} FROM liane_requests WHERE id = ?1"),
        [id],
        map_request,
    )
    .optional()
}

/// Batch fetch, ordered ascending by id to keep downstream grouping deterministic.
pub fn liane_requests_by_ids(conn: &Connection, ids: &[String]) -> Result<Vec<LianeRequestRow>> {
    if ids.is_empty() {
        return Ok(vec![]);
    }
    let sql = format!(
        "SELECT {REQUEST_COLUMNS} FROM liane_requests WHERE id IN ({}) ORDER BY id",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(ids.iter()), map_request)?;
    rows.collect()
}

pub fn liane_requests_for_user(conn: &Connection, user_id: &str) -> Result<Vec<LianeRequestRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REQUEST_COLUMNS} FROM liane_requests WHERE created_by = ?1 ORDER BY id"
    ))?;
    let rows = stmt.query_map([user_id], map_request)?;
    rows.collect()
}

/// Returns the number of updated rows: 0 means not found or not owned.
pub fn update_liane_request(
    conn: &Connection,
    id: &str,
    owner: &str,
    name: &str,
    is_enabled: bool,
    round_trip: bool,
) -> Result<usize> {
    conn.execute(
        "UPDATE liane_requests SET name = ?1, is_enabled = ?2, round_trip = ?3
         WHERE id = ?4 AND created_by = ?5",
        params![name, is_enabled, round_trip, id, owner],
    )
}

pub fn delete_liane_request(conn: &Connection, id: &str, owner: &str) -> Result<usize> {
    conn.execute(
        "DELETE FROM liane_requests WHERE id = ?1 AND created_by = ?2",
        params![id, owner],
    )
}

/// All enabled requests joined against their cached route geometry, for the
/// matcher's candidate pass. Requests without a cached route are invisible
/// to matching by construction.
pub struct RequestRouteRow {
    pub id: String,
    pub created_by: String,
    pub is_enabled: bool,
    pub geometry: String,
}

pub fn requests_with_geometry(conn: &Connection) -> Result<Vec<RequestRouteRow>> {
    let mut stmt = conn.prepare(
        "SELECT lr.id, lr.created_by, lr.is_enabled, r.geometry
         FROM liane_requests lr
         INNER JOIN routes r ON r.way_points = lr.way_points
         ORDER BY lr.id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(RequestRouteRow {
            id: row.get(0)?,
            created_by: row.get(1)?,
            is_enabled: row.get(2)?,
            geometry: row.get(3)?,
        })
    })?;
    rows.collect()
}

// -- Membership rows --

const MEMBER_COLUMNS: &str =
    "liane_request_id, liane_id, requested_at, joined_at, last_read_at";

fn map_member(row: &rusqlite::Row<'_>) -> Result<MemberRow> {
    Ok(MemberRow {
        liane_request_id: row.get(0)?,
        liane_id: row.get(1)?,
        requested_at: row.get(2)?,
        joined_at: row.get(3)?,
        last_read_at: row.get(4)?,
    })
}

/// Upsert of a pending row: re-requesting the same pair refreshes
/// requested_at instead of duplicating.
pub fn upsert_pending_member(
    conn: &Connection,
    liane_request_id: &str,
    liane_id: &str,
    requested_at: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO liane_members (liane_request_id, liane_id, requested_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (liane_request_id, liane_id)
         DO UPDATE SET requested_at = excluded.requested_at WHERE joined_at IS NULL",
        params![liane_request_id, liane_id, requested_at],
    )?;
    Ok(())
}

/// Inserts a confirmed self-membership for a group root. Idempotent.
pub fn insert_root_member(
    conn: &Connection,
    liane_request_id: &str,
    liane_id: &str,
    at: &str,
) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO liane_members
            (liane_request_id, liane_id, requested_at, joined_at)
         VALUES (?1, ?2, ?3, ?3)",
        params![liane_request_id, liane_id, at],
    )?;
    Ok(())
}

pub fn members_for_lianes(conn: &Connection, liane_ids: &[String]) -> Result<Vec<MemberRow>> {
    if liane_ids.is_empty() {
        return Ok(vec![]);
    }
    let sql = format!(
        "SELECT {MEMBER_COLUMNS} FROM liane_members WHERE liane_id IN ({})
         ORDER BY joined_at, requested_at",
        placeholders(liane_ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(liane_ids.iter()), map_member)?;
    rows.collect()
}

pub fn memberships_for_requests(
    conn: &Connection,
    request_ids: &[String],
) -> Result<Vec<MemberRow>> {
    if request_ids.is_empty() {
        return Ok(vec![]);
    }
    let sql = format!(
        "SELECT {MEMBER_COLUMNS} FROM liane_members WHERE liane_request_id IN ({})",
        placeholders(request_ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(request_ids.iter()), map_member)?;
    rows.collect()
}

pub fn confirmed_memberships_for_requests(
    conn: &Connection,
    request_ids: &[String],
) -> Result<Vec<MemberRow>> {
    if request_ids.is_empty() {
        return Ok(vec![]);
    }
    let sql = format!(
        "SELECT {MEMBER_COLUMNS} FROM liane_members
         WHERE joined_at IS NOT NULL AND liane_request_id IN ({})",
        placeholders(request_ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(request_ids.iter()), map_member)?;
    rows.collect()
}

pub fn member_row(
    conn: &Connection,
    liane_request_id: &str,
    liane_id: &str,
) -> Result<Option<MemberRow>> {
    conn.query_row(
        &format!(
            "SELECT {MEMBER_COLUMNS} FROM liane_members
             WHERE liane_request_id = ?1 AND liane_id = ?2"
        ),
        params![liane_request_id, liane_id],
        map_member,
    )
    .optional()
}

/// The caller's own membership row (any state) for a liane, resolved
/// through liane_requests ownership.
pub fn member_row_for_user(
    conn: &Connection,
    liane_id: &str,
    user_id: &str,
) -> Result<Option<MemberRow>> {
    conn.query_row(
        "SELECT m.liane_request_id, m.liane_id, m.requested_at, m.joined_at, m.last_read_at
         FROM liane_members m
         INNER JOIN liane_requests lr ON lr.id = m.liane_request_id
         WHERE m.liane_id = ?1 AND lr.created_by = ?2",
        params![liane_id, user_id],
        map_member,
    )
    .optional()
}

pub fn pending_rows_for_liane(conn: &Connection, liane_id: &str) -> Result<Vec<MemberRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MEMBER_COLUMNS} FROM liane_members
         WHERE liane_id = ?1 AND joined_at IS NULL
         ORDER BY requested_at"
    ))?;
    let rows = stmt.query_map([liane_id], map_member)?;
    rows.collect()
}

/// Confirms a pending row. Returns 0 when no pending row matched, which is
/// how the loser of a concurrent accept/reject race finds out.
pub fn set_joined(
    conn: &Connection,
    liane_request_id: &str,
    liane_id: &str,
    at: &str,
) -> Result<usize> {
    conn.execute(
        "UPDATE liane_members SET joined_at = ?1
         WHERE liane_request_id = ?2 AND liane_id = ?3 AND joined_at IS NULL",
        params![at, liane_request_id, liane_id],
    )
}

pub fn delete_pending_row(
    conn: &Connection,
    liane_request_id: &str,
    liane_id: &str,
) -> Result<usize> {
    conn.execute(
        "DELETE FROM liane_members
         WHERE liane_request_id = ?1 AND liane_id = ?2 AND joined_at IS NULL",
        params![liane_request_id, liane_id],
    )
}

pub fn delete_member(conn: &Connection, liane_request_id: &str, liane_id: &str) -> Result<usize> {
    conn.execute(
        "DELETE FROM liane_members WHERE liane_request_id = ?1 AND liane_id = ?2",
        params![liane_request_id, liane_id],
    )
}

pub fn delete_members_for_request(conn: &Connection, liane_request_id: &str) -> Result<usize> {
    conn.execute(
        "DELETE FROM liane_members WHERE liane_request_id = ?1",
        [liane_request_id],
    )
}

pub fn delete_members_for_liane(conn: &Connection, liane_id: &str) -> Result<usize> {
    conn.execute("DELETE FROM liane_members WHERE liane_id = ?1", [liane_id])
}

pub fn delete_pending_rows_for_request(
    conn: &Connection,
    liane_request_id: &str,
) -> Result<usize> {
    conn.execute(
        "DELETE FROM liane_members WHERE liane_request_id = ?1 AND joined_at IS NULL",
        [liane_request_id],
    )
}

pub fn confirmed_membership_for_request(
    conn: &Connection,
    liane_request_id: &str,
) -> Result<Option<MemberRow>> {
    conn.query_row(
        &format!(
            "SELECT {MEMBER_COLUMNS} FROM liane_members
             WHERE liane_request_id = ?1 AND joined_at IS NOT NULL"
        ),
        [liane_request_id],
        map_member,
    )
    .optional()
}

pub fn set_last_read(
    conn: &Connection,
    liane_request_id: &str,
    liane_id: &str,
    at: &str,
) -> Result<usize> {
    conn.execute(
        "UPDATE liane_members SET last_read_at = ?1
         WHERE liane_request_id = ?2 AND liane_id = ?3",
        params![at, liane_request_id, liane_id],
    )
}

// -- Messages --

pub fn insert_message(conn: &Connection, row: &MessageRow) -> Result<()> {
    conn.execute(
        "INSERT INTO liane_messages (id, liane_id, content, created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![row.id, row.liane_id, row.content, row.created_by, row.created_at],
    )?;
    Ok(())
}

fn map_message(row: &rusqlite::Row<'_>) -> Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        liane_id: row.get(1)?,
        content: row.get(2)?,
        created_by: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// One page of a conversation, newest first. `floor` is the membership
/// visibility boundary; the cursor excludes everything at or after the
/// previous page's last (created_at, id).
pub fn messages_page(
    conn: &Connection,
    liane_id: &str,
    floor: &str,
    cursor: Option<(&str, &str)>,
    limit: usize,
) -> Result<Vec<MessageRow>> {
    let base = "SELECT id, liane_id, content, created_by, created_at
                FROM liane_messages
                WHERE liane_id = ?1 AND created_at >= ?2";
    match cursor {
        Some((ts, id)) => {
            let sql = format!(
                "{base} AND (created_at < ?3 OR (created_at = ?3 AND id < ?4))
                 ORDER BY created_at DESC, id DESC LIMIT ?5"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows =
                stmt.query_map(params![liane_id, floor, ts, id, limit as i64], map_message)?;
            rows.collect()
        }
        None => {
            let sql = format!("{base} ORDER BY created_at DESC, id DESC LIMIT ?3");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![liane_id, floor, limit as i64], map_message)?;
            rows.collect()
        }
    }
}

pub fn count_messages(conn: &Connection, liane_id: &str, floor: &str) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM liane_messages WHERE liane_id = ?1 AND created_at >= ?2",
        params![liane_id, floor],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

// -- Unread sources --
//
// Three independent per-liane counts, unioned and summed by the caller:
// join requests pending on lianes the user roots, join requests the user
// sent, and unread conversation messages.

pub fn owned_pending_counts(conn: &Connection, user_id: &str) -> Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT m.liane_id, COUNT(*)
         FROM liane_members m
         INNER JOIN liane_requests root ON root.id = m.liane_id
         INNER JOIN liane_requests req ON req.id = m.liane_request_id
         WHERE root.created_by = ?1 AND m.joined_at IS NULL AND req.created_by != ?1
         GROUP BY m.liane_id",
    )?;
    let rows = stmt.query_map([user_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

pub fn sent_pending_counts(conn: &Connection, user_id: &str) -> Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT m.liane_id, COUNT(*)
         FROM liane_members m
         INNER JOIN liane_requests req ON req.id = m.liane_request_id
         WHERE req.created_by = ?1 AND m.joined_at IS NULL
         GROUP BY m.liane_id",
    )?;
    let rows = stmt.query_map([user_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

pub fn unread_message_counts(conn: &Connection, user_id: &str) -> Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT m.liane_id, COUNT(msg.id)
         FROM liane_members m
         INNER JOIN liane_requests req
            ON req.id = m.liane_request_id AND req.created_by = ?1
         INNER JOIN liane_messages msg
            ON msg.liane_id = m.liane_id
            AND msg.created_at >= m.joined_at
            AND msg.created_by != ?1
         WHERE m.joined_at IS NOT NULL
           AND (m.last_read_at IS NULL OR msg.created_at > m.last_read_at)
         GROUP BY m.liane_id",
    )?;
    let rows = stmt.query_map([user_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// -- Routes --

pub fn route_exists(conn: &Connection, way_points_key: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM routes WHERE way_points = ?1",
        [way_points_key],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn insert_route(conn: &Connection, row: &RouteRow) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO routes (way_points, geometry, distance, duration)
         VALUES (?1, ?2, ?3, ?4)",
        params![row.way_points, row.geometry, row.distance, row.duration],
    )?;
    Ok(())
}

pub fn route_by_key(conn: &Connection, way_points_key: &str) -> Result<Option<RouteRow>> {
    conn.query_row(
        "SELECT way_points, geometry, distance, duration FROM routes WHERE way_points = ?1",
        [way_points_key],
        |row| {
            Ok(RouteRow {
                way_points: row.get(0)?,
                geometry: row.get(1)?,
                distance: row.get(2)?,
                duration: row.get(3)?,
            })
        },
    )
    .optional()
}

// -- Trips --

pub fn insert_trip(conn: &Connection, row: &TripRow) -> Result<()> {
    conn.execute(
        "INSERT INTO trips (id, liane_id, driver_id, way_points, departure_time)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![row.id, row.liane_id, row.driver_id, row.way_points, row.departure_time],
    )?;
    Ok(())
}

pub fn trip_by_id(conn: &Connection, id: &str) -> Result<Option<TripRow>> {
    conn.query_row(
        "SELECT id, liane_id, driver_id, way_points, departure_time FROM trips WHERE id = ?1",
        [id],
        |row| {
            Ok(TripRow {
                id: row.get(0)?,
                liane_id: row.get(1)?,
                driver_id: row.get(2)?,
                way_points: row.get(3)?,
                departure_time: row.get(4)?,
            })
        },
    )
    .optional()
}

pub fn insert_trip_member(
    conn: &Connection,
    trip_id: &str,
    user_id: &str,
    pickup: &str,
    deposit: &str,
) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO trip_members (trip_id, user_id, pickup, deposit)
         VALUES (?1, ?2, ?3, ?4)",
        params![trip_id, user_id, pickup, deposit],
    )?;
    Ok(())
}
