//! Marshalling between liane request rows and domain models, plus the
//! routes-cache key and geometry encoding shared by the matcher and the
//! orchestrator.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use liane_db::models::LianeRequestRow;
use liane_db::queries;
use liane_types::models::{LatLng, LianeRequest, RallyingPoint, WeekDays};

use crate::error::{EngineError, Result};

pub(crate) const TIME_FORMAT: &str = "%H:%M:%S";

pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid> {
    Ok(Uuid::parse_str(raw)?)
}

pub(crate) fn parse_dt(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

pub(crate) fn parse_time(raw: &str) -> Result<NaiveTime> {
    Ok(NaiveTime::parse_from_str(raw, TIME_FORMAT)?)
}

/// Canonical routes-cache key: the JSON array of waypoint ids in travel
/// order. Identical sequences share one cached route.
pub fn way_points_key(ids: &[Uuid]) -> Result<String> {
    Ok(serde_json::to_string(ids)?)
}

pub(crate) fn encode_geometry(line: &[LatLng]) -> Result<String> {
    let pairs: Vec<[f64; 2]> = line.iter().map(|p| [p.lat, p.lng]).collect();
    Ok(serde_json::to_string(&pairs)?)
}

pub(crate) fn decode_geometry(raw: &str) -> Result<Vec<LatLng>> {
    let pairs: Vec<[f64; 2]> = serde_json::from_str(raw)?;
    Ok(pairs.into_iter().map(|[lat, lng]| LatLng::new(lat, lng)).collect())
}

/// Resolves rows into domain requests, batching the rallying point lookup
/// across all of them.
pub fn hydrate(conn: &Connection, rows: Vec<LianeRequestRow>) -> Result<Vec<LianeRequest>> {
    let mut parsed: Vec<(LianeRequestRow, Vec<Uuid>)> = Vec::with_capacity(rows.len());
    let mut point_ids: HashSet<String> = HashSet::new();
    for row in rows {
        let ids: Vec<Uuid> = serde_json::from_str(&row.way_points)?;
        point_ids.extend(ids.iter().map(ToString::to_string));
        parsed.push((row, ids));
    }

    let id_list: Vec<String> = point_ids.into_iter().collect();
    let points = queries::rallying_points_by_ids(conn, &id_list)?
        .into_iter()
        .map(|p| {
            let id = parse_uuid(&p.id)?;
            Ok((
                id,
                RallyingPoint {
                    id,
                    label: p.label,
                    location: LatLng::new(p.lat, p.lng),
                },
            ))
        })
        .collect::<Result<HashMap<Uuid, RallyingPoint>>>()?;

    parsed
        .into_iter()
        .map(|(row, ids)| {
            let way_points = ids
                .iter()
                .map(|id| points.get(id).cloned().ok_or(EngineError::NotFound))
                .collect::<Result<Vec<_>>>()?;
            Ok(LianeRequest {
                id: parse_uuid(&row.id)?,
                name: row.name,
                way_points,
                round_trip: row.round_trip,
                arrive_before: parse_time(&row.arrive_before)?,
                return_after: parse_time(&row.return_after)?,
                can_drive: row.can_drive,
                week_days: WeekDays(row.week_days),
                is_enabled: row.is_enabled,
                created_by: parse_uuid(&row.created_by)?,
                created_at: parse_dt(&row.created_at)?,
            })
        })
        .collect()
}

pub fn get(conn: &Connection, id: Uuid) -> Result<LianeRequest> {
    let row = queries::liane_request_by_id(conn, &id.to_string())?.ok_or(EngineError::NotFound)?;
    hydrate(conn, vec![row])?.pop().ok_or(EngineError::NotFound)
}

pub fn get_many(conn: &Connection, ids: &[Uuid]) -> Result<Vec<LianeRequest>> {
    let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
    let rows = queries::liane_requests_by_ids(conn, &ids)?;
    hydrate(conn, rows)
}

pub fn list_for_user(conn: &Connection, user: Uuid) -> Result<Vec<LianeRequest>> {
    let rows = queries::liane_requests_for_user(conn, &user.to_string())?;
    hydrate(conn, rows)
}
