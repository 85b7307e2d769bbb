//! Aggregation of membership rows into full liane views. A liane is never
//! stored as its own row; it exists as the set of membership rows sharing
//! a liane_id, resolved here into users and requests.

use std::collections::{HashMap, HashSet};

use rusqlite::Connection;
use tracing::warn;
use uuid::Uuid;

use liane_db::models::MemberRow;
use liane_db::queries;
use liane_types::models::{Liane, LianeMember, User};

use crate::error::{EngineError, Result};
use crate::request_store::{self, parse_dt, parse_uuid};

pub(crate) fn load_users(conn: &Connection, ids: &[String]) -> Result<HashMap<Uuid, User>> {
    queries::users_by_ids(conn, ids)?
        .into_iter()
        .map(|row| {
            let id = parse_uuid(&row.id)?;
            Ok((
                id,
                User {
                    id,
                    pseudo: row.pseudo,
                    created_at: parse_dt(&row.created_at)?,
                },
            ))
        })
        .collect()
}

/// Resolves raw membership rows into members, keyed back to their liane.
fn build_members(conn: &Connection, rows: &[MemberRow]) -> Result<Vec<(Uuid, LianeMember)>> {
    let request_ids: Vec<String> = rows
        .iter()
        .map(|r| r.liane_request_id.clone())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let request_rows = queries::liane_requests_by_ids(conn, &request_ids)?;
    let requests: HashMap<Uuid, _> = request_store::hydrate(conn, request_rows)?
        .into_iter()
        .map(|r| (r.id, r))
        .collect();

    let owner_ids: Vec<String> = requests
        .values()
        .map(|r| r.created_by.to_string())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let users = load_users(conn, &owner_ids)?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        // Rows left behind by a deleted request or user are skipped, not
        // surfaced as an error.
        let Some(request) = requests.get(&parse_uuid(&row.liane_request_id)?) else {
            warn!(request = %row.liane_request_id, "Dropping membership row with no request");
            continue;
        };
        let Some(user) = users.get(&request.created_by) else {
            warn!(user = %request.created_by, "Dropping membership row with no user");
            continue;
        };
        let member = LianeMember {
            user: user.clone(),
            liane_request: request.clone(),
            requested_at: parse_dt(&row.requested_at)?,
            joined_at: row.joined_at.as_deref().map(parse_dt).transpose()?,
            last_read_at: row.last_read_at.as_deref().map(parse_dt).transpose()?,
        };
        out.push((parse_uuid(&row.liane_id)?, member));
    }
    Ok(out)
}

/// Resolves every materialized liane among `liane_ids`. Groups that exist
/// only as pending rows have no confirmed member yet and are skipped.
pub fn fetch_lianes(conn: &Connection, liane_ids: &[Uuid]) -> Result<Vec<Liane>> {
    let ids: Vec<String> = liane_ids.iter().map(ToString::to_string).collect();
    let rows = queries::members_for_lianes(conn, &ids)?;
    let members = build_members(conn, &rows)?;

    let mut grouped: HashMap<Uuid, Liane> = HashMap::new();
    let mut order: Vec<Uuid> = Vec::new();
    for (liane_id, member) in members {
        let liane = grouped.entry(liane_id).or_insert_with(|| {
            order.push(liane_id);
            Liane {
                id: liane_id,
                members: vec![],
                pending_members: vec![],
            }
        });
        if member.joined_at.is_some() {
            liane.members.push(member);
        } else {
            liane.pending_members.push(member);
        }
    }

    let mut out = Vec::with_capacity(order.len());
    for id in order {
        let mut liane = grouped.remove(&id).ok_or(EngineError::NotFound)?;
        if liane.members.is_empty() {
            continue;
        }
        liane.members.sort_by_key(|m| m.joined_at);
        liane.pending_members.sort_by_key(|m| m.requested_at);
        out.push(liane);
    }
    Ok(out)
}

pub fn fetch_liane(conn: &Connection, liane_id: Uuid) -> Result<Option<Liane>> {
    Ok(fetch_lianes(conn, &[liane_id])?.pop())
}

/// Like [`fetch_liane`], but a group that exists only as pending rows is
/// presented as if the root request's owner were already confirmed. The
/// group materializes for real on first acceptance.
pub fn fetch_or_synthesize(conn: &Connection, liane_id: Uuid) -> Result<Option<Liane>> {
    if let Some(liane) = fetch_liane(conn, liane_id)? {
        return Ok(Some(liane));
    }

    let Some(root_row) = queries::liane_request_by_id(conn, &liane_id.to_string())? else {
        return Ok(None);
    };
    let root = request_store::hydrate(conn, vec![root_row])?
        .pop()
        .ok_or(EngineError::NotFound)?;
    let users = load_users(conn, &[root.created_by.to_string()])?;
    let owner = users.get(&root.created_by).ok_or(EngineError::NotFound)?;

    let pending_rows = queries::pending_rows_for_liane(conn, &liane_id.to_string())?;
    let mut pending: Vec<LianeMember> = build_members(conn, &pending_rows)?
        .into_iter()
        .map(|(_, m)| m)
        .collect();
    pending.sort_by_key(|m| m.requested_at);

    let implicit = LianeMember {
        user: owner.clone(),
        liane_request: root.clone(),
        requested_at: root.created_at,
        joined_at: Some(root.created_at),
        last_read_at: None,
    };
    Ok(Some(Liane {
        id: liane_id,
        members: vec![implicit],
        pending_members: pending,
    }))
}
