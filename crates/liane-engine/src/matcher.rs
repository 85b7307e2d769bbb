//! Route matching. Scores are asymmetric: each side of a pair sees the
//! shared section relative to its own route length, so a short commute
//! fully contained in a long one scores 1.0 for the short side only.

use std::collections::{HashMap, HashSet};

use rusqlite::Connection;
use tracing::warn;
use uuid::Uuid;

use liane_db::queries;
use liane_types::models::{
    GroupMatch, LatLng, Liane, LianeRequest, Match, RallyingPoint, SingleMatch,
};

use crate::error::{EngineError, Result};
use crate::geo;
use crate::request_store::{self, parse_uuid};
use crate::fetcher;

/// Minimum overlap fraction for a candidate to be proposed.
pub const MIN_SCORE: f64 = 0.3;

struct Candidate {
    request_id: Uuid,
    owner: Uuid,
    score: f64,
    start: LatLng,
    end: LatLng,
}

/// Ranked matching candidates for one request: every enabled request from
/// another user whose cached route shares more than [`MIN_SCORE`] of this
/// request's route, grouped by the liane the counterpart already sits in.
pub fn find_matches(conn: &Connection, request: &LianeRequest) -> Result<Vec<Match>> {
    let mut by_request = find_matches_for(conn, std::slice::from_ref(request))?;
    Ok(by_request.remove(&request.id).unwrap_or_default())
}

/// One matching pass over a whole batch of requests. Candidate geometries,
/// rallying points, users and liane links are loaded once and shared.
pub fn find_matches_for(
    conn: &Connection,
    requests: &[LianeRequest],
) -> Result<HashMap<Uuid, Vec<Match>>> {
    let mut out: HashMap<Uuid, Vec<Match>> = HashMap::new();
    if requests.is_empty() {
        return Ok(out);
    }

    // Every enabled request with a cached route, decoded once. The pool
    // keeps the query's id order so ties group deterministically.
    let mut pool: Vec<(Uuid, Uuid, Vec<LatLng>)> = Vec::new();
    for cand in queries::requests_with_geometry(conn)? {
        if !cand.is_enabled {
            continue;
        }
        pool.push((
            parse_uuid(&cand.id)?,
            parse_uuid(&cand.created_by)?,
            request_store::decode_geometry(&cand.geometry)?,
        ));
    }

    let mut raw: HashMap<Uuid, Vec<Candidate>> = HashMap::new();
    for request in requests {
        let ids: Vec<Uuid> = request.way_points.iter().map(|p| p.id).collect();
        let key = request_store::way_points_key(&ids)?;
        let Some(route) = queries::route_by_key(conn, &key)? else {
            out.insert(request.id, vec![]);
            continue;
        };
        let own_line = request_store::decode_geometry(&route.geometry)?;
        if own_line.len() < 2 {
            out.insert(request.id, vec![]);
            continue;
        }
        let index = geo::GridIndex::from_polyline(&own_line);

        let mut candidates: Vec<Candidate> = Vec::new();
        for (cand_id, owner, line) in &pool {
            if *owner == request.created_by {
                continue;
            }
            if !index.may_overlap(line) {
                continue;
            }
            let Some(shared) = geo::shared_subline(&own_line, line) else {
                continue;
            };
            let score = geo::overlap_score(&own_line, &shared);
            if score <= MIN_SCORE {
                continue;
            }
            candidates.push(Candidate {
                request_id: *cand_id,
                owner: *owner,
                score,
                start: shared[0],
                end: shared[shared.len() - 1],
            });
        }
        raw.insert(request.id, candidates);
    }

    let mut owner_ids: HashSet<String> = HashSet::new();
    let mut candidate_ids: HashSet<String> = HashSet::new();
    for cand in raw.values().flatten() {
        owner_ids.insert(cand.owner.to_string());
        candidate_ids.insert(cand.request_id.to_string());
    }

    let points = load_rallying_points(conn)?;
    let owner_ids: Vec<String> = owner_ids.into_iter().collect();
    let users = fetcher::load_users(conn, &owner_ids)?;

    // A candidate already confirmed in a liane is proposed through that
    // liane instead of individually.
    let candidate_ids: Vec<String> = candidate_ids.into_iter().collect();
    let linked: HashMap<Uuid, Uuid> =
        queries::confirmed_memberships_for_requests(conn, &candidate_ids)?
            .into_iter()
            .map(|row| Ok((parse_uuid(&row.liane_request_id)?, parse_uuid(&row.liane_id)?)))
            .collect::<Result<_>>()?;
    let liane_ids: Vec<Uuid> = linked
        .values()
        .copied()
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let lianes: HashMap<Uuid, Liane> = fetcher::fetch_lianes(conn, &liane_ids)?
        .into_iter()
        .map(|l| (l.id, l))
        .collect();

    for (request_id, candidates) in raw {
        let mut matches: Vec<Match> = Vec::new();
        let mut grouped: HashMap<Uuid, Vec<SingleMatch>> = HashMap::new();
        for cand in candidates {
            let user = users.get(&cand.owner).ok_or(EngineError::NotFound)?.clone();
            let single = SingleMatch {
                liane_request: cand.request_id,
                user,
                pickup: nearest_rallying_point(&points, cand.start).ok_or(EngineError::NotFound)?,
                deposit: nearest_rallying_point(&points, cand.end).ok_or(EngineError::NotFound)?,
                score: cand.score,
            };
            match linked.get(&cand.request_id) {
                Some(liane_id) => grouped.entry(*liane_id).or_default().push(single),
                None => matches.push(Match::Single(single)),
            }
        }

        for (liane_id, members) in grouped {
            let Some(liane) = lianes.get(&liane_id).cloned() else {
                warn!(liane = %liane_id, "Dropping match group with unresolvable liane");
                continue;
            };
            let best = members
                .iter()
                .max_by(|a, b| a.score.total_cmp(&b.score))
                .ok_or(EngineError::NotFound)?
                .clone();
            matches.push(Match::Group(GroupMatch {
                liane,
                pickup: best.pickup,
                deposit: best.deposit,
                score: best.score,
                matches: members,
            }));
        }

        matches.sort_by(|a, b| {
            b.score()
                .total_cmp(&a.score())
                .then_with(|| b.group_size().cmp(&a.group_size()))
                .then_with(|| a.min_request_id().cmp(&b.min_request_id()))
        });
        out.insert(request_id, matches);
    }
    Ok(out)
}

/// Pairwise overlap between two specific requests, without the ranking
/// threshold: when joining an existing trip any shared section counts.
pub fn find_match_between(
    conn: &Connection,
    from: &LianeRequest,
    to: &LianeRequest,
) -> Result<Option<SingleMatch>> {
    let from_ids: Vec<Uuid> = from.way_points.iter().map(|p| p.id).collect();
    let to_ids: Vec<Uuid> = to.way_points.iter().map(|p| p.id).collect();
    let Some(from_route) = queries::route_by_key(conn, &request_store::way_points_key(&from_ids)?)?
    else {
        return Ok(None);
    };
    let Some(to_route) = queries::route_by_key(conn, &request_store::way_points_key(&to_ids)?)?
    else {
        return Ok(None);
    };

    let from_line = request_store::decode_geometry(&from_route.geometry)?;
    let to_line = request_store::decode_geometry(&to_route.geometry)?;
    let Some(shared) = geo::shared_subline(&from_line, &to_line) else {
        return Ok(None);
    };

    let points = load_rallying_points(conn)?;
    let users = fetcher::load_users(conn, &[to.created_by.to_string()])?;
    let user = users.get(&to.created_by).ok_or(EngineError::NotFound)?.clone();

    Ok(Some(SingleMatch {
        liane_request: to.id,
        user,
        pickup: nearest_rallying_point(&points, shared[0]).ok_or(EngineError::NotFound)?,
        deposit: nearest_rallying_point(&points, shared[shared.len() - 1])
            .ok_or(EngineError::NotFound)?,
        score: geo::overlap_score(&from_line, &shared),
    }))
}

fn load_rallying_points(conn: &Connection) -> Result<Vec<RallyingPoint>> {
    queries::all_rallying_points(conn)?
        .into_iter()
        .map(|p| {
            Ok(RallyingPoint {
                id: parse_uuid(&p.id)?,
                label: p.label,
                location: LatLng::new(p.lat, p.lng),
            })
        })
        .collect()
}

fn nearest_rallying_point(points: &[RallyingPoint], target: LatLng) -> Option<RallyingPoint> {
    points
        .iter()
        .min_by(|a, b| {
            geo::haversine(a.location, target).total_cmp(&geo::haversine(b.location, target))
        })
        .cloned()
}
