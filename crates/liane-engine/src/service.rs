//! Membership orchestration. Every state transition runs inside one
//! transaction together with the system message that records it;
//! notifications go out only after the commit.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use liane_db::{Database, fmt_ts, models::{LianeRequestRow, RouteRow, TripRow}, queries};
use liane_types::api::{CreateLianeRequest, UpdateLianeRequest};
use liane_types::events::LianeEvent;
use liane_types::models::{
    LatLng, Liane, LianeMatch, LianeRequest, LianeState, Trip,
};

use crate::dispatch::Dispatch;
use crate::error::{EngineError, Result};
use crate::request_store::{self, TIME_FORMAT, parse_uuid};
use crate::routing::{Route, Routing};
use crate::{fetcher, matcher, messages};

#[derive(Clone)]
pub struct LianeService {
    db: Arc<Database>,
    routing: Arc<dyn Routing>,
    dispatch: Arc<dyn Dispatch>,
}

impl LianeService {
    pub fn new(db: Arc<Database>, routing: Arc<dyn Routing>, dispatch: Arc<dyn Dispatch>) -> Self {
        Self { db, routing, dispatch }
    }

    pub fn create(&self, user: Uuid, req: CreateLianeRequest) -> Result<LianeRequest> {
        if req.week_days.is_empty() {
            return Err(EngineError::Validation("at least one week day is required".into()));
        }
        let distinct: HashSet<Uuid> = req.way_points.iter().copied().collect();
        if req.way_points.len() < 2 || distinct.len() != req.way_points.len() {
            return Err(EngineError::Validation(
                "way points must be at least two distinct rallying points".into(),
            ));
        }

        let key = request_store::way_points_key(&req.way_points)?;
        let reversed_ids: Vec<Uuid> = req.way_points.iter().rev().copied().collect();
        let reversed_key = request_store::way_points_key(&reversed_ids)?;

        let (coords, need_forward, need_return) = self.db.with_conn(|conn| {
            let ids: Vec<String> = req.way_points.iter().map(ToString::to_string).collect();
            let rows = queries::rallying_points_by_ids(conn, &ids)?;
            if rows.len() != distinct.len() {
                return Err(EngineError::Validation("unknown rallying point".into()));
            }
            let by_id: HashMap<String, LatLng> = rows
                .into_iter()
                .map(|p| {
                    let location = LatLng::new(p.lat, p.lng);
                    (p.id, location)
                })
                .collect();
            let coords = req
                .way_points
                .iter()
                .map(|id| {
                    by_id
                        .get(&id.to_string())
                        .copied()
                        .ok_or_else(|| EngineError::Validation("unknown rallying point".into()))
                })
                .collect::<Result<Vec<LatLng>>>()?;
            let need_forward = !queries::route_exists(conn, &key)?;
            let need_return = req.round_trip && !queries::route_exists(conn, &reversed_key)?;
            Ok((coords, need_forward, need_return))
        })?;

        // Routing happens outside the connection lock.
        let forward = if need_forward { Some(self.compute_route(&coords)?) } else { None };
        let backward = if need_return {
            let mut rev = coords.clone();
            rev.reverse();
            Some(self.compute_route(&rev)?)
        } else {
            None
        };

        let id = req.id.unwrap_or_else(Uuid::new_v4);
        let now = Utc::now();
        let row = LianeRequestRow {
            id: id.to_string(),
            name: req.name,
            way_points: key.clone(),
            round_trip: req.round_trip,
            arrive_before: req.arrive_before.format(TIME_FORMAT).to_string(),
            return_after: req.return_after.format(TIME_FORMAT).to_string(),
            can_drive: req.can_drive,
            week_days: req.week_days.0,
            is_enabled: true,
            created_by: user.to_string(),
            created_at: fmt_ts(now),
        };

        self.db.with_tx(|conn| {
            if let Some(route) = &forward {
                queries::insert_route(conn, &route_row(&key, route)?)?;
            }
            if let Some(route) = &backward {
                queries::insert_route(conn, &route_row(&reversed_key, route)?)?;
            }
            queries::insert_liane_request(conn, &row)?;
            Ok::<_, EngineError>(())
        })?;

        info!(request = %id, "Liane request created");
        self.db.with_conn(|conn| request_store::get(conn, id))
    }

    /// All of the user's requests with their resolved match state.
    pub fn list(&self, user: Uuid) -> Result<Vec<LianeMatch>> {
        self.db.with_conn(|conn| {
            let requests = request_store::list_for_user(conn, user)?;
            let states = states_of(conn, &requests)?;
            Ok(requests
                .into_iter()
                .zip(states)
                .map(|(request, state)| LianeMatch { liane_request: request, state })
                .collect())
        })
    }

    pub fn get(&self, user: Uuid, id: Uuid) -> Result<LianeMatch> {
        self.db.with_conn(|conn| {
            let request = request_store::get(conn, id)?;
            if request.created_by != user {
                return Err(EngineError::Unauthorized);
            }
            let state = state_of(conn, &request)?;
            Ok(LianeMatch { liane_request: request, state })
        })
    }

    pub fn get_liane(&self, user: Uuid, liane_id: Uuid) -> Result<Liane> {
        self.db.with_conn(|conn| {
            let liane =
                fetcher::fetch_or_synthesize(conn, liane_id)?.ok_or(EngineError::NotFound)?;
            if !liane.is_member(user, true) {
                return Err(EngineError::Unauthorized);
            }
            Ok(liane)
        })
    }

    pub fn update(&self, user: Uuid, id: Uuid, patch: UpdateLianeRequest) -> Result<LianeRequest> {
        let current = self.db.with_conn(|conn| request_store::get(conn, id))?;
        if current.created_by != user {
            return Err(EngineError::Unauthorized);
        }
        let name = patch.name.unwrap_or_else(|| current.name.clone());
        let is_enabled = patch.is_enabled.unwrap_or(current.is_enabled);
        let round_trip = patch.round_trip.unwrap_or(current.round_trip);

        // Turning round_trip on may need the return route cached.
        if round_trip && !current.round_trip {
            let reversed_ids: Vec<Uuid> = current.way_points.iter().rev().map(|p| p.id).collect();
            let reversed_key = request_store::way_points_key(&reversed_ids)?;
            let cached = self
                .db
                .with_conn(|conn| Ok::<_, EngineError>(queries::route_exists(conn, &reversed_key)?))?;
            if !cached {
                let coords: Vec<LatLng> =
                    current.way_points.iter().rev().map(|p| p.location).collect();
                let route = self.compute_route(&coords)?;
                self.db.with_tx(|conn| {
                    queries::insert_route(conn, &route_row(&reversed_key, &route)?)?;
                    Ok::<_, EngineError>(())
                })?;
            }
        }

        self.db.with_tx(|conn| {
            let n = queries::update_liane_request(
                conn,
                &id.to_string(),
                &user.to_string(),
                &name,
                is_enabled,
                round_trip,
            )?;
            if n == 0 {
                return Err(EngineError::NotFound);
            }
            Ok(())
        })?;
        self.db.with_conn(|conn| request_store::get(conn, id))
    }

    /// Removes a request and every membership row that references it,
    /// including the rows of a group it roots. Deleting a request that no
    /// longer exists, or that the caller does not own, is a no-op.
    pub fn delete(&self, user: Uuid, id: Uuid) -> Result<()> {
        self.db.with_tx(|conn| {
            let Some(row) = queries::liane_request_by_id(conn, &id.to_string())? else {
                return Ok(());
            };
            if row.created_by != user.to_string() {
                return Ok(());
            }
            queries::delete_members_for_request(conn, &id.to_string())?;
            queries::delete_members_for_liane(conn, &id.to_string())?;
            queries::delete_liane_request(conn, &id.to_string(), &user.to_string())?;
            info!(request = %id, "Liane request deleted");
            Ok(())
        })
    }

    /// Files a join request from `request_id` toward the group holding
    /// `target_id`. When the target request already sits in a liane the
    /// join is redirected there; otherwise the target request roots a new
    /// group under its own id. Returns false when the caller's request is
    /// already confirmed elsewhere; a previous pending request elsewhere
    /// is replaced. Targeting the caller's own group is also a false
    /// no-op.
    pub fn join_request(&self, user: Uuid, request_id: Uuid, target_id: Uuid) -> Result<bool> {
        let outcome = self.db.with_tx(|conn| {
            let request = request_store::get(conn, request_id)?;
            if request.created_by != user {
                return Err(EngineError::Unauthorized);
            }
            if queries::confirmed_membership_for_request(conn, &request_id.to_string())?.is_some() {
                return Ok(None);
            }
            let liane_id = match queries::confirmed_membership_for_request(
                conn,
                &target_id.to_string(),
            )? {
                Some(row) => parse_uuid(&row.liane_id)?,
                None => target_id,
            };
            let root = queries::liane_request_by_id(conn, &liane_id.to_string())?
                .ok_or(EngineError::NotFound)?;
            if root.created_by == user.to_string() {
                return Ok(None);
            }

            // One outstanding join request per liane request.
            queries::delete_pending_rows_for_request(conn, &request_id.to_string())?;
            let now = Utc::now();
            queries::upsert_pending_member(
                conn,
                &request_id.to_string(),
                &liane_id.to_string(),
                &fmt_ts(now),
            )?;

            let pseudo = queries::user_by_id(conn, &user.to_string())?
                .ok_or(EngineError::NotFound)?
                .pseudo;
            let message = messages::insert(
                conn,
                liane_id,
                messages::member_requested(&pseudo, user, request_id),
                user,
                now,
            )?;
            Ok(Some((liane_id, message)))
        })?;

        match outcome {
            Some((liane_id, message)) => {
                self.dispatch.push_message(liane_id, &message);
                info!(request = %request_id, liane = %liane_id, "Join request filed");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Confirms a pending member. Only the root request's owner or an
    /// already confirmed member may decide. The first acceptance also
    /// materializes the group by writing the root's own membership row.
    pub fn accept(&self, user: Uuid, request_id: Uuid, liane_id: Uuid) -> Result<Liane> {
        let (liane, message, requester) = self.db.with_tx(|conn| {
            let root = queries::liane_request_by_id(conn, &liane_id.to_string())?
                .ok_or(EngineError::NotFound)?;
            check_can_decide(conn, &root, user, liane_id)?;

            // The root's joined_at is its request creation time, so the
            // whole conversation stays visible to it.
            queries::insert_root_member(
                conn,
                &liane_id.to_string(),
                &liane_id.to_string(),
                &root.created_at,
            )?;

            let accepted = queries::liane_request_by_id(conn, &request_id.to_string())?
                .ok_or(EngineError::NotFound)?;
            let now = Utc::now();
            let n = queries::set_joined(conn, &request_id.to_string(), &liane_id.to_string(), &fmt_ts(now))?;
            if n == 0 {
                return Err(EngineError::NotFound);
            }

            let requester = parse_uuid(&accepted.created_by)?;
            let pseudo = queries::user_by_id(conn, &accepted.created_by)?
                .ok_or(EngineError::NotFound)?
                .pseudo;
            // The acceptance notice is authored by the deciding member, so
            // it counts as unread for the requester too.
            let message = messages::insert(
                conn,
                liane_id,
                messages::member_added(&pseudo, requester, request_id),
                user,
                now,
            )?;
            let liane = fetcher::fetch_liane(conn, liane_id)?.ok_or(EngineError::NotFound)?;
            Ok((liane, message, requester))
        })?;

        self.dispatch.push_message(liane_id, &message);
        self.dispatch.dispatch(
            LianeEvent::MemberAccepted { liane: liane_id, liane_request: request_id, user: requester },
            user,
        );
        info!(liane = %liane_id, request = %request_id, "Join request accepted");
        Ok(liane)
    }

    /// Removes a pending member. Rejecting a row that is no longer pending,
    /// including one already accepted, is NotFound.
    pub fn reject(&self, user: Uuid, request_id: Uuid, liane_id: Uuid) -> Result<()> {
        let (message, requester) = self.db.with_tx(|conn| {
            let root = queries::liane_request_by_id(conn, &liane_id.to_string())?
                .ok_or(EngineError::NotFound)?;
            check_can_decide(conn, &root, user, liane_id)?;

            let rejected = queries::liane_request_by_id(conn, &request_id.to_string())?
                .ok_or(EngineError::NotFound)?;
            let n = queries::delete_pending_row(conn, &request_id.to_string(), &liane_id.to_string())?;
            if n == 0 {
                return Err(EngineError::NotFound);
            }

            let requester = parse_uuid(&rejected.created_by)?;
            let pseudo = queries::user_by_id(conn, &rejected.created_by)?
                .ok_or(EngineError::NotFound)?
                .pseudo;
            let message = messages::insert(
                conn,
                liane_id,
                messages::member_rejected(&pseudo, requester),
                user,
                Utc::now(),
            )?;
            Ok((message, requester))
        })?;

        self.dispatch.push_message(liane_id, &message);
        self.dispatch.dispatch(
            LianeEvent::MemberRejected { liane: liane_id, liane_request: request_id, user: requester },
            user,
        );
        info!(liane = %liane_id, request = %request_id, "Join request rejected");
        Ok(())
    }

    /// Withdraws the caller's membership, pending or confirmed. Returns
    /// false when the caller has no row for this liane.
    pub fn leave(&self, user: Uuid, liane_id: Uuid) -> Result<bool> {
        let outcome = self.db.with_tx(|conn| {
            let Some(row) =
                queries::member_row_for_user(conn, &liane_id.to_string(), &user.to_string())?
            else {
                return Ok(None);
            };
            let was_confirmed = row.joined_at.is_some();
            queries::delete_member(conn, &row.liane_request_id, &row.liane_id)?;
            if !was_confirmed {
                return Ok(Some(None));
            }
            let pseudo = queries::user_by_id(conn, &user.to_string())?
                .ok_or(EngineError::NotFound)?
                .pseudo;
            Ok::<_, EngineError>(Some(Some(messages::insert(
                conn,
                liane_id,
                messages::member_left(&pseudo, user),
                user,
                Utc::now(),
            )?)))
        })?;

        let Some(message) = outcome else {
            return Ok(false);
        };
        if let Some(message) = message {
            self.dispatch.push_message(liane_id, &message);
        }
        info!(liane = %liane_id, user = %user, "Member left");
        Ok(true)
    }

    /// Schedules a trip for a liane, driven by the caller.
    pub fn create_trip(
        &self,
        user: Uuid,
        liane_id: Uuid,
        way_points: Vec<Uuid>,
        departure_time: DateTime<Utc>,
    ) -> Result<Trip> {
        if way_points.len() < 2 {
            return Err(EngineError::Validation("a trip needs at least two stops".into()));
        }
        let (trip, message) = self.db.with_tx(|conn| {
            let row = queries::member_row_for_user(conn, &liane_id.to_string(), &user.to_string())?;
            if !matches!(row, Some(ref r) if r.joined_at.is_some()) {
                return Err(EngineError::Unauthorized);
            }
            let trip = Trip {
                id: Uuid::new_v4(),
                liane_id,
                driver: user,
                way_points,
                departure_time,
            };
            queries::insert_trip(
                conn,
                &TripRow {
                    id: trip.id.to_string(),
                    liane_id: liane_id.to_string(),
                    driver_id: user.to_string(),
                    way_points: serde_json::to_string(&trip.way_points)?,
                    departure_time: fmt_ts(departure_time),
                },
            )?;
            let message =
                messages::insert(conn, liane_id, messages::trip_added(trip.id), user, Utc::now())?;
            Ok((trip, message))
        })?;

        self.dispatch.push_message(liane_id, &message);
        info!(liane = %liane_id, trip = %trip.id, "Trip added");
        Ok(trip)
    }

    /// Adds the caller to a scheduled trip when their route overlaps the
    /// driver's. Returns false when there is no overlap or the trip does
    /// not pass the caller's pickup and deposit.
    pub fn join_trip(&self, user: Uuid, trip_id: Uuid) -> Result<bool> {
        let outcome = self.db.with_tx(|conn| {
            let trip = queries::trip_by_id(conn, &trip_id.to_string())?
                .ok_or(EngineError::NotFound)?;
            let liane_id = parse_uuid(&trip.liane_id)?;

            let caller_row = queries::member_row_for_user(conn, &trip.liane_id, &user.to_string())?;
            let Some(caller_row) = caller_row.filter(|r| r.joined_at.is_some()) else {
                return Err(EngineError::Unauthorized);
            };
            let driver_row = queries::member_row_for_user(conn, &trip.liane_id, &trip.driver_id)?;
            let Some(driver_row) = driver_row.filter(|r| r.joined_at.is_some()) else {
                return Err(EngineError::NotFound);
            };

            let caller_request =
                request_store::get(conn, parse_uuid(&caller_row.liane_request_id)?)?;
            let driver_request =
                request_store::get(conn, parse_uuid(&driver_row.liane_request_id)?)?;
            let Some(shared) = matcher::find_match_between(conn, &caller_request, &driver_request)?
            else {
                return Ok(None);
            };

            // Orient pickup and deposit along the trip's stop order; a trip
            // running the return leg passes them reversed.
            let stops: Vec<Uuid> = serde_json::from_str(&trip.way_points)?;
            let pickup_idx = stops.iter().position(|s| *s == shared.pickup.id);
            let deposit_idx = stops.iter().position(|s| *s == shared.deposit.id);
            let (pickup, deposit) = match (pickup_idx, deposit_idx) {
                (Some(p), Some(d)) if p < d => (shared.pickup, shared.deposit),
                (Some(p), Some(d)) if d < p => (shared.deposit, shared.pickup),
                _ => return Ok(None),
            };

            queries::insert_trip_member(
                conn,
                &trip_id.to_string(),
                &user.to_string(),
                &pickup.id.to_string(),
                &deposit.id.to_string(),
            )?;
            let pseudo = queries::user_by_id(conn, &user.to_string())?
                .ok_or(EngineError::NotFound)?
                .pseudo;
            let message = messages::insert(
                conn,
                liane_id,
                messages::member_joined_trip(&pseudo, user, trip_id),
                user,
                Utc::now(),
            )?;
            Ok(Some((liane_id, message)))
        })?;

        match outcome {
            Some((liane_id, message)) => {
                self.dispatch.push_message(liane_id, &message);
                info!(trip = %trip_id, user = %user, "Member joined trip");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn compute_route(&self, coords: &[LatLng]) -> Result<Route> {
        self.routing.route(coords).map_err(EngineError::Routing)
    }
}

fn route_row(key: &str, route: &Route) -> Result<RouteRow> {
    Ok(RouteRow {
        way_points: key.to_string(),
        geometry: request_store::encode_geometry(&route.geometry)?,
        distance: route.distance,
        duration: route.duration,
    })
}

fn state_of(conn: &Connection, request: &LianeRequest) -> Result<LianeState> {
    states_of(conn, std::slice::from_ref(request))?
        .pop()
        .ok_or(EngineError::NotFound)
}

/// Resolves the state of every request in one pass: memberships and
/// attached lianes are fetched in batches, and all detached requests go
/// through a single matching run.
fn states_of(conn: &Connection, requests: &[LianeRequest]) -> Result<Vec<LianeState>> {
    if requests.is_empty() {
        return Ok(vec![]);
    }
    let ids: Vec<String> = requests.iter().map(|r| r.id.to_string()).collect();

    let mut confirmed: HashMap<Uuid, Uuid> = HashMap::new();
    let mut pending: HashMap<Uuid, Uuid> = HashMap::new();
    for row in queries::memberships_for_requests(conn, &ids)? {
        let request_id = parse_uuid(&row.liane_request_id)?;
        let liane_id = parse_uuid(&row.liane_id)?;
        if row.joined_at.is_some() {
            confirmed.insert(request_id, liane_id);
        } else {
            pending.entry(request_id).or_insert(liane_id);
        }
    }

    // A request with no row of its own may still root a group others have
    // asked to join.
    let mut incoming: HashSet<Uuid> = HashSet::new();
    for row in queries::members_for_lianes(conn, &ids)? {
        if row.joined_at.is_none() {
            incoming.insert(parse_uuid(&row.liane_id)?);
        }
    }

    let attached_ids: Vec<Uuid> = confirmed
        .values()
        .copied()
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let attached: HashMap<Uuid, Liane> = fetcher::fetch_lianes(conn, &attached_ids)?
        .into_iter()
        .map(|l| (l.id, l))
        .collect();

    let detached: Vec<LianeRequest> = requests
        .iter()
        .filter(|r| {
            !confirmed.contains_key(&r.id)
                && !pending.contains_key(&r.id)
                && !incoming.contains(&r.id)
        })
        .cloned()
        .collect();
    let mut match_map = matcher::find_matches_for(conn, &detached)?;

    requests
        .iter()
        .map(|request| {
            if let Some(liane_id) = confirmed.get(&request.id) {
                let liane = attached.get(liane_id).cloned().ok_or(EngineError::NotFound)?;
                return Ok(LianeState::Attached { liane });
            }
            if let Some(liane_id) = pending.get(&request.id) {
                let liane = fetcher::fetch_or_synthesize(conn, *liane_id)?
                    .ok_or(EngineError::NotFound)?;
                return Ok(LianeState::Pending { liane });
            }
            if incoming.contains(&request.id) {
                let liane = fetcher::fetch_or_synthesize(conn, request.id)?
                    .ok_or(EngineError::NotFound)?;
                return Ok(LianeState::Pending { liane });
            }
            Ok(LianeState::Detached {
                matches: match_map.remove(&request.id).unwrap_or_default(),
            })
        })
        .collect()
}

fn check_can_decide(
    conn: &Connection,
    root: &LianeRequestRow,
    user: Uuid,
    liane_id: Uuid,
) -> Result<()> {
    if root.created_by == user.to_string() {
        return Ok(());
    }
    match queries::member_row_for_user(conn, &liane_id.to_string(), &user.to_string())? {
        Some(row) if row.joined_at.is_some() => Ok(()),
        _ => Err(EngineError::Unauthorized),
    }
}
