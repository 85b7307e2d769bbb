//! End-to-end engine scenarios over an in-memory database, with a
//! straight-line routing stub and a recording dispatcher.

use std::sync::{Arc, Mutex};

use chrono::{NaiveTime, Utc, Weekday};
use uuid::Uuid;

use liane_db::{Database, fmt_ts, queries};
use liane_engine::routing::Route;
use liane_engine::{Dispatch, EngineError, LianeMessageService, LianeService, Routing, geo};
use liane_types::api::{CreateLianeRequest, Pagination, UpdateLianeRequest};
use liane_types::events::LianeEvent;
use liane_types::models::{
    LatLng, LianeMessage, LianeRequest, LianeState, Match, MessageContent, WeekDays,
};

/// Routes along straight segments, one vertex every 0.05 degrees. Two
/// requests through the same corridor then share identical vertices, just
/// like routes from a common road routing backend.
struct StraightLineRouting;

impl Routing for StraightLineRouting {
    fn route(&self, coordinates: &[LatLng]) -> anyhow::Result<Route> {
        let mut geometry = Vec::new();
        for w in coordinates.windows(2) {
            let span = (w[1].lng - w[0].lng).abs().max((w[1].lat - w[0].lat).abs());
            let steps = ((span / 0.05).round() as usize).max(1);
            for i in 0..steps {
                let t = i as f64 / steps as f64;
                geometry.push(LatLng::new(
                    w[0].lat + (w[1].lat - w[0].lat) * t,
                    w[0].lng + (w[1].lng - w[0].lng) * t,
                ));
            }
        }
        if let Some(last) = coordinates.last() {
            geometry.push(*last);
        }
        let distance = geo::polyline_length(&geometry);
        Ok(Route { geometry, distance, duration: distance / 13.0 })
    }
}

#[derive(Default)]
struct RecordingDispatch {
    events: Mutex<Vec<LianeEvent>>,
    messages: Mutex<Vec<LianeMessage>>,
}

impl Dispatch for RecordingDispatch {
    fn dispatch(&self, event: LianeEvent, _by: Uuid) {
        self.events.lock().unwrap().push(event);
    }

    fn push_message(&self, _liane_id: Uuid, message: &LianeMessage) {
        self.messages.lock().unwrap().push(message.clone());
    }
}

struct TestEnv {
    db: Arc<Database>,
    service: LianeService,
    messages: LianeMessageService,
    dispatch: Arc<RecordingDispatch>,
}

fn env() -> TestEnv {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let dispatch = Arc::new(RecordingDispatch::default());
    let routing = Arc::new(StraightLineRouting);
    let service = LianeService::new(db.clone(), routing, dispatch.clone());
    let messages = LianeMessageService::new(db.clone(), dispatch.clone());
    TestEnv { db, service, messages, dispatch }
}

fn register(env: &TestEnv, pseudo: &str) -> Uuid {
    let id = Uuid::new_v4();
    env.db
        .with_conn(|conn| {
            queries::insert_user(conn, &id.to_string(), pseudo, "hash", &fmt_ts(Utc::now()))
        })
        .unwrap();
    id
}

fn add_point(env: &TestEnv, label: &str, lat: f64, lng: f64) -> Uuid {
    let id = Uuid::new_v4();
    env.db
        .with_conn(|conn| {
            queries::insert_rallying_point(
                conn,
                &liane_db::models::RallyingPointRow {
                    id: id.to_string(),
                    label: label.to_string(),
                    lat,
                    lng,
                },
            )
        })
        .unwrap();
    id
}

fn create_request(env: &TestEnv, user: Uuid, name: &str, points: &[Uuid]) -> LianeRequest {
    env.service
        .create(
            user,
            CreateLianeRequest {
                id: None,
                name: name.to_string(),
                way_points: points.to_vec(),
                round_trip: false,
                arrive_before: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                return_after: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
                can_drive: true,
                week_days: WeekDays::from_days(&[Weekday::Mon, Weekday::Fri]),
            },
        )
        .unwrap()
}

/// Four rallying points along the equator, plus two commutes sharing the
/// section between p2 and p3: alice p1->p3, bob p2->p4.
struct Corridor {
    alice: Uuid,
    bob: Uuid,
    p1: Uuid,
    p2: Uuid,
    p3: Uuid,
    p4: Uuid,
    alice_request: LianeRequest,
    bob_request: LianeRequest,
}

fn corridor(env: &TestEnv) -> Corridor {
    let alice = register(env, "alice");
    let bob = register(env, "bob");
    let p1 = add_point(env, "Mende", 0.0, 0.0);
    let p2 = add_point(env, "Balsièges", 0.0, 0.6);
    let p3 = add_point(env, "Ispagnac", 0.0, 1.0);
    let p4 = add_point(env, "Florac", 0.0, 1.5);
    let alice_request = create_request(env, alice, "aller au travail", &[p1, p3]);
    let bob_request = create_request(env, bob, "trajet marché", &[p2, p4]);
    Corridor { alice, bob, p1, p2, p3, p4, alice_request, bob_request }
}

fn detached_matches(state: &LianeState) -> &[Match] {
    match state {
        LianeState::Detached { matches } => matches,
        other => panic!("expected detached state, got {other:?}"),
    }
}

#[test]
fn create_rejects_invalid_input() {
    let env = env();
    let user = register(&env, "alice");
    let p1 = add_point(&env, "a", 0.0, 0.0);
    let p2 = add_point(&env, "b", 0.0, 1.0);

    let base = CreateLianeRequest {
        id: None,
        name: "test".into(),
        way_points: vec![p1, p2],
        round_trip: false,
        arrive_before: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        return_after: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        can_drive: false,
        week_days: WeekDays::single(Weekday::Mon),
    };

    let no_days = CreateLianeRequest { week_days: WeekDays::EMPTY, ..base.clone() };
    assert!(matches!(env.service.create(user, no_days), Err(EngineError::Validation(_))));

    let one_point = CreateLianeRequest { way_points: vec![p1], ..base.clone() };
    assert!(matches!(env.service.create(user, one_point), Err(EngineError::Validation(_))));

    let duplicated = CreateLianeRequest { way_points: vec![p1, p1], ..base.clone() };
    assert!(matches!(env.service.create(user, duplicated), Err(EngineError::Validation(_))));

    let unknown = CreateLianeRequest { way_points: vec![p1, Uuid::new_v4()], ..base.clone() };
    assert!(matches!(env.service.create(user, unknown), Err(EngineError::Validation(_))));

    assert!(env.service.create(user, base).is_ok());
}

#[test]
fn detached_requests_see_each_other() {
    let env = env();
    let c = corridor(&env);

    let listed = env.service.list(c.alice).unwrap();
    assert_eq!(listed.len(), 1);
    let matches = detached_matches(&listed[0].state);
    assert_eq!(matches.len(), 1);
    let Match::Single(single) = &matches[0] else {
        panic!("expected a single match");
    };
    assert_eq!(single.liane_request, c.bob_request.id);
    assert_eq!(single.user.pseudo, "bob");
    assert!((single.score - 0.4).abs() < 0.01, "score {}", single.score);
    assert_eq!(single.pickup.id, c.p2);
    assert_eq!(single.deposit.id, c.p3);

    // The overlap is most of bob's shorter route, so his score is higher.
    let listed = env.service.list(c.bob).unwrap();
    let matches = detached_matches(&listed[0].state);
    let Match::Single(single) = &matches[0] else {
        panic!("expected a single match");
    };
    assert_eq!(single.liane_request, c.alice_request.id);
    assert!(single.score > 0.4);
}

#[test]
fn disabled_requests_are_not_matched() {
    let env = env();
    let c = corridor(&env);

    env.service
        .update(
            c.bob,
            c.bob_request.id,
            UpdateLianeRequest { name: None, is_enabled: Some(false), round_trip: None },
        )
        .unwrap();

    let listed = env.service.list(c.alice).unwrap();
    assert!(detached_matches(&listed[0].state).is_empty());
}

#[test]
fn join_request_goes_pending_on_both_sides() {
    let env = env();
    let c = corridor(&env);

    assert!(env.service.join_request(c.bob, c.bob_request.id, c.alice_request.id).unwrap());

    let bob_view = env.service.list(c.bob).unwrap();
    let LianeState::Pending { liane } = &bob_view[0].state else {
        panic!("expected pending state");
    };
    assert_eq!(liane.id, c.alice_request.id);
    assert_eq!(liane.members.len(), 1);
    assert_eq!(liane.members[0].user.id, c.alice);
    assert_eq!(liane.pending_members.len(), 1);
    assert_eq!(liane.pending_members[0].user.id, c.bob);

    let alice_view = env.service.list(c.alice).unwrap();
    let LianeState::Pending { liane } = &alice_view[0].state else {
        panic!("expected pending state");
    };
    assert_eq!(liane.pending_members.len(), 1);

    // Re-requesting is allowed while still pending.
    assert!(env.service.join_request(c.bob, c.bob_request.id, c.alice_request.id).unwrap());

    // A request cannot join the group rooted at itself; like any other
    // double-submission this is a quiet false, not an error.
    assert!(!env.service.join_request(c.alice, c.alice_request.id, c.alice_request.id).unwrap());
}

#[test]
fn pending_requests_are_exclusive() {
    let env = env();
    let c = corridor(&env);
    let carol = register(&env, "carol");
    let carol_request = create_request(&env, carol, "covoiturage", &[c.p1, c.p4]);

    env.service.join_request(c.bob, c.bob_request.id, c.alice_request.id).unwrap();
    env.service.join_request(c.bob, c.bob_request.id, carol_request.id).unwrap();

    // The newer request replaced the older one.
    let leftovers = env
        .db
        .with_conn(|conn| queries::pending_rows_for_liane(conn, &c.alice_request.id.to_string()))
        .unwrap();
    assert!(leftovers.is_empty());

    let LianeState::Pending { liane } = &env.service.list(c.bob).unwrap()[0].state else {
        panic!("expected pending state");
    };
    assert_eq!(liane.id, carol_request.id);
}

#[test]
fn accept_attaches_member_and_notifies() {
    let env = env();
    let c = corridor(&env);
    env.service.join_request(c.bob, c.bob_request.id, c.alice_request.id).unwrap();

    let liane = env.service.accept(c.alice, c.bob_request.id, c.alice_request.id).unwrap();
    assert_eq!(liane.id, c.alice_request.id);
    assert_eq!(liane.members.len(), 2);
    assert!(liane.pending_members.is_empty());
    assert!(liane.member(c.alice).is_some());
    assert!(liane.member(c.bob).is_some());

    let bob_view = env.service.list(c.bob).unwrap();
    assert!(matches!(bob_view[0].state, LianeState::Attached { .. }));
    let alice_view = env.service.list(c.alice).unwrap();
    assert!(matches!(alice_view[0].state, LianeState::Attached { .. }));

    let events = env.dispatch.events.lock().unwrap();
    assert!(matches!(
        events.as_slice(),
        [LianeEvent::MemberAccepted { liane, liane_request, user }]
            if *liane == c.alice_request.id && *liane_request == c.bob_request.id && *user == c.bob
    ));

    let pushed = env.dispatch.messages.lock().unwrap();
    assert_eq!(pushed.len(), 2);
    assert!(matches!(pushed[0].content, MessageContent::MemberRequested { .. }));
    assert!(matches!(pushed[1].content, MessageContent::MemberAdded { .. }));

    // Accepting a second time finds no pending row.
    let again = env.service.accept(c.alice, c.bob_request.id, c.alice_request.id);
    assert!(matches!(again, Err(EngineError::NotFound)));
}

#[test]
fn only_members_can_decide() {
    let env = env();
    let c = corridor(&env);
    let mallory = register(&env, "mallory");
    env.service.join_request(c.bob, c.bob_request.id, c.alice_request.id).unwrap();

    let denied = env.service.accept(mallory, c.bob_request.id, c.alice_request.id);
    assert!(matches!(denied, Err(EngineError::Unauthorized)));
    let denied = env.service.reject(mallory, c.bob_request.id, c.alice_request.id);
    assert!(matches!(denied, Err(EngineError::Unauthorized)));
}

#[test]
fn reject_removes_pending_row() {
    let env = env();
    let c = corridor(&env);
    env.service.join_request(c.bob, c.bob_request.id, c.alice_request.id).unwrap();

    env.service.reject(c.alice, c.bob_request.id, c.alice_request.id).unwrap();

    let bob_view = env.service.list(c.bob).unwrap();
    assert!(matches!(bob_view[0].state, LianeState::Detached { .. }));

    let events = env.dispatch.events.lock().unwrap();
    assert!(matches!(events.as_slice(), [LianeEvent::MemberRejected { .. }]));

    // Rejecting after the row is gone is a not-found, also when the row
    // was consumed by an acceptance instead.
    let again = env.service.reject(c.alice, c.bob_request.id, c.alice_request.id);
    assert!(matches!(again, Err(EngineError::NotFound)));
}

#[test]
fn reject_after_accept_is_not_found() {
    let env = env();
    let c = corridor(&env);
    env.service.join_request(c.bob, c.bob_request.id, c.alice_request.id).unwrap();
    env.service.accept(c.alice, c.bob_request.id, c.alice_request.id).unwrap();

    let rejected = env.service.reject(c.alice, c.bob_request.id, c.alice_request.id);
    assert!(matches!(rejected, Err(EngineError::NotFound)));
}

#[test]
fn leave_withdraws_membership() {
    let env = env();
    let c = corridor(&env);
    env.service.join_request(c.bob, c.bob_request.id, c.alice_request.id).unwrap();
    env.service.accept(c.alice, c.bob_request.id, c.alice_request.id).unwrap();

    assert!(env.service.leave(c.bob, c.alice_request.id).unwrap());

    let bob_view = env.service.list(c.bob).unwrap();
    assert!(matches!(bob_view[0].state, LianeState::Detached { .. }));

    let pushed = env.dispatch.messages.lock().unwrap();
    assert!(matches!(pushed.last().unwrap().content, MessageContent::MemberLeft { .. }));

    // Leaving twice: the membership row no longer exists.
    drop(pushed);
    assert!(!env.service.leave(c.bob, c.alice_request.id).unwrap());
}

#[test]
fn delete_is_idempotent_and_owner_only() {
    let env = env();
    let c = corridor(&env);

    // Deleting someone else's request changes nothing and raises nothing.
    env.service.delete(c.bob, c.alice_request.id).unwrap();
    assert_eq!(env.service.list(c.alice).unwrap().len(), 1);

    env.service.delete(c.alice, c.alice_request.id).unwrap();
    env.service.delete(c.alice, c.alice_request.id).unwrap();

    assert!(env.service.list(c.alice).unwrap().is_empty());
}

#[test]
fn grouped_candidates_are_proposed_as_one_match() {
    let env = env();
    let c = corridor(&env);
    let carol = register(&env, "carol");
    let carol_request = create_request(&env, carol, "navette", &[c.p2, c.p3]);

    // bob and carol form a liane rooted at bob's request.
    env.service.join_request(carol, carol_request.id, c.bob_request.id).unwrap();
    env.service.accept(c.bob, carol_request.id, c.bob_request.id).unwrap();

    let listed = env.service.list(c.alice).unwrap();
    let matches = detached_matches(&listed[0].state);
    assert_eq!(matches.len(), 1);
    let Match::Group(group) = &matches[0] else {
        panic!("expected a group match");
    };
    assert_eq!(group.liane.id, c.bob_request.id);
    assert_eq!(group.liane.members.len(), 2);
    assert_eq!(group.matches.len(), 2);
    // The group carries its best member's score and stops.
    assert!(group.matches.iter().all(|m| m.score <= group.score));
}

#[test]
fn join_via_an_attached_request_lands_on_its_group() {
    let env = env();
    let c = corridor(&env);
    let carol = register(&env, "carol");
    let carol_request = create_request(&env, carol, "navette", &[c.p2, c.p3]);

    env.service.join_request(carol, carol_request.id, c.bob_request.id).unwrap();
    env.service.accept(c.bob, carol_request.id, c.bob_request.id).unwrap();

    // Targeting carol's request resolves to the group rooted at bob's.
    assert!(env.service.join_request(c.alice, c.alice_request.id, carol_request.id).unwrap());
    let liane = env.service.get_liane(c.bob, c.bob_request.id).unwrap();
    assert_eq!(liane.pending_members.len(), 1);
    assert_eq!(liane.pending_members[0].liane_request.id, c.alice_request.id);
}

#[test]
fn list_resolves_each_request_to_its_own_state() {
    let env = env();
    let c = corridor(&env);
    let carol = register(&env, "carol");
    let carol_request = create_request(&env, carol, "navette", &[c.p2, c.p3]);

    // bob attaches to alice's group, carol's request stays outstanding.
    env.service.join_request(c.bob, c.bob_request.id, c.alice_request.id).unwrap();
    env.service.accept(c.alice, c.bob_request.id, c.alice_request.id).unwrap();
    env.service.join_request(carol, carol_request.id, c.alice_request.id).unwrap();

    // A second commute for bob, far away from the corridor.
    let p5 = add_point(&env, "Rodez", 4.0, 0.0);
    let p6 = add_point(&env, "Onet", 4.0, 0.5);
    let lonely = create_request(&env, c.bob, "week-end", &[p5, p6]);

    let bob_view = env.service.list(c.bob).unwrap();
    assert_eq!(bob_view.len(), 2);
    let by_id = |id: Uuid| bob_view.iter().find(|m| m.liane_request.id == id).unwrap();
    assert!(matches!(by_id(c.bob_request.id).state, LianeState::Attached { .. }));
    assert!(detached_matches(&by_id(lonely.id).state).is_empty());

    let alice_view = env.service.list(c.alice).unwrap();
    let LianeState::Attached { liane } = &alice_view[0].state else {
        panic!("expected attached state");
    };
    assert_eq!(liane.members.len(), 2);
    assert_eq!(liane.pending_members.len(), 1);

    let carol_view = env.service.list(carol).unwrap();
    assert!(matches!(carol_view[0].state, LianeState::Pending { .. }));
}

#[test]
fn unread_counts_come_from_three_sources() {
    let env = env();
    let c = corridor(&env);

    assert!(env.messages.unread_counts(c.alice).unwrap().is_empty());

    env.service.join_request(c.bob, c.bob_request.id, c.alice_request.id).unwrap();

    // One pending join request on alice's root, one outstanding request
    // for bob.
    let alice_counts = env.messages.unread_counts(c.alice).unwrap();
    assert_eq!(alice_counts.get(&c.alice_request.id), Some(&1));
    let bob_counts = env.messages.unread_counts(c.bob).unwrap();
    assert_eq!(bob_counts.get(&c.alice_request.id), Some(&1));

    env.service.accept(c.alice, c.bob_request.id, c.alice_request.id).unwrap();

    // The pending rows are gone; each side now has one unread system
    // message authored by the other: bob's join request for alice, and
    // alice's acceptance notice for bob.
    let alice_counts = env.messages.unread_counts(c.alice).unwrap();
    assert_eq!(alice_counts.get(&c.alice_request.id), Some(&1));
    let bob_counts = env.messages.unread_counts(c.bob).unwrap();
    assert_eq!(bob_counts.get(&c.alice_request.id), Some(&1));

    env.messages.send_message(c.bob, c.alice_request.id, "on part à 8h ?").unwrap();
    let alice_counts = env.messages.unread_counts(c.alice).unwrap();
    assert_eq!(alice_counts.get(&c.alice_request.id), Some(&2));

    // Reading the conversation clears the counter.
    env.messages
        .get_messages(c.alice, c.alice_request.id, &Pagination::default())
        .unwrap();
    assert!(env.messages.unread_counts(c.alice).unwrap().is_empty());
}

#[test]
fn conversation_flow() {
    let env = env();
    let c = corridor(&env);
    env.service.join_request(c.bob, c.bob_request.id, c.alice_request.id).unwrap();
    env.service.accept(c.alice, c.bob_request.id, c.alice_request.id).unwrap();

    let sent = env.messages.send_message(c.bob, c.alice_request.id, "salut !").unwrap();
    assert!(sent.is_some());

    // Whitespace-only input is dropped without error.
    let dropped = env.messages.send_message(c.bob, c.alice_request.id, "   \n").unwrap();
    assert!(dropped.is_none());

    let page = env
        .messages
        .get_messages(c.alice, c.alice_request.id, &Pagination::default())
        .unwrap();
    // Newest first: the text, then MemberAdded, then MemberRequested.
    assert_eq!(page.data.len(), 3);
    assert_eq!(page.data[0].content.text(), "salut !");
    assert!(matches!(page.data[1].content, MessageContent::MemberAdded { .. }));
    assert!(matches!(page.data[2].content, MessageContent::MemberRequested { .. }));
    assert_eq!(page.total, 3);
    assert!(page.next_cursor.is_none());

    // Outsiders can neither read nor write.
    let mallory = register(&env, "mallory");
    assert!(matches!(
        env.messages.get_messages(mallory, c.alice_request.id, &Pagination::default()),
        Err(EngineError::Unauthorized)
    ));
    assert!(matches!(
        env.messages.send_message(mallory, c.alice_request.id, "coucou"),
        Err(EngineError::Unauthorized)
    ));
}

#[test]
fn pending_members_read_but_do_not_write() {
    let env = env();
    let c = corridor(&env);
    env.service.join_request(c.bob, c.bob_request.id, c.alice_request.id).unwrap();

    let page = env
        .messages
        .get_messages(c.bob, c.alice_request.id, &Pagination::default())
        .unwrap();
    assert_eq!(page.data.len(), 1);

    assert!(matches!(
        env.messages.send_message(c.bob, c.alice_request.id, "je suis là"),
        Err(EngineError::Unauthorized)
    ));
}

#[test]
fn message_pagination_walks_backwards() {
    let env = env();
    let c = corridor(&env);
    env.service.join_request(c.bob, c.bob_request.id, c.alice_request.id).unwrap();
    env.service.accept(c.alice, c.bob_request.id, c.alice_request.id).unwrap();

    for i in 0..5 {
        env.messages
            .send_message(c.bob, c.alice_request.id, &format!("message {i}"))
            .unwrap();
    }

    let first = env
        .messages
        .get_messages(c.alice, c.alice_request.id, &Pagination { cursor: None, limit: 3 })
        .unwrap();
    assert_eq!(first.data.len(), 3);
    assert_eq!(first.total, 7);
    let cursor = first.next_cursor.clone().expect("a full page has a next cursor");

    let second = env
        .messages
        .get_messages(
            c.alice,
            c.alice_request.id,
            &Pagination { cursor: Some(cursor), limit: 3 },
        )
        .unwrap();
    assert_eq!(second.data.len(), 3);

    let first_ids: Vec<Uuid> = first.data.iter().map(|m| m.id).collect();
    assert!(second.data.iter().all(|m| !first_ids.contains(&m.id)));
    assert!(second.data.iter().all(|m| m.created_at <= first.data[2].created_at));
}

#[test]
fn mark_as_read_moves_the_marker() {
    let env = env();
    let c = corridor(&env);
    env.service.join_request(c.bob, c.bob_request.id, c.alice_request.id).unwrap();
    env.service.accept(c.alice, c.bob_request.id, c.alice_request.id).unwrap();
    env.messages.send_message(c.bob, c.alice_request.id, "bonjour").unwrap();

    assert!(!env.messages.unread_counts(c.alice).unwrap().is_empty());
    env.messages.mark_as_read(c.alice, c.alice_request.id, None).unwrap();
    assert!(env.messages.unread_counts(c.alice).unwrap().is_empty());

    let outsider = register(&env, "mallory");
    assert!(matches!(
        env.messages.mark_as_read(outsider, c.alice_request.id, None),
        Err(EngineError::Unauthorized)
    ));
}

#[test]
fn join_trip_orients_pickup_and_deposit() {
    let env = env();
    let c = corridor(&env);
    env.service.join_request(c.bob, c.bob_request.id, c.alice_request.id).unwrap();
    env.service.accept(c.alice, c.bob_request.id, c.alice_request.id).unwrap();

    let now = Utc::now();
    let outbound = env
        .service
        .create_trip(c.alice, c.alice_request.id, vec![c.p1, c.p2, c.p3], now)
        .unwrap();
    assert!(env.service.join_trip(c.bob, outbound.id).unwrap());
    assert_eq!(trip_member_stops(&env, outbound.id, c.bob), (c.p2, c.p3));

    // The same commute on the return leg passes the stops reversed.
    let inbound = env
        .service
        .create_trip(c.alice, c.alice_request.id, vec![c.p3, c.p2, c.p1], now)
        .unwrap();
    assert!(env.service.join_trip(c.bob, inbound.id).unwrap());
    assert_eq!(trip_member_stops(&env, inbound.id, c.bob), (c.p3, c.p2));

    // A trip skipping the shared section has nowhere to pick bob up.
    let elsewhere = env
        .service
        .create_trip(c.alice, c.alice_request.id, vec![c.p1, c.p3], now)
        .unwrap();
    assert!(!env.service.join_trip(c.bob, elsewhere.id).unwrap());

    let outsider = register(&env, "mallory");
    assert!(matches!(
        env.service.join_trip(outsider, outbound.id),
        Err(EngineError::Unauthorized)
    ));
    assert!(matches!(
        env.service.join_trip(c.bob, Uuid::new_v4()),
        Err(EngineError::NotFound)
    ));
}

fn trip_member_stops(env: &TestEnv, trip_id: Uuid, user: Uuid) -> (Uuid, Uuid) {
    env.db
        .with_conn(|conn| {
            conn.query_row(
                "SELECT pickup, deposit FROM trip_members WHERE trip_id = ?1 AND user_id = ?2",
                [trip_id.to_string(), user.to_string()],
                |row| {
                    let pickup: String = row.get(0)?;
                    let deposit: String = row.get(1)?;
                    Ok((pickup.parse().unwrap(), deposit.parse().unwrap()))
                },
            )
        })
        .unwrap()
}
