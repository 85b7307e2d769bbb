use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            pseudo      TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS rallying_points (
            id          TEXT PRIMARY KEY,
            label       TEXT NOT NULL,
            lat         REAL NOT NULL,
            lng         REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS liane_requests (
            id              TEXT PRIMARY KEY,
            name            TEXT NOT NULL,
            way_points      TEXT NOT NULL,
            round_trip      INTEGER NOT NULL DEFAULT 0,
            arrive_before   TEXT NOT NULL,
            return_after    TEXT NOT NULL,
            can_drive       INTEGER NOT NULL DEFAULT 0,
            week_days       INTEGER NOT NULL,
            is_enabled      INTEGER NOT NULL DEFAULT 1,
            created_by      TEXT NOT NULL REFERENCES users(id),
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_liane_requests_user
            ON liane_requests(created_by);

        -- Membership rows. liane_id is a liane_request id reused as the
        -- group identity, so there is no separate liane table to reference.
        CREATE TABLE IF NOT EXISTS liane_members (
            liane_request_id    TEXT NOT NULL REFERENCES liane_requests(id),
            liane_id            TEXT NOT NULL,
            requested_at        TEXT NOT NULL,
            joined_at           TEXT,
            last_read_at        TEXT,
            PRIMARY KEY (liane_request_id, liane_id)
        );

        CREATE INDEX IF NOT EXISTS idx_liane_members_liane
            ON liane_members(liane_id, joined_at);

        CREATE TABLE IF NOT EXISTS liane_messages (
            id          TEXT PRIMARY KEY,
            liane_id    TEXT NOT NULL,
            content     TEXT NOT NULL,
            created_by  TEXT NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_liane_messages_liane
            ON liane_messages(liane_id, created_at);

        -- Route geometry cache, keyed by the exact waypoint-id sequence so
        -- repeated creates with the same sequence never recompute geometry.
        CREATE TABLE IF NOT EXISTS routes (
            way_points  TEXT PRIMARY KEY,
            geometry    TEXT NOT NULL,
            distance    REAL NOT NULL,
            duration    REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS trips (
            id              TEXT PRIMARY KEY,
            liane_id        TEXT NOT NULL,
            driver_id       TEXT NOT NULL REFERENCES users(id),
            way_points      TEXT NOT NULL,
            departure_time  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS trip_members (
            trip_id     TEXT NOT NULL REFERENCES trips(id),
            user_id     TEXT NOT NULL REFERENCES users(id),
            pickup      TEXT NOT NULL,
            deposit     TEXT NOT NULL,
            PRIMARY KEY (trip_id, user_id)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
