use anyhow::Context;
use rusqlite::Connection;

// Migrations are embedded so that in-memory databases (tests) get the
// full schema without a migrations directory on disk.
const MIGRATIONS: &[(&str, &str)] = &[(
    "001_init",
    "CREATE TABLE IF NOT EXISTS facilities (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        address TEXT NOT NULL,
        total_slots INTEGER NOT NULL CHECK (total_slots > 0),
        price_per_hour REAL NOT NULL CHECK (price_per_hour >= 0),
        open_time TEXT NOT NULL DEFAULT '00:00',
        close_time TEXT NOT NULL DEFAULT '23:59',
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS occupied_slots (
        facility_id TEXT NOT NULL REFERENCES facilities(id),
        slot_number INTEGER NOT NULL,
        booking_id TEXT NOT NULL,
        booked_at TEXT NOT NULL,
        PRIMARY KEY (facility_id, slot_number)
    );

    -- no FK on facility_id: bookings are retained as history and must
    -- outlive a deleted facility
    CREATE TABLE IF NOT EXISTS bookings (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        facility_id TEXT NOT NULL,
        slot_number INTEGER NOT NULL,
        start_time TEXT NOT NULL,
        end_time TEXT NOT NULL,
        duration_hours INTEGER NOT NULL,
        total_price REAL NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        payment_status TEXT NOT NULL DEFAULT 'pending',
        payment_method TEXT NOT NULL,
        payment_id TEXT,
        vehicle_type TEXT NOT NULL,
        vehicle_number TEXT NOT NULL,
        vehicle_model TEXT,
        vehicle_color TEXT,
        check_in_time TEXT,
        check_out_time TEXT,
        cancellation_reason TEXT,
        refund_amount REAL NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_bookings_user ON bookings(user_id, created_at);
    CREATE INDEX IF NOT EXISTS idx_bookings_facility_status ON bookings(facility_id, status);

    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT,
        phone TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );",
)];

pub fn run_migrations(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .context("failed to create migrations table")?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .context("failed to check migration status")?;

        if already_applied {
            continue;
        }

        conn.execute_batch(sql)
            .with_context(|| format!("failed to apply migration: {name}"))?;

        conn.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])
            .with_context(|| format!("failed to record migration: {name}"))?;

        tracing::info!("applied migration: {name}");
    }

    Ok(())
}
