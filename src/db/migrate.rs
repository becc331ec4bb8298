use rusqlite::{Connection, TransactionBehavior, params};
use crate::error::{Result, AffinityError};

/// Migration metadata
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

/// Schema migrations compiled into the binary, in version order
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "001_contact_graph",
        sql: include_str!("../../migrations/001_contact_graph.sql"),
    },
];

/// Create schema_migrations table if it doesn't exist
fn ensure_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get versions of applied migrations
pub fn get_applied_versions(conn: &Connection) -> Result<Vec<u32>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations ORDER BY version")?;
    let versions: Vec<u32> = stmt
        .query_map([], |row| row.get::<_, u32>(0))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(versions)
}

/// Run all pending migrations
///
/// Each migration takes the write lock before checking whether it was
/// applied, so connections racing on a fresh database apply it once.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    ensure_migrations_table(conn)?;

    for migration in MIGRATIONS {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if get_applied_versions(&tx)?.contains(&migration.version) {
            log::debug!("Migration {} already applied, skipping", migration.name);
            continue;
        }

        log::info!("Applying migration: {} (version {})", migration.name, migration.version);

        tx.execute_batch(migration.sql).map_err(|e| {
            AffinityError::Configuration(format!("failed to execute migration {}: {}", migration.name, e))
        })?;

        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )?;

        tx.commit()?;
    }

    Ok(())
}
