use ::duckdb::Connection;

struct Migration {
    version: &'static str,
    sql: &'static str,
}

// The price table itself is recreated on every replace and so has no migration.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_ingest_log",
        sql: r#"
CREATE TABLE IF NOT EXISTS ingest_log (
    run_id TEXT PRIMARY KEY,
    table_name TEXT NOT NULL,
    started_at TIMESTAMP,
    attempted BIGINT NOT NULL,
    succeeded BIGINT NOT NULL,
    empty BIGINT NOT NULL,
    failed BIGINT NOT NULL,
    row_count BIGINT NOT NULL,
    elapsed_ms BIGINT NOT NULL,
    logged_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    },
    Migration {
        version: "0002_ingest_log_indexes",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_ingest_log_table_logged_at ON ingest_log(table_name, logged_at);
"#,
    },
];

pub fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        let query = format!(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = '{}'",
            migration.version
        );
        let applied_count: i64 = connection.query_row(query.as_str(), [], |row| row.get(0))?;

        if applied_count == 0 {
            connection.execute_batch(migration.sql)?;
            let insert = format!(
                "INSERT INTO schema_migrations (version) VALUES ('{}')",
                migration.version
            );
            connection.execute_batch(insert.as_str())?;
        }
    }

    Ok(())
}
