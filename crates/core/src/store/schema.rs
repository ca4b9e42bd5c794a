use rusqlite::{params, Connection};

use crate::error::{Error, Result};

pub const SCHEMA_VERSION: u32 = 1;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS images (
            key   INTEGER PRIMARY KEY AUTOINCREMENT,
            body  TEXT NOT NULL CHECK (json_valid(body))
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_images_id ON images(
            (CASE WHEN json_type(body, '$.id') = 'integer' THEN json_extract(body, '$.id') END)
        );

        CREATE TABLE IF NOT EXISTS albums (
            key   INTEGER PRIMARY KEY AUTOINCREMENT,
            body  TEXT NOT NULL CHECK (json_valid(body))
        );

        CREATE TABLE IF NOT EXISTS config (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

/// Stamp or verify `schema_version` in the config table.
pub fn migrate(conn: &Connection) -> Result<()> {
    let current: Option<String> = conn
        .query_row(
            "SELECT value FROM config WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .ok();

    match current {
        None => {
            conn.execute(
                "INSERT INTO config (key, value) VALUES ('schema_version', ?1)",
                params![SCHEMA_VERSION.to_string()],
            )?;
        }
        Some(v) => {
            let db = v.parse::<u32>().map_err(|_| Error::InvalidConfig {
                key: "schema_version".to_string(),
                value: v.clone(),
            })?;
            if db > SCHEMA_VERSION {
                return Err(Error::SchemaTooNew {
                    db,
                    code: SCHEMA_VERSION,
                });
            }
        }
    }
    Ok(())
}
