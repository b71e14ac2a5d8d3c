// SPDX-FileCopyrightText: 2026 Cloak Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! On-disk store file: connection setup and embedded schema migrations.
//!
//! The store runs in rollback-journal mode so that, between transactions,
//! `vault.db` alone holds the complete database. The locked artifact captures
//! exactly those bytes.

use std::path::Path;
use std::time::Duration;

use cloak_core::CloakError;
use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;
use tracing::debug;

/// Live store file name inside a store directory.
pub const STORE_FILE: &str = "vault.db";

/// Locked-artifact file name, sibling of [`STORE_FILE`].
pub const LOCKED_FILE: &str = "vault.locked";

/// Rollback journal SQLite may leave behind after a crash.
pub const JOURNAL_FILE: &str = "vault.db-journal";

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Open (creating if needed) the store file and bring its schema up to date.
pub async fn open_store(path: &Path) -> Result<Connection, CloakError> {
    let conn = Connection::open(path)
        .await
        .map_err(|e| CloakError::Storage { source: Box::new(e) })?;

    conn.call(|conn| -> Result<(), rusqlite::Error> {
        conn.busy_timeout(Duration::from_secs(5))?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "DELETE", |row| row.get(0))?;
        debug!(journal_mode = %mode, "store pragmas applied");
        Ok(())
    })
    .await
    .map_err(map_tr_err)?;

    conn.call(|conn| -> Result<(), refinery::Error> {
        embedded::migrations::runner().run(conn)?;
        Ok(())
    })
    .await
    .map_err(|e| CloakError::Storage {
        source: format!("store migration failed: {e}").into(),
    })?;

    debug!(path = %path.display(), "store opened");
    Ok(conn)
}

/// `(ciphertext, iv)` of one stored value.
pub(crate) type SealedValue = (Vec<u8>, Vec<u8>);

/// Any one ciphertext in the store, current or archived, to test a key against.
pub(crate) async fn sample_ciphertext(
    conn: &Connection,
) -> Result<Option<SealedValue>, CloakError> {
    conn.call(|conn| -> Result<Option<SealedValue>, rusqlite::Error> {
        conn.query_row(
            "SELECT ciphertext, iv FROM secrets
             UNION ALL
             SELECT ciphertext, iv FROM secret_history
             LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
    })
    .await
    .map_err(map_tr_err)
}

/// Convert a tokio-rusqlite error into the shared storage error.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> CloakError {
    CloakError::Storage {
        source: format!("vault database error: {e}").into(),
    }
}
