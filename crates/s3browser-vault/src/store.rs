//! SQLite-backed connection-profile store
//!
//! Two tables: `metadata` (encryption salt, key-check canary) and
//! `connections`. The database runs in WAL mode so readers never block
//! the single writer. Every logical operation is one transaction on a
//! connection behind a mutex; operations are short and never perform I/O
//! beyond the database file itself.

use crate::crypto::{KEY_CHECK_CANARY, SALT_LEN, SecretCipher};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use s3browser_common::key::{validate_endpoint, validate_profile_name};
use s3browser_common::types::ConnectionRecord;
use s3browser_common::{Error, Result};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

const METADATA_SALT_KEY: &str = "encryption_salt";
const METADATA_KEY_CHECK_KEY: &str = "key_check";

/// Parameters for inserting or updating a connection profile.
#[derive(Clone, Debug, Default)]
pub struct SaveConnection {
    /// `None` inserts a new profile; `Some` updates an existing one.
    pub id: Option<i64>,
    pub profile_name: String,
    pub endpoint: String,
    pub access_key_id: String,
    /// Required on insert; `None` on update keeps the stored ciphertext.
    pub secret: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub auto_detect_region: bool,
}

/// The encrypted profile vault.
pub struct Vault {
    conn: Mutex<Connection>,
    cipher: SecretCipher,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault").finish_non_exhaustive()
    }
}

impl Vault {
    /// Open (or initialize) the vault at `db_path` with the given master
    /// secret.
    ///
    /// First use creates the schema, generates the salt and seals the
    /// key-check canary. Later opens re-derive the key and verify the
    /// canary; a mismatch is fatal and surfaced as a configuration
    /// error before any profile secret is touched.
    pub fn open(db_path: &Path, master_secret: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .map_err(|e| Error::configuration(format!("cannot open vault: {e}")))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| Error::configuration(format!("cannot enable WAL: {e}")))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS metadata (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS connections (
                id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                profile_name       TEXT NOT NULL UNIQUE,
                endpoint           TEXT NOT NULL,
                access_key_id      TEXT NOT NULL,
                secret_ciphertext  BLOB NOT NULL,
                bucket             TEXT,
                region             TEXT,
                auto_detect_region INTEGER NOT NULL DEFAULT 1,
                last_used_at       INTEGER NOT NULL
            );",
        )
        .map_err(|e| Error::configuration(format!("cannot create vault schema: {e}")))?;

        let salt_b64: Option<String> = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                params![METADATA_SALT_KEY],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_db_err)?;
        let key_check_b64: Option<String> = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                params![METADATA_KEY_CHECK_KEY],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_db_err)?;
        let connection_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM connections", [], |row| row.get(0))
            .map_err(map_db_err)?;

        let cipher = match (salt_b64, key_check_b64) {
            (Some(salt_b64), Some(key_check_b64)) => {
                let salt = BASE64.decode(&salt_b64).map_err(|_| {
                    Error::configuration("malformed encryption salt in vault metadata")
                })?;
                if salt.len() != SALT_LEN {
                    return Err(Error::configuration(format!(
                        "malformed encryption salt: expected {SALT_LEN} bytes, got {}",
                        salt.len()
                    )));
                }
                let cipher = SecretCipher::derive(master_secret, &salt)?;
                let key_check = BASE64.decode(&key_check_b64).map_err(|_| {
                    Error::configuration("malformed key check in vault metadata")
                })?;
                if cipher.open(&key_check)? != KEY_CHECK_CANARY {
                    return Err(Error::configuration("encryption key mismatch"));
                }
                cipher
            }
            _ if connection_count > 0 => {
                // Ciphertext exists but nothing proves the key matches:
                // either a partially created database or a replaced
                // metadata row. Refuse rather than decrypt garbage.
                return Err(Error::configuration(
                    "vault has stored secrets but no key check; the database is \
                     partially initialized or its metadata was replaced",
                ));
            }
            _ => {
                let salt = SecretCipher::generate_salt();
                let cipher = SecretCipher::derive(master_secret, &salt)?;
                let key_check = cipher.seal(KEY_CHECK_CANARY)?;
                conn.execute(
                    "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
                    params![METADATA_SALT_KEY, BASE64.encode(salt)],
                )
                .map_err(map_db_err)?;
                conn.execute(
                    "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
                    params![METADATA_KEY_CHECK_KEY, BASE64.encode(key_check)],
                )
                .map_err(map_db_err)?;
                info!(path = %db_path.display(), "initialized vault");
                cipher
            }
        };

        Ok(Self {
            conn: Mutex::new(conn),
            cipher,
        })
    }

    /// Insert or update a connection profile and return the stored
    /// record.
    pub fn save_connection(&self, save: SaveConnection) -> Result<ConnectionRecord> {
        validate_profile_name(&save.profile_name)?;
        validate_endpoint(&save.endpoint)?;
        if save.access_key_id.is_empty() {
            return Err(Error::invalid_input("access key id must not be empty"));
        }
        let now = unix_now();
        let conn = self.conn.lock();

        let id = match save.id {
            None => {
                let secret = save.secret.as_deref().ok_or_else(|| {
                    Error::invalid_input("a secret is required when creating a connection")
                })?;
                let ciphertext = self.cipher.seal(secret.as_bytes())?;
                conn.execute(
                    "INSERT INTO connections
                        (profile_name, endpoint, access_key_id, secret_ciphertext,
                         bucket, region, auto_detect_region, last_used_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        save.profile_name,
                        save.endpoint,
                        save.access_key_id,
                        ciphertext,
                        save.bucket,
                        save.region,
                        save.auto_detect_region,
                        now,
                    ],
                )
                .map_err(|e| map_save_err(&e, &save.profile_name))?;
                conn.last_insert_rowid()
            }
            Some(id) => {
                let updated = match save.secret.as_deref() {
                    Some(secret) => {
                        let ciphertext = self.cipher.seal(secret.as_bytes())?;
                        conn.execute(
                            "UPDATE connections SET
                                profile_name = ?1, endpoint = ?2, access_key_id = ?3,
                                secret_ciphertext = ?4, bucket = ?5, region = ?6,
                                auto_detect_region = ?7, last_used_at = ?8
                             WHERE id = ?9",
                            params![
                                save.profile_name,
                                save.endpoint,
                                save.access_key_id,
                                ciphertext,
                                save.bucket,
                                save.region,
                                save.auto_detect_region,
                                now,
                                id,
                            ],
                        )
                        .map_err(|e| map_save_err(&e, &save.profile_name))?
                    }
                    None => conn
                        .execute(
                            "UPDATE connections SET
                                profile_name = ?1, endpoint = ?2, access_key_id = ?3,
                                bucket = ?4, region = ?5, auto_detect_region = ?6,
                                last_used_at = ?7
                             WHERE id = ?8",
                            params![
                                save.profile_name,
                                save.endpoint,
                                save.access_key_id,
                                save.bucket,
                                save.region,
                                save.auto_detect_region,
                                now,
                                id,
                            ],
                        )
                        .map_err(|e| map_save_err(&e, &save.profile_name))?,
                };
                if updated == 0 {
                    return Err(Error::not_found(format!("connection {id} does not exist")));
                }
                id
            }
        };

        query_record(&conn, id)?
            .ok_or_else(|| Error::internal("saved connection vanished"))
    }

    /// Fetch one profile by id.
    pub fn get_connection(&self, id: i64) -> Result<ConnectionRecord> {
        let conn = self.conn.lock();
        query_record(&conn, id)?
            .ok_or_else(|| Error::not_found(format!("connection {id} does not exist")))
    }

    /// List profiles, most recently used first.
    pub fn list_connections(&self) -> Result<Vec<ConnectionRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, profile_name, endpoint, access_key_id, bucket, region,
                        auto_detect_region, last_used_at
                 FROM connections ORDER BY last_used_at DESC, id DESC",
            )
            .map_err(map_db_err)?;
        let rows = stmt
            .query_map([], row_to_record)
            .map_err(map_db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(map_db_err)?;
        Ok(rows)
    }

    /// Delete a profile; returns whether a row was removed.
    pub fn delete_connection(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let removed = conn
            .execute("DELETE FROM connections WHERE id = ?1", params![id])
            .map_err(map_db_err)?;
        Ok(removed > 0)
    }

    /// Refresh `last_used_at` for a profile.
    pub fn touch(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE connections SET last_used_at = ?1 WHERE id = ?2",
            params![unix_now(), id],
        )
        .map_err(map_db_err)?;
        Ok(())
    }

    /// Decrypt the stored secret for one profile. Callers materialize an
    /// S3 client from it and must not retain the plaintext.
    pub fn decrypt_secret(&self, id: i64) -> Result<String> {
        let ciphertext: Vec<u8> = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT secret_ciphertext FROM connections WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_db_err)?
            .ok_or_else(|| Error::not_found(format!("connection {id} does not exist")))?
        };
        let plaintext = self.cipher.open(&ciphertext)?;
        String::from_utf8(plaintext)
            .map_err(|_| Error::internal("decrypted secret is not valid UTF-8"))
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn query_record(conn: &Connection, id: i64) -> Result<Option<ConnectionRecord>> {
    conn.query_row(
        "SELECT id, profile_name, endpoint, access_key_id, bucket, region,
                auto_detect_region, last_used_at
         FROM connections WHERE id = ?1",
        params![id],
        row_to_record,
    )
    .optional()
    .map_err(map_db_err)
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConnectionRecord> {
    Ok(ConnectionRecord {
        id: row.get(0)?,
        profile_name: row.get(1)?,
        endpoint: row.get(2)?,
        access_key_id: row.get(3)?,
        bucket: row.get(4)?,
        region: row.get(5)?,
        auto_detect_region: row.get(6)?,
        last_used_at: row.get(7)?,
    })
}

fn map_db_err(err: rusqlite::Error) -> Error {
    Error::internal(format!("vault query failed: {err}"))
}

fn map_save_err(err: &rusqlite::Error, profile_name: &str) -> Error {
    if let rusqlite::Error::SqliteFailure(failure, _) = err {
        if failure.code == rusqlite::ErrorCode::ConstraintViolation {
            return Error::conflict(format!(
                "a connection named {profile_name:?} already exists"
            ));
        }
    }
    Error::internal(format!("vault write failed: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MASTER: &str = "an encryption key with plenty of length";

    fn new_save(name: &str) -> SaveConnection {
        SaveConnection {
            id: None,
            profile_name: name.to_string(),
            endpoint: "https://s3.amazonaws.com".to_string(),
            access_key_id: "AKIAEXAMPLE".to_string(),
            secret: Some("wJalrXUtnFEMI/K7MDENG/bPxRfiCY".to_string()),
            bucket: None,
            region: None,
            auto_detect_region: true,
        }
    }

    fn open_vault(dir: &TempDir, master: &str) -> Result<Vault> {
        Vault::open(&dir.path().join("s3browser.db"), master)
    }

    #[test]
    fn test_insert_and_get() {
        let dir = TempDir::new().unwrap();
        let vault = open_vault(&dir, MASTER).unwrap();
        let record = vault.save_connection(new_save("aws-dev")).unwrap();
        assert_eq!(record.profile_name, "aws-dev");
        assert!(record.id > 0);
        let fetched = vault.get_connection(record.id).unwrap();
        assert_eq!(fetched, record);
    }

    #[test]
    fn test_insert_requires_secret() {
        let dir = TempDir::new().unwrap();
        let vault = open_vault(&dir, MASTER).unwrap();
        let mut save = new_save("aws-dev");
        save.secret = None;
        assert!(vault.save_connection(save).is_err());
    }

    #[test]
    fn test_profile_name_uniqueness() {
        let dir = TempDir::new().unwrap();
        let vault = open_vault(&dir, MASTER).unwrap();
        vault.save_connection(new_save("aws-dev")).unwrap();
        let mut dup = new_save("aws-dev");
        dup.endpoint = "https://minio.internal".to_string();
        let err = vault.save_connection(dup).unwrap_err();
        assert_eq!(err.api_code(), "conflict");
    }

    #[test]
    fn test_update_keeps_secret_when_omitted() {
        let dir = TempDir::new().unwrap();
        let vault = open_vault(&dir, MASTER).unwrap();
        let record = vault.save_connection(new_save("aws-dev")).unwrap();
        let mut update = new_save("aws-dev-renamed");
        update.id = Some(record.id);
        update.secret = None;
        vault.save_connection(update).unwrap();
        assert_eq!(
            vault.decrypt_secret(record.id).unwrap(),
            "wJalrXUtnFEMI/K7MDENG/bPxRfiCY"
        );
    }

    #[test]
    fn test_update_unknown_id_is_not_found() {
        let dir = TempDir::new().unwrap();
        let vault = open_vault(&dir, MASTER).unwrap();
        let mut update = new_save("ghost");
        update.id = Some(42);
        let err = vault.save_connection(update).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_delete_reports_removal() {
        let dir = TempDir::new().unwrap();
        let vault = open_vault(&dir, MASTER).unwrap();
        let record = vault.save_connection(new_save("aws-dev")).unwrap();
        assert!(vault.delete_connection(record.id).unwrap());
        assert!(!vault.delete_connection(record.id).unwrap());
    }

    #[test]
    fn test_list_sorted_by_last_used() {
        let dir = TempDir::new().unwrap();
        let vault = open_vault(&dir, MASTER).unwrap();
        let first = vault.save_connection(new_save("first")).unwrap();
        let _second = vault.save_connection(new_save("second")).unwrap();
        // Touch bumps `first` ahead even with equal wall-clock seconds:
        // ties break by id DESC, so force a strictly newer timestamp.
        {
            let conn = vault.conn.lock();
            conn.execute(
                "UPDATE connections SET last_used_at = last_used_at + 10 WHERE id = ?1",
                params![first.id],
            )
            .unwrap();
        }
        let names: Vec<String> = vault
            .list_connections()
            .unwrap()
            .into_iter()
            .map(|r| r.profile_name)
            .collect();
        assert_eq!(names, vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn test_key_check_law() {
        let dir = TempDir::new().unwrap();
        {
            let vault = open_vault(&dir, MASTER).unwrap();
            vault.save_connection(new_save("aws-dev")).unwrap();
        }
        // Wrong key: startup fails before any secret is read.
        let err = open_vault(&dir, "a different key that is also long enough").unwrap_err();
        assert_eq!(err.api_code(), "configuration_error");
        assert!(err.to_string().contains("key mismatch"));
        // Original key: startup succeeds again.
        let vault = open_vault(&dir, MASTER).unwrap();
        assert_eq!(vault.list_connections().unwrap().len(), 1);
    }

    #[test]
    fn test_plaintext_secret_never_on_disk() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("s3browser.db");
        let secret = "wJalrXUtnFEMI/K7MDENG/bPxRfiCY";
        {
            let vault = Vault::open(&db_path, MASTER).unwrap();
            vault.save_connection(new_save("aws-dev")).unwrap();
            // Checkpoint WAL so everything lands in the main file.
            vault
                .conn
                .lock()
                .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
                .unwrap();
        }
        let raw = std::fs::read(&db_path).unwrap();
        assert!(
            !raw.windows(secret.len())
                .any(|window| window == secret.as_bytes()),
            "plaintext secret found in database file"
        );
    }

    #[test]
    fn test_missing_key_check_with_rows_refuses_start() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("s3browser.db");
        {
            let vault = Vault::open(&db_path, MASTER).unwrap();
            vault.save_connection(new_save("aws-dev")).unwrap();
            vault
                .conn
                .lock()
                .execute(
                    "DELETE FROM metadata WHERE key = ?1",
                    params![METADATA_KEY_CHECK_KEY],
                )
                .unwrap();
        }
        let err = Vault::open(&db_path, MASTER).unwrap_err();
        assert_eq!(err.api_code(), "configuration_error");
        assert!(err.to_string().contains("partially initialized"));
    }

    #[test]
    fn test_corrupt_salt_refuses_start() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("s3browser.db");
        {
            let vault = Vault::open(&db_path, MASTER).unwrap();
            vault
                .conn
                .lock()
                .execute(
                    "UPDATE metadata SET value = ?1 WHERE key = ?2",
                    params![BASE64.encode([1u8; 4]), METADATA_SALT_KEY],
                )
                .unwrap();
        }
        let err = Vault::open(&db_path, MASTER).unwrap_err();
        assert!(err.to_string().contains("salt"));
    }
}
