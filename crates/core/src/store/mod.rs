pub mod schema;

use std::collections::HashSet;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::collections::{AlbumCollection, ImageCollection};
use crate::domain::*;
use crate::error::{Error, Result};

/// A document's `id` when it is a JSON integer, else NULL. With duplicate keys
/// SQLite reads the first one; every id the store hands out or matches on
/// goes through this expression.
const DOC_ID: &str = "CASE WHEN json_type(body, '$.id') = 'integer' THEN json_extract(body, '$.id') END";

/// Albums whose `images` field is a usable reference list.
const WELL_FORMED_ALBUM: &str = "json_type(a.body, '$.images') IS 'array'";

/// SQLite-backed document store holding the `images` and `albums` collections.
///
/// Every document is a JSON object kept verbatim in `body`; the store only
/// looks inside it through `json_extract`/`json_each`.
pub struct DocumentStore {
    conn: Connection,
}

impl DocumentStore {
    /// Open or create a store at the given path with WAL mode.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        schema::initialize(&conn)?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    /// Handle on the images collection.
    pub fn images(&self) -> SqliteImages<'_> {
        SqliteImages { conn: &self.conn }
    }

    /// Handle on the albums collection.
    pub fn albums(&self) -> SqliteAlbums<'_> {
        SqliteAlbums { conn: &self.conn }
    }

    // ── Images ───────────────────────────────────────────────────────

    pub fn insert_image<T: Serialize>(&self, doc: &T) -> Result<DocKey> {
        let body = to_body(doc)?;
        self.conn
            .execute("INSERT INTO images (body) VALUES (?1)", params![body])?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Insert an image body verbatim, as another client of the store would write it.
    pub fn insert_image_raw(&self, body: &str) -> Result<DocKey> {
        let is_object: bool = self.conn.query_row(
            "SELECT CASE WHEN json_valid(?1) THEN json_type(?1) = 'object' ELSE 0 END",
            params![body],
            |row| row.get(0),
        )?;
        if !is_object {
            return Err(Error::NotAnObject);
        }
        self.conn
            .execute("INSERT INTO images (body) VALUES (?1)", params![body])?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Insert multiple image documents in a single transaction.
    pub fn insert_images_batch<T: Serialize>(&mut self, docs: &[T]) -> Result<Vec<DocKey>> {
        let bodies = docs.iter().map(to_body).collect::<Result<Vec<_>>>()?;
        let tx = self.conn.transaction()?;
        let mut keys = Vec::with_capacity(bodies.len());
        {
            let mut stmt = tx.prepare("INSERT INTO images (body) VALUES (?1)")?;
            for body in &bodies {
                stmt.execute(params![body])?;
                keys.push(tx.last_insert_rowid());
            }
        }
        tx.commit()?;
        Ok(keys)
    }

    pub fn list_images(&self) -> Result<Vec<Document>> {
        list_documents(&self.conn, "images")
    }

    /// Ids of every well-formed image, ascending.
    pub fn image_ids(&self) -> Result<Vec<ImageId>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DOC_ID} FROM images WHERE json_type(body, '$.id') = 'integer' ORDER BY 1"
        ))?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn count_images(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ── Albums ───────────────────────────────────────────────────────

    pub fn insert_album<T: Serialize>(&self, doc: &T) -> Result<DocKey> {
        let body = to_body(doc)?;
        self.conn
            .execute("INSERT INTO albums (body) VALUES (?1)", params![body])?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Replace the document stored under `key`.
    pub fn update_album<T: Serialize>(&self, key: DocKey, doc: &T) -> Result<()> {
        let body = to_body(doc)?;
        let changed = self.conn.execute(
            "UPDATE albums SET body = ?1 WHERE key = ?2",
            params![body, key],
        )?;
        if changed == 0 {
            return Err(Error::AlbumNotFound(key));
        }
        Ok(())
    }

    pub fn delete_album(&self, key: DocKey) -> Result<()> {
        let changed = self
            .conn
            .execute("DELETE FROM albums WHERE key = ?1", params![key])?;
        if changed == 0 {
            return Err(Error::AlbumNotFound(key));
        }
        Ok(())
    }

    pub fn list_albums(&self) -> Result<Vec<Document>> {
        list_documents(&self.conn, "albums")
    }

    pub fn count_albums(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM albums", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ── Stats ────────────────────────────────────────────────────────

    /// All store counts in a single query for the status table.
    pub fn stats(&self) -> Result<StoreStats> {
        let sql = format!(
            "SELECT
                (SELECT COUNT(*) FROM images),
                (SELECT COUNT(*) FROM albums),
                (SELECT COUNT(*) FROM images WHERE json_type(body, '$.id') IS NOT 'integer'),
                (SELECT COUNT(*) FROM albums a WHERE NOT ({WELL_FORMED_ALBUM})),
                (SELECT COUNT(*) FROM images i
                 WHERE json_type(i.body, '$.id') = 'integer'
                   AND NOT EXISTS (
                       SELECT 1 FROM albums a, json_each(a.body, '$.images') j
                       WHERE {WELL_FORMED_ALBUM}
                         AND j.type = 'integer'
                         AND j.value = json_extract(i.body, '$.id')))"
        );
        let stats = self.conn.query_row(&sql, [], |row| {
            Ok(StoreStats {
                total_images: row.get::<_, i64>(0)? as usize,
                total_albums: row.get::<_, i64>(1)? as usize,
                malformed_images: row.get::<_, i64>(2)? as usize,
                malformed_albums: row.get::<_, i64>(3)? as usize,
                orphan_images: row.get::<_, i64>(4)? as usize,
            })
        })?;
        Ok(stats)
    }

    // ── Config ───────────────────────────────────────────────────────

    pub fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Write several config entries in a single transaction.
    pub fn set_configs(&self, entries: &[(&str, &str)]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO config (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )?;
            for (key, value) in entries {
                stmt.execute(params![key, value])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_config(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM config WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }
}

/// Images collection backed by the store's `images` table.
pub struct SqliteImages<'s> {
    conn: &'s Connection,
}

impl ImageCollection for SqliteImages<'_> {
    fn fetch_batch(&self, after: Option<DocKey>, limit: usize) -> Result<Vec<Document>> {
        let sql = format!(
            "SELECT key, {DOC_ID}, body FROM images WHERE key > ?1 ORDER BY key LIMIT ?2"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let docs = stmt
            .query_map(params![after.unwrap_or(i64::MIN), limit as i64], read_document)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(docs)
    }

    fn delete_by_id(&self, id: ImageId) -> Result<DeleteOutcome> {
        // idx_images_id is unique, so this removes at most one row.
        let sql = format!("DELETE FROM images WHERE {DOC_ID} = ?1");
        let removed = self.conn.execute(&sql, params![id])?;
        Ok(if removed == 0 {
            DeleteOutcome::AlreadyGone
        } else {
            DeleteOutcome::Deleted
        })
    }
}

/// Albums collection backed by the store's `albums` table. Read-only.
pub struct SqliteAlbums<'s> {
    conn: &'s Connection,
}

impl AlbumCollection for SqliteAlbums<'_> {
    fn references(&self, id: ImageId) -> Result<bool> {
        let sql = format!(
            "SELECT EXISTS (
                SELECT 1 FROM albums a, json_each(a.body, '$.images') j
                WHERE {WELL_FORMED_ALBUM} AND j.type = 'integer' AND j.value = ?1)"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let found: bool = stmt.query_row(params![id], |row| row.get(0))?;
        Ok(found)
    }

    fn referenced_ids(&self) -> Result<HashSet<ImageId>> {
        let sql = format!(
            "SELECT DISTINCT j.value FROM albums a, json_each(a.body, '$.images') j
             WHERE {WELL_FORMED_ALBUM} AND j.type = 'integer'"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<HashSet<_>, _>>()?;
        Ok(ids)
    }

    fn count_malformed(&self) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM albums a WHERE NOT ({WELL_FORMED_ALBUM})");
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn to_body<T: Serialize>(doc: &T) -> Result<String> {
    let value = serde_json::to_value(doc)?;
    if !value.is_object() {
        return Err(Error::NotAnObject);
    }
    Ok(value.to_string())
}

fn read_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        key: row.get(0)?,
        id: row.get(1)?,
        body: row.get(2)?,
    })
}

fn list_documents(conn: &Connection, table: &str) -> Result<Vec<Document>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT key, {DOC_ID}, body FROM {table} ORDER BY key"
    ))?;
    let docs = stmt
        .query_map([], read_document)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn album(id: i64, images: &[ImageId]) -> Album {
        Album {
            id,
            images: images.to_vec(),
        }
    }

    // ── Open / schema ────────────────────────────────────────────

    #[test]
    fn test_open_creates_parent_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("nested/dir/store.db");
        DocumentStore::open(&db_path).unwrap();
        assert!(db_path.exists());
    }

    #[test]
    fn test_reopen_persists_documents() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("store.db");
        {
            let store = DocumentStore::open(&db_path).unwrap();
            store.insert_image(&Image { id: 1 }).unwrap();
            store.insert_album(&album(1, &[1])).unwrap();
        }
        let store = DocumentStore::open(&db_path).unwrap();
        assert_eq!(store.count_images().unwrap(), 1);
        assert_eq!(store.count_albums().unwrap(), 1);
    }

    #[test]
    fn test_schema_version_set_on_fresh_store() {
        let store = DocumentStore::open_in_memory().unwrap();
        assert_eq!(store.get_config("schema_version").unwrap(), Some("1".to_string()));
    }

    #[test]
    fn test_reject_future_schema_version() {
        let conn = Connection::open_in_memory().unwrap();
        schema::initialize(&conn).unwrap();
        conn.execute(
            "INSERT INTO config (key, value) VALUES ('schema_version', '999')",
            [],
        )
        .unwrap();

        let err = schema::migrate(&conn).unwrap_err();
        assert!(matches!(err, Error::SchemaTooNew { db: 999, code: 1 }));
    }

    #[test]
    fn test_migration_check_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        schema::initialize(&conn).unwrap();
        schema::migrate(&conn).unwrap();
        schema::migrate(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM config WHERE key = 'schema_version'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    // ── Documents ────────────────────────────────────────────────

    #[test]
    fn test_non_object_document_rejected() {
        let store = DocumentStore::open_in_memory().unwrap();
        let err = store.insert_image(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, Error::NotAnObject));
    }

    #[test]
    fn test_duplicate_image_id_rejected() {
        let store = DocumentStore::open_in_memory().unwrap();
        store.insert_image(&Image { id: 4 }).unwrap();
        let err = store.insert_image(&json!({"id": 4, "path": "b.jpg"})).unwrap_err();
        assert!(matches!(err, Error::Database(_)));
    }

    #[test]
    fn test_images_without_id_may_repeat() {
        let store = DocumentStore::open_in_memory().unwrap();
        store.insert_image(&json!({"path": "a.jpg"})).unwrap();
        store.insert_image(&json!({"path": "b.jpg"})).unwrap();
        assert_eq!(store.count_images().unwrap(), 2);
        assert!(store.image_ids().unwrap().is_empty());
    }

    #[test]
    fn test_insert_images_batch_returns_increasing_keys() {
        let mut store = DocumentStore::open_in_memory().unwrap();
        let docs: Vec<Image> = (1..=5).map(|id| Image { id }).collect();
        let keys = store.insert_images_batch(&docs).unwrap();
        assert_eq!(keys.len(), 5);
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(store.image_ids().unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_insert_images_batch_is_atomic() {
        let mut store = DocumentStore::open_in_memory().unwrap();
        let docs = vec![Image { id: 1 }, Image { id: 2 }, Image { id: 1 }];
        assert!(store.insert_images_batch(&docs).is_err());
        assert_eq!(store.count_images().unwrap(), 0);
    }

    #[test]
    fn test_update_and_delete_album() {
        let store = DocumentStore::open_in_memory().unwrap();
        let key = store.insert_album(&album(1, &[1])).unwrap();
        store.update_album(key, &album(1, &[2, 3])).unwrap();

        let albums = store.list_albums().unwrap();
        let parsed: Album = serde_json::from_str(&albums[0].body).unwrap();
        assert_eq!(parsed.images, vec![2, 3]);

        store.delete_album(key).unwrap();
        assert_eq!(store.count_albums().unwrap(), 0);
        assert!(matches!(store.delete_album(key), Err(Error::AlbumNotFound(k)) if k == key));
        assert!(matches!(store.update_album(key, &album(1, &[])), Err(Error::AlbumNotFound(_))));
    }

    // ── Image collection ─────────────────────────────────────────

    #[test]
    fn test_fetch_batch_resumes_after_key() {
        let store = DocumentStore::open_in_memory().unwrap();
        for id in 1..=5 {
            store.insert_image(&Image { id }).unwrap();
        }
        let images = store.images();
        let first = images.fetch_batch(None, 2).unwrap();
        assert_eq!(first.len(), 2);
        let rest = images.fetch_batch(Some(first[1].key), 10).unwrap();
        assert_eq!(rest.len(), 3);
        assert!(rest.iter().all(|d| d.key > first[1].key));
    }

    #[test]
    fn test_delete_by_id_removes_only_that_image() {
        let store = DocumentStore::open_in_memory().unwrap();
        store.insert_image(&Image { id: 1 }).unwrap();
        store.insert_image(&Image { id: 2 }).unwrap();

        assert_eq!(store.images().delete_by_id(1).unwrap(), DeleteOutcome::Deleted);
        assert_eq!(store.image_ids().unwrap(), vec![2]);
    }

    #[test]
    fn test_delete_by_id_missing_is_already_gone() {
        let store = DocumentStore::open_in_memory().unwrap();
        assert_eq!(store.images().delete_by_id(9).unwrap(), DeleteOutcome::AlreadyGone);
    }

    #[test]
    fn test_delete_by_id_ignores_string_ids() {
        let store = DocumentStore::open_in_memory().unwrap();
        store.insert_image(&json!({"id": "3"})).unwrap();
        assert_eq!(store.images().delete_by_id(3).unwrap(), DeleteOutcome::AlreadyGone);
        assert_eq!(store.count_images().unwrap(), 1);
    }

    #[test]
    fn test_fetched_id_matches_delete_for_duplicate_keys() {
        let store = DocumentStore::open_in_memory().unwrap();
        // serde_json cannot emit a repeated key, so write the body directly.
        store.insert_image_raw(r#"{"id":1,"id":2}"#).unwrap();
        store.insert_image(&Image { id: 2 }).unwrap();

        let docs = store.images().fetch_batch(None, 10).unwrap();
        let ids: Vec<Option<ImageId>> = docs.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![Some(1), Some(2)]);

        assert_eq!(store.images().delete_by_id(1).unwrap(), DeleteOutcome::Deleted);
        assert_eq!(store.image_ids().unwrap(), vec![2]);
    }

    #[test]
    fn test_fetched_id_is_none_for_malformed() {
        let store = DocumentStore::open_in_memory().unwrap();
        store.insert_image(&json!({"id": "3"})).unwrap();
        store.insert_image(&json!({"id": 2.5})).unwrap();
        store.insert_image(&json!({"path": "a.jpg"})).unwrap();

        let docs = store.list_images().unwrap();
        assert_eq!(docs.len(), 3);
        assert!(docs.iter().all(|d| d.id.is_none()));
    }

    // ── Album collection ─────────────────────────────────────────

    #[test]
    fn test_references_checks_every_album() {
        let store = DocumentStore::open_in_memory().unwrap();
        store.insert_album(&album(1, &[1, 2])).unwrap();
        store.insert_album(&album(2, &[3, 3])).unwrap();
        let albums = store.albums();
        assert!(albums.references(1).unwrap());
        assert!(albums.references(3).unwrap());
        assert!(!albums.references(4).unwrap());
    }

    #[test]
    fn test_references_ignores_malformed_albums() {
        let store = DocumentStore::open_in_memory().unwrap();
        store.insert_album(&json!({"id": 1, "images": 5})).unwrap();
        store.insert_album(&json!({"id": 2, "images": {"x": 6}})).unwrap();
        store.insert_album(&json!({"id": 3})).unwrap();
        store.insert_album(&json!({"id": 4, "images": ["7", 8]})).unwrap();
        let albums = store.albums();
        assert!(!albums.references(5).unwrap());
        assert!(!albums.references(6).unwrap());
        assert!(!albums.references(7).unwrap());
        assert!(albums.references(8).unwrap());
        assert_eq!(albums.count_malformed().unwrap(), 3);
    }

    #[test]
    fn test_referenced_ids_matches_references() {
        let store = DocumentStore::open_in_memory().unwrap();
        store.insert_album(&album(1, &[1, 2, 2])).unwrap();
        store.insert_album(&album(2, &[9])).unwrap();
        store.insert_album(&json!({"id": 3, "images": 4})).unwrap();

        let ids = store.albums().referenced_ids().unwrap();
        assert_eq!(ids, HashSet::from([1, 2, 9]));
    }

    // ── Stats / config ───────────────────────────────────────────

    #[test]
    fn test_stats_counts_orphans_and_malformed() {
        let store = DocumentStore::open_in_memory().unwrap();
        store.insert_image(&Image { id: 1 }).unwrap();
        store.insert_image(&Image { id: 2 }).unwrap();
        store.insert_image(&json!({"name": "no id"})).unwrap();
        store.insert_album(&album(1, &[2, 5])).unwrap();
        store.insert_album(&json!({"id": 2, "images": "1"})).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(
            stats,
            StoreStats {
                total_images: 3,
                total_albums: 2,
                malformed_images: 1,
                malformed_albums: 1,
                orphan_images: 1,
            }
        );
    }

    #[test]
    fn test_set_config_overwrite() {
        let store = DocumentStore::open_in_memory().unwrap();
        assert_eq!(store.get_config("sweep.batch_size").unwrap(), None);
        store.set_config("sweep.batch_size", "50").unwrap();
        store.set_config("sweep.batch_size", "25").unwrap();
        assert_eq!(store.get_config("sweep.batch_size").unwrap(), Some("25".to_string()));
    }

    #[test]
    fn test_set_configs_is_atomic() {
        let store = DocumentStore::open_in_memory().unwrap();
        store
            .conn
            .execute_batch(
                "CREATE TRIGGER reject_c BEFORE INSERT ON config
                 WHEN NEW.key = 'c'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        assert!(store.set_configs(&[("a", "1"), ("b", "2"), ("c", "3")]).is_err());
        assert_eq!(store.get_config("a").unwrap(), None);
        assert_eq!(store.get_config("b").unwrap(), None);

        store.set_configs(&[("a", "1"), ("b", "2")]).unwrap();
        assert_eq!(store.get_config("b").unwrap(), Some("2".to_string()));
    }
}
