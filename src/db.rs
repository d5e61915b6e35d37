use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension};

pub const RAW_TEXT: &str = "raw_text";
pub const SECTIONS: &str = "sections";
pub const SUMMARY: &str = "summary";

pub const SLOT_NAMES: [&str; 3] = [RAW_TEXT, SECTIONS, SUMMARY];

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS documents (
            id          TEXT PRIMARY KEY,
            source_path TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS slots (
            doc_id     TEXT NOT NULL REFERENCES documents(id),
            name       TEXT NOT NULL,
            body       TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (doc_id, name)
        );
        CREATE INDEX IF NOT EXISTS idx_slots_name ON slots(name);
        ",
    )?;
    Ok(())
}

// ── Documents ──

pub fn upsert_document(conn: &Connection, id: &str, source_path: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO documents (id, source_path) VALUES (?1, ?2)
         ON CONFLICT(id) DO UPDATE SET source_path = excluded.source_path",
        rusqlite::params![id, source_path],
    )?;
    Ok(())
}

pub fn document_source(conn: &Connection, id: &str) -> Result<Option<String>> {
    let source = conn
        .query_row("SELECT source_path FROM documents WHERE id = ?1", [id], |row| row.get(0))
        .optional()?;
    Ok(source)
}

pub fn document_exists(conn: &Connection, id: &str) -> Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM documents WHERE id = ?1", [id], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

// ── Slots ──

pub struct SlotWrite {
    pub doc_id: String,
    pub name: &'static str,
    pub body: String,
}

pub fn put_slot(conn: &Connection, doc_id: &str, name: &str, body: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO slots (doc_id, name, body) VALUES (?1, ?2, ?3)
         ON CONFLICT(doc_id, name) DO UPDATE
         SET body = excluded.body, updated_at = datetime('now')",
        rusqlite::params![doc_id, name, body],
    )?;
    Ok(())
}

/// Write a batch of slots in one transaction.
pub fn put_slots(conn: &Connection, rows: &[SlotWrite]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO slots (doc_id, name, body) VALUES (?1, ?2, ?3)
             ON CONFLICT(doc_id, name) DO UPDATE
             SET body = excluded.body, updated_at = datetime('now')",
        )?;
        for r in rows {
            stmt.execute(rusqlite::params![r.doc_id, r.name, r.body])?;
        }
    }
    tx.commit()?;
    Ok(())
}

pub fn get_slot(conn: &Connection, doc_id: &str, name: &str) -> Result<Option<String>> {
    let body = conn
        .query_row(
            "SELECT body FROM slots WHERE doc_id = ?1 AND name = ?2",
            rusqlite::params![doc_id, name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(body)
}

pub fn has_slot(conn: &Connection, doc_id: &str, name: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM slots WHERE doc_id = ?1 AND name = ?2",
            rusqlite::params![doc_id, name],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

pub struct PendingSlot {
    pub doc_id: String,
    pub body: String,
}

/// Documents that have `input` filled but not `output`, oldest first.
pub fn fetch_pending(
    conn: &Connection,
    input: &str,
    output: &str,
    limit: Option<usize>,
) -> Result<Vec<PendingSlot>> {
    let sql = format!(
        "SELECT s.doc_id, s.body
         FROM slots s
         LEFT JOIN slots o ON o.doc_id = s.doc_id AND o.name = ?2
         WHERE s.name = ?1 AND o.doc_id IS NULL
         ORDER BY s.updated_at, s.doc_id{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params![input, output], |row| {
            Ok(PendingSlot {
                doc_id: row.get(0)?,
                body: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Listing ──

pub struct DocumentRow {
    pub id: String,
    pub source_path: String,
    pub slots: Vec<String>,
    pub last_update: Option<NaiveDateTime>,
}

pub fn list_documents(conn: &Connection) -> Result<Vec<DocumentRow>> {
    let mut stmt = conn.prepare(
        "SELECT d.id, d.source_path, COALESCE(GROUP_CONCAT(s.name, ','), ''), MAX(s.updated_at)
         FROM documents d
         LEFT JOIN slots s ON s.doc_id = d.id
         GROUP BY d.id
         ORDER BY d.created_at, d.id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            let slots: String = row.get(2)?;
            let updated: Option<String> = row.get(3)?;
            Ok(DocumentRow {
                id: row.get(0)?,
                source_path: row.get(1)?,
                slots: ordered_slot_names(&slots),
                last_update: updated.as_deref().and_then(parse_sqlite_time),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn ordered_slot_names(joined: &str) -> Vec<String> {
    let present: Vec<&str> = joined.split(',').filter(|s| !s.is_empty()).collect();
    SLOT_NAMES
        .iter()
        .filter(|name| present.contains(name))
        .map(|name| name.to_string())
        .collect()
}

fn parse_sqlite_time(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok()
}

// ── Stats ──

pub struct Stats {
    pub documents: usize,
    pub extracted: usize,
    pub segmented: usize,
    pub summarized: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let documents: usize = conn.query_row("SELECT COUNT(*) FROM documents", [], |r| r.get(0))?;
    let count = |name: &str| -> Result<usize> {
        Ok(conn.query_row("SELECT COUNT(*) FROM slots WHERE name = ?1", [name], |r| r.get(0))?)
    };
    Ok(Stats {
        documents,
        extracted: count(RAW_TEXT)?,
        segmented: count(SECTIONS)?,
        summarized: count(SUMMARY)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn document_source_lookup() {
        let conn = mem();
        assert_eq!(document_source(&conn, "paper").unwrap(), None);
        upsert_document(&conn, "paper", "/a/paper.pdf").unwrap();
        assert_eq!(document_source(&conn, "paper").unwrap().as_deref(), Some("/a/paper.pdf"));
    }

    #[test]
    fn slot_roundtrip_and_overwrite() {
        let conn = mem();
        upsert_document(&conn, "paper", "paper.pdf").unwrap();
        assert_eq!(get_slot(&conn, "paper", RAW_TEXT).unwrap(), None);
        put_slot(&conn, "paper", RAW_TEXT, "first").unwrap();
        put_slot(&conn, "paper", RAW_TEXT, "second").unwrap();
        assert_eq!(get_slot(&conn, "paper", RAW_TEXT).unwrap().as_deref(), Some("second"));
        assert!(has_slot(&conn, "paper", RAW_TEXT).unwrap());
        assert!(!has_slot(&conn, "paper", SUMMARY).unwrap());
    }

    #[test]
    fn slot_requires_document() {
        let conn = mem();
        assert!(put_slot(&conn, "ghost", RAW_TEXT, "x").is_err());
    }

    #[test]
    fn pending_excludes_finished() {
        let conn = mem();
        for id in ["a", "b", "c"] {
            upsert_document(&conn, id, "x.pdf").unwrap();
            put_slot(&conn, id, RAW_TEXT, id).unwrap();
        }
        put_slot(&conn, "b", SECTIONS, "{}").unwrap();

        let pending = fetch_pending(&conn, RAW_TEXT, SECTIONS, None).unwrap();
        let ids: Vec<_> = pending.iter().map(|p| p.doc_id.as_str()).collect();
        assert_eq!(ids, ["a", "c"]);
        assert_eq!(pending[1].body, "c");

        assert_eq!(fetch_pending(&conn, RAW_TEXT, SECTIONS, Some(1)).unwrap().len(), 1);
    }

    #[test]
    fn batch_write_and_stats() {
        let conn = mem();
        upsert_document(&conn, "a", "a.pdf").unwrap();
        upsert_document(&conn, "b", "b.pdf").unwrap();
        put_slots(
            &conn,
            &[
                SlotWrite { doc_id: "a".into(), name: RAW_TEXT, body: "t".into() },
                SlotWrite { doc_id: "b".into(), name: RAW_TEXT, body: "t".into() },
                SlotWrite { doc_id: "a".into(), name: SECTIONS, body: "{}".into() },
            ],
        )
        .unwrap();
        let s = get_stats(&conn).unwrap();
        assert_eq!((s.documents, s.extracted, s.segmented, s.summarized), (2, 2, 1, 0));
    }

    #[test]
    fn listing_orders_slots() {
        let conn = mem();
        upsert_document(&conn, "a", "a.pdf").unwrap();
        put_slot(&conn, "a", SECTIONS, "{}").unwrap();
        put_slot(&conn, "a", RAW_TEXT, "t").unwrap();
        upsert_document(&conn, "b", "b.pdf").unwrap();

        let rows = list_documents(&conn).unwrap();
        assert_eq!(rows.len(), 2);
        let a = rows.iter().find(|r| r.id == "a").unwrap();
        assert_eq!(a.slots, [RAW_TEXT, SECTIONS]);
        assert!(a.last_update.is_some());
        let b = rows.iter().find(|r| r.id == "b").unwrap();
        assert!(b.slots.is_empty());
        assert!(b.last_update.is_none());
    }

    #[test]
    fn on_disk_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("papers.sqlite");
        {
            let conn = connect(&path).unwrap();
            init_schema(&conn).unwrap();
            upsert_document(&conn, "a", "a.pdf").unwrap();
            put_slot(&conn, "a", SUMMARY, "done").unwrap();
        }
        let conn = connect(&path).unwrap();
        assert_eq!(get_slot(&conn, "a", SUMMARY).unwrap().as_deref(), Some("done"));
    }
}
