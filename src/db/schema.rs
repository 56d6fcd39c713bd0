//! SQL DDL for all engram tables.
//!
//! Defines the `branches`, `entities`, `observations`, `relations`,
//! `keywords`, `cross_references`, `entities_fts` (FTS5), and `schema_meta`
//! tables, plus the triggers that keep the FTS shadow in sync with
//! `entities`. All DDL uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::{params, Connection};

/// Reserved name of the pre-seeded default branch (id 1).
pub const MAIN_BRANCH: &str = "main";

/// All schema DDL statements for engram's core tables.
const SCHEMA_SQL: &str = r#"
-- Branch partitions
CREATE TABLE IF NOT EXISTS branches (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    purpose TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Named graph nodes, scoped per branch
CREATE TABLE IF NOT EXISTS entities (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    branch_id INTEGER NOT NULL REFERENCES branches(id) ON DELETE CASCADE,
    status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active','deprecated','archived','draft')),
    status_reason TEXT,
    original_content TEXT NOT NULL DEFAULT '',
    optimized_content TEXT NOT NULL DEFAULT '',
    token_count INTEGER NOT NULL DEFAULT 0,
    compression_ratio REAL NOT NULL DEFAULT 1.0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    last_accessed TEXT NOT NULL,
    UNIQUE(name, branch_id)
);

CREATE INDEX IF NOT EXISTS idx_entities_name ON entities(name);
CREATE INDEX IF NOT EXISTS idx_entities_branch ON entities(branch_id);
CREATE INDEX IF NOT EXISTS idx_entities_status ON entities(status);
CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(entity_type);
CREATE INDEX IF NOT EXISTS idx_entities_accessed ON entities(last_accessed);

-- Ordered textual facts per entity
CREATE TABLE IF NOT EXISTS observations (
    id INTEGER PRIMARY KEY,
    entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    content TEXT NOT NULL,
    optimized_content TEXT NOT NULL DEFAULT '',
    sequence_order INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_observations_entity ON observations(entity_id);

-- Directed typed edges, both endpoints in the same branch
CREATE TABLE IF NOT EXISTS relations (
    id INTEGER PRIMARY KEY,
    from_entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    to_entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    relation_type TEXT NOT NULL,
    branch_id INTEGER NOT NULL REFERENCES branches(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    UNIQUE(from_entity_id, to_entity_id, relation_type)
);

CREATE INDEX IF NOT EXISTS idx_relations_from ON relations(from_entity_id);
CREATE INDEX IF NOT EXISTS idx_relations_to ON relations(to_entity_id);
CREATE INDEX IF NOT EXISTS idx_relations_type ON relations(relation_type);

-- Weighted terms for the keyword search strategy
CREATE TABLE IF NOT EXISTS keywords (
    id INTEGER PRIMARY KEY,
    keyword TEXT NOT NULL,
    entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    weight REAL NOT NULL DEFAULT 1.0,
    context TEXT
);

CREATE INDEX IF NOT EXISTS idx_keywords_keyword ON keywords(keyword);
CREATE INDEX IF NOT EXISTS idx_keywords_entity ON keywords(entity_id);

-- By-name pointers into other branches, resolved lazily
CREATE TABLE IF NOT EXISTS cross_references (
    id INTEGER PRIMARY KEY,
    from_entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    target_branch_id INTEGER NOT NULL REFERENCES branches(id) ON DELETE CASCADE,
    target_entity_name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(from_entity_id, target_branch_id, target_entity_name)
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// FTS5 shadow over `(name, entity_type, optimized_content)`, external
/// content backed by `entities`.
const FTS_SQL: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS entities_fts USING fts5(
    name,
    entity_type,
    optimized_content,
    content='entities',
    content_rowid='id'
);
"#;

/// Triggers keeping the FTS shadow row-for-row with `entities`.
const TRIGGER_SQL: &str = r#"
CREATE TRIGGER IF NOT EXISTS entities_fts_insert AFTER INSERT ON entities BEGIN
    INSERT INTO entities_fts(rowid, name, entity_type, optimized_content)
    VALUES (new.id, new.name, new.entity_type, new.optimized_content);
END;

CREATE TRIGGER IF NOT EXISTS entities_fts_delete AFTER DELETE ON entities BEGIN
    INSERT INTO entities_fts(entities_fts, rowid, name, entity_type, optimized_content)
    VALUES ('delete', old.id, old.name, old.entity_type, old.optimized_content);
END;

CREATE TRIGGER IF NOT EXISTS entities_fts_update AFTER UPDATE ON entities BEGIN
    INSERT INTO entities_fts(entities_fts, rowid, name, entity_type, optimized_content)
    VALUES ('delete', old.id, old.name, old.entity_type, old.optimized_content);
    INSERT INTO entities_fts(rowid, name, entity_type, optimized_content)
    VALUES (new.id, new.name, new.entity_type, new.optimized_content);
END;
"#;

/// Initialize all schema tables and seed the `main` branch. Idempotent.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute_batch(FTS_SQL)?;
    conn.execute_batch(TRIGGER_SQL)?;

    // Seed the reserved default branch with a fixed id
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT OR IGNORE INTO branches (id, name, purpose, created_at, updated_at) \
         VALUES (1, ?1, 'Default branch', ?2, ?2)",
        params![MAIN_BRANCH, now],
    )?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        for expected in [
            "branches",
            "entities",
            "observations",
            "relations",
            "keywords",
            "cross_references",
            "schema_meta",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap(); // second call should not error
    }

    #[test]
    fn main_branch_is_seeded_with_id_1() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let (id, name): (i64, String) = conn
            .query_row("SELECT id, name FROM branches WHERE name = 'main'", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(id, 1);
        assert_eq!(name, MAIN_BRANCH);
    }

    #[test]
    fn fts_triggers_track_entity_rows() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO entities (name, entity_type, branch_id, original_content, optimized_content, created_at, updated_at, last_accessed) \
             VALUES ('Auth', 'Service', 1, 'JWT tokens', 'JWT tokens', ?1, ?1, ?1)",
            params![now],
        )
        .unwrap();

        let hits: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM entities_fts WHERE entities_fts MATCH 'jwt'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(hits, 1);

        // Update must replace the shadow row
        conn.execute(
            "UPDATE entities SET optimized_content = 'bcrypt hashing' WHERE name = 'Auth'",
            [],
        )
        .unwrap();
        let stale: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM entities_fts WHERE entities_fts MATCH 'jwt'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(stale, 0);
        let fresh: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM entities_fts WHERE entities_fts MATCH 'bcrypt'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(fresh, 1);

        // Delete must drop the shadow row
        conn.execute("DELETE FROM entities WHERE name = 'Auth'", [])
            .unwrap();
        let gone: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM entities_fts WHERE entities_fts MATCH 'bcrypt'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(gone, 0);
    }
}
