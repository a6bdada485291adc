//! SQL schema for the Ontograph SQLite store.
//!
//! Executed once at connection startup; `PRAGMA user_version` records the
//! layout revision.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS projects (
    project_id  TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    status      TEXT NOT NULL DEFAULT 'active',   -- 'active' | 'archived'
    owner       TEXT,
    config      TEXT NOT NULL DEFAULT '{}',       -- JSON
    stats       TEXT NOT NULL DEFAULT '{}',       -- JSON usage counters
    tags        TEXT NOT NULL DEFAULT '[]',       -- JSON
    created_at  TEXT NOT NULL
);

-- Version rows are append-only; only is_active ever changes.
CREATE TABLE IF NOT EXISTS schemas (
    schema_id           TEXT PRIMARY KEY,
    project_id          TEXT NOT NULL REFERENCES projects(project_id),
    schema_name         TEXT NOT NULL,
    kind                TEXT NOT NULL,              -- 'NODE' | 'EDGE'
    version_major       INTEGER NOT NULL,
    version_minor       INTEGER NOT NULL,
    version_patch       INTEGER NOT NULL,
    is_active           INTEGER NOT NULL,
    strict              INTEGER NOT NULL DEFAULT 0,
    attributes          TEXT NOT NULL DEFAULT '[]', -- JSON
    vector_config       TEXT,                       -- JSON or 'null'
    unstructured_config TEXT,                       -- JSON or 'null'
    endpoints           TEXT,                       -- JSON or 'null'
    created_at          TEXT NOT NULL,
    UNIQUE (project_id, schema_name, version_major, version_minor, version_patch)
);

-- At most one active version per name.
CREATE UNIQUE INDEX IF NOT EXISTS schemas_active_idx
    ON schemas(project_id, schema_name) WHERE is_active = 1;

CREATE TABLE IF NOT EXISTS documents (
    file_id     TEXT PRIMARY KEY,
    project_id  TEXT NOT NULL REFERENCES projects(project_id),
    filename    TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

-- Scalar columns only, so rows can be inserted in batches.
CREATE TABLE IF NOT EXISTS chunks (
    chunk_id    TEXT PRIMARY KEY,
    file_id     TEXT NOT NULL REFERENCES documents(file_id),
    project_id  TEXT NOT NULL REFERENCES projects(project_id),
    chunk_index INTEGER NOT NULL,
    char_start  INTEGER NOT NULL,
    char_end    INTEGER NOT NULL,
    text        TEXT NOT NULL,
    embedding   BLOB,                               -- little-endian f32
    UNIQUE (file_id, chunk_index)
);

CREATE TABLE IF NOT EXISTS nodes (
    node_id           TEXT PRIMARY KEY,
    project_id        TEXT NOT NULL REFERENCES projects(project_id),
    schema_id         TEXT NOT NULL REFERENCES schemas(schema_id),
    schema_name       TEXT NOT NULL,
    node_name         TEXT NOT NULL,
    normalized_name   TEXT NOT NULL,
    structured_data   TEXT NOT NULL DEFAULT '{}',   -- JSON
    unstructured_data TEXT,                         -- JSON
    vector            TEXT,                         -- JSON array or 'null'
    metadata          TEXT NOT NULL DEFAULT '{}',   -- JSON
    created_at        TEXT NOT NULL,
    UNIQUE (project_id, schema_name, normalized_name)
);

-- Undirected edges are stored with start_node_id < end_node_id.
CREATE TABLE IF NOT EXISTS edges (
    edge_id           TEXT PRIMARY KEY,
    project_id        TEXT NOT NULL REFERENCES projects(project_id),
    schema_id         TEXT NOT NULL REFERENCES schemas(schema_id),
    relationship_type TEXT NOT NULL,
    start_node_id     TEXT NOT NULL REFERENCES nodes(node_id),
    end_node_id       TEXT NOT NULL REFERENCES nodes(node_id),
    direction         TEXT NOT NULL,                -- 'DIRECTED' | 'UNDIRECTED'
    properties        TEXT NOT NULL DEFAULT '{}',   -- JSON
    created_at        TEXT NOT NULL,
    UNIQUE (project_id, start_node_id, end_node_id, relationship_type)
);

CREATE TABLE IF NOT EXISTS ontology_proposals (
    proposal_id          TEXT PRIMARY KEY,
    project_id           TEXT NOT NULL REFERENCES projects(project_id),
    status               TEXT NOT NULL,             -- 'proposed' | 'modified' | 'finalized'
    reviewed             INTEGER NOT NULL DEFAULT 0,
    ontology             TEXT NOT NULL,             -- JSON
    finalized_schema_ids TEXT NOT NULL DEFAULT '[]',-- JSON
    created_at           TEXT NOT NULL,
    updated_at           TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS schemas_project_idx   ON schemas(project_id, schema_name);
CREATE INDEX IF NOT EXISTS chunks_file_idx       ON chunks(file_id, chunk_index);
CREATE INDEX IF NOT EXISTS nodes_project_idx     ON nodes(project_id, created_at);
CREATE INDEX IF NOT EXISTS edges_project_idx     ON edges(project_id, created_at);
CREATE INDEX IF NOT EXISTS proposals_project_idx ON ontology_proposals(project_id);

PRAGMA user_version = 1;
";
