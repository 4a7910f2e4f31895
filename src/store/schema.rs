pub const SCHEMA: &str = r#"
-- Users are opaque actors supplied by the identity layer
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT DEFAULT (datetime('now'))
);

-- Tokens are auth credentials; non-admin tokens must belong to a user
CREATE TABLE IF NOT EXISTS tokens (
    id TEXT PRIMARY KEY,
    token_hash TEXT NOT NULL,          -- argon2id hash with embedded salt
    token_lookup TEXT NOT NULL,        -- first 8 chars of ID for fast lookup
    is_admin INTEGER NOT NULL DEFAULT 0,
    user_id TEXT REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT DEFAULT (datetime('now')),
    expires_at TEXT,                   -- NULL = never
    last_used_at TEXT
);

-- Recipes define the label set a dataset may use
CREATE TABLE IF NOT EXISTS recipes (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    creator_id TEXT REFERENCES users(id) ON DELETE SET NULL,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS labels (
    id TEXT PRIMARY KEY,
    recipe_id TEXT NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    tool TEXT NOT NULL,                -- bounding_box | ellipse | line | polygon
    created_at TEXT DEFAULT (datetime('now')),

    UNIQUE(recipe_id, name)
);

CREATE TABLE IF NOT EXISTS datasets (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    description TEXT,
    recipe_id TEXT NOT NULL REFERENCES recipes(id),
    public INTEGER NOT NULL DEFAULT 0,
    price INTEGER NOT NULL DEFAULT 0,  -- cents, 0 = free
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

-- Explicit role grants, one per (dataset, user)
CREATE TABLE IF NOT EXISTS grants (
    dataset_id TEXT NOT NULL REFERENCES datasets(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    role TEXT NOT NULL,
    purchased INTEGER NOT NULL DEFAULT 0,
    purchased_at TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (dataset_id, user_id)
);

-- Base assets; payload lives in the object store under id
CREATE TABLE IF NOT EXISTS assets (
    id TEXT PRIMARY KEY,
    dataset_id TEXT NOT NULL REFERENCES datasets(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    size INTEGER NOT NULL,
    display_name TEXT NOT NULL,
    mimetype TEXT NOT NULL,
    stage TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS annotations (
    id TEXT PRIMARY KEY,
    asset_id TEXT NOT NULL REFERENCES assets(id) ON DELETE CASCADE,
    label_id TEXT NOT NULL REFERENCES labels(id),
    frame INTEGER,
    data TEXT NOT NULL,                -- JSON array of normalized coordinates
    old_annotation TEXT,               -- JSON of the value before the last merge
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS pull_requests (
    id TEXT PRIMARY KEY,
    dataset_id TEXT NOT NULL REFERENCES datasets(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    description TEXT,
    status TEXT NOT NULL DEFAULT 'draft',
    merge_progress INTEGER NOT NULL DEFAULT 0,  -- merge blocks completed
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),
    merged_at TEXT
);

CREATE TABLE IF NOT EXISTS pull_request_messages (
    id TEXT PRIMARY KEY,
    pull_request_id TEXT NOT NULL REFERENCES pull_requests(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    body TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now'))
);

-- Staging: new assets proposed by a pull request
CREATE TABLE IF NOT EXISTS staged_assets (
    id TEXT PRIMARY KEY,
    pull_request_id TEXT NOT NULL REFERENCES pull_requests(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    size INTEGER NOT NULL,
    display_name TEXT NOT NULL,
    mimetype TEXT NOT NULL,
    merged_asset_id TEXT,
    created_at TEXT DEFAULT (datetime('now'))
);

-- Staging: annotation changes. Exactly one of staged_asset_id, asset_id,
-- annotation_id is set. asset_id and annotation_id are plain references:
-- rows outlive the base records they point at.
CREATE TABLE IF NOT EXISTS staged_annotations (
    id TEXT PRIMARY KEY,
    pull_request_id TEXT NOT NULL REFERENCES pull_requests(id) ON DELETE CASCADE,
    staged_asset_id TEXT REFERENCES staged_assets(id) ON DELETE CASCADE,
    asset_id TEXT,
    annotation_id TEXT,
    label_id TEXT,
    frame INTEGER,
    data TEXT,
    old_annotation TEXT,
    merged_annotation_id TEXT,
    created_at TEXT DEFAULT (datetime('now'))
);

-- Staging: existing assets queued for deletion
CREATE TABLE IF NOT EXISTS staged_asset_deletions (
    pull_request_id TEXT NOT NULL REFERENCES pull_requests(id) ON DELETE CASCADE,
    asset_id TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (pull_request_id, asset_id)
);

CREATE INDEX IF NOT EXISTS idx_labels_recipe ON labels(recipe_id);
CREATE INDEX IF NOT EXISTS idx_datasets_recipe ON datasets(recipe_id);
CREATE INDEX IF NOT EXISTS idx_grants_user ON grants(user_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_tokens_lookup ON tokens(token_lookup);
CREATE INDEX IF NOT EXISTS idx_tokens_user ON tokens(user_id);
CREATE INDEX IF NOT EXISTS idx_assets_dataset ON assets(dataset_id);
CREATE INDEX IF NOT EXISTS idx_annotations_asset ON annotations(asset_id);
CREATE INDEX IF NOT EXISTS idx_pull_requests_dataset ON pull_requests(dataset_id);
CREATE INDEX IF NOT EXISTS idx_messages_pull_request ON pull_request_messages(pull_request_id);
CREATE INDEX IF NOT EXISTS idx_staged_assets_pull_request ON staged_assets(pull_request_id);
CREATE INDEX IF NOT EXISTS idx_staged_annotations_pull_request ON staged_annotations(pull_request_id);
CREATE INDEX IF NOT EXISTS idx_staged_annotations_staged_asset ON staged_annotations(staged_asset_id);
"#;
