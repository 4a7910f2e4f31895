use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use serde::de::DeserializeOwned;

use super::Store;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::*;

const USER_COLUMNS: &str = "id, name, created_at";
const TOKEN_COLUMNS: &str =
    "id, token_hash, token_lookup, is_admin, user_id, created_at, expires_at, last_used_at";
const RECIPE_COLUMNS: &str = "id, name, creator_id, created_at";
const LABEL_COLUMNS: &str = "id, recipe_id, name, tool, created_at";
const DATASET_COLUMNS: &str =
    "id, owner_id, name, description, recipe_id, public, price, created_at, updated_at";
const GRANT_COLUMNS: &str =
    "dataset_id, user_id, role, purchased, purchased_at, created_at, updated_at";
const ASSET_COLUMNS: &str = "id, dataset_id, kind, size, display_name, mimetype, stage, created_at";
const ANNOTATION_COLUMNS: &str =
    "id, asset_id, label_id, frame, data, old_annotation, created_at, updated_at";
const PULL_REQUEST_COLUMNS: &str = "id, dataset_id, user_id, name, description, status, merge_progress, created_at, updated_at, merged_at";
const MESSAGE_COLUMNS: &str = "id, pull_request_id, user_id, body, created_at";
const STAGED_ASSET_COLUMNS: &str =
    "id, pull_request_id, kind, size, display_name, mimetype, merged_asset_id, created_at";
const STAGED_ANNOTATION_COLUMNS: &str = "id, pull_request_id, staged_asset_id, asset_id, annotation_id, label_id, frame, data, old_annotation, merged_annotation_id, created_at";
const DELETION_COLUMNS: &str = "pull_request_id, asset_id, created_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a guard to the underlying database connection.
    /// This allows consuming applications to execute custom SQL.
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn()
    }

    fn query_list<T, P>(
        &self,
        sql: &str,
        params: P,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>>
    where
        P: rusqlite::Params,
    {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, map)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn query_one<T, P>(
        &self,
        sql: &str,
        params: P,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Option<T>>
    where
        P: rusqlite::Params,
    {
        self.conn()
            .query_row(sql, params, map)
            .optional()
            .map_err(Error::from)
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn datetime_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    Ok(parse_datetime(&row.get::<_, String>(idx)?))
}

fn optional_datetime_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    Ok(row.get::<_, Option<String>>(idx)?.map(|s| parse_datetime(&s)))
}

fn json_at<T: DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn enum_at<T>(row: &Row<'_>, idx: usize, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown value '{raw}'").into(),
        )
    })
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

fn insert_result(result: rusqlite::Result<usize>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => Err(Error::AlreadyExists),
        Err(e) => Err(Error::from(e)),
    }
}

fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: datetime_at(row, 2)?,
    })
}

fn map_token(row: &Row<'_>) -> rusqlite::Result<Token> {
    Ok(Token {
        id: row.get(0)?,
        token_hash: row.get(1)?,
        token_lookup: row.get(2)?,
        is_admin: row.get(3)?,
        user_id: row.get(4)?,
        created_at: datetime_at(row, 5)?,
        expires_at: optional_datetime_at(row, 6)?,
        last_used_at: optional_datetime_at(row, 7)?,
    })
}

fn map_recipe(row: &Row<'_>) -> rusqlite::Result<Recipe> {
    Ok(Recipe {
        id: row.get(0)?,
        name: row.get(1)?,
        creator_id: row.get(2)?,
        created_at: datetime_at(row, 3)?,
    })
}

fn map_label(row: &Row<'_>) -> rusqlite::Result<Label> {
    Ok(Label {
        id: row.get(0)?,
        recipe_id: row.get(1)?,
        name: row.get(2)?,
        tool: enum_at(row, 3, Tool::parse)?,
        created_at: datetime_at(row, 4)?,
    })
}

fn map_dataset(row: &Row<'_>) -> rusqlite::Result<Dataset> {
    Ok(Dataset {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        recipe_id: row.get(4)?,
        public: row.get(5)?,
        price: row.get(6)?,
        created_at: datetime_at(row, 7)?,
        updated_at: datetime_at(row, 8)?,
    })
}

fn map_grant(row: &Row<'_>) -> rusqlite::Result<Grant> {
    Ok(Grant {
        dataset_id: row.get(0)?,
        user_id: row.get(1)?,
        role: enum_at(row, 2, Role::parse)?,
        purchased: row.get(3)?,
        purchased_at: optional_datetime_at(row, 4)?,
        created_at: datetime_at(row, 5)?,
        updated_at: datetime_at(row, 6)?,
    })
}

fn map_asset(row: &Row<'_>) -> rusqlite::Result<Asset> {
    Ok(Asset {
        id: row.get(0)?,
        dataset_id: row.get(1)?,
        kind: enum_at(row, 2, AssetKind::parse)?,
        size: row.get(3)?,
        display_name: row.get(4)?,
        mimetype: row.get(5)?,
        stage: row.get(6)?,
        created_at: datetime_at(row, 7)?,
    })
}

fn map_old_annotation(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<AnnotationValue>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| json_at(idx, &raw))
        .transpose()
}

fn map_annotation(row: &Row<'_>) -> rusqlite::Result<Annotation> {
    let data: String = row.get(4)?;
    Ok(Annotation {
        id: row.get(0)?,
        asset_id: row.get(1)?,
        value: AnnotationValue {
            label_id: row.get(2)?,
            frame: row.get(3)?,
            data: json_at(4, &data)?,
        },
        old_annotation: map_old_annotation(row, 5)?,
        created_at: datetime_at(row, 6)?,
        updated_at: datetime_at(row, 7)?,
    })
}

fn map_pull_request(row: &Row<'_>) -> rusqlite::Result<PullRequest> {
    Ok(PullRequest {
        id: row.get(0)?,
        dataset_id: row.get(1)?,
        user_id: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        status: enum_at(row, 5, PullRequestStatus::parse)?,
        merge_progress: row.get(6)?,
        created_at: datetime_at(row, 7)?,
        updated_at: datetime_at(row, 8)?,
        merged_at: optional_datetime_at(row, 9)?,
    })
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<PullRequestMessage> {
    Ok(PullRequestMessage {
        id: row.get(0)?,
        pull_request_id: row.get(1)?,
        user_id: row.get(2)?,
        body: row.get(3)?,
        created_at: datetime_at(row, 4)?,
    })
}

fn map_staged_asset(row: &Row<'_>) -> rusqlite::Result<StagedAsset> {
    Ok(StagedAsset {
        id: row.get(0)?,
        pull_request_id: row.get(1)?,
        kind: enum_at(row, 2, AssetKind::parse)?,
        size: row.get(3)?,
        display_name: row.get(4)?,
        mimetype: row.get(5)?,
        merged_asset_id: row.get(6)?,
        created_at: datetime_at(row, 7)?,
    })
}

fn map_staged_annotation(row: &Row<'_>) -> rusqlite::Result<StagedAnnotationRow> {
    let label_id: Option<String> = row.get(5)?;
    let frame: Option<i64> = row.get(6)?;
    let data: Option<String> = row.get(7)?;

    let value = match (label_id, data) {
        (Some(label_id), Some(data)) => Some(AnnotationValue {
            label_id,
            data: json_at(7, &data)?,
            frame,
        }),
        _ => None,
    };

    Ok(StagedAnnotationRow {
        id: row.get(0)?,
        pull_request_id: row.get(1)?,
        staged_asset_id: row.get(2)?,
        asset_id: row.get(3)?,
        annotation_id: row.get(4)?,
        value,
        old_annotation: map_old_annotation(row, 8)?,
        merged_annotation_id: row.get(9)?,
        created_at: datetime_at(row, 10)?,
    })
}

fn map_deletion(row: &Row<'_>) -> rusqlite::Result<StagedAssetDeletion> {
    Ok(StagedAssetDeletion {
        pull_request_id: row.get(0)?,
        asset_id: row.get(1)?,
        created_at: datetime_at(row, 2)?,
    })
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // User operations

    fn create_user(&self, user: &User) -> Result<()> {
        insert_result(self.conn().execute(
            "INSERT INTO users (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![user.id, user.name, format_datetime(&user.created_at)],
        ))
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.query_one(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            map_user,
        )
    }

    fn get_user_by_name(&self, name: &str) -> Result<Option<User>> {
        self.query_one(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE name = ?1"),
            params![name],
            map_user,
        )
    }

    fn list_users(&self, cursor: &str, limit: i32) -> Result<Vec<User>> {
        self.query_list(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id > ?1 ORDER BY id LIMIT ?2"),
            params![cursor, limit],
            map_user,
        )
    }

    fn delete_user(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Token operations

    fn create_token(&self, token: &Token) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO tokens (id, token_hash, token_lookup, is_admin, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                token.id,
                token.token_hash,
                token.token_lookup,
                token.is_admin,
                token.user_id,
                format_datetime(&token.created_at),
                token.expires_at.as_ref().map(format_datetime),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::TokenLookupCollision)
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>> {
        self.query_one(
            &format!("SELECT {TOKEN_COLUMNS} FROM tokens WHERE token_lookup = ?1"),
            params![lookup],
            map_token,
        )
    }

    fn list_user_tokens(&self, user_id: &str) -> Result<Vec<Token>> {
        self.query_list(
            &format!(
                "SELECT {TOKEN_COLUMNS} FROM tokens WHERE user_id = ?1 ORDER BY created_at DESC"
            ),
            params![user_id],
            map_token,
        )
    }

    fn delete_token(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM tokens WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn update_token_last_used(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE tokens SET last_used_at = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), id],
        )?;
        Ok(())
    }

    fn has_admin_token(&self) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM tokens WHERE is_admin = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // Recipe operations

    fn create_recipe(&self, recipe: &Recipe) -> Result<()> {
        insert_result(self.conn().execute(
            "INSERT INTO recipes (id, name, creator_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                recipe.id,
                recipe.name,
                recipe.creator_id,
                format_datetime(&recipe.created_at)
            ],
        ))
    }

    fn get_recipe(&self, id: &str) -> Result<Option<Recipe>> {
        self.query_one(
            &format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = ?1"),
            params![id],
            map_recipe,
        )
    }

    fn list_recipes(&self, cursor: &str, limit: i32) -> Result<Vec<Recipe>> {
        self.query_list(
            &format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id > ?1 ORDER BY id LIMIT ?2"),
            params![cursor, limit],
            map_recipe,
        )
    }

    fn is_recipe_bound(&self, recipe_id: &str) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM datasets WHERE recipe_id = ?1",
            params![recipe_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn create_label(&self, label: &Label) -> Result<()> {
        insert_result(self.conn().execute(
            "INSERT INTO labels (id, recipe_id, name, tool, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                label.id,
                label.recipe_id,
                label.name,
                label.tool.as_str(),
                format_datetime(&label.created_at),
            ],
        ))
    }

    fn get_label(&self, id: &str) -> Result<Option<Label>> {
        self.query_one(
            &format!("SELECT {LABEL_COLUMNS} FROM labels WHERE id = ?1"),
            params![id],
            map_label,
        )
    }

    fn list_labels(&self, recipe_id: &str) -> Result<Vec<Label>> {
        self.query_list(
            &format!("SELECT {LABEL_COLUMNS} FROM labels WHERE recipe_id = ?1 ORDER BY name"),
            params![recipe_id],
            map_label,
        )
    }

    fn rename_label(&self, id: &str, name: &str) -> Result<()> {
        let result = self.conn().execute(
            "UPDATE labels SET name = ?1 WHERE id = ?2",
            params![name, id],
        );
        match result {
            Ok(0) => Err(Error::NotFound("label")),
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(Error::AlreadyExists),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn delete_label(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM labels WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Dataset operations

    fn create_dataset(&self, dataset: &Dataset) -> Result<()> {
        insert_result(self.conn().execute(
            "INSERT INTO datasets (id, owner_id, name, description, recipe_id, public, price, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                dataset.id,
                dataset.owner_id,
                dataset.name,
                dataset.description,
                dataset.recipe_id,
                dataset.public,
                dataset.price,
                format_datetime(&dataset.created_at),
                format_datetime(&dataset.updated_at),
            ],
        ))
    }

    fn get_dataset(&self, id: &str) -> Result<Option<Dataset>> {
        self.query_one(
            &format!("SELECT {DATASET_COLUMNS} FROM datasets WHERE id = ?1"),
            params![id],
            map_dataset,
        )
    }

    fn get_datasets(&self, ids: &[String]) -> Result<Vec<Dataset>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {DATASET_COLUMNS} FROM datasets WHERE id IN ({}) ORDER BY id",
            placeholders(1, ids.len())
        );
        self.query_list(&sql, params_from_iter(ids.iter()), map_dataset)
    }

    fn list_datasets(&self, cursor: &str, limit: i32) -> Result<Vec<Dataset>> {
        self.query_list(
            &format!("SELECT {DATASET_COLUMNS} FROM datasets WHERE id > ?1 ORDER BY id LIMIT ?2"),
            params![cursor, limit],
            map_dataset,
        )
    }

    fn update_dataset(&self, dataset: &Dataset) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE datasets SET name = ?1, description = ?2, public = ?3, price = ?4, updated_at = ?5
             WHERE id = ?6",
            params![
                dataset.name,
                dataset.description,
                dataset.public,
                dataset.price,
                format_datetime(&dataset.updated_at),
                dataset.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound("dataset"));
        }
        Ok(())
    }

    fn list_owned_dataset_ids(&self, owner_id: &str) -> Result<Vec<String>> {
        self.query_list(
            "SELECT id FROM datasets WHERE owner_id = ?1 ORDER BY id",
            params![owner_id],
            |row| row.get(0),
        )
    }

    fn delete_dataset(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM datasets WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn dataset_stats(&self, dataset_id: &str) -> Result<DatasetStats> {
        let (assets, annotations, annotated_assets): (i64, i64, i64) = self.conn().query_row(
            "SELECT COUNT(*), COALESCE(SUM(cnt), 0), COALESCE(SUM(CASE WHEN cnt > 0 THEN 1 ELSE 0 END), 0)
             FROM (
                SELECT a.id, (SELECT COUNT(*) FROM annotations n WHERE n.asset_id = a.id) AS cnt
                FROM assets a WHERE a.dataset_id = ?1
             )",
            params![dataset_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        Ok(DatasetStats {
            assets,
            annotations,
            annotated_assets,
            unannotated_assets: assets - annotated_assets,
        })
    }

    // Grant operations

    fn upsert_grant(&self, grant: &Grant) -> Result<()> {
        self.conn().execute(
            "INSERT INTO grants (dataset_id, user_id, role, purchased, purchased_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (dataset_id, user_id) DO UPDATE SET
                role = excluded.role,
                purchased = excluded.purchased,
                purchased_at = excluded.purchased_at,
                updated_at = excluded.updated_at",
            params![
                grant.dataset_id,
                grant.user_id,
                grant.role.as_str(),
                grant.purchased,
                grant.purchased_at.as_ref().map(format_datetime),
                format_datetime(&grant.created_at),
                format_datetime(&grant.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get_grant(&self, dataset_id: &str, user_id: &str) -> Result<Option<Grant>> {
        self.query_one(
            &format!("SELECT {GRANT_COLUMNS} FROM grants WHERE dataset_id = ?1 AND user_id = ?2"),
            params![dataset_id, user_id],
            map_grant,
        )
    }

    fn list_dataset_grants(&self, dataset_id: &str) -> Result<Vec<Grant>> {
        self.query_list(
            &format!("SELECT {GRANT_COLUMNS} FROM grants WHERE dataset_id = ?1 ORDER BY user_id"),
            params![dataset_id],
            map_grant,
        )
    }

    fn list_user_grants_for_datasets(
        &self,
        user_id: &str,
        dataset_ids: &[String],
    ) -> Result<Vec<Grant>> {
        if dataset_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {GRANT_COLUMNS} FROM grants WHERE user_id = ?1 AND dataset_id IN ({})",
            placeholders(2, dataset_ids.len())
        );
        let values = std::iter::once(user_id).chain(dataset_ids.iter().map(String::as_str));
        self.query_list(&sql, params_from_iter(values), map_grant)
    }

    fn delete_grant(&self, dataset_id: &str, user_id: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM grants WHERE dataset_id = ?1 AND user_id = ?2",
            params![dataset_id, user_id],
        )?;
        Ok(rows > 0)
    }

    // Asset operations

    fn create_asset(&self, asset: &Asset) -> Result<bool> {
        let rows = self.conn().execute(
            "INSERT INTO assets (id, dataset_id, kind, size, display_name, mimetype, stage, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (id) DO NOTHING",
            params![
                asset.id,
                asset.dataset_id,
                asset.kind.as_str(),
                asset.size,
                asset.display_name,
                asset.mimetype,
                asset.stage,
                format_datetime(&asset.created_at),
            ],
        )?;
        Ok(rows > 0)
    }

    fn get_asset(&self, id: &str) -> Result<Option<Asset>> {
        self.query_one(
            &format!("SELECT {ASSET_COLUMNS} FROM assets WHERE id = ?1"),
            params![id],
            map_asset,
        )
    }

    fn list_dataset_assets(
        &self,
        dataset_id: &str,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<Asset>> {
        self.query_list(
            &format!(
                "SELECT {ASSET_COLUMNS} FROM assets WHERE dataset_id = ?1 AND id > ?2 ORDER BY id LIMIT ?3"
            ),
            params![dataset_id, cursor, limit],
            map_asset,
        )
    }

    fn list_dataset_asset_ids(&self, dataset_id: &str) -> Result<Vec<String>> {
        self.query_list(
            "SELECT id FROM assets WHERE dataset_id = ?1 ORDER BY id",
            params![dataset_id],
            |row| row.get(0),
        )
    }

    fn delete_assets(&self, ids: &[String]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM assets WHERE id = ?1")?;
            for id in ids {
                deleted += stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(deleted)
    }

    // Annotation operations

    fn create_annotation(&self, annotation: &Annotation) -> Result<bool> {
        let old_annotation = annotation
            .old_annotation
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let rows = self.conn().execute(
            "INSERT INTO annotations (id, asset_id, label_id, frame, data, old_annotation, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (id) DO NOTHING",
            params![
                annotation.id,
                annotation.asset_id,
                annotation.value.label_id,
                annotation.value.frame,
                serde_json::to_string(&annotation.value.data)?,
                old_annotation,
                format_datetime(&annotation.created_at),
                format_datetime(&annotation.updated_at),
            ],
        )?;
        Ok(rows > 0)
    }

    fn get_annotation(&self, id: &str) -> Result<Option<Annotation>> {
        self.query_one(
            &format!("SELECT {ANNOTATION_COLUMNS} FROM annotations WHERE id = ?1"),
            params![id],
            map_annotation,
        )
    }

    fn list_asset_annotations(&self, asset_id: &str) -> Result<Vec<Annotation>> {
        self.query_list(
            &format!(
                "SELECT {ANNOTATION_COLUMNS} FROM annotations WHERE asset_id = ?1 ORDER BY created_at, id"
            ),
            params![asset_id],
            map_annotation,
        )
    }

    fn update_annotation(&self, annotation: &Annotation) -> Result<()> {
        let old_annotation = annotation
            .old_annotation
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let rows = self.conn().execute(
            "UPDATE annotations SET label_id = ?1, frame = ?2, data = ?3, old_annotation = ?4, updated_at = ?5
             WHERE id = ?6",
            params![
                annotation.value.label_id,
                annotation.value.frame,
                serde_json::to_string(&annotation.value.data)?,
                old_annotation,
                format_datetime(&annotation.updated_at),
                annotation.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound("annotation"));
        }
        Ok(())
    }

    fn delete_annotation(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM annotations WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Pull request operations

    fn create_pull_request(&self, pr: &PullRequest) -> Result<()> {
        insert_result(self.conn().execute(
            "INSERT INTO pull_requests (id, dataset_id, user_id, name, description, status, merge_progress, created_at, updated_at, merged_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                pr.id,
                pr.dataset_id,
                pr.user_id,
                pr.name,
                pr.description,
                pr.status.as_str(),
                pr.merge_progress,
                format_datetime(&pr.created_at),
                format_datetime(&pr.updated_at),
                pr.merged_at.as_ref().map(format_datetime),
            ],
        ))
    }

    fn get_pull_request(&self, id: &str) -> Result<Option<PullRequest>> {
        self.query_one(
            &format!("SELECT {PULL_REQUEST_COLUMNS} FROM pull_requests WHERE id = ?1"),
            params![id],
            map_pull_request,
        )
    }

    fn list_pull_requests(
        &self,
        dataset_id: &str,
        status: Option<PullRequestStatus>,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<PullRequest>> {
        self.query_list(
            &format!(
                "SELECT {PULL_REQUEST_COLUMNS} FROM pull_requests
                 WHERE dataset_id = ?1 AND (?2 IS NULL OR status = ?2) AND id > ?3
                 ORDER BY id LIMIT ?4"
            ),
            params![dataset_id, status.map(|s| s.as_str()), cursor, limit],
            map_pull_request,
        )
    }

    fn update_pull_request(&self, pr: &PullRequest) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE pull_requests SET name = ?1, description = ?2, status = ?3, merge_progress = ?4,
                updated_at = ?5, merged_at = ?6
             WHERE id = ?7",
            params![
                pr.name,
                pr.description,
                pr.status.as_str(),
                pr.merge_progress,
                format_datetime(&pr.updated_at),
                pr.merged_at.as_ref().map(format_datetime),
                pr.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound("pull request"));
        }
        Ok(())
    }

    fn delete_pull_request(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM pull_requests WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn pull_request_stats(&self, pull_request_id: &str) -> Result<PullRequestStats> {
        self.conn()
            .query_row(
                "SELECT
                    (SELECT COUNT(*) FROM staged_assets WHERE pull_request_id = ?1),
                    (SELECT COUNT(*) FROM (
                        SELECT asset_id AS target FROM staged_annotations
                        WHERE pull_request_id = ?1 AND asset_id IS NOT NULL
                        UNION
                        SELECT COALESCE(n.asset_id, 'annotation:' || s.annotation_id)
                        FROM staged_annotations s LEFT JOIN annotations n ON n.id = s.annotation_id
                        WHERE s.pull_request_id = ?1 AND s.annotation_id IS NOT NULL
                    )),
                    (SELECT COUNT(*) FROM staged_asset_deletions WHERE pull_request_id = ?1),
                    (SELECT COUNT(*) FROM pull_request_messages WHERE pull_request_id = ?1)",
                params![pull_request_id],
                |row| {
                    Ok(PullRequestStats {
                        new_assets: row.get(0)?,
                        changed_assets: row.get(1)?,
                        deleted_assets: row.get(2)?,
                        messages: row.get(3)?,
                    })
                },
            )
            .map_err(Error::from)
    }

    // Message operations

    fn create_message(&self, message: &PullRequestMessage) -> Result<()> {
        insert_result(self.conn().execute(
            "INSERT INTO pull_request_messages (id, pull_request_id, user_id, body, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message.id,
                message.pull_request_id,
                message.user_id,
                message.body,
                format_datetime(&message.created_at),
            ],
        ))
    }

    fn list_messages(&self, pull_request_id: &str) -> Result<Vec<PullRequestMessage>> {
        self.query_list(
            &format!(
                "SELECT {MESSAGE_COLUMNS} FROM pull_request_messages
                 WHERE pull_request_id = ?1 ORDER BY created_at, id"
            ),
            params![pull_request_id],
            map_message,
        )
    }

    // Staged asset operations

    fn create_staged_asset(&self, staged: &StagedAsset) -> Result<()> {
        insert_result(self.conn().execute(
            "INSERT INTO staged_assets (id, pull_request_id, kind, size, display_name, mimetype, merged_asset_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                staged.id,
                staged.pull_request_id,
                staged.kind.as_str(),
                staged.size,
                staged.display_name,
                staged.mimetype,
                staged.merged_asset_id,
                format_datetime(&staged.created_at),
            ],
        ))
    }

    fn get_staged_asset(&self, id: &str) -> Result<Option<StagedAsset>> {
        self.query_one(
            &format!("SELECT {STAGED_ASSET_COLUMNS} FROM staged_assets WHERE id = ?1"),
            params![id],
            map_staged_asset,
        )
    }

    fn list_staged_assets(&self, pull_request_id: &str) -> Result<Vec<StagedAsset>> {
        self.query_list(
            &format!(
                "SELECT {STAGED_ASSET_COLUMNS} FROM staged_assets
                 WHERE pull_request_id = ?1 ORDER BY created_at, id"
            ),
            params![pull_request_id],
            map_staged_asset,
        )
    }

    fn list_dataset_staged_asset_ids(&self, dataset_id: &str) -> Result<Vec<String>> {
        self.query_list(
            "SELECT s.id FROM staged_assets s JOIN pull_requests p ON s.pull_request_id = p.id
             WHERE p.dataset_id = ?1 ORDER BY s.id",
            params![dataset_id],
            |row| row.get(0),
        )
    }

    fn set_staged_asset_merged_id(&self, id: &str, merged_asset_id: &str) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE staged_assets SET merged_asset_id = ?1 WHERE id = ?2",
            params![merged_asset_id, id],
        )?;

        if rows == 0 {
            return Err(Error::NotFound("staged asset"));
        }
        Ok(())
    }

    fn delete_staged_asset(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM staged_assets WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Staged annotation operations

    fn create_staged_annotation(&self, staged: &StagedAnnotation) -> Result<()> {
        let row = StagedAnnotationRow::from_staged(staged);
        let data = row
            .value
            .as_ref()
            .map(|v| serde_json::to_string(&v.data))
            .transpose()?;
        let old_annotation = row
            .old_annotation
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        insert_result(self.conn().execute(
            "INSERT INTO staged_annotations (id, pull_request_id, staged_asset_id, asset_id, annotation_id,
                label_id, frame, data, old_annotation, merged_annotation_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                row.id,
                row.pull_request_id,
                row.staged_asset_id,
                row.asset_id,
                row.annotation_id,
                row.value.as_ref().map(|v| v.label_id.as_str()),
                row.value.as_ref().and_then(|v| v.frame),
                data,
                old_annotation,
                row.merged_annotation_id,
                format_datetime(&row.created_at),
            ],
        ))
    }

    fn get_staged_annotation(&self, id: &str) -> Result<Option<StagedAnnotationRow>> {
        self.query_one(
            &format!("SELECT {STAGED_ANNOTATION_COLUMNS} FROM staged_annotations WHERE id = ?1"),
            params![id],
            map_staged_annotation,
        )
    }

    fn list_staged_annotations(&self, pull_request_id: &str) -> Result<Vec<StagedAnnotationRow>> {
        self.query_list(
            &format!(
                "SELECT {STAGED_ANNOTATION_COLUMNS} FROM staged_annotations
                 WHERE pull_request_id = ?1 ORDER BY created_at, id"
            ),
            params![pull_request_id],
            map_staged_annotation,
        )
    }

    fn set_staged_annotation_merged_id(&self, id: &str, merged_annotation_id: &str) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE staged_annotations SET merged_annotation_id = ?1 WHERE id = ?2",
            params![merged_annotation_id, id],
        )?;

        if rows == 0 {
            return Err(Error::NotFound("staged annotation"));
        }
        Ok(())
    }

    fn set_staged_annotation_old_value(&self, id: &str, old: &AnnotationValue) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE staged_annotations SET old_annotation = ?1 WHERE id = ?2",
            params![serde_json::to_string(old)?, id],
        )?;

        if rows == 0 {
            return Err(Error::NotFound("staged annotation"));
        }
        Ok(())
    }

    fn delete_staged_annotation(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM staged_annotations WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Staged asset deletion operations

    fn queue_asset_deletion(&self, deletion: &StagedAssetDeletion) -> Result<bool> {
        let rows = self.conn().execute(
            "INSERT INTO staged_asset_deletions (pull_request_id, asset_id, created_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (pull_request_id, asset_id) DO NOTHING",
            params![
                deletion.pull_request_id,
                deletion.asset_id,
                format_datetime(&deletion.created_at),
            ],
        )?;
        Ok(rows > 0)
    }

    fn dequeue_asset_deletion(&self, pull_request_id: &str, asset_id: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM staged_asset_deletions WHERE pull_request_id = ?1 AND asset_id = ?2",
            params![pull_request_id, asset_id],
        )?;
        Ok(rows > 0)
    }

    fn list_staged_asset_deletions(
        &self,
        pull_request_id: &str,
    ) -> Result<Vec<StagedAssetDeletion>> {
        self.query_list(
            &format!(
                "SELECT {DELETION_COLUMNS} FROM staged_asset_deletions
                 WHERE pull_request_id = ?1 ORDER BY asset_id"
            ),
            params![pull_request_id],
            map_deletion,
        )
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open() -> (TempDir, SqliteStore) {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        (temp, store)
    }

    fn seed_dataset(store: &SqliteStore) -> Dataset {
        let now = Utc::now();
        store
            .create_user(&User {
                id: "user-1".to_string(),
                name: "alice".to_string(),
                created_at: now,
            })
            .unwrap();
        store
            .create_recipe(&Recipe {
                id: "recipe-1".to_string(),
                name: "boxes".to_string(),
                creator_id: Some("user-1".to_string()),
                created_at: now,
            })
            .unwrap();
        store
            .create_label(&Label {
                id: "label-1".to_string(),
                recipe_id: "recipe-1".to_string(),
                name: "car".to_string(),
                tool: Tool::BoundingBox,
                created_at: now,
            })
            .unwrap();
        let dataset = Dataset {
            id: "ds-1".to_string(),
            owner_id: "user-1".to_string(),
            name: "streets".to_string(),
            description: None,
            recipe_id: "recipe-1".to_string(),
            public: true,
            price: 0,
            created_at: now,
            updated_at: now,
        };
        store.create_dataset(&dataset).unwrap();
        dataset
    }

    fn asset(id: &str) -> Asset {
        Asset {
            id: id.to_string(),
            dataset_id: "ds-1".to_string(),
            kind: AssetKind::Image,
            size: 3,
            display_name: format!("{id}.png"),
            mimetype: "image/png".to_string(),
            stage: "uploaded".to_string(),
            created_at: Utc::now(),
        }
    }

    fn annotation(id: &str, asset_id: &str) -> Annotation {
        Annotation {
            id: id.to_string(),
            asset_id: asset_id.to_string(),
            value: AnnotationValue {
                label_id: "label-1".to_string(),
                data: vec![0.1, 0.1, 0.2, 0.2],
                frame: None,
            },
            old_annotation: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_initialize_creates_tables() {
        let (_temp, store) = open();

        let conn = store.conn();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "users",
            "tokens",
            "recipes",
            "labels",
            "datasets",
            "grants",
            "assets",
            "annotations",
            "pull_requests",
            "pull_request_messages",
            "staged_assets",
            "staged_annotations",
            "staged_asset_deletions",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn test_create_asset_is_idempotent() {
        let (_temp, store) = open();
        seed_dataset(&store);

        assert!(store.create_asset(&asset("a-1")).unwrap());
        assert!(!store.create_asset(&asset("a-1")).unwrap());
        assert_eq!(store.list_dataset_asset_ids("ds-1").unwrap(), vec!["a-1"]);
    }

    #[test]
    fn test_delete_assets_cascades_annotations() {
        let (_temp, store) = open();
        seed_dataset(&store);
        store.create_asset(&asset("a-1")).unwrap();
        store.create_asset(&asset("a-2")).unwrap();
        store.create_annotation(&annotation("n-1", "a-1")).unwrap();
        store.create_annotation(&annotation("n-2", "a-2")).unwrap();

        let deleted = store
            .delete_assets(&["a-1".to_string(), "missing".to_string()])
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get_annotation("n-1").unwrap().is_none());
        assert!(store.get_annotation("n-2").unwrap().is_some());
    }

    #[test]
    fn test_get_datasets_skips_unknown_ids() {
        let (_temp, store) = open();
        let dataset = seed_dataset(&store);

        let found = store
            .get_datasets(&["missing".to_string(), dataset.id.clone(), dataset.id.clone()])
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, dataset.id);
        assert!(store.get_datasets(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_grant_upsert_and_batch_lookup() {
        let (_temp, store) = open();
        seed_dataset(&store);
        let now = Utc::now();

        let mut grant = Grant {
            dataset_id: "ds-1".to_string(),
            user_id: "user-1".to_string(),
            role: Role::Preview,
            purchased: false,
            purchased_at: None,
            created_at: now,
            updated_at: now,
        };
        store.upsert_grant(&grant).unwrap();
        grant.role = Role::Maintainer;
        store.upsert_grant(&grant).unwrap();

        let grants = store.list_dataset_grants("ds-1").unwrap();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].role, Role::Maintainer);

        let batch = store
            .list_user_grants_for_datasets("user-1", &["ds-1".to_string(), "ds-2".to_string()])
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert!(
            store
                .list_user_grants_for_datasets("user-1", &[])
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_staged_annotation_row_round_trip() {
        let (_temp, store) = open();
        seed_dataset(&store);
        let now = Utc::now();
        store
            .create_pull_request(&PullRequest {
                id: "pr-1".to_string(),
                dataset_id: "ds-1".to_string(),
                user_id: "user-1".to_string(),
                name: "fix labels".to_string(),
                description: None,
                status: PullRequestStatus::Draft,
                merge_progress: 0,
                created_at: now,
                updated_at: now,
                merged_at: None,
            })
            .unwrap();

        let staged = StagedAnnotation {
            id: "sa-1".to_string(),
            pull_request_id: "pr-1".to_string(),
            change: StagedChange::OnExistingAnnotation {
                annotation_id: "n-1".to_string(),
                replacement: None,
            },
            old_annotation: None,
            merged_annotation_id: None,
            created_at: now,
        };
        store.create_staged_annotation(&staged).unwrap();

        let old = AnnotationValue {
            label_id: "label-1".to_string(),
            data: vec![0.0, 0.0, 0.5, 0.5],
            frame: Some(3),
        };
        store.set_staged_annotation_old_value("sa-1", &old).unwrap();

        let fetched = store
            .get_staged_annotation("sa-1")
            .unwrap()
            .unwrap()
            .into_staged()
            .unwrap();
        assert_eq!(fetched.change, staged.change);
        assert_eq!(fetched.old_annotation, Some(old));
    }

    #[test]
    fn test_queue_asset_deletion_is_idempotent() {
        let (_temp, store) = open();
        seed_dataset(&store);
        let now = Utc::now();
        store
            .create_pull_request(&PullRequest {
                id: "pr-1".to_string(),
                dataset_id: "ds-1".to_string(),
                user_id: "user-1".to_string(),
                name: "cleanup".to_string(),
                description: None,
                status: PullRequestStatus::Draft,
                merge_progress: 0,
                created_at: now,
                updated_at: now,
                merged_at: None,
            })
            .unwrap();

        let deletion = StagedAssetDeletion {
            pull_request_id: "pr-1".to_string(),
            asset_id: "a-1".to_string(),
            created_at: now,
        };
        assert!(store.queue_asset_deletion(&deletion).unwrap());
        assert!(!store.queue_asset_deletion(&deletion).unwrap());
        assert_eq!(store.list_staged_asset_deletions("pr-1").unwrap().len(), 1);
        assert!(store.dequeue_asset_deletion("pr-1", "a-1").unwrap());
        assert!(!store.dequeue_asset_deletion("pr-1", "a-1").unwrap());
    }

    #[test]
    fn test_dataset_stats_counts_assets_not_rows() {
        let (_temp, store) = open();
        seed_dataset(&store);
        store.create_asset(&asset("a-1")).unwrap();
        store.create_asset(&asset("a-2")).unwrap();
        store.create_annotation(&annotation("n-1", "a-1")).unwrap();
        store.create_annotation(&annotation("n-2", "a-1")).unwrap();

        let stats = store.dataset_stats("ds-1").unwrap();
        assert_eq!(
            stats,
            DatasetStats {
                assets: 2,
                annotations: 2,
                annotated_assets: 1,
                unannotated_assets: 1,
            }
        );
    }

    #[test]
    fn test_duplicate_user_name() {
        let (_temp, store) = open();
        seed_dataset(&store);

        let result = store.create_user(&User {
            id: "user-2".to_string(),
            name: "alice".to_string(),
            created_at: Utc::now(),
        });
        assert!(matches!(result, Err(Error::AlreadyExists)));
    }

    #[test]
    fn test_token_lookup_collision() {
        let (_temp, store) = open();

        let token1 = Token {
            id: "token-1".to_string(),
            token_hash: "hash1".to_string(),
            token_lookup: "lookup12".to_string(),
            is_admin: true,
            user_id: None,
            created_at: Utc::now(),
            expires_at: None,
            last_used_at: None,
        };
        store.create_token(&token1).unwrap();

        let token2 = Token {
            id: "token-2".to_string(),
            token_hash: "hash2".to_string(),
            token_lookup: "lookup12".to_string(),
            is_admin: true,
            user_id: None,
            created_at: Utc::now(),
            expires_at: None,
            last_used_at: None,
        };

        let result = store.create_token(&token2);
        assert!(matches!(result, Err(Error::TokenLookupCollision)));
        assert!(store.has_admin_token().unwrap());
    }
}
