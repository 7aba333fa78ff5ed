//! SQLite-backed persistence for the single active quiz.
//!
//! One database file holds exactly one quiz in progress: the definition
//! (split over a key/value table), one row per feature, and the ordered
//! guessed-id log. Starting a new quiz replaces the definition and clears
//! the log in the same transaction, so a torn mix of old and new quiz is
//! never observable.

use std::path::Path;
use std::time::Duration;

use log::info;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};

use crate::quiz::{Feature, FeatureId, PropertyValues, QuizInfo};

const KEY_DATA_SOURCE: &str = "data-source";
const KEY_ATTRIBUTION: &str = "attribution";
const KEY_MATCH_PROPERTY: &str = "match-property";
const KEY_PROPERTY_VALUES: &str = "collected-property-values";
const KEY_QUIZ_ID: &str = "quiz-id";
const KEY_CREATED_AT: &str = "created-at";

/// Everything persisted for the current quiz, read in one transaction so a
/// concurrent write can never produce a torn snapshot.
#[derive(Debug, Clone)]
pub struct StoredData {
    pub quiz_info: QuizInfo,
    /// Guessed feature ids in the order they were first matched.
    pub guessed_ids: Vec<FeatureId>,
}

/// Cheap summary of the stored quiz, for the resume prompt. Reads counts
/// instead of loading the feature list.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizOverview {
    pub data_source: String,
    pub match_property: String,
    pub num_features: usize,
    pub num_guessed: usize,
}

/// Durable storage gateway for quiz state.
pub struct QuizStore {
    conn: Connection,
}

impl QuizStore {
    /// Open (or create) the store at the given path.
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        // WAL keeps reads from blocking behind writes
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open a throwaway in-memory store.
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Read the persisted quiz definition and guessed ids as one consistent
    /// snapshot. `None` when no quiz was ever stored.
    pub fn stored_data(&mut self) -> Result<Option<StoredData>, rusqlite::Error> {
        let tx = self.conn.transaction()?;

        let data_source = quiz_info_value(&tx, KEY_DATA_SOURCE)?;
        let match_property = quiz_info_value(&tx, KEY_MATCH_PROPERTY)?;
        let (Some(data_source), Some(match_property)) = (data_source, match_property) else {
            return Ok(None);
        };
        let attribution = quiz_info_value(&tx, KEY_ATTRIBUTION)?;
        let collected_property_values: PropertyValues =
            match quiz_info_value(&tx, KEY_PROPERTY_VALUES)? {
                Some(json) => serde_json::from_str(&json).map_err(json_read_error)?,
                None => PropertyValues::new(),
            };

        let features = {
            let mut statement = tx.prepare("SELECT id, data FROM features ORDER BY id")?;
            let rows = statement.query_map([], |row| {
                let id: i64 = row.get(0)?;
                let data: String = row.get(1)?;
                let mut feature: Feature =
                    serde_json::from_str(&data).map_err(json_read_error)?;
                feature.id = Some(id as FeatureId);
                Ok(feature)
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let guessed_ids = {
            let mut statement =
                tx.prepare("SELECT feature_id FROM guessed_ids ORDER BY seq")?;
            let rows = statement
                .query_map([], |row| Ok(row.get::<_, i64>(0)? as FeatureId))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        tx.commit()?;
        Ok(Some(StoredData {
            quiz_info: QuizInfo {
                data_source,
                features,
                attribution,
                match_property,
                collected_property_values,
            },
            guessed_ids,
        }))
    }

    /// Summary of the stored quiz without loading the feature list. `None`
    /// when no quiz was ever stored.
    pub fn quiz_overview(&mut self) -> Result<Option<QuizOverview>, rusqlite::Error> {
        let tx = self.conn.transaction()?;

        let data_source = quiz_info_value(&tx, KEY_DATA_SOURCE)?;
        let match_property = quiz_info_value(&tx, KEY_MATCH_PROPERTY)?;
        let (Some(data_source), Some(match_property)) = (data_source, match_property) else {
            return Ok(None);
        };
        let num_features: i64 =
            tx.query_row("SELECT COUNT(*) FROM features", [], |row| row.get(0))?;
        let num_guessed: i64 =
            tx.query_row("SELECT COUNT(*) FROM guessed_ids", [], |row| row.get(0))?;

        tx.commit()?;
        Ok(Some(QuizOverview {
            data_source,
            match_property,
            num_features: num_features as usize,
            num_guessed: num_guessed as usize,
        }))
    }

    /// Atomically replace the stored quiz definition, clearing the guessed
    /// history of whatever quiz was stored before.
    pub fn set_quiz_info(&mut self, quiz_info: &QuizInfo) -> Result<(), rusqlite::Error> {
        let quiz_id = uuid::Uuid::new_v4().to_string();
        let created_at = chrono::Utc::now().to_rfc3339();

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM guessed_ids", [])?;
        tx.execute("DELETE FROM features", [])?;
        tx.execute("DELETE FROM quiz_info", [])?;

        {
            let mut statement =
                tx.prepare("INSERT INTO quiz_info (key, value) VALUES (?1, ?2)")?;
            statement.execute(params![KEY_DATA_SOURCE, quiz_info.data_source])?;
            if let Some(attribution) = &quiz_info.attribution {
                statement.execute(params![KEY_ATTRIBUTION, attribution])?;
            }
            statement.execute(params![KEY_MATCH_PROPERTY, quiz_info.match_property])?;
            let property_values = serde_json::to_string(&quiz_info.collected_property_values)
                .map_err(json_write_error)?;
            statement.execute(params![KEY_PROPERTY_VALUES, property_values])?;
            statement.execute(params![KEY_QUIZ_ID, quiz_id])?;
            statement.execute(params![KEY_CREATED_AT, created_at])?;
        }

        {
            let mut statement =
                tx.prepare("INSERT INTO features (id, data) VALUES (?1, ?2)")?;
            for (index, feature) in quiz_info.features.iter().enumerate() {
                let id = feature.id.unwrap_or(index);
                let data = serde_json::to_string(feature).map_err(json_write_error)?;
                statement.execute(params![id as i64, data])?;
            }
        }

        tx.commit()?;
        info!(
            "stored quiz {} ({} features from {:?})",
            quiz_id,
            quiz_info.features.len(),
            quiz_info.data_source
        );
        Ok(())
    }

    /// Append guessed ids to the durable log without touching the rest of
    /// the store. Repeated calls with disjoint id sets neither lose nor
    /// duplicate entries.
    pub fn add_guessed_ids(&mut self, ids: &[FeatureId]) -> Result<(), rusqlite::Error> {
        if ids.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        {
            let mut statement =
                tx.prepare("INSERT INTO guessed_ids (feature_id) VALUES (?1)")?;
            for id in ids {
                statement.execute(params![*id as i64])?;
            }
        }
        tx.commit()
    }

    /// Sabotage the schema so every subsequent write fails. Exercises the
    /// session's persist-before-mutate contract.
    #[cfg(test)]
    pub(crate) fn drop_tables_for_tests(&mut self) {
        if let Err(error) = self
            .conn
            .execute_batch("DROP TABLE quiz_info; DROP TABLE features; DROP TABLE guessed_ids;")
        {
            log::warn!("failed to drop tables: {error}");
        }
    }
}

fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS quiz_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS features (
            id INTEGER PRIMARY KEY,
            data TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS guessed_ids (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            feature_id INTEGER NOT NULL
        );
        "#,
    )
}

fn quiz_info_value(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM quiz_info WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

fn json_write_error(error: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(error))
}

fn json_read_error(error: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(error))
}
