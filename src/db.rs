use std::collections::BTreeSet;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::error;
use uuid::Uuid;

use crate::clock::Clock;
use crate::models::{Student, StudentStatus};
use crate::Academy;
use crate::store::{Direction, Document, DocumentStore, Fields, Query, StoreError};

const IMPORTS: &str = "imports";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Documents live as JSONB rows in `academy.documents`, keyed by
/// collection and id.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn document_from_row(row: &sqlx::postgres::PgRow) -> Result<Document, StoreError> {
    let id: String = row.try_get("id")?;
    let Json(data): Json<Value> = row.try_get("data")?;
    Ok(Document { id, data })
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn insert(&self, collection: &str, data: Fields) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO academy.documents (collection, id, data)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(collection)
        .bind(&id)
        .bind(Json(Value::Object(data)))
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    async fn put(&self, collection: &str, id: &str, data: Fields) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO academy.documents (collection, id, data)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, id) DO UPDATE
            SET data = EXCLUDED.data, updated_at = now()
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(Json(Value::Object(data)))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query(
            "SELECT id, data FROM academy.documents WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(document_from_row).transpose()
    }

    async fn update(&self, collection: &str, id: &str, patch: Fields) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE academy.documents
            SET data = data || $3, updated_at = now()
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(Json(Value::Object(patch)))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(collection, id));
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM academy.documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(collection, id));
        }
        Ok(())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        let mut sql = String::from("SELECT id, data FROM academy.documents WHERE collection = $1");
        let mut param = 2;

        for filter in query.filters.iter() {
            sql.push_str(&format!(
                " AND {} {} ${}::jsonb",
                json_key(&filter.field)?,
                filter.op.sql(),
                param
            ));
            param += 1;
        }

        if let Some((field, direction)) = &query.order_by {
            let direction = match direction {
                Direction::Asc => "ASC",
                Direction::Desc => "DESC",
            };
            sql.push_str(&format!(" ORDER BY {} {}", json_key(field)?, direction));
        }

        let mut rows = sqlx::query(&sql).bind(collection);
        for filter in query.filters.iter() {
            rows = rows.bind(Json(&filter.value));
        }

        let records = rows.fetch_all(&self.pool).await?;
        records.iter().map(document_from_row).collect()
    }
}

/// Query fields go into the SQL as literal JSONB keys so the expression
/// indexes in the migrations can match. Only plain identifiers pass.
fn json_key(field: &str) -> Result<String, StoreError> {
    if !field.is_empty() && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(format!("data -> '{}'", field))
    } else {
        Err(StoreError::Invalid(format!("unsupported query field: {}", field)))
    }
}

/// Seeded and imported rows carry source keys so re-running is a no-op.
async fn is_new_source_key(store: &dyn DocumentStore, source_key: &str) -> Result<bool, StoreError> {
    Ok(store.get(IMPORTS, source_key).await?.is_none())
}

/// Claims the source key before writing the check-in, so a failure after the
/// write can never let a rerun insert it twice. A failed write releases the
/// claim so the row is retried on the next run.
async fn claim_and_record(
    academy: &Academy,
    source_key: &str,
    student_id: &str,
    present: bool,
    notes: Option<&str>,
    timestamp: DateTime<Utc>,
) -> anyhow::Result<()> {
    let store = academy.store.as_ref();
    let mut fields = Fields::new();
    fields.insert(
        "imported_at".to_string(),
        Value::from(academy.clock.now().timestamp_millis()),
    );
    store.put(IMPORTS, source_key, fields).await?;

    if !academy
        .ledger
        .record_check_in_at(student_id, present, notes, timestamp)
        .await
    {
        if let Err(err) = store.delete(IMPORTS, source_key).await {
            error!(source_key, error = %err, "failed to release source key");
        }
        anyhow::bail!("failed to record check-in {source_key}");
    }
    Ok(())
}

pub async fn seed(academy: &Academy) -> anyhow::Result<()> {
    let store = academy.store.as_ref();
    let students = vec![
        (
            "0d29201a-2ac1-443d-b232-c02121f67525",
            "Ana Souza",
            "ana.souza@academy.example",
        ),
        (
            "a31976ab-d05d-4020-84da-69f40d793769",
            "Bruno Lima",
            "bruno.lima@academy.example",
        ),
        (
            "158fd70f-15bf-4ec5-aadd-afbb52c9a561",
            "Carla Mendes",
            "carla.mendes@academy.example",
        ),
    ];

    for (id, name, email) in students.iter() {
        academy
            .directory
            .put(&Student {
                id: id.to_string(),
                name: name.to_string(),
                email: email.to_string(),
                status: StudentStatus::Active,
            })
            .await?;
    }

    let check_ins = vec![
        ("seed-001", 0usize, 3i64, true, "Worked closed guard sweeps"),
        ("seed-002", 0, 2, true, ""),
        ("seed-003", 0, 1, false, "Knee injury, watched class"),
        ("seed-004", 1, 2, true, "First class"),
        ("seed-005", 2, 5, true, ""),
        ("seed-006", 2, 4, true, "Drilled armbar from mount"),
    ];

    let now = academy.clock.now();
    let mut touched = BTreeSet::new();
    for (source_key, student, days_ago, present, note) in check_ins {
        if !is_new_source_key(store, source_key).await? {
            continue;
        }
        let student_id = students[student].0;
        let note = (!note.is_empty()).then_some(note);
        let timestamp = now - Duration::days(days_ago);
        claim_and_record(academy, source_key, student_id, present, note, timestamp).await?;
        touched.insert(student_id);
    }

    for student_id in touched {
        academy.desk.recompute(student_id).await;
    }

    Ok(())
}

pub async fn import_csv(academy: &Academy, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        full_name: String,
        email: String,
        present: bool,
        notes: Option<String>,
        checked_in_at: DateTime<Utc>,
        source_key: Option<String>,
    }

    let store = academy.store.as_ref();
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;
    let mut touched = BTreeSet::new();

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid CSV row {}", line + 1))?;

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));
        if !is_new_source_key(store, &source_key).await? {
            continue;
        }

        let student_id = academy
            .directory
            .upsert_by_email(&row.full_name, &row.email)
            .await?;

        claim_and_record(
            academy,
            &source_key,
            &student_id,
            row.present,
            row.notes.as_deref(),
            row.checked_in_at,
        )
        .await?;
        touched.insert(student_id);
        inserted += 1;
    }

    for student_id in touched.iter() {
        academy.desk.recompute(student_id).await;
    }

    Ok(inserted)
}
