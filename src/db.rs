//! Postgres storage for the raw record set, so that separate CLI invocations
//! share one dataset. Only validated inputs are stored; grades, alerts, GPA
//! and risk are recomputed after every load.

use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use tracing::warn;
use uuid::Uuid;

use crate::consolidate::{consolidate, Dataset};
use crate::error::EngineError;
use crate::models::{NormalizedRow, Scope, StudentIdentity, SubjectRecord};

/// Advisory lock held for the lifetime of a write transaction. Shared by
/// every process writing to the same database.
pub const WRITE_LOCK_KEY: i64 = 0x6163_6164_7269_736b;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct StoredState {
    pub scope: Scope,
    pub last_run_id: Uuid,
    pub updated_at: DateTime<Utc>,
}

pub async fn fetch_state(pool: &PgPool) -> anyhow::Result<Option<StoredState>> {
    let mut conn = pool.acquire().await.context("failed to acquire connection")?;
    read_state(&mut conn).await
}

pub async fn load_dataset(pool: &PgPool) -> anyhow::Result<Dataset> {
    let mut conn = pool.acquire().await.context("failed to acquire connection")?;
    read_dataset(&mut conn).await
}

/// An open write transaction holding [`WRITE_LOCK_KEY`]. The dataset it
/// loads cannot change underneath it; dropping it without `save` or `clear`
/// rolls back.
pub struct DatasetWrite {
    tx: Transaction<'static, Postgres>,
}

/// Starts a write. Fails with [`EngineError::WriteInProgress`] when another
/// ingest or reset, in this process or any other, holds the lock.
pub async fn begin_write(pool: &PgPool) -> anyhow::Result<DatasetWrite> {
    let mut tx = pool.begin().await.context("failed to open transaction")?;
    let granted: bool = sqlx::query_scalar("SELECT pg_try_advisory_xact_lock($1)")
        .bind(WRITE_LOCK_KEY)
        .fetch_one(&mut *tx)
        .await
        .context("failed to request the write lock")?;

    if !granted {
        warn!("rejected database write while another write is in progress");
        tx.rollback().await.ok();
        return Err(EngineError::WriteInProgress.into());
    }
    Ok(DatasetWrite { tx })
}

impl DatasetWrite {
    pub async fn load(&mut self) -> anyhow::Result<Dataset> {
        read_dataset(&mut self.tx).await
    }

    /// Replaces whatever is stored with `dataset` and commits.
    pub async fn save(mut self, dataset: &Dataset, run_id: Uuid) -> anyhow::Result<()> {
        delete_all(&mut self.tx).await?;
        insert_dataset(&mut self.tx, dataset, run_id).await?;
        self.tx.commit().await.context("failed to commit dataset")?;
        Ok(())
    }

    pub async fn clear(mut self) -> anyhow::Result<()> {
        delete_all(&mut self.tx).await?;
        sqlx::query("DELETE FROM academic_risk.dataset_state")
            .execute(&mut *self.tx)
            .await?;
        self.tx.commit().await.context("failed to commit reset")?;
        Ok(())
    }

    pub async fn rollback(self) -> anyhow::Result<()> {
        self.tx.rollback().await.context("failed to roll back")?;
        Ok(())
    }
}

async fn read_state(conn: &mut PgConnection) -> anyhow::Result<Option<StoredState>> {
    let row = sqlx::query(
        "SELECT scope, last_run_id, updated_at FROM academic_risk.dataset_state WHERE id = 1",
    )
    .fetch_optional(&mut *conn)
    .await
    .context("failed to read dataset state")?;

    let Some(row) = row else {
        return Ok(None);
    };

    let scope: String = row.try_get("scope")?;
    Ok(Some(StoredState {
        scope: scope.parse()?,
        last_run_id: row.try_get("last_run_id")?,
        updated_at: row.try_get("updated_at")?,
    }))
}

async fn read_dataset(conn: &mut PgConnection) -> anyhow::Result<Dataset> {
    let Some(state) = read_state(conn).await? else {
        return Ok(Dataset::default());
    };

    let records = sqlx::query(
        r#"
        SELECT st.roll_number, st.full_name, st.email, st.course,
               r.semester, r.subject_name, r.marks_obtained, r.total_marks,
               r.credits, r.attendance_percentage, r.reported_cgpa
        FROM academic_risk.subject_records r
        JOIN academic_risk.students st ON st.roll_number = r.roll_number
        ORDER BY st.roll_number, r.semester, r.subject_name
        "#,
    )
    .fetch_all(&mut *conn)
    .await
    .context("failed to load subject records")?;

    let mut rows = Vec::with_capacity(records.len());
    for row in records {
        let roll_number: String = row.try_get("roll_number")?;
        let semester: i32 = row.try_get("semester")?;
        let semester = u32::try_from(semester)
            .with_context(|| format!("stored semester {semester} for {roll_number} is negative"))?;

        rows.push(NormalizedRow {
            student: StudentIdentity {
                roll_number: roll_number.clone(),
                name: row.try_get("full_name")?,
                email: row.try_get("email")?,
                course: row.try_get("course")?,
            },
            record: SubjectRecord::new(
                roll_number,
                semester,
                row.try_get("subject_name")?,
                row.try_get("marks_obtained")?,
                row.try_get("total_marks")?,
                row.try_get("credits")?,
                row.try_get("attendance_percentage")?,
                row.try_get("reported_cgpa")?,
            ),
        });
    }

    Ok(consolidate(rows, state.scope).dataset)
}

async fn delete_all(conn: &mut PgConnection) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM academic_risk.subject_records")
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM academic_risk.students")
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn insert_dataset(
    conn: &mut PgConnection,
    dataset: &Dataset,
    run_id: Uuid,
) -> anyhow::Result<()> {
    for profile in dataset.students() {
        sqlx::query(
            r#"
            INSERT INTO academic_risk.students (roll_number, full_name, email, course)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&profile.roll_number)
        .bind(&profile.name)
        .bind(&profile.email)
        .bind(&profile.course)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("failed to store student {}", profile.roll_number))?;

        for record in profile.records() {
            let semester = i32::try_from(record.semester)
                .with_context(|| format!("semester {} is too large to store", record.semester))?;
            sqlx::query(
                r#"
                INSERT INTO academic_risk.subject_records
                (id, roll_number, semester, subject_name, marks_obtained, total_marks,
                 credits, attendance_percentage, reported_cgpa)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&record.roll_number)
            .bind(semester)
            .bind(&record.subject)
            .bind(record.marks_obtained)
            .bind(record.total_marks)
            .bind(record.credits)
            .bind(record.attendance)
            .bind(record.reported_cgpa)
            .execute(&mut *conn)
            .await?;
        }
    }

    sqlx::query(
        r#"
        INSERT INTO academic_risk.dataset_state (id, scope, last_run_id, updated_at)
        VALUES (1, $1, $2, now())
        ON CONFLICT (id) DO UPDATE
        SET scope = EXCLUDED.scope, last_run_id = EXCLUDED.last_run_id, updated_at = now()
        "#,
    )
    .bind(dataset.scope().as_str())
    .bind(run_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
