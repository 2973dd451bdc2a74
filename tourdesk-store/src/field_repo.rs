use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgConnection, PgPool};
use std::collections::{HashMap, HashSet};
use tourdesk_core::assignment::{self, TripAssignment};
use tourdesk_core::field::{AttendanceEntry, CheckIn, CheckInInput, TripNote, TripNoteInput};
use tourdesk_core::repository::{FieldRepository, RepoResult, RepositoryError};
use tourdesk_core::views::AssignmentView;
use tracing::info;
use uuid::Uuid;

use crate::rows::{db_err, lock_instance, prefixed, AssignmentRow, ASSIGNMENT_COLUMNS};

pub struct PgFieldRepository {
    pool: PgPool,
}

impl PgFieldRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct AssignmentViewRow {
    #[sqlx(flatten)]
    assignment: AssignmentRow,
    tour_name: String,
    template_title: String,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

#[derive(sqlx::FromRow)]
struct CheckInRow {
    id: Uuid,
    tour_instance_id: Uuid,
    assignment_id: Uuid,
    guide_id: Uuid,
    waypoint: String,
    notes: Option<String>,
    checked_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct AttendanceRow {
    check_in_id: Uuid,
    passenger_id: Uuid,
    present: bool,
}

#[derive(sqlx::FromRow)]
struct NoteRow {
    id: Uuid,
    tour_instance_id: Uuid,
    assignment_id: Uuid,
    author_id: Uuid,
    category: String,
    body: String,
    created_at: DateTime<Utc>,
}

impl NoteRow {
    fn into_domain(self) -> RepoResult<TripNote> {
        Ok(TripNote {
            id: self.id,
            tour_instance_id: self.tour_instance_id,
            assignment_id: self.assignment_id,
            author_id: self.author_id,
            category: self.category.parse()?,
            body: self.body,
            created_at: self.created_at,
        })
    }
}

/// Passengers of live bookings on the departure.
async fn manifest_ids(conn: &mut PgConnection, instance_id: Uuid) -> RepoResult<HashSet<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        r#"SELECT p.id FROM passengers p
           JOIN bookings b ON b.id = p.booking_id
           WHERE b.tour_instance_id = $1
             AND b.deleted_at IS NULL AND p.deleted_at IS NULL
             AND b.status <> 'cancelled'"#,
    )
    .bind(instance_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_err)?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

async fn ensure_instance(conn: &mut PgConnection, instance_id: Uuid) -> RepoResult<Uuid> {
    let row: Option<(Uuid,)> =
        sqlx::query_as("SELECT template_id FROM tour_instances WHERE id = $1 AND deleted_at IS NULL")
            .bind(instance_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_err)?;
    row.map(|(template_id,)| template_id)
        .ok_or_else(|| RepositoryError::not_found("departure", instance_id))
}

#[async_trait]
impl FieldRepository for PgFieldRepository {
    async fn list_guide_assignments(&self, guide_id: Uuid) -> RepoResult<Vec<AssignmentView>> {
        let sql = format!(
            r#"SELECT {}, tr.name AS tour_name, t.title AS template_title, i.start_date, i.end_date
               FROM trip_assignments a
               LEFT JOIN tour_instances i ON i.id = a.tour_instance_id
               JOIN tour_templates t ON t.id = COALESCE(a.template_id, i.template_id)
               JOIN tours tr ON tr.id = t.tour_id
               WHERE a.guide_id = $1
                 AND t.deleted_at IS NULL
                 AND (i.id IS NULL OR i.deleted_at IS NULL)
               ORDER BY i.start_date NULLS LAST, a.created_at"#,
            prefixed("a", ASSIGNMENT_COLUMNS)
        );
        let rows = sqlx::query_as::<_, AssignmentViewRow>(&sql)
            .bind(guide_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.into_iter()
            .map(|row| {
                Ok(AssignmentView {
                    assignment: row.assignment.into_domain()?,
                    tour_name: row.tour_name,
                    template_title: row.template_title,
                    start_date: row.start_date,
                    end_date: row.end_date,
                })
            })
            .collect()
    }

    async fn respond_assignment(
        &self,
        id: Uuid,
        guide_id: Uuid,
        accept: bool,
        note: Option<String>,
    ) -> RepoResult<TripAssignment> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Departure before assignment, the order guide-list edits lock in.
        let (instance_id,): (Option<Uuid>,) =
            sqlx::query_as("SELECT tour_instance_id FROM trip_assignments WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?
                .ok_or_else(|| RepositoryError::not_found("assignment", id))?;
        if let Some(instance_id) = instance_id {
            lock_instance(&mut tx, instance_id).await?.ensure_open()?;
        }

        let sql = format!("SELECT {} FROM trip_assignments WHERE id = $1 FOR UPDATE", ASSIGNMENT_COLUMNS);
        let mut assignment = sqlx::query_as::<_, AssignmentRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?
            .ok_or_else(|| RepositoryError::not_found("assignment", id))?
            .into_domain()?;
        assignment.respond(guide_id, accept, note)?;

        sqlx::query(
            "UPDATE trip_assignments SET status = $2, response_note = $3, responded_at = $4, updated_at = $5 WHERE id = $1",
        )
        .bind(assignment.id)
        .bind(assignment.status.as_str())
        .bind(&assignment.response_note)
        .bind(assignment.responded_at)
        .bind(assignment.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        info!("Guide {} answered assignment {}: {}", guide_id, id, assignment.status);
        Ok(assignment)
    }

    async fn operating_assignment(&self, guide_id: Uuid, instance_id: Uuid) -> RepoResult<Option<TripAssignment>> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        let template_id = ensure_instance(&mut conn, instance_id).await?;

        let sql = format!(
            "SELECT {} FROM trip_assignments WHERE guide_id = $1 AND (tour_instance_id = $2 OR template_id = $3)",
            ASSIGNMENT_COLUMNS
        );
        let assignments = sqlx::query_as::<_, AssignmentRow>(&sql)
            .bind(guide_id)
            .bind(instance_id)
            .bind(template_id)
            .fetch_all(&mut *conn)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(AssignmentRow::into_domain)
            .collect::<RepoResult<Vec<_>>>()?;

        Ok(assignment::operating_assignment(&assignments, guide_id, instance_id, template_id).cloned())
    }

    async fn record_check_in(
        &self,
        instance_id: Uuid,
        assignment: &TripAssignment,
        input: &CheckInInput,
    ) -> RepoResult<CheckIn> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        lock_instance(&mut tx, instance_id).await?.ensure_open()?;
        let manifest = manifest_ids(&mut tx, instance_id).await?;
        input.validate(&manifest)?;

        let now = Utc::now();
        let check_in = CheckIn {
            id: Uuid::new_v4(),
            tour_instance_id: instance_id,
            assignment_id: assignment.id,
            guide_id: assignment.guide_id,
            waypoint: input.waypoint.trim().to_string(),
            notes: input.notes.as_deref().map(str::trim).filter(|n| !n.is_empty()).map(str::to_string),
            checked_at: input.checked_at.unwrap_or(now),
            attendance: input.attendance.clone(),
            created_at: now,
        };

        sqlx::query(
            r#"INSERT INTO check_ins
                   (id, tour_instance_id, assignment_id, guide_id, waypoint, notes, checked_at, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(check_in.id)
        .bind(check_in.tour_instance_id)
        .bind(check_in.assignment_id)
        .bind(check_in.guide_id)
        .bind(&check_in.waypoint)
        .bind(&check_in.notes)
        .bind(check_in.checked_at)
        .bind(check_in.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        for entry in &check_in.attendance {
            sqlx::query("INSERT INTO check_in_attendance (check_in_id, passenger_id, present) VALUES ($1, $2, $3)")
                .bind(check_in.id)
                .bind(entry.passenger_id)
                .bind(entry.present)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        info!(
            "Check-in at '{}' on departure {}: {} present, {} absent",
            check_in.waypoint,
            instance_id,
            check_in.present_count(),
            check_in.absent_count()
        );
        Ok(check_in)
    }

    async fn list_check_ins(&self, instance_id: Uuid) -> RepoResult<Vec<CheckIn>> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        ensure_instance(&mut conn, instance_id).await?;

        let rows = sqlx::query_as::<_, CheckInRow>(
            r#"SELECT id, tour_instance_id, assignment_id, guide_id, waypoint, notes, checked_at, created_at
               FROM check_ins WHERE tour_instance_id = $1 ORDER BY checked_at"#,
        )
        .bind(instance_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err)?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let attendance = sqlx::query_as::<_, AttendanceRow>(
            "SELECT check_in_id, passenger_id, present FROM check_in_attendance WHERE check_in_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err)?;

        let mut by_check_in: HashMap<Uuid, Vec<AttendanceEntry>> = HashMap::new();
        for row in attendance {
            by_check_in.entry(row.check_in_id).or_default().push(AttendanceEntry {
                passenger_id: row.passenger_id,
                present: row.present,
            });
        }

        Ok(rows
            .into_iter()
            .map(|row| CheckIn {
                attendance: by_check_in.remove(&row.id).unwrap_or_default(),
                id: row.id,
                tour_instance_id: row.tour_instance_id,
                assignment_id: row.assignment_id,
                guide_id: row.guide_id,
                waypoint: row.waypoint,
                notes: row.notes,
                checked_at: row.checked_at,
                created_at: row.created_at,
            })
            .collect())
    }

    async fn add_note(
        &self,
        instance_id: Uuid,
        assignment: &TripAssignment,
        input: &TripNoteInput,
    ) -> RepoResult<TripNote> {
        input.validate()?;

        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        ensure_instance(&mut conn, instance_id).await?;

        sqlx::query_as::<_, NoteRow>(
            r#"INSERT INTO trip_notes (id, tour_instance_id, assignment_id, author_id, category, body)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING id, tour_instance_id, assignment_id, author_id, category, body, created_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(instance_id)
        .bind(assignment.id)
        .bind(assignment.guide_id)
        .bind(input.category.as_str())
        .bind(input.body.trim())
        .fetch_one(&mut *conn)
        .await
        .map_err(db_err)?
        .into_domain()
    }

    async fn list_notes(&self, instance_id: Uuid) -> RepoResult<Vec<TripNote>> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        ensure_instance(&mut conn, instance_id).await?;

        sqlx::query_as::<_, NoteRow>(
            r#"SELECT id, tour_instance_id, assignment_id, author_id, category, body, created_at
               FROM trip_notes WHERE tour_instance_id = $1 ORDER BY created_at"#,
        )
        .bind(instance_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err)?
        .into_iter()
        .map(NoteRow::into_domain)
        .collect()
    }
}
