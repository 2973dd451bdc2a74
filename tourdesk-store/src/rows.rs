//! Row structs shared by the repositories and their conversion into domain types.
//! Enum columns are TEXT and parsed on the way out.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::PgConnection;
use tourdesk_booking::{Booking, BookingBalance, Passenger, Payment};
use tourdesk_catalog::{ItineraryDay, TourInstance, TourTemplate};
use tourdesk_core::assignment::TripAssignment;
use tourdesk_core::identity::User;
use tourdesk_core::repository::{RepoResult, RepositoryError};
use tourdesk_core::views::{BookingDetail, InstanceSummary};
use tourdesk_shared::Masked;
use uuid::Uuid;

/// Unique and foreign-key violations surface as conflicts; everything else is storage.
pub(crate) fn db_err(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() || db.is_foreign_key_violation() {
            return RepositoryError::Conflict(db.message().to_string());
        }
    }
    RepositoryError::Storage(Box::new(err))
}

/// Like [`db_err`], with a readable message for the conflict case.
pub(crate) fn conflict_as(message: &'static str) -> impl Fn(sqlx::Error) -> RepositoryError {
    move |err| match db_err(err) {
        RepositoryError::Conflict(_) => RepositoryError::Conflict(message.into()),
        other => other,
    }
}

/// Empty strings from forms become NULL.
pub(crate) fn blank_to_none(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

pub(crate) const USER_COLUMNS: &str =
    "id, name, email, role, is_active, last_login_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
pub(crate) struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    pub fn into_domain(self) -> RepoResult<User> {
        Ok(User {
            id: self.id,
            name: self.name,
            email: self.email,
            role: self.role.parse()?,
            is_active: self.is_active,
            last_login_at: self.last_login_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub(crate) const TEMPLATE_COLUMNS: &str = "id, tour_id, title, duration_days, itinerary, base_price_cents, \
     default_capacity, margin, created_at, updated_at";

#[derive(sqlx::FromRow)]
pub(crate) struct TemplateRow {
    pub id: Uuid,
    pub tour_id: Uuid,
    pub title: String,
    pub duration_days: i32,
    pub itinerary: Json<Vec<ItineraryDay>>,
    pub base_price_cents: i64,
    pub default_capacity: i32,
    pub margin: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TemplateRow> for TourTemplate {
    fn from(row: TemplateRow) -> Self {
        Self {
            id: row.id,
            tour_id: row.tour_id,
            title: row.title,
            duration_days: row.duration_days,
            itinerary: row.itinerary.0,
            base_price_cents: row.base_price_cents,
            default_capacity: row.default_capacity,
            margin: row.margin,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub(crate) const INSTANCE_COLUMNS: &str = "id, template_id, start_date, end_date, capacity, \
     price_override_cents, status, notes, created_at, updated_at";

#[derive(sqlx::FromRow)]
pub(crate) struct InstanceRow {
    pub id: Uuid,
    pub template_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub capacity: i32,
    pub price_override_cents: Option<i64>,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InstanceRow {
    pub fn into_domain(self) -> RepoResult<TourInstance> {
        Ok(TourInstance {
            id: self.id,
            template_id: self.template_id,
            start_date: self.start_date,
            end_date: self.end_date,
            capacity: self.capacity,
            price_override_cents: self.price_override_cents,
            status: self.status.parse()?,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Departure joined with its template and tour, plus seats held by live bookings.
pub(crate) const INSTANCE_SUMMARY_SELECT: &str = r#"
    SELECT i.id, i.template_id, i.start_date, i.end_date, i.capacity, i.price_override_cents,
           i.status, i.notes, i.created_at, i.updated_at,
           tr.name AS tour_name, t.title AS template_title, t.base_price_cents,
           COALESCE((SELECT SUM(b.passenger_count) FROM bookings b
                     WHERE b.tour_instance_id = i.id
                       AND b.deleted_at IS NULL
                       AND b.status <> 'cancelled'), 0)::INT AS booked_seats
    FROM tour_instances i
    JOIN tour_templates t ON t.id = i.template_id
    JOIN tours tr ON tr.id = t.tour_id
    WHERE i.deleted_at IS NULL
"#;

#[derive(sqlx::FromRow)]
pub(crate) struct InstanceSummaryRow {
    #[sqlx(flatten)]
    pub instance: InstanceRow,
    pub tour_name: String,
    pub template_title: String,
    pub base_price_cents: i64,
    pub booked_seats: i32,
}

impl InstanceSummaryRow {
    pub fn into_domain(self) -> RepoResult<InstanceSummary> {
        let instance = self.instance.into_domain()?;
        Ok(InstanceSummary {
            unit_price_cents: instance.price_override_cents.unwrap_or(self.base_price_cents),
            seats_available: tourdesk_catalog::seats_available(instance.capacity, self.booked_seats),
            booked_seats: self.booked_seats,
            tour_name: self.tour_name,
            template_title: self.template_title,
            instance,
        })
    }
}

pub(crate) const ASSIGNMENT_COLUMNS: &str = "id, guide_id, template_id, tour_instance_id, status, \
     response_note, responded_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
pub(crate) struct AssignmentRow {
    pub id: Uuid,
    pub guide_id: Uuid,
    pub template_id: Option<Uuid>,
    pub tour_instance_id: Option<Uuid>,
    pub status: String,
    pub response_note: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AssignmentRow {
    pub fn into_domain(self) -> RepoResult<TripAssignment> {
        Ok(TripAssignment {
            id: self.id,
            guide_id: self.guide_id,
            template_id: self.template_id,
            tour_instance_id: self.tour_instance_id,
            status: self.status.parse()?,
            response_note: self.response_note,
            responded_at: self.responded_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub(crate) const BOOKING_COLUMNS: &str = "id, reference, tour_instance_id, customer_name, customer_email, \
     customer_phone, passenger_count, unit_price_cents, total_cents, status, notes, created_at, updated_at";

#[derive(sqlx::FromRow)]
pub(crate) struct BookingRow {
    pub id: Uuid,
    pub reference: String,
    pub tour_instance_id: Uuid,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub passenger_count: i32,
    pub unit_price_cents: i64,
    pub total_cents: i64,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookingRow {
    pub fn into_domain(self) -> RepoResult<Booking> {
        Ok(Booking {
            id: self.id,
            reference: self.reference,
            tour_instance_id: self.tour_instance_id,
            customer_name: self.customer_name,
            customer_email: Masked::new(self.customer_email),
            customer_phone: self.customer_phone.map(Masked::new),
            passenger_count: self.passenger_count,
            unit_price_cents: self.unit_price_cents,
            total_cents: self.total_cents,
            status: self.status.parse()?,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub(crate) const PASSENGER_COLUMNS: &str = "id, booking_id, first_name, last_name, date_of_birth, \
     document_number, nationality, is_lead, created_at, updated_at";

#[derive(sqlx::FromRow)]
pub(crate) struct PassengerRow {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub document_number: Option<String>,
    pub nationality: Option<String>,
    pub is_lead: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PassengerRow> for Passenger {
    fn from(row: PassengerRow) -> Self {
        Self {
            id: row.id,
            booking_id: row.booking_id,
            first_name: row.first_name,
            last_name: row.last_name,
            date_of_birth: row.date_of_birth,
            document_number: row.document_number.map(Masked::new),
            nationality: row.nationality,
            is_lead: row.is_lead,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub(crate) const PAYMENT_COLUMNS: &str = "id, booking_id, amount_cents, method, status, reference, notes, \
     paid_at, refunded_at, recorded_by, created_at";

#[derive(sqlx::FromRow)]
pub(crate) struct PaymentRow {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub amount_cents: i64,
    pub method: String,
    pub status: String,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub paid_at: DateTime<Utc>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub recorded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl PaymentRow {
    pub fn into_domain(self) -> RepoResult<Payment> {
        Ok(Payment {
            id: self.id,
            booking_id: self.booking_id,
            amount_cents: self.amount_cents,
            method: self.method.parse()?,
            status: self.status.parse()?,
            reference: self.reference,
            notes: self.notes,
            paid_at: self.paid_at,
            refunded_at: self.refunded_at,
            recorded_by: self.recorded_by,
            created_at: self.created_at,
        })
    }
}

/// Seats held by non-cancelled bookings on a departure.
pub(crate) async fn booked_seats(conn: &mut PgConnection, instance_id: Uuid) -> RepoResult<i32> {
    let (seats,): (i32,) = sqlx::query_as(
        r#"SELECT COALESCE(SUM(passenger_count), 0)::INT FROM bookings
           WHERE tour_instance_id = $1 AND deleted_at IS NULL AND status <> 'cancelled'"#,
    )
    .bind(instance_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_err)?;
    Ok(seats)
}

/// Departure row locked for the rest of the transaction.
pub(crate) async fn lock_instance(conn: &mut PgConnection, id: Uuid) -> RepoResult<TourInstance> {
    let sql = format!(
        "SELECT {} FROM tour_instances WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        INSTANCE_COLUMNS
    );
    sqlx::query_as::<_, InstanceRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?
        .ok_or_else(|| RepositoryError::not_found("departure", id))?
        .into_domain()
}

pub(crate) async fn lock_booking(conn: &mut PgConnection, id: Uuid) -> RepoResult<Booking> {
    let sql = format!(
        "SELECT {} FROM bookings WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        BOOKING_COLUMNS
    );
    sqlx::query_as::<_, BookingRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?
        .ok_or_else(|| RepositoryError::not_found("booking", id))?
        .into_domain()
}

pub(crate) async fn assignments_for(
    conn: &mut PgConnection,
    column: &'static str,
    target_id: Uuid,
) -> RepoResult<Vec<TripAssignment>> {
    let sql = format!(
        "SELECT {} FROM trip_assignments WHERE {} = $1 ORDER BY created_at",
        ASSIGNMENT_COLUMNS, column
    );
    sqlx::query_as::<_, AssignmentRow>(&sql)
        .bind(target_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err)?
        .into_iter()
        .map(AssignmentRow::into_domain)
        .collect()
}

#[derive(sqlx::FromRow)]
struct BookingHeaderRow {
    #[sqlx(flatten)]
    booking: BookingRow,
    tour_name: String,
    start_date: NaiveDate,
}

/// Booking with passengers, payments and balance, as one read.
pub(crate) async fn load_booking_detail(conn: &mut PgConnection, id: Uuid) -> RepoResult<Option<BookingDetail>> {
    let sql = format!(
        r#"SELECT {}, tr.name AS tour_name, i.start_date
           FROM bookings b
           JOIN tour_instances i ON i.id = b.tour_instance_id
           JOIN tour_templates t ON t.id = i.template_id
           JOIN tours tr ON tr.id = t.tour_id
           WHERE b.id = $1 AND b.deleted_at IS NULL"#,
        prefixed("b", BOOKING_COLUMNS)
    );
    let header = sqlx::query_as::<_, BookingHeaderRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;
    let Some(header) = header else {
        return Ok(None);
    };

    let sql = format!(
        "SELECT {} FROM passengers WHERE booking_id = $1 AND deleted_at IS NULL \
         ORDER BY is_lead DESC, created_at",
        PASSENGER_COLUMNS
    );
    let passengers = sqlx::query_as::<_, PassengerRow>(&sql)
        .bind(id)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err)?
        .into_iter()
        .map(Passenger::from)
        .collect();

    let sql = format!("SELECT {} FROM payments WHERE booking_id = $1 ORDER BY paid_at", PAYMENT_COLUMNS);
    let payments = sqlx::query_as::<_, PaymentRow>(&sql)
        .bind(id)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err)?
        .into_iter()
        .map(PaymentRow::into_domain)
        .collect::<RepoResult<Vec<Payment>>>()?;

    let booking = header.booking.into_domain()?;
    let balance = BookingBalance::from_payments(booking.total_cents, &payments);
    Ok(Some(BookingDetail {
        booking,
        tour_name: header.tour_name,
        start_date: header.start_date,
        passengers,
        payments,
        balance,
    }))
}

/// `a, b` -> `x.a, x.b` for joins.
pub(crate) fn prefixed(alias: &str, columns: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{}.{}", alias, c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_qualifies_every_column() {
        assert_eq!(prefixed("b", "id, reference,status"), "b.id, b.reference, b.status");
    }

    #[test]
    fn blank_form_values_become_null() {
        assert_eq!(blank_to_none(Some("  ")), None);
        assert_eq!(blank_to_none(Some(" +30 210 000 ")), Some("+30 210 000".into()));
        assert_eq!(blank_to_none(None), None);
    }

    #[test]
    fn row_not_found_is_storage_not_conflict() {
        assert!(matches!(db_err(sqlx::Error::RowNotFound), RepositoryError::Storage(_)));
        let mapped = conflict_as("email already in use")(sqlx::Error::PoolTimedOut);
        assert!(matches!(mapped, RepositoryError::Storage(_)));
    }

    #[test]
    fn unknown_enum_text_is_a_rule_error() {
        let row = UserRow {
            id: Uuid::new_v4(),
            name: "Eleni".into(),
            email: "eleni@example.com".into(),
            role: "superuser".into(),
            is_active: true,
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(matches!(row.into_domain(), Err(RepositoryError::Rule(_))));
    }
}
