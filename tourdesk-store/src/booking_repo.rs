use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use tourdesk_booking::{
    booking_reference, settle_status, transition, Booking, BookingDraft, BookingError, BookingStatus,
    Passenger, PassengerInput, Payment, PaymentStatus, TransitionSource,
};
use tourdesk_catalog::ensure_capacity;
use tourdesk_core::repository::{BookingRepository, RepoResult, RepositoryError};
use tourdesk_core::views::{
    like_pattern, BookingDetail, BookingFilter, BookingUpdate, PaymentFilter, PaymentInput, Settlement,
};
use tourdesk_shared::{Page, PageRequest};
use tracing::info;
use uuid::Uuid;

use crate::rows::{
    blank_to_none, booked_seats, conflict_as, db_err, load_booking_detail, lock_booking, lock_instance,
    BookingRow, PassengerRow, PaymentRow, BOOKING_COLUMNS, PASSENGER_COLUMNS, PAYMENT_COLUMNS,
};

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn detail(&self, id: Uuid) -> RepoResult<BookingDetail> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        load_booking_detail(&mut conn, id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("booking", id))
    }
}

/// Re-derive the status from money received. Returns the previous status when it moved.
async fn settle(conn: &mut PgConnection, booking: &mut Booking) -> RepoResult<Option<BookingStatus>> {
    let (paid,): (i64,) = sqlx::query_as(
        "SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM payments WHERE booking_id = $1 AND status = 'completed'",
    )
    .bind(booking.id)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_err)?;

    let next = settle_status(booking.status, booking.total_cents, paid);
    if next == booking.status {
        return Ok(None);
    }

    let previous = transition(booking, next, TransitionSource::Payment)?;
    sqlx::query("UPDATE bookings SET status = $2, updated_at = $3 WHERE id = $1")
        .bind(booking.id)
        .bind(booking.status.as_str())
        .bind(booking.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;

    info!("Booking {} settled from {} to {}", booking.reference, previous, booking.status);
    Ok(Some(previous))
}

/// Passenger lists only change while the booking is still live.
fn ensure_editable(booking: &Booking) -> RepoResult<()> {
    if !booking.status.accepts_payments() {
        return Err(RepositoryError::Conflict(format!(
            "booking {} is {}",
            booking.reference, booking.status
        )));
    }
    Ok(())
}

async fn tour_instance_of(conn: &mut PgConnection, booking_id: Uuid) -> RepoResult<Uuid> {
    let row: Option<(Uuid,)> =
        sqlx::query_as("SELECT tour_instance_id FROM bookings WHERE id = $1 AND deleted_at IS NULL")
            .bind(booking_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_err)?;
    row.map(|(id,)| id)
        .ok_or_else(|| RepositoryError::not_found("booking", booking_id))
}

async fn clear_lead(conn: &mut PgConnection, booking_id: Uuid, except: Option<Uuid>) -> RepoResult<()> {
    sqlx::query(
        "UPDATE passengers SET is_lead = FALSE, updated_at = NOW() \
         WHERE booking_id = $1 AND is_lead AND ($2::UUID IS NULL OR id <> $2)",
    )
    .bind(booking_id)
    .bind(except)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;
    Ok(())
}

async fn insert_passenger(conn: &mut PgConnection, booking_id: Uuid, input: &PassengerInput) -> RepoResult<Passenger> {
    let sql = format!(
        r#"INSERT INTO passengers
               (id, booking_id, first_name, last_name, date_of_birth, document_number, nationality, is_lead)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
           RETURNING {}"#,
        PASSENGER_COLUMNS
    );
    let row = sqlx::query_as::<_, PassengerRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(booking_id)
        .bind(input.first_name.trim())
        .bind(input.last_name.trim())
        .bind(input.date_of_birth)
        .bind(blank_to_none(input.document_number.as_ref().map(|d| d.expose().as_str())))
        .bind(blank_to_none(input.nationality.as_deref()))
        .bind(input.is_lead)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_err)?;
    Ok(row.into())
}

async fn insert_payment(conn: &mut PgConnection, payment: &Payment) -> RepoResult<()> {
    sqlx::query(
        r#"INSERT INTO payments
               (id, booking_id, amount_cents, method, status, reference, notes, paid_at, recorded_by, created_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
    )
    .bind(payment.id)
    .bind(payment.booking_id)
    .bind(payment.amount_cents)
    .bind(payment.method.as_str())
    .bind(payment.status.as_str())
    .bind(&payment.reference)
    .bind(&payment.notes)
    .bind(payment.paid_at)
    .bind(payment.recorded_by)
    .bind(payment.created_at)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;
    Ok(())
}

async fn write_size(conn: &mut PgConnection, booking: &Booking) -> RepoResult<()> {
    sqlx::query("UPDATE bookings SET passenger_count = $2, total_cents = $3, updated_at = $4 WHERE id = $1")
        .bind(booking.id)
        .bind(booking.passenger_count)
        .bind(booking.total_cents)
        .bind(booking.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    Ok(())
}

async fn lock_payment(conn: &mut PgConnection, id: Uuid) -> RepoResult<Payment> {
    let sql = format!("SELECT {} FROM payments WHERE id = $1 FOR UPDATE", PAYMENT_COLUMNS);
    sqlx::query_as::<_, PaymentRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?
        .ok_or_else(|| RepositoryError::not_found("payment", id))?
        .into_domain()
}

fn push_booking_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &BookingFilter) {
    qb.push(" WHERE deleted_at IS NULL");
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(instance_id) = filter.tour_instance_id {
        qb.push(" AND tour_instance_id = ").push_bind(instance_id);
    }
    if filter.from.is_some() || filter.to.is_some() {
        qb.push(" AND tour_instance_id IN (SELECT id FROM tour_instances WHERE TRUE");
        if let Some(from) = filter.from {
            qb.push(" AND start_date >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            qb.push(" AND start_date <= ").push_bind(to);
        }
        qb.push(")");
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = like_pattern(search);
        qb.push(" AND (reference ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR customer_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR customer_email ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn push_payment_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &PaymentFilter) {
    qb.push(" WHERE booking_id IN (SELECT id FROM bookings WHERE deleted_at IS NULL)");
    if let Some(method) = filter.method {
        qb.push(" AND method = ").push_bind(method.as_str());
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(from) = filter.from {
        qb.push(" AND paid_at::DATE >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND paid_at::DATE <= ").push_bind(to);
    }
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn create_booking(&self, mut draft: BookingDraft, recorded_by: Uuid) -> RepoResult<BookingDetail> {
        draft.validate()?;
        draft.assign_lead();

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let instance = lock_instance(&mut tx, draft.tour_instance_id).await?;
        instance.ensure_open()?;
        let seats = booked_seats(&mut tx, instance.id).await?;
        ensure_capacity(instance.capacity, seats, draft.passenger_count)?;

        let (base_price,): (i64,) = sqlx::query_as("SELECT base_price_cents FROM tour_templates WHERE id = $1")
            .bind(instance.template_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;
        let unit_price = instance.price_override_cents.unwrap_or(base_price);

        let now = Utc::now();
        let id = Uuid::new_v4();
        let mut booking = Booking {
            id,
            reference: booking_reference(id, now.date_naive()),
            tour_instance_id: instance.id,
            customer_name: draft.customer_name.trim().to_string(),
            customer_email: draft.customer_email.clone(),
            customer_phone: draft.customer_phone.clone(),
            passenger_count: draft.passenger_count,
            unit_price_cents: unit_price,
            total_cents: draft.price(unit_price)?,
            status: BookingStatus::Pending,
            notes: blank_to_none(draft.notes.as_deref()),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"INSERT INTO bookings
                   (id, reference, tour_instance_id, customer_name, customer_email, customer_phone,
                    passenger_count, unit_price_cents, total_cents, status, notes, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"#,
        )
        .bind(booking.id)
        .bind(&booking.reference)
        .bind(booking.tour_instance_id)
        .bind(&booking.customer_name)
        .bind(booking.customer_email.expose().trim())
        .bind(blank_to_none(booking.customer_phone.as_ref().map(|p| p.expose().as_str())))
        .bind(booking.passenger_count)
        .bind(booking.unit_price_cents)
        .bind(booking.total_cents)
        .bind(booking.status.as_str())
        .bind(&booking.notes)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(conflict_as("booking reference already taken, please retry"))?;

        for passenger in &draft.passengers {
            insert_passenger(&mut tx, booking.id, passenger).await?;
        }

        if let Some(initial) = &draft.initial_payment {
            let payment = Payment {
                id: Uuid::new_v4(),
                booking_id: booking.id,
                amount_cents: initial.amount_cents,
                method: initial.method,
                status: PaymentStatus::Completed,
                reference: blank_to_none(initial.reference.as_deref()),
                notes: None,
                paid_at: now,
                refunded_at: None,
                recorded_by: Some(recorded_by),
                created_at: now,
            };
            insert_payment(&mut tx, &payment).await?;
        }

        settle(&mut tx, &mut booking).await?;
        tx.commit().await.map_err(db_err)?;

        info!(
            "Booking {} created on departure {} for {} passengers",
            booking.reference, booking.tour_instance_id, booking.passenger_count
        );
        self.detail(booking.id).await
    }

    async fn get_booking(&self, id: Uuid) -> RepoResult<Option<BookingDetail>> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        load_booking_detail(&mut conn, id).await
    }

    async fn list_bookings(&self, filter: &BookingFilter, page: &PageRequest) -> RepoResult<Page<Booking>> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM bookings");
        push_booking_filter(&mut count, filter);
        let (total,): (i64,) = count
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        let mut qb = QueryBuilder::new(format!("SELECT {} FROM bookings", BOOKING_COLUMNS));
        push_booking_filter(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let bookings = qb
            .build_query_as::<BookingRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(BookingRow::into_domain)
            .collect::<RepoResult<Vec<_>>>()?;

        Ok(Page::new(bookings, total, page))
    }

    async fn update_booking(&self, id: Uuid, update: &BookingUpdate) -> RepoResult<Booking> {
        update.validate()?;

        let sql = format!(
            r#"UPDATE bookings SET
                   customer_name = COALESCE($2, customer_name),
                   customer_email = COALESCE($3, customer_email),
                   customer_phone = CASE WHEN $4::TEXT IS NULL THEN customer_phone ELSE NULLIF($4, '') END,
                   notes = CASE WHEN $5::TEXT IS NULL THEN notes ELSE NULLIF($5, '') END,
                   updated_at = NOW()
               WHERE id = $1 AND deleted_at IS NULL
               RETURNING {}"#,
            BOOKING_COLUMNS
        );
        sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id)
            .bind(update.customer_name.as_deref().map(str::trim))
            .bind(update.customer_email.as_ref().map(|e| e.expose().trim()))
            .bind(update.customer_phone.as_ref().map(|p| p.expose().trim()))
            .bind(update.notes.as_deref().map(str::trim))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| RepositoryError::not_found("booking", id))?
            .into_domain()
    }

    async fn change_status(&self, id: Uuid, next: BookingStatus) -> RepoResult<(Booking, BookingStatus)> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let mut booking = lock_booking(&mut tx, id).await?;
        let previous = transition(&mut booking, next, TransitionSource::Operator)?;

        sqlx::query("UPDATE bookings SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(booking.id)
            .bind(booking.status.as_str())
            .bind(booking.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        info!("Booking {} moved from {} to {}", booking.reference, previous, booking.status);
        Ok((booking, previous))
    }

    async fn delete_booking(&self, id: Uuid) -> RepoResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        lock_booking(&mut tx, id).await?;

        let (holds_money,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM payments WHERE booking_id = $1 AND status = 'completed')",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        if holds_money {
            return Err(RepositoryError::Conflict(
                "booking has completed payments; refund them first".into(),
            ));
        }

        sqlx::query("UPDATE bookings SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query("UPDATE passengers SET deleted_at = NOW(), updated_at = NOW() WHERE booking_id = $1 AND deleted_at IS NULL")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn add_passenger(&self, booking_id: Uuid, input: &PassengerInput) -> RepoResult<Settlement> {
        input.validate()?;

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Departure first, then booking: the same order as booking creation.
        let instance_id = tour_instance_of(&mut tx, booking_id).await?;
        let instance = lock_instance(&mut tx, instance_id).await?;
        let mut booking = lock_booking(&mut tx, booking_id).await?;
        ensure_editable(&booking)?;
        instance.ensure_open()?;

        let seats = booked_seats(&mut tx, instance.id).await?;
        ensure_capacity(instance.capacity, seats, 1)?;

        let passenger = insert_passenger(&mut tx, booking.id, input).await?;
        if passenger.is_lead {
            clear_lead(&mut tx, booking.id, Some(passenger.id)).await?;
        }

        booking.resize(booking.passenger_count + 1)?;
        write_size(&mut tx, &booking).await?;
        let previous_status = settle(&mut tx, &mut booking).await?;

        tx.commit().await.map_err(db_err)?;
        Ok(Settlement { detail: self.detail(booking_id).await?, previous_status })
    }

    async fn update_passenger(&self, id: Uuid, input: &PassengerInput) -> RepoResult<Passenger> {
        input.validate()?;

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let sql = format!(
            r#"UPDATE passengers SET
                   first_name = $2, last_name = $3, date_of_birth = $4, document_number = $5,
                   nationality = $6, is_lead = is_lead OR $7, updated_at = NOW()
               WHERE id = $1 AND deleted_at IS NULL
               RETURNING {}"#,
            PASSENGER_COLUMNS
        );
        let passenger: Passenger = sqlx::query_as::<_, PassengerRow>(&sql)
            .bind(id)
            .bind(input.first_name.trim())
            .bind(input.last_name.trim())
            .bind(input.date_of_birth)
            .bind(blank_to_none(input.document_number.as_ref().map(|d| d.expose().as_str())))
            .bind(blank_to_none(input.nationality.as_deref()))
            .bind(input.is_lead)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?
            .ok_or_else(|| RepositoryError::not_found("passenger", id))?
            .into();

        if input.is_lead {
            clear_lead(&mut tx, passenger.booking_id, Some(passenger.id)).await?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(passenger)
    }

    async fn remove_passenger(&self, id: Uuid) -> RepoResult<Settlement> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let (booking_id,): (Uuid,) =
            sqlx::query_as("SELECT booking_id FROM passengers WHERE id = $1 AND deleted_at IS NULL")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?
                .ok_or_else(|| RepositoryError::not_found("passenger", id))?;

        let instance_id = tour_instance_of(&mut tx, booking_id).await?;
        lock_instance(&mut tx, instance_id).await?;
        let mut booking = lock_booking(&mut tx, booking_id).await?;

        // Re-read under the booking lock: a concurrent removal may already have run.
        let sql = format!(
            "SELECT {} FROM passengers WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
            PASSENGER_COLUMNS
        );
        let passenger: Passenger = sqlx::query_as::<_, PassengerRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?
            .ok_or_else(|| RepositoryError::not_found("passenger", id))?
            .into();

        ensure_editable(&booking)?;
        if booking.passenger_count <= 1 {
            return Err(BookingError::Validation("a booking needs at least one passenger".into()).into());
        }

        sqlx::query(
            "UPDATE passengers SET deleted_at = NOW(), is_lead = FALSE, updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(passenger.id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if passenger.is_lead {
            sqlx::query(
                r#"UPDATE passengers SET is_lead = TRUE, updated_at = NOW()
                   WHERE id = (SELECT id FROM passengers
                               WHERE booking_id = $1 AND deleted_at IS NULL
                               ORDER BY created_at LIMIT 1)"#,
            )
            .bind(booking.id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        booking.resize(booking.passenger_count - 1)?;
        write_size(&mut tx, &booking).await?;
        let previous_status = settle(&mut tx, &mut booking).await?;

        tx.commit().await.map_err(db_err)?;
        Ok(Settlement { detail: self.detail(booking.id).await?, previous_status })
    }

    async fn record_payment(
        &self,
        booking_id: Uuid,
        input: &PaymentInput,
        recorded_by: Uuid,
    ) -> RepoResult<(Payment, Settlement)> {
        input.validate()?;

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let mut booking = lock_booking(&mut tx, booking_id).await?;
        if !booking.status.accepts_payments() {
            return Err(BookingError::NotPayable(booking.status.to_string()).into());
        }

        let now = Utc::now();
        let payment = Payment {
            id: Uuid::new_v4(),
            booking_id,
            amount_cents: input.amount_cents,
            method: input.method,
            status: PaymentStatus::Completed,
            reference: blank_to_none(input.reference.as_deref()),
            notes: blank_to_none(input.notes.as_deref()),
            paid_at: input.paid_at.unwrap_or(now),
            refunded_at: None,
            recorded_by: Some(recorded_by),
            created_at: now,
        };
        insert_payment(&mut tx, &payment).await?;
        let previous_status = settle(&mut tx, &mut booking).await?;

        tx.commit().await.map_err(db_err)?;
        info!("Payment of {} cents recorded on booking {}", payment.amount_cents, booking.reference);

        let detail = self.detail(booking_id).await?;
        Ok((payment, Settlement { detail, previous_status }))
    }

    async fn refund_payment(&self, id: Uuid) -> RepoResult<(Payment, Settlement)> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let mut payment = lock_payment(&mut tx, id).await?;
        let mut booking = lock_booking(&mut tx, payment.booking_id).await?;
        payment.refund()?;

        sqlx::query("UPDATE payments SET status = $2, refunded_at = $3 WHERE id = $1")
            .bind(payment.id)
            .bind(payment.status.as_str())
            .bind(payment.refunded_at)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        let previous_status = settle(&mut tx, &mut booking).await?;

        tx.commit().await.map_err(db_err)?;
        info!("Payment {} refunded on booking {}", payment.id, booking.reference);

        let detail = self.detail(booking.id).await?;
        Ok((payment, Settlement { detail, previous_status }))
    }

    async fn delete_payment(&self, id: Uuid) -> RepoResult<Settlement> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let payment = lock_payment(&mut tx, id).await?;
        let mut booking = lock_booking(&mut tx, payment.booking_id).await?;

        sqlx::query("DELETE FROM payments WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        let previous_status = settle(&mut tx, &mut booking).await?;

        tx.commit().await.map_err(db_err)?;
        Ok(Settlement { detail: self.detail(booking.id).await?, previous_status })
    }

    async fn list_payments(&self, filter: &PaymentFilter, page: &PageRequest) -> RepoResult<Page<Payment>> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM payments");
        push_payment_filter(&mut count, filter);
        let (total,): (i64,) = count
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        let mut qb = QueryBuilder::new(format!("SELECT {} FROM payments", PAYMENT_COLUMNS));
        push_payment_filter(&mut qb, filter);
        qb.push(" ORDER BY paid_at DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let payments = qb
            .build_query_as::<PaymentRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(PaymentRow::into_domain)
            .collect::<RepoResult<Vec<_>>>()?;

        Ok(Page::new(payments, total, page))
    }
}
