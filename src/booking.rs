use chrono::{NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    auth::new_id,
    db,
    error::{conflict_on_unique, ApiError},
    models::{
        AppointmentRow, ServiceRow, StaffRow, UserRow, PAYMENT_DEPOSIT, PAYMENT_PENDING,
        STATUS_CANCELLED, STATUS_COMPLETED, STATUS_CONFIRMED, STATUS_PENDING,
    },
    pricing::{self, Quote},
    recurring::parse_date,
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    pub service_id: String,
    pub staff_id: String,
    pub appointment_date: String,
    pub appointment_time: String,
}

/// The booking wizard's final step: validate, price, persist. One pending
/// appointment plus its deposit row; nothing is written when validation
/// fails.
pub async fn create_booking(
    pool: &SqlitePool,
    user: &UserRow,
    input: &NewBooking,
    today: NaiveDate,
) -> Result<(AppointmentRow, Quote), ApiError> {
    validate_required(input)?;
    parse_date(&input.appointment_date, "appointment_date")?;
    if NaiveTime::parse_from_str(&input.appointment_time, "%H:%M").is_err() {
        return Err(ApiError::validation("appointment_time must be HH:MM"));
    }

    let service = fetch_service(pool, &input.service_id).await?;
    let staff = fetch_staff(pool, &input.staff_id).await?;

    let birthday_today = pricing::is_birthday_today(user.birthday.as_deref(), today);
    let quote = pricing::quote(
        service.base_price,
        staff.price_multiplier,
        &service.name,
        &user.role,
        birthday_today,
    );

    let appointment_id = new_id();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"INSERT INTO appointments
           (id, user_id, service_id, staff_id, appointment_date, appointment_time,
            total_price, discount_applied, discount_type, status, can_reschedule,
            recurring_booking_id, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, NULL, ?)"#,
    )
    .bind(&appointment_id)
    .bind(&user.id)
    .bind(&service.id)
    .bind(&staff.id)
    .bind(&input.appointment_date)
    .bind(&input.appointment_time)
    .bind(quote.final_price)
    .bind(quote.discount)
    .bind(quote.discount_type)
    .bind(STATUS_PENDING)
    .bind(&now)
    .execute(pool)
    .await
    .map_err(|err| conflict_on_unique(err, "This time slot is already booked."))?;

    // Recurring series are deposit-exempt; wizard bookings are not.
    let deposit = db::deposit_amount(pool).await;
    sqlx::query(
        r#"INSERT INTO payments (id, appointment_id, user_id, amount, kind, status, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(&appointment_id)
    .bind(&user.id)
    .bind(deposit)
    .bind(PAYMENT_DEPOSIT)
    .bind(PAYMENT_PENDING)
    .bind(&now)
    .execute(pool)
    .await?;

    let row = fetch_appointment(pool, &appointment_id).await?;
    Ok((row, quote))
}

pub async fn cancel_booking(
    pool: &SqlitePool,
    user_id: &str,
    appointment_id: &str,
) -> Result<AppointmentRow, ApiError> {
    let row = fetch_appointment(pool, appointment_id).await?;
    if row.user_id != user_id {
        return Err(ApiError::Forbidden);
    }
    if row.status != STATUS_PENDING && row.status != STATUS_CONFIRMED {
        return Err(ApiError::validation(
            "Only pending or confirmed appointments can be cancelled.",
        ));
    }

    sqlx::query("UPDATE appointments SET status = ? WHERE id = ?")
        .bind(STATUS_CANCELLED)
        .bind(appointment_id)
        .execute(pool)
        .await?;

    fetch_appointment(pool, appointment_id).await
}

pub async fn reschedule_booking(
    pool: &SqlitePool,
    user_id: &str,
    appointment_id: &str,
    new_date: &str,
    new_time: &str,
) -> Result<AppointmentRow, ApiError> {
    parse_date(new_date, "appointment_date")?;
    if NaiveTime::parse_from_str(new_time, "%H:%M").is_err() {
        return Err(ApiError::validation("appointment_time must be HH:MM"));
    }

    let row = fetch_appointment(pool, appointment_id).await?;
    if row.user_id != user_id {
        return Err(ApiError::Forbidden);
    }
    if row.can_reschedule == 0 {
        return Err(ApiError::validation(
            "This appointment cannot be rescheduled.",
        ));
    }
    if row.status != STATUS_PENDING && row.status != STATUS_CONFIRMED {
        return Err(ApiError::validation(
            "Only pending or confirmed appointments can be rescheduled.",
        ));
    }

    sqlx::query(
        "UPDATE appointments SET appointment_date = ?, appointment_time = ? WHERE id = ?",
    )
    .bind(new_date)
    .bind(new_time)
    .bind(appointment_id)
    .execute(pool)
    .await
    .map_err(|err| conflict_on_unique(err, "This time slot is already booked."))?;

    fetch_appointment(pool, appointment_id).await
}

/// Status moves forward only: pending -> confirmed -> completed, with
/// cancellation terminal from either live state.
pub fn allowed_transition(current: &str, next: &str) -> bool {
    match current {
        STATUS_PENDING => matches!(next, STATUS_CONFIRMED | STATUS_COMPLETED | STATUS_CANCELLED),
        STATUS_CONFIRMED => matches!(next, STATUS_COMPLETED | STATUS_CANCELLED),
        _ => false,
    }
}

pub async fn transition_status(
    pool: &SqlitePool,
    row: &AppointmentRow,
    next: &str,
) -> Result<(), ApiError> {
    if !matches!(next, STATUS_CONFIRMED | STATUS_COMPLETED | STATUS_CANCELLED) {
        return Err(ApiError::validation(format!("Invalid status '{next}'.")));
    }
    if !allowed_transition(&row.status, next) {
        return Err(ApiError::Conflict(format!(
            "Cannot move a {} appointment to {next}.",
            row.status
        )));
    }

    sqlx::query("UPDATE appointments SET status = ? WHERE id = ?")
        .bind(next)
        .bind(&row.id)
        .execute(pool)
        .await?;

    Ok(())
}

fn validate_required(input: &NewBooking) -> Result<(), ApiError> {
    if input.service_id.trim().is_empty() {
        return Err(ApiError::validation("Please select a service."));
    }
    if input.staff_id.trim().is_empty() {
        return Err(ApiError::validation("Please select a lash artist."));
    }
    if input.appointment_date.trim().is_empty() {
        return Err(ApiError::validation("Please pick a date."));
    }
    if input.appointment_time.trim().is_empty() {
        return Err(ApiError::validation("Please pick a time."));
    }
    Ok(())
}

async fn fetch_service(pool: &SqlitePool, service_id: &str) -> Result<ServiceRow, ApiError> {
    sqlx::query_as::<_, ServiceRow>(
        "SELECT id, name, category, base_price, duration_minutes FROM services WHERE id = ?",
    )
    .bind(service_id)
    .fetch_optional(pool)
    .await?
    .ok_or(ApiError::NotFound("service"))
}

async fn fetch_staff(pool: &SqlitePool, staff_id: &str) -> Result<StaffRow, ApiError> {
    sqlx::query_as::<_, StaffRow>(
        "SELECT id, user_id, name, tier, price_multiplier FROM staff WHERE id = ?",
    )
    .bind(staff_id)
    .fetch_optional(pool)
    .await?
    .ok_or(ApiError::NotFound("staff"))
}

pub async fn fetch_appointment(
    pool: &SqlitePool,
    appointment_id: &str,
) -> Result<AppointmentRow, ApiError> {
    sqlx::query_as::<_, AppointmentRow>(
        r#"SELECT id, user_id, service_id, staff_id, appointment_date, appointment_time,
                  total_price, discount_applied, discount_type, status, can_reschedule,
                  recurring_booking_id, created_at
           FROM appointments WHERE id = ?"#,
    )
    .bind(appointment_id)
    .fetch_optional(pool)
    .await?
    .ok_or(ApiError::NotFound("appointment"))
}
