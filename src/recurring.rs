use chrono::{Days, Months, NaiveDate, NaiveTime, Utc};
use sqlx::SqlitePool;

use crate::{
    auth::new_id,
    error::{conflict_on_unique, ApiError},
    models::{
        RecurringBookingRow, FREQ_BI_WEEKLY, FREQ_MONTHLY, FREQ_WEEKLY, STATUS_CONFIRMED,
    },
};

/// Hard safety bound for indefinite series, roughly two years of weekly
/// cadence.
pub const MAX_GENERATED_APPOINTMENTS: usize = 104;

/// Expands a recurring template into concrete appointment dates, starting at
/// `start` inclusive. Stops once the cursor passes `end` (when set) or the
/// cap is reached.
///
/// The monthly step is a calendar-month increment: a Jan 31 start lands on
/// the last day of February and stays on that day-of-month afterwards, so
/// short months shift the series.
pub fn expand_schedule(
    start: NaiveDate,
    end: Option<NaiveDate>,
    frequency: &str,
) -> Result<Vec<NaiveDate>, ApiError> {
    if !matches!(frequency, FREQ_WEEKLY | FREQ_BI_WEEKLY | FREQ_MONTHLY) {
        return Err(ApiError::validation(format!(
            "Unknown frequency '{frequency}'. Expected weekly, bi-weekly or monthly."
        )));
    }

    let mut dates = Vec::new();
    let mut cursor = start;

    while dates.len() < MAX_GENERATED_APPOINTMENTS {
        if let Some(end) = end {
            if cursor > end {
                break;
            }
        }
        dates.push(cursor);
        cursor = match advance(cursor, frequency) {
            Some(next) => next,
            None => break,
        };
    }

    Ok(dates)
}

fn advance(cursor: NaiveDate, frequency: &str) -> Option<NaiveDate> {
    match frequency {
        FREQ_WEEKLY => cursor.checked_add_days(Days::new(7)),
        FREQ_BI_WEEKLY => cursor.checked_add_days(Days::new(14)),
        FREQ_MONTHLY => cursor.checked_add_months(Months::new(1)),
        _ => None,
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct NewRecurringBooking {
    pub user_id: String,
    pub service_id: String,
    pub staff_id: String,
    pub start_date: String,
    pub end_date: Option<String>,
    pub frequency: String,
    pub appointment_time: String,
}

/// Creates the template and every generated appointment in one transaction.
/// A slot conflict or price-lookup failure rolls the whole series back, so
/// no template-without-children state ever becomes visible.
///
/// Generated appointments are auto-confirmed, reschedulable, deposit-exempt,
/// and priced at the service's base price as of generation time.
pub async fn create_with_children(
    pool: &SqlitePool,
    input: &NewRecurringBooking,
) -> Result<RecurringBookingRow, ApiError> {
    let start = parse_date(&input.start_date, "start_date")?;
    let end = match input.end_date.as_deref() {
        Some(raw) if !raw.trim().is_empty() => Some(parse_date(raw, "end_date")?),
        _ => None,
    };
    if NaiveTime::parse_from_str(&input.appointment_time, "%H:%M").is_err() {
        return Err(ApiError::validation("appointment_time must be HH:MM"));
    }

    let dates = expand_schedule(start, end, &input.frequency)?;

    let mut tx = pool.begin().await?;

    let base_price = sqlx::query_scalar::<_, f64>("SELECT base_price FROM services WHERE id = ?")
        .bind(&input.service_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ApiError::NotFound("service"))?;

    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM staff WHERE id = ?")
        .bind(&input.staff_id)
        .fetch_one(&mut *tx)
        .await?;
    if exists == 0 {
        return Err(ApiError::NotFound("staff"));
    }

    let template_id = new_id();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"INSERT INTO recurring_bookings
           (id, user_id, service_id, staff_id, start_date, end_date, frequency,
            appointment_time, is_active, total_appointments_generated, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, 0, ?)"#,
    )
    .bind(&template_id)
    .bind(&input.user_id)
    .bind(&input.service_id)
    .bind(&input.staff_id)
    .bind(&input.start_date)
    .bind(&input.end_date)
    .bind(&input.frequency)
    .bind(&input.appointment_time)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    for date in &dates {
        sqlx::query(
            r#"INSERT INTO appointments
               (id, user_id, service_id, staff_id, appointment_date, appointment_time,
                total_price, discount_applied, discount_type, status, can_reschedule,
                recurring_booking_id, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, 0, NULL, ?, 1, ?, ?)"#,
        )
        .bind(new_id())
        .bind(&input.user_id)
        .bind(&input.service_id)
        .bind(&input.staff_id)
        .bind(date.format("%Y-%m-%d").to_string())
        .bind(&input.appointment_time)
        .bind(base_price)
        .bind(STATUS_CONFIRMED)
        .bind(&template_id)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|err| {
            conflict_on_unique(err, "Series conflicts with an existing booking.")
        })?;
    }

    sqlx::query("UPDATE recurring_bookings SET total_appointments_generated = ? WHERE id = ?")
        .bind(dates.len() as i64)
        .bind(&template_id)
        .execute(&mut *tx)
        .await?;

    let row = sqlx::query_as::<_, RecurringBookingRow>(
        r#"SELECT id, user_id, service_id, staff_id, start_date, end_date, frequency,
                  appointment_time, is_active, total_appointments_generated, created_at
           FROM recurring_bookings WHERE id = ?"#,
    )
    .bind(&template_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(row)
}

pub fn parse_date(raw: &str, field: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::validation(format!("{field} must be YYYY-MM-DD")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn indefinite_series_caps_at_hard_bound() {
        let dates = expand_schedule(date(2024, 1, 1), None, FREQ_WEEKLY).unwrap();
        assert_eq!(dates.len(), MAX_GENERATED_APPOINTMENTS);

        let monthly = expand_schedule(date(2024, 1, 1), None, FREQ_MONTHLY).unwrap();
        assert_eq!(monthly.len(), MAX_GENERATED_APPOINTMENTS);
    }

    #[test]
    fn weekly_cadence_is_seven_days() {
        let dates = expand_schedule(date(2024, 1, 1), None, FREQ_WEEKLY).unwrap();
        for pair in dates.windows(2) {
            assert_eq!((pair[1] - pair[0]).num_days(), 7);
        }
    }

    #[test]
    fn bi_weekly_cadence_is_fourteen_days() {
        let dates = expand_schedule(date(2024, 1, 1), None, FREQ_BI_WEEKLY).unwrap();
        for pair in dates.windows(2) {
            assert_eq!((pair[1] - pair[0]).num_days(), 14);
        }
    }

    #[test]
    fn monthly_series_drifts_at_short_months() {
        // A Jan 31 start cannot stay on the 31st: February clamps it to the
        // 29th (2024 is a leap year) and the series keeps that day.
        let dates = expand_schedule(date(2024, 1, 31), Some(date(2024, 5, 1)), FREQ_MONTHLY)
            .unwrap();
        assert_eq!(
            dates,
            vec![
                date(2024, 1, 31),
                date(2024, 2, 29),
                date(2024, 3, 29),
                date(2024, 4, 29),
            ]
        );
    }

    #[test]
    fn weekly_series_with_end_date() {
        // Jan 1 through Mar 1: nine Mondays, the last on Feb 26.
        let dates = expand_schedule(date(2024, 1, 1), Some(date(2024, 3, 1)), FREQ_WEEKLY)
            .unwrap();
        assert_eq!(dates.len(), 9);
        assert_eq!(dates.first(), Some(&date(2024, 1, 1)));
        assert_eq!(dates.last(), Some(&date(2024, 2, 26)));
        assert!(dates.iter().all(|d| *d <= date(2024, 3, 1)));
    }

    #[test]
    fn end_date_is_inclusive() {
        let dates = expand_schedule(date(2024, 1, 1), Some(date(2024, 1, 15)), FREQ_WEEKLY)
            .unwrap();
        assert_eq!(
            dates,
            vec![date(2024, 1, 1), date(2024, 1, 8), date(2024, 1, 15)]
        );
    }

    #[test]
    fn end_before_start_yields_nothing() {
        let dates = expand_schedule(date(2024, 2, 1), Some(date(2024, 1, 1)), FREQ_WEEKLY)
            .unwrap();
        assert!(dates.is_empty());
    }

    #[test]
    fn unknown_frequency_is_rejected() {
        let err = expand_schedule(date(2024, 1, 1), None, "daily").unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }
}
