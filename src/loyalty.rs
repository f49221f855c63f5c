use chrono::NaiveDate;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::{
    error::ApiError,
    models::{UserRow, ROLE_CLIENT, ROLE_VIP, STATUS_CANCELLED, STATUS_COMPLETED},
};

/// Completed appointments needed to earn VIP status.
pub const VIP_COMPLETED_TARGET: i64 = 10;

/// The streak value at which the one-time referral fast-track offer shows.
pub const FAST_TRACK_STREAK: i64 = 5;

/// Progress toward VIP, capped at the target for display no matter how many
/// appointments were actually completed.
pub fn vip_progress(completed_count: i64) -> i64 {
    completed_count.min(VIP_COMPLETED_TARGET)
}

pub fn bookings_to_vip(completed_count: i64) -> i64 {
    VIP_COMPLETED_TARGET - vip_progress(completed_count)
}

/// Exact-equality trigger: a streak of 4 or 6 does not show the offer, and a
/// user who skips past 5 never sees it. Issuing a referral code retires the
/// offer for good.
pub fn fast_track_offer(vip_streak: i64, has_referral_code: bool) -> bool {
    vip_streak == FAST_TRACK_STREAK && !has_referral_code
}

/// Upcoming and past buckets overlap for a completed appointment dated
/// today; both predicates hold and the appointment is listed twice.
pub fn is_upcoming(appointment_date: &str, today: NaiveDate, status: &str) -> bool {
    let Ok(date) = NaiveDate::parse_from_str(appointment_date, "%Y-%m-%d") else {
        return false;
    };
    date >= today && status != STATUS_CANCELLED
}

pub fn is_past(appointment_date: &str, today: NaiveDate, status: &str) -> bool {
    let Ok(date) = NaiveDate::parse_from_str(appointment_date, "%Y-%m-%d") else {
        return false;
    };
    (date < today || status == STATUS_COMPLETED) && status != STATUS_CANCELLED
}

#[derive(Debug, Clone, Serialize)]
pub struct LoyaltySummary {
    pub completed_appointments: i64,
    pub vip_progress: i64,
    pub bookings_to_vip: i64,
    pub vip_streak: i64,
    pub is_vip: bool,
    pub referral_code: Option<String>,
    pub fast_track_offer: bool,
}

pub async fn loyalty_summary(
    pool: &SqlitePool,
    user: &UserRow,
) -> Result<LoyaltySummary, ApiError> {
    let completed = completed_count(pool, &user.id).await?;

    Ok(LoyaltySummary {
        completed_appointments: completed,
        vip_progress: vip_progress(completed),
        bookings_to_vip: bookings_to_vip(completed),
        vip_streak: user.vip_streak,
        is_vip: user.role == ROLE_VIP,
        referral_code: user.referral_code.clone(),
        fast_track_offer: fast_track_offer(user.vip_streak, user.referral_code.is_some()),
    })
}

async fn completed_count(pool: &SqlitePool, user_id: &str) -> Result<i64, ApiError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM appointments WHERE user_id = ? AND status = ?",
    )
    .bind(user_id)
    .bind(STATUS_COMPLETED)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Runs after an appointment flips to completed: bumps the client's streak,
/// promotes them at the target, and fast-tracks their referrer on the first
/// completion. Promotion is one-way; a vip is never demoted.
pub async fn record_completion(pool: &SqlitePool, user_id: &str) -> Result<(), ApiError> {
    sqlx::query("UPDATE users SET vip_streak = vip_streak + 1 WHERE id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;

    let completed = completed_count(pool, user_id).await?;

    if completed >= VIP_COMPLETED_TARGET {
        promote_to_vip(pool, user_id).await?;
    }

    if completed == 1 {
        let referred_by = sqlx::query_scalar::<_, Option<String>>(
            "SELECT referred_by FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .flatten();

        if let Some(referrer_id) = referred_by {
            promote_to_vip(pool, &referrer_id).await?;
        }
    }

    Ok(())
}

async fn promote_to_vip(pool: &SqlitePool, user_id: &str) -> Result<(), ApiError> {
    let result = sqlx::query("UPDATE users SET role = ? WHERE id = ? AND role = ?")
        .bind(ROLE_VIP)
        .bind(user_id)
        .bind(ROLE_CLIENT)
        .execute(pool)
        .await?;

    if result.rows_affected() > 0 {
        log::info!("User {user_id} promoted to VIP");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{STATUS_CONFIRMED, STATUS_PENDING};

    #[test]
    fn progress_caps_at_target() {
        assert_eq!(vip_progress(0), 0);
        assert_eq!(vip_progress(7), 7);
        assert_eq!(vip_progress(10), 10);
        assert_eq!(vip_progress(27), 10);
    }

    #[test]
    fn bookings_to_vip_counts_down() {
        assert_eq!(bookings_to_vip(0), 10);
        assert_eq!(bookings_to_vip(7), 3);
        assert_eq!(bookings_to_vip(27), 0);
    }

    #[test]
    fn fast_track_triggers_on_exact_streak() {
        assert!(!fast_track_offer(4, false));
        assert!(fast_track_offer(5, false));
        assert!(!fast_track_offer(6, false));
    }

    #[test]
    fn issued_referral_code_retires_the_offer() {
        assert!(!fast_track_offer(5, true));
    }

    #[test]
    fn bucketing_splits_on_today() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();

        assert!(is_upcoming("2024-06-16", today, STATUS_PENDING));
        assert!(is_upcoming("2024-06-15", today, STATUS_CONFIRMED));
        assert!(!is_upcoming("2024-06-14", today, STATUS_CONFIRMED));

        assert!(is_past("2024-06-14", today, STATUS_COMPLETED));
        assert!(is_past("2024-06-14", today, STATUS_CONFIRMED));
        assert!(!is_past("2024-06-16", today, STATUS_PENDING));
    }

    #[test]
    fn completed_today_lands_in_both_buckets() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        assert!(is_upcoming("2024-06-15", today, STATUS_COMPLETED));
        assert!(is_past("2024-06-15", today, STATUS_COMPLETED));
    }

    #[test]
    fn cancelled_is_in_neither_bucket() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        assert!(!is_upcoming("2024-06-16", today, STATUS_CANCELLED));
        assert!(!is_past("2024-06-14", today, STATUS_CANCELLED));
    }

    #[test]
    fn unparseable_dates_are_skipped() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        assert!(!is_upcoming("soon", today, STATUS_PENDING));
        assert!(!is_past("soon", today, STATUS_COMPLETED));
    }
}
