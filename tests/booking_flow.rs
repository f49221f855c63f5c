mod common;

use chrono::NaiveDate;

use lashloft::booking::{self, NewBooking};
use lashloft::db;
use lashloft::error::ApiError;
use lashloft::loyalty;
use lashloft::models::{ROLE_CLIENT, ROLE_VIP, STATUS_CANCELLED, STATUS_PENDING};

fn booking_input(service_id: &str, staff_id: &str, date: &str, time: &str) -> NewBooking {
    NewBooking {
        service_id: service_id.to_string(),
        staff_id: staff_id.to_string(),
        appointment_date: date.to_string(),
        appointment_time: time.to_string(),
    }
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
}

#[tokio::test]
async fn wizard_booking_is_pending_with_deposit() {
    let pool = common::test_pool().await;
    let user_id = common::insert_user(&pool, ROLE_VIP, None).await;
    let service_id = common::insert_service(&pool, "Hybrid Full Set", 140.0).await;
    let staff_id = common::insert_staff(&pool, "Mia", 1.25).await;

    let user = db::fetch_user(&pool, &user_id).await.unwrap();
    let input = booking_input(&service_id, &staff_id, "2024-07-01", "10:00");

    let (row, quote) = booking::create_booking(&pool, &user, &input, today())
        .await
        .expect("booking should succeed");

    assert_eq!(row.status, STATUS_PENDING);
    assert_eq!(row.can_reschedule, 1);
    assert_eq!(row.recurring_booking_id, None);

    // 140 * 1.25 - 20 (hybrid full set, vip)
    assert_eq!(quote.discount, 20.0);
    assert_eq!(quote.discount_type, Some("vip"));
    assert!((row.total_price - 155.0).abs() < f64::EPSILON);

    let (amount, kind, status) = sqlx::query_as::<_, (f64, String, String)>(
        "SELECT amount, kind, status FROM payments WHERE appointment_id = ?",
    )
    .bind(&row.id)
    .fetch_one(&pool)
    .await
    .expect("deposit row");
    assert_eq!(amount, 20.0);
    assert_eq!(kind, "deposit");
    assert_eq!(status, "pending");
}

#[tokio::test]
async fn birthday_refill_discount_applies() {
    let pool = common::test_pool().await;
    let user_id = common::insert_user(&pool, ROLE_VIP, Some("1990-06-15")).await;
    let service_id = common::insert_service(&pool, "Lash Refill", 65.0).await;
    let staff_id = common::insert_staff(&pool, "Mia", 1.0).await;

    let user = db::fetch_user(&pool, &user_id).await.unwrap();
    let input = booking_input(&service_id, &staff_id, "2024-07-01", "10:00");

    let (row, quote) = booking::create_booking(&pool, &user, &input, today())
        .await
        .unwrap();

    assert_eq!(quote.discount, 20.0);
    assert_eq!(quote.discount_type, Some("birthday"));
    assert_eq!(row.discount_type.as_deref(), Some("birthday"));
    assert!((row.total_price - 45.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn non_vip_pays_full_price() {
    let pool = common::test_pool().await;
    let user_id = common::insert_user(&pool, ROLE_CLIENT, Some("1990-06-15")).await;
    let service_id = common::insert_service(&pool, "Mega Volume Full Set", 190.0).await;
    let staff_id = common::insert_staff(&pool, "Mia", 1.0).await;

    let user = db::fetch_user(&pool, &user_id).await.unwrap();
    let input = booking_input(&service_id, &staff_id, "2024-07-01", "10:00");

    let (row, quote) = booking::create_booking(&pool, &user, &input, today())
        .await
        .unwrap();

    assert_eq!(quote.discount, 0.0);
    assert_eq!(row.discount_type, None);
    assert!((row.total_price - 190.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn missing_fields_reject_before_any_write() {
    let pool = common::test_pool().await;
    let user_id = common::insert_user(&pool, ROLE_CLIENT, None).await;
    let service_id = common::insert_service(&pool, "Lash Refill", 65.0).await;
    let staff_id = common::insert_staff(&pool, "Mia", 1.0).await;

    let user = db::fetch_user(&pool, &user_id).await.unwrap();
    let input = booking_input(&service_id, "", "2024-07-01", "10:00");

    let err = booking::create_booking(&pool, &user, &input, today())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    let bad_date = booking_input(&service_id, &staff_id, "July 1st", "10:00");
    let err = booking::create_booking(&pool, &user, &bad_date, today())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    assert_eq!(common::count_rows(&pool, "appointments").await, 0);
    assert_eq!(common::count_rows(&pool, "payments").await, 0);
}

#[tokio::test]
async fn double_booking_a_slot_is_a_conflict() {
    let pool = common::test_pool().await;
    let first = common::insert_user(&pool, ROLE_CLIENT, None).await;
    let second = common::insert_user(&pool, ROLE_CLIENT, None).await;
    let service_id = common::insert_service(&pool, "Lash Refill", 65.0).await;
    let staff_id = common::insert_staff(&pool, "Mia", 1.0).await;

    let input = booking_input(&service_id, &staff_id, "2024-07-01", "10:00");

    let user = db::fetch_user(&pool, &first).await.unwrap();
    booking::create_booking(&pool, &user, &input, today())
        .await
        .unwrap();

    let user = db::fetch_user(&pool, &second).await.unwrap();
    let err = booking::create_booking(&pool, &user, &input, today())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
}

#[tokio::test]
async fn cancellation_is_terminal() {
    let pool = common::test_pool().await;
    let user_id = common::insert_user(&pool, ROLE_CLIENT, None).await;
    let service_id = common::insert_service(&pool, "Lash Refill", 65.0).await;
    let staff_id = common::insert_staff(&pool, "Mia", 1.0).await;

    let user = db::fetch_user(&pool, &user_id).await.unwrap();
    let input = booking_input(&service_id, &staff_id, "2024-07-01", "10:00");
    let (row, _) = booking::create_booking(&pool, &user, &input, today())
        .await
        .unwrap();

    let cancelled = booking::cancel_booking(&pool, &user_id, &row.id).await.unwrap();
    assert_eq!(cancelled.status, STATUS_CANCELLED);

    let err = booking::cancel_booking(&pool, &user_id, &row.id).await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test]
async fn only_the_owner_may_cancel() {
    let pool = common::test_pool().await;
    let owner = common::insert_user(&pool, ROLE_CLIENT, None).await;
    let other = common::insert_user(&pool, ROLE_CLIENT, None).await;
    let service_id = common::insert_service(&pool, "Lash Refill", 65.0).await;
    let staff_id = common::insert_staff(&pool, "Mia", 1.0).await;

    let user = db::fetch_user(&pool, &owner).await.unwrap();
    let input = booking_input(&service_id, &staff_id, "2024-07-01", "10:00");
    let (row, _) = booking::create_booking(&pool, &user, &input, today())
        .await
        .unwrap();

    let err = booking::cancel_booking(&pool, &other, &row.id).await.unwrap_err();
    assert!(matches!(err, ApiError::Forbidden));
}

#[tokio::test]
async fn reschedule_respects_the_flag() {
    let pool = common::test_pool().await;
    let user_id = common::insert_user(&pool, ROLE_CLIENT, None).await;
    let service_id = common::insert_service(&pool, "Lash Refill", 65.0).await;
    let staff_id = common::insert_staff(&pool, "Mia", 1.0).await;

    let user = db::fetch_user(&pool, &user_id).await.unwrap();
    let input = booking_input(&service_id, &staff_id, "2024-07-01", "10:00");
    let (row, _) = booking::create_booking(&pool, &user, &input, today())
        .await
        .unwrap();

    let moved =
        booking::reschedule_booking(&pool, &user_id, &row.id, "2024-07-02", "11:00")
            .await
            .unwrap();
    assert_eq!(moved.appointment_date, "2024-07-02");
    assert_eq!(moved.appointment_time, "11:00");

    sqlx::query("UPDATE appointments SET can_reschedule = 0 WHERE id = ?")
        .bind(&row.id)
        .execute(&pool)
        .await
        .unwrap();

    let err = booking::reschedule_booking(&pool, &user_id, &row.id, "2024-07-03", "11:00")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test]
async fn status_only_moves_forward() {
    let pool = common::test_pool().await;
    let user_id = common::insert_user(&pool, ROLE_CLIENT, None).await;
    let service_id = common::insert_service(&pool, "Lash Refill", 65.0).await;
    let staff_id = common::insert_staff(&pool, "Mia", 1.0).await;

    let user = db::fetch_user(&pool, &user_id).await.unwrap();
    let input = booking_input(&service_id, &staff_id, "2024-07-01", "10:00");
    let (row, _) = booking::create_booking(&pool, &user, &input, today())
        .await
        .unwrap();

    booking::transition_status(&pool, &row, "confirmed").await.unwrap();

    let row = booking::fetch_appointment(&pool, &row.id).await.unwrap();
    let err = booking::transition_status(&pool, &row, "pending").await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    booking::transition_status(&pool, &row, "completed").await.unwrap();

    let row = booking::fetch_appointment(&pool, &row.id).await.unwrap();
    let err = booking::transition_status(&pool, &row, "cancelled").await.unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
}

#[tokio::test]
async fn completion_streak_promotes_at_target() {
    let pool = common::test_pool().await;
    let user_id = common::insert_user(&pool, ROLE_CLIENT, None).await;
    let service_id = common::insert_service(&pool, "Lash Refill", 65.0).await;
    let staff_id = common::insert_staff(&pool, "Mia", 1.0).await;

    common::insert_completed_appointments(&pool, &user_id, &service_id, &staff_id, "2023-01-01", 9)
        .await;
    loyalty::record_completion(&pool, &user_id).await.unwrap();

    let user = db::fetch_user(&pool, &user_id).await.unwrap();
    assert_eq!(user.vip_streak, 1);
    assert_eq!(user.role, ROLE_CLIENT, "nine completions stay client");

    common::insert_completed_appointments(&pool, &user_id, &service_id, &staff_id, "2023-01-02", 1)
        .await;
    loyalty::record_completion(&pool, &user_id).await.unwrap();

    let user = db::fetch_user(&pool, &user_id).await.unwrap();
    assert_eq!(user.role, ROLE_VIP, "tenth completion promotes");
}

#[tokio::test]
async fn first_completion_fast_tracks_the_referrer() {
    let pool = common::test_pool().await;
    let referrer = common::insert_user(&pool, ROLE_CLIENT, None).await;
    let referred = common::insert_user(&pool, ROLE_CLIENT, None).await;
    let service_id = common::insert_service(&pool, "Lash Refill", 65.0).await;
    let staff_id = common::insert_staff(&pool, "Mia", 1.0).await;

    sqlx::query("UPDATE users SET referred_by = ? WHERE id = ?")
        .bind(&referrer)
        .bind(&referred)
        .execute(&pool)
        .await
        .unwrap();

    common::insert_completed_appointments(&pool, &referred, &service_id, &staff_id, "2023-01-01", 1)
        .await;
    loyalty::record_completion(&pool, &referred).await.unwrap();

    let user = db::fetch_user(&pool, &referrer).await.unwrap();
    assert_eq!(user.role, ROLE_VIP, "referrer is fast-tracked");

    let referred_user = db::fetch_user(&pool, &referred).await.unwrap();
    assert_eq!(referred_user.role, ROLE_CLIENT);
}
