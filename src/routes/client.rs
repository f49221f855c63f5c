use actix_web::{web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{client_validator, new_referral_code, AuthUser},
    booking::{self, NewBooking},
    db::{self, fetch_appointment_detail},
    error::{conflict_on_unique, ApiError},
    loyalty,
    messaging,
    models::{AppointmentDetailRow, ConversationRow, NotificationRow},
    notify,
    state::{AppState, ServerEvent},
};

#[derive(Deserialize)]
struct RescheduleForm {
    appointment_date: String,
    appointment_time: String,
}

#[derive(Deserialize)]
struct ConversationForm {
    staff_id: String,
}

#[derive(Deserialize)]
struct MessageForm {
    body: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .wrap(HttpAuthentication::basic(client_validator))
            .service(
                web::resource("/bookings")
                    .route(web::get().to(my_bookings))
                    .route(web::post().to(create_booking)),
            )
            .service(web::resource("/bookings/{id}/cancel").route(web::post().to(cancel_booking)))
            .service(
                web::resource("/bookings/{id}/reschedule")
                    .route(web::post().to(reschedule_booking)),
            )
            .service(web::resource("/loyalty").route(web::get().to(loyalty_status)))
            .service(web::resource("/referral").route(web::post().to(issue_referral_code)))
            .service(web::resource("/notifications").route(web::get().to(my_notifications)))
            .service(
                web::resource("/notifications/{id}/read")
                    .route(web::post().to(mark_notification_read)),
            )
            .service(
                web::resource("/conversations")
                    .route(web::get().to(my_conversations))
                    .route(web::post().to(open_conversation)),
            )
            .service(
                web::resource("/conversations/{id}/messages")
                    .route(web::get().to(list_messages))
                    .route(web::post().to(send_message)),
            )
            .service(web::resource("/push/subscribe").route(web::post().to(subscribe_push))),
    );
}

async fn create_booking(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Json<NewBooking>,
) -> Result<HttpResponse, ApiError> {
    let user = db::fetch_user(&state.db, &auth.id).await?;
    let today = Utc::now().date_naive();

    let (row, quote) = booking::create_booking(&state.db, &user, &form, today).await?;

    notify::notify_admins(
        &state,
        "booking_requested",
        "New booking request",
        &format!("{} requested an appointment.", user.display_name),
    )
    .await;

    if let Some(detail) = fetch_appointment_detail(&state.db, &row.id).await {
        let _ = state
            .events
            .send(ServerEvent::from_appointment("appointment_created", detail));
    }

    Ok(HttpResponse::Created().json(json!({
        "appointment_id": row.id,
        "status": row.status,
        "quote": quote,
    })))
}

async fn my_bookings(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse, ApiError> {
    let rows = sqlx::query_as::<_, AppointmentDetailRow>(
        r#"SELECT a.id, a.user_id, u.display_name AS client_name,
                  a.service_id, sv.name AS service_name,
                  a.staff_id, st.name AS staff_name,
                  a.appointment_date, a.appointment_time,
                  a.total_price, a.discount_applied, a.discount_type,
                  a.status, a.can_reschedule, a.recurring_booking_id
           FROM appointments a
           JOIN users u ON a.user_id = u.id
           JOIN services sv ON a.service_id = sv.id
           JOIN staff st ON a.staff_id = st.id
           WHERE a.user_id = ?
           ORDER BY a.appointment_date, a.appointment_time"#,
    )
    .bind(&auth.id)
    .fetch_all(&state.db)
    .await?;

    let today = Utc::now().date_naive();
    // A completed appointment dated today satisfies both predicates and is
    // listed in both buckets.
    let upcoming: Vec<&AppointmentDetailRow> = rows
        .iter()
        .filter(|row| loyalty::is_upcoming(&row.appointment_date, today, &row.status))
        .collect();
    let past: Vec<&AppointmentDetailRow> = rows
        .iter()
        .filter(|row| loyalty::is_past(&row.appointment_date, today, &row.status))
        .collect();

    Ok(HttpResponse::Ok().json(json!({
        "upcoming": upcoming,
        "past": past,
    })))
}

async fn cancel_booking(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let appointment_id = path.into_inner();
    let row = booking::cancel_booking(&state.db, &auth.id, &appointment_id).await?;

    notify::notify_admins(
        &state,
        "booking_cancelled",
        "Booking cancelled",
        &format!("{} cancelled an appointment.", auth.display_name),
    )
    .await;

    if let Some(detail) = fetch_appointment_detail(&state.db, &row.id).await {
        let _ = state
            .events
            .send(ServerEvent::from_appointment("appointment_updated", detail));
    }

    Ok(HttpResponse::Ok().json(json!({ "appointment_id": row.id, "status": row.status })))
}

async fn reschedule_booking(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Json<RescheduleForm>,
) -> Result<HttpResponse, ApiError> {
    let appointment_id = path.into_inner();
    let row = booking::reschedule_booking(
        &state.db,
        &auth.id,
        &appointment_id,
        &form.appointment_date,
        &form.appointment_time,
    )
    .await?;

    if let Some(detail) = fetch_appointment_detail(&state.db, &row.id).await {
        let _ = state
            .events
            .send(ServerEvent::from_appointment("appointment_updated", detail));
    }

    Ok(HttpResponse::Ok().json(json!({
        "appointment_id": row.id,
        "appointment_date": row.appointment_date,
        "appointment_time": row.appointment_time,
    })))
}

async fn loyalty_status(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse, ApiError> {
    let user = db::fetch_user(&state.db, &auth.id).await?;
    let summary = loyalty::loyalty_summary(&state.db, &user).await?;
    Ok(HttpResponse::Ok().json(summary))
}

async fn issue_referral_code(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse, ApiError> {
    let user = db::fetch_user(&state.db, &auth.id).await?;

    if let Some(code) = user.referral_code {
        return Ok(HttpResponse::Ok().json(json!({ "referral_code": code })));
    }

    let code = new_referral_code();
    sqlx::query("UPDATE users SET referral_code = ? WHERE id = ?")
        .bind(&code)
        .bind(&auth.id)
        .execute(&state.db)
        .await
        .map_err(|err| conflict_on_unique(err, "Referral code collision, try again."))?;

    Ok(HttpResponse::Created().json(json!({ "referral_code": code })))
}

async fn my_notifications(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse, ApiError> {
    let rows = sqlx::query_as::<_, NotificationRow>(
        r#"SELECT id, user_id, kind, title, body, read, created_at
           FROM notifications WHERE user_id = ?
           ORDER BY created_at DESC LIMIT 50"#,
    )
    .bind(&auth.id)
    .fetch_all(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(rows))
}

async fn mark_notification_read(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let notification_id = path.into_inner();
    let result = sqlx::query("UPDATE notifications SET read = 1 WHERE id = ? AND user_id = ?")
        .bind(&notification_id)
        .bind(&auth.id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("notification"));
    }

    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}

async fn my_conversations(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse, ApiError> {
    let rows = sqlx::query_as::<_, ConversationRow>(
        r#"SELECT id, client_id, staff_id, created_at, last_message_at
           FROM conversations WHERE client_id = ?
           ORDER BY last_message_at DESC"#,
    )
    .bind(&auth.id)
    .fetch_all(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(rows))
}

async fn open_conversation(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Json<ConversationForm>,
) -> Result<HttpResponse, ApiError> {
    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM staff WHERE id = ?")
        .bind(&form.staff_id)
        .fetch_one(&state.db)
        .await?;
    if exists == 0 {
        return Err(ApiError::NotFound("staff"));
    }

    let row = messaging::ensure_conversation(&state.db, &auth.id, &form.staff_id).await?;
    Ok(HttpResponse::Ok().json(row))
}

async fn list_messages(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let conversation_id = path.into_inner();
    let conversation = messaging::conversation(&state.db, &conversation_id).await?;
    if conversation.client_id != auth.id {
        return Err(ApiError::Forbidden);
    }

    let messages = messaging::list_messages(&state.db, &conversation_id).await?;
    messaging::mark_read(&state.db, &conversation_id, &auth.id).await?;

    Ok(HttpResponse::Ok().json(messages))
}

async fn send_message(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Json<MessageForm>,
) -> Result<HttpResponse, ApiError> {
    let conversation_id = path.into_inner();
    let conversation = messaging::conversation(&state.db, &conversation_id).await?;
    if conversation.client_id != auth.id {
        return Err(ApiError::Forbidden);
    }

    let message = messaging::send_message(&state.db, &conversation_id, &auth.id, &form.body).await?;

    let _ = state
        .events
        .send(ServerEvent::message(&conversation_id, &auth.id));

    let staff_user = sqlx::query_scalar::<_, Option<String>>(
        "SELECT user_id FROM staff WHERE id = ?",
    )
    .bind(&conversation.staff_id)
    .fetch_optional(&state.db)
    .await?
    .flatten();

    if let Some(staff_user_id) = staff_user {
        notify::notify_user(
            &state,
            &staff_user_id,
            "message",
            "New message",
            &format!("{} sent you a message.", auth.display_name),
        )
        .await;
    }

    Ok(HttpResponse::Created().json(message))
}

async fn subscribe_push(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let raw = String::from_utf8(body.to_vec()).unwrap_or_default();
    if raw.trim().is_empty() {
        return Err(ApiError::validation("Subscription payload is required."));
    }

    notify::store_subscription(&state.db, &auth.id, &raw).await?;
    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}
