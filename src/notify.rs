use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;
use web_push::{
    ContentEncoding, IsahcWebPushClient, SubscriptionInfo, VapidSignatureBuilder, WebPushClient,
    WebPushError, WebPushMessageBuilder, URL_SAFE_NO_PAD,
};

use crate::{
    auth::new_id,
    models::ROLE_ADMIN,
    state::{AppState, PushConfig},
};

#[derive(Debug, Deserialize)]
pub struct PushSubscriptionInput {
    pub endpoint: String,
    pub keys: PushKeys,
}

#[derive(Debug, Deserialize)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, sqlx::FromRow)]
struct PushSubscriptionRow {
    endpoint: String,
    p256dh: String,
    auth: String,
}

pub async fn store_subscription(
    pool: &SqlitePool,
    user_id: &str,
    raw_subscription: &str,
) -> Result<(), sqlx::Error> {
    let subscription: PushSubscriptionInput = match serde_json::from_str(raw_subscription) {
        Ok(value) => value,
        Err(err) => {
            log::warn!("Invalid push subscription payload: {err}");
            return Ok(());
        }
    };

    sqlx::query(
        r#"INSERT INTO push_subscriptions (id, user_id, endpoint, p256dh, auth, created_at)
           VALUES (?, ?, ?, ?, ?, ?)
           ON CONFLICT(user_id, endpoint) DO UPDATE SET
             p256dh = excluded.p256dh,
             auth = excluded.auth"#,
    )
    .bind(new_id())
    .bind(user_id)
    .bind(subscription.endpoint)
    .bind(subscription.keys.p256dh)
    .bind(subscription.keys.auth)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Records an in-app notification and fans it out to the user's push
/// subscriptions. Failures are logged and swallowed; notifying must never
/// fail the operation that triggered it.
pub async fn notify_user(state: &AppState, user_id: &str, kind: &str, title: &str, body: &str) {
    let result = sqlx::query(
        r#"INSERT INTO notifications (id, user_id, kind, title, body, read, created_at)
           VALUES (?, ?, ?, ?, ?, 0, ?)"#,
    )
    .bind(new_id())
    .bind(user_id)
    .bind(kind)
    .bind(title)
    .bind(body)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await;

    if let Err(err) = result {
        log::warn!("Notification insert failed for {user_id}: {err}");
    }

    if !state.push.enabled() {
        return;
    }

    let rows = sqlx::query_as::<_, PushSubscriptionRow>(
        "SELECT endpoint, p256dh, auth FROM push_subscriptions WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    if rows.is_empty() {
        return;
    }

    let payload = serde_json::json!({
        "title": title,
        "body": body,
        "kind": kind,
    })
    .to_string();

    for row in rows {
        if let Err(err) = send_push(&state.push, row, &payload).await {
            log::warn!("Push send failed: {err}");
        }
    }
}

pub async fn notify_admins(state: &AppState, kind: &str, title: &str, body: &str) {
    let admin_ids = sqlx::query_scalar::<_, String>(
        "SELECT id FROM users WHERE role = ? AND active = 1",
    )
    .bind(ROLE_ADMIN)
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    for admin_id in admin_ids {
        notify_user(state, &admin_id, kind, title, body).await;
    }
}

async fn send_push(
    config: &PushConfig,
    row: PushSubscriptionRow,
    payload: &str,
) -> Result<(), WebPushError> {
    let subscription = SubscriptionInfo::new(row.endpoint, row.p256dh, row.auth);
    let mut builder = WebPushMessageBuilder::new(&subscription);
    builder.set_payload(ContentEncoding::Aes128Gcm, payload.as_bytes());

    let mut vapid_builder =
        VapidSignatureBuilder::from_base64(&config.private_key, URL_SAFE_NO_PAD, &subscription)?;
    vapid_builder.add_claim("sub", config.subject.clone());

    builder.set_vapid_signature(vapid_builder.build()?);

    let client = IsahcWebPushClient::new()?;
    client.send(builder.build()?).await?;
    Ok(())
}
