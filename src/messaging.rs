use chrono::Utc;
use sqlx::SqlitePool;

use crate::{
    auth::new_id,
    error::ApiError,
    models::{ConversationRow, MessageRow},
};

pub async fn conversation(
    pool: &SqlitePool,
    conversation_id: &str,
) -> Result<ConversationRow, ApiError> {
    sqlx::query_as::<_, ConversationRow>(
        r#"SELECT id, client_id, staff_id, created_at, last_message_at
           FROM conversations WHERE id = ?"#,
    )
    .bind(conversation_id)
    .fetch_optional(pool)
    .await?
    .ok_or(ApiError::NotFound("conversation"))
}

/// One conversation per client/staff pair; reuses an existing row.
pub async fn ensure_conversation(
    pool: &SqlitePool,
    client_id: &str,
    staff_id: &str,
) -> Result<ConversationRow, ApiError> {
    let existing = sqlx::query_as::<_, ConversationRow>(
        r#"SELECT id, client_id, staff_id, created_at, last_message_at
           FROM conversations WHERE client_id = ? AND staff_id = ?"#,
    )
    .bind(client_id)
    .bind(staff_id)
    .fetch_optional(pool)
    .await?;

    if let Some(row) = existing {
        return Ok(row);
    }

    let id = new_id();
    sqlx::query(
        r#"INSERT INTO conversations (id, client_id, staff_id, created_at)
           VALUES (?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(client_id)
    .bind(staff_id)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    conversation(pool, &id).await
}

pub async fn list_messages(
    pool: &SqlitePool,
    conversation_id: &str,
) -> Result<Vec<MessageRow>, ApiError> {
    let rows = sqlx::query_as::<_, MessageRow>(
        r#"SELECT id, conversation_id, sender_id, body, read, created_at
           FROM messages WHERE conversation_id = ?
           ORDER BY created_at"#,
    )
    .bind(conversation_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn send_message(
    pool: &SqlitePool,
    conversation_id: &str,
    sender_id: &str,
    body: &str,
) -> Result<MessageRow, ApiError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(ApiError::validation("Message body is required."));
    }

    let id = new_id();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"INSERT INTO messages (id, conversation_id, sender_id, body, read, created_at)
           VALUES (?, ?, ?, ?, 0, ?)"#,
    )
    .bind(&id)
    .bind(conversation_id)
    .bind(sender_id)
    .bind(body)
    .bind(&now)
    .execute(pool)
    .await?;

    sqlx::query("UPDATE conversations SET last_message_at = ? WHERE id = ?")
        .bind(&now)
        .bind(conversation_id)
        .execute(pool)
        .await?;

    let row = sqlx::query_as::<_, MessageRow>(
        r#"SELECT id, conversation_id, sender_id, body, read, created_at
           FROM messages WHERE id = ?"#,
    )
    .bind(&id)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Marks everything the reader did not send as read.
pub async fn mark_read(
    pool: &SqlitePool,
    conversation_id: &str,
    reader_id: &str,
) -> Result<(), ApiError> {
    sqlx::query("UPDATE messages SET read = 1 WHERE conversation_id = ? AND sender_id != ?")
        .bind(conversation_id)
        .bind(reader_id)
        .execute(pool)
        .await?;
    Ok(())
}
