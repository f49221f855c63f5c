use serde::Serialize;

pub const ROLE_CLIENT: &str = "client";
pub const ROLE_VIP: &str = "vip";
pub const ROLE_STAFF: &str = "staff";
pub const ROLE_MANAGER: &str = "manager";
pub const ROLE_ADMIN: &str = "admin";

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_CONFIRMED: &str = "confirmed";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_CANCELLED: &str = "cancelled";

pub const FREQ_WEEKLY: &str = "weekly";
pub const FREQ_BI_WEEKLY: &str = "bi-weekly";
pub const FREQ_MONTHLY: &str = "monthly";

pub const TIME_OFF_PENDING: &str = "pending";
pub const TIME_OFF_APPROVED: &str = "approved";
pub const TIME_OFF_DECLINED: &str = "declined";

pub const PAYMENT_DEPOSIT: &str = "deposit";
pub const PAYMENT_PENDING: &str = "pending";

#[allow(dead_code)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub password_hash: String,
    pub birthday: Option<String>,
    pub vip_streak: i64,
    pub referral_code: Option<String>,
    pub referred_by: Option<String>,
    pub active: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ServiceRow {
    pub id: String,
    pub name: String,
    pub category: String,
    pub base_price: f64,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StaffRow {
    pub id: String,
    pub user_id: Option<String>,
    pub name: String,
    pub tier: String,
    pub price_multiplier: f64,
}

#[allow(dead_code)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppointmentRow {
    pub id: String,
    pub user_id: String,
    pub service_id: String,
    pub staff_id: String,
    pub appointment_date: String,
    pub appointment_time: String,
    pub total_price: f64,
    pub discount_applied: f64,
    pub discount_type: Option<String>,
    pub status: String,
    pub can_reschedule: i64,
    pub recurring_booking_id: Option<String>,
    pub created_at: String,
}

/// Appointment joined with the names the client apps and event stream want.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AppointmentDetailRow {
    pub id: String,
    pub user_id: String,
    pub client_name: String,
    pub service_id: String,
    pub service_name: String,
    pub staff_id: String,
    pub staff_name: String,
    pub appointment_date: String,
    pub appointment_time: String,
    pub total_price: f64,
    pub discount_applied: f64,
    pub discount_type: Option<String>,
    pub status: String,
    pub can_reschedule: i64,
    pub recurring_booking_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RecurringBookingRow {
    pub id: String,
    pub user_id: String,
    pub service_id: String,
    pub staff_id: String,
    pub start_date: String,
    pub end_date: Option<String>,
    pub frequency: String,
    pub appointment_time: String,
    pub is_active: i64,
    pub total_appointments_generated: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TimeOffRow {
    pub id: String,
    pub staff_id: String,
    pub start_date: String,
    pub end_date: String,
    pub reason: String,
    pub status: String,
    pub reviewed_by: Option<String>,
    pub review_notes: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ConversationRow {
    pub id: String,
    pub client_id: String,
    pub staff_id: String,
    pub created_at: String,
    pub last_message_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub body: String,
    pub read: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub read: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StaffNoteRow {
    pub id: String,
    pub staff_id: String,
    pub client_id: String,
    pub note: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SettingRow {
    pub key: String,
    pub value: String,
    pub updated_at: String,
}
