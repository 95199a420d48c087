use serde::Serialize;
use sqlx::FromRow;

/// Student row as resolved by an identity adapter.
#[derive(Clone, Debug, FromRow, Serialize)]
pub struct Student {
    pub id: i64,
    pub roll: String,
    pub full_name: String,
    pub qr_token: Option<String>,
    pub section_id: Option<i64>,
    pub active: bool,
}
