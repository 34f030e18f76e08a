use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// アプリ本体が所有する profiles テーブルの行
///
/// twigate からは読み取り専用（check-user のメールアドレス解決にのみ使用）
#[derive(Debug, FromRow, Serialize)]
pub struct Profile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
