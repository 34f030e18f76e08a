use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// ユーザーの二要素認証（TOTP）レコード
///
/// ユーザーごとに最大1件（user_id が主キー）。
/// シークレットは AES-256-GCM で封緘されて保存される。
/// 平文シークレットはログ・レスポンスに出力禁止（発行時の1回を除く）
#[derive(Debug, FromRow, Serialize)]
pub struct TwoFactorRecord {
    pub user_id: Uuid,
    #[serde(skip)]
    pub secret_sealed: Vec<u8>,
    /// false = 発行済み・未検証（PendingVerification）、true = 有効
    pub enabled: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
