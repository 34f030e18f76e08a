use sqlx::PgPool;
use uuid::Uuid;

use crate::models::TwoFactorRecord;

#[derive(Clone)]
pub struct TwoFactorRepository {
    pool: PgPool,
}

impl TwoFactorRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// ユーザーIDで2FAレコードを検索
    pub async fn find_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<TwoFactorRecord>, sqlx::Error> {
        sqlx::query_as::<_, TwoFactorRecord>(
            r#"
            SELECT user_id, secret_sealed, enabled, created_at, updated_at
            FROM two_factor_auth
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// シークレットを発行・再発行する（単一のアトミックな upsert）
    ///
    /// # Note
    /// 既存レコードがある場合も enabled = false に戻す。
    /// 有効化済みユーザーの再発行は未検証シークレットを信用しないよう
    /// 同一ステートメント内で必ず保留状態に遷移させる
    pub async fn upsert_secret(
        &self,
        user_id: Uuid,
        secret_sealed: &[u8],
    ) -> Result<TwoFactorRecord, sqlx::Error> {
        sqlx::query_as::<_, TwoFactorRecord>(
            r#"
            INSERT INTO two_factor_auth (user_id, secret_sealed, enabled)
            VALUES ($1, $2, false)
            ON CONFLICT (user_id) DO UPDATE
            SET secret_sealed = EXCLUDED.secret_sealed,
                enabled = false,
                updated_at = NOW()
            RETURNING user_id, secret_sealed, enabled, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(secret_sealed)
        .fetch_one(&self.pool)
        .await
    }

    /// 2FAを有効化（登録時コード検証の成功後に呼び出す）
    pub async fn enable(&self, user_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE two_factor_auth
            SET enabled = true, updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// 2FAを無効化
    ///
    /// # Note
    /// レコードが存在しない場合も成功扱い（冪等）。
    /// シークレットは保持する（再有効化時に再スキャン不要）
    pub async fn disable(&self, user_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE two_factor_auth
            SET enabled = false, updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
