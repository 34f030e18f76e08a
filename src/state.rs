use std::sync::Arc;

use secrecy::ExposeSecret;
use sqlx::PgPool;

use crate::config::Config;
use crate::error::AppError;
use crate::repositories::{ProfileRepository, TwoFactorRepository};
use crate::services::{IdentityClient, SecretCipher, TotpService};

/// アプリケーション共有状態
///
/// axum の State として全ハンドラーで共有される。
/// Clone は必須（axum が内部で clone するため）。
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL コネクションプール
    pub db_pool: PgPool,
    /// アプリケーション設定（Arc で共有）
    pub config: Arc<Config>,
    /// 2FAレコードリポジトリ
    pub two_factor_repo: TwoFactorRepository,
    /// プロフィールリポジトリ（check-user 用）
    pub profile_repo: ProfileRepository,
    /// TOTPサービス
    pub totp_service: TotpService,
    /// シークレット封緘用暗号
    pub secret_cipher: SecretCipher,
    /// 認証バックエンドクライアント
    pub identity_client: IdentityClient,
}

impl AppState {
    /// 新しい AppState を作成
    pub fn new(db_pool: PgPool, config: Config) -> Result<Self, AppError> {
        let config = Arc::new(config);
        let two_factor_repo = TwoFactorRepository::new(db_pool.clone());
        let profile_repo = ProfileRepository::new(db_pool.clone());
        let totp_service = TotpService::new(config.totp_issuer.clone());
        let secret_cipher = SecretCipher::from_base64(config.secret_sealing_key.expose_secret())?;
        let identity_client = IdentityClient::new(
            config.auth_url.clone(),
            config.auth_api_key.expose_secret().clone(),
        );

        Ok(Self {
            db_pool,
            config,
            two_factor_repo,
            profile_repo,
            totp_service,
            secret_cipher,
            identity_client,
        })
    }
}
