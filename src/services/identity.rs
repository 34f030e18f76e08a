use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;

/// 認証済みユーザーのアイデンティティ
///
/// twigate 自身は認証を行わない。セッションの正当性判定は
/// 認証バックエンドに委譲し、その結果だけを受け取る
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: Uuid,
    pub email: Option<String>,
}

impl Identity {
    /// 認証アプリに表示するアカウントラベル
    pub fn account_label(&self) -> &str {
        self.email.as_deref().unwrap_or("user")
    }
}

/// 認証バックエンドのユーザー情報レスポンス
#[derive(Debug, Deserialize)]
struct AuthUserResponse {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

/// 認証バックエンド API クライアント
#[derive(Clone)]
pub struct IdentityClient {
    client: reqwest::Client,
    auth_url: String,
    api_key: String,
}

impl IdentityClient {
    /// 新しい IdentityClient を作成
    pub fn new(auth_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            auth_url,
            api_key,
        }
    }

    /// アクセストークンから現在のユーザーを取得
    ///
    /// トークンが無効・期限切れの場合は認証エラー
    pub async fn get_user(&self, access_token: &str) -> Result<Identity, AppError> {
        let url = format!("{}/auth/v1/user", self.auth_url);

        let response: reqwest::Response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .header("apikey", &self.api_key)
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            tracing::debug!("無効なアクセストークン");
            return Err(AppError::Authentication("invalid_token".to_string()));
        }

        if !status.is_success() {
            tracing::error!(status = %status, "ユーザー情報の取得失敗");
            return Err(AppError::Internal(anyhow::anyhow!(
                "auth backend returned status: {}",
                status
            )));
        }

        let user: AuthUserResponse = response.json().await.map_err(|e| {
            tracing::error!(error = ?e, "認証バックエンドレスポンスのパースエラー");
            AppError::Internal(anyhow::anyhow!("Failed to parse auth backend response"))
        })?;

        tracing::debug!(user_id = %user.id, "ユーザー情報取得成功");
        Ok(Identity {
            id: user.id,
            email: user.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_label_prefers_email() {
        let identity = Identity {
            id: Uuid::nil(),
            email: Some("test@example.com".to_string()),
        };
        assert_eq!(identity.account_label(), "test@example.com");
    }

    #[test]
    fn test_account_label_falls_back_without_email() {
        let identity = Identity {
            id: Uuid::nil(),
            email: None,
        };
        assert_eq!(identity.account_label(), "user");
    }
}
