use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("認証エラー: {0}")]
    Authentication(String),

    #[error("バリデーションエラー: {0}")]
    Validation(String),

    #[error("データベースエラー")]
    Database(#[from] sqlx::Error),

    #[error("認証バックエンド API エラー")]
    AuthBackend(#[from] reqwest::Error),

    #[error("内部エラー")]
    Internal(#[from] anyhow::Error),

    #[error("二要素認証が設定されていません")]
    TotpNotProvisioned,

    #[error("認証コードが無効です")]
    TotpInvalid,

    #[error("二要素認証を確認できませんでした")]
    TotpVerificationFailed,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Authentication(_) => (StatusCode::UNAUTHORIZED, "認証が必要です".to_string()),
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Database(e) => {
                tracing::error!(error = ?e, "データベースエラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "内部エラーが発生しました".to_string(),
                )
            }
            Self::AuthBackend(e) => {
                tracing::error!(error = ?e, "認証バックエンド通信エラー");
                (
                    StatusCode::BAD_GATEWAY,
                    "認証サーバーとの通信に失敗しました".to_string(),
                )
            }
            Self::Internal(e) => {
                tracing::error!(error = ?e, "内部エラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "内部エラーが発生しました".to_string(),
                )
            }
            Self::TotpNotProvisioned => (
                StatusCode::BAD_REQUEST,
                "二要素認証が設定されていません。先にシークレットを発行してください".to_string(),
            ),
            Self::TotpInvalid => (
                StatusCode::BAD_REQUEST,
                "認証コードが正しくありません".to_string(),
            ),
            // ログイン時検証は「未設定」「未有効化」「コード不一致」を区別しない
            // （レスポンスから登録状態を推測されないため）
            Self::TotpVerificationFailed => (
                StatusCode::BAD_REQUEST,
                "二要素認証を確認できませんでした".to_string(),
            ),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
