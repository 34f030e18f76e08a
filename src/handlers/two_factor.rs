use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header},
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::services::{Identity, TotpService};
use crate::state::AppState;

// === シークレット発行 ===

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub secret: String,
    #[serde(rename = "qrCode")]
    pub qr_code: String,
}

/// POST /api/2fa/generate
///
/// 新しいTOTPシークレットを発行し、QRコードとともに返す。
/// 再発行時は既存シークレットを上書きし enabled = false に戻す
/// （以前の認証アプリ登録はこの時点で無効になる。意図された挙動）。
///
/// # Security
/// - シークレット平文はこのレスポンス以外に出力禁止
/// - 保存に失敗した場合はシークレットを返さない
pub async fn generate_2fa(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<GenerateResponse>, AppError> {
    let identity = current_identity(&state, &headers).await?;

    // シークレット生成・封緘・保存
    // upsert は1ステートメントで enabled = false へのリセットまで行う
    let secret = TotpService::generate_secret();
    let sealed = state.secret_cipher.seal(&secret)?;
    state
        .two_factor_repo
        .upsert_secret(identity.id, &sealed)
        .await?;

    // QRコード生成（保存成功後のみ）
    let qr_code = state
        .totp_service
        .qr_code_data_uri(identity.account_label(), &secret)?;

    tracing::info!(user_id = %identity.id, "2FAシークレット発行");

    Ok(Json(GenerateResponse { secret, qr_code }))
}

// === 登録時検証（有効化） ===

#[derive(Debug, Deserialize)]
pub struct EnableRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct EnableResponse {
    pub success: bool,
}

/// POST /api/2fa/enable
///
/// 発行済みシークレットに対する初回コード検証。成功で2FAを有効化する。
/// 有効化済みレコードへの再実行は、正しいコードであれば成功（冪等）。
///
/// # Security
/// - コードはログ出力禁止
pub async fn enable_2fa(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<EnableRequest>,
) -> Result<Json<EnableResponse>, AppError> {
    validate_totp_code(&request.code)?;

    let identity = current_identity(&state, &headers).await?;

    let record = state
        .two_factor_repo
        .find_by_user_id(identity.id)
        .await?
        .ok_or(AppError::TotpNotProvisioned)?;

    let secret = state.secret_cipher.open(&record.secret_sealed)?;
    if !state.totp_service.verify_code(&secret, &request.code)? {
        return Err(AppError::TotpInvalid);
    }

    state.two_factor_repo.enable(identity.id).await?;

    tracing::info!(user_id = %identity.id, "2FA有効化完了");

    Ok(Json(EnableResponse { success: true }))
}

// === ログイン時検証 ===

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub success: bool,
}

/// POST /api/2fa/verify
///
/// ログイン時の第二要素検証。enabled = true のレコードのみ受理する。
/// 状態は一切変更しない（読み取り専用）。
///
/// # Security
/// - 「未設定」「未有効化」「コード不一致」は同一エラーで返し、
///   このエンドポイントから登録状態を列挙させない
pub async fn verify_2fa(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, AppError> {
    if request.code.is_empty() {
        return Err(AppError::Validation("認証コードは必須です".to_string()));
    }

    let identity = current_identity(&state, &headers).await?;

    let record = state
        .two_factor_repo
        .find_by_user_id(identity.id)
        .await?
        .ok_or(AppError::TotpVerificationFailed)?;

    // 発行済み・未検証のレコードにログインを通させない
    if !record.enabled {
        return Err(AppError::TotpVerificationFailed);
    }

    let secret = state.secret_cipher.open(&record.secret_sealed)?;
    if !state.totp_service.verify_code(&secret, &request.code)? {
        return Err(AppError::TotpVerificationFailed);
    }

    Ok(Json(VerifyResponse { success: true }))
}

// === 無効化 ===

#[derive(Debug, Serialize)]
pub struct DisableResponse {
    pub success: bool,
}

/// POST /api/2fa/disable
///
/// 2FAを無効化する。レコードが存在しない・既に無効の場合も成功（冪等）。
/// シークレットは保持され、enable で再スキャンなしに再有効化できる
pub async fn disable_2fa(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DisableResponse>, AppError> {
    let identity = current_identity(&state, &headers).await?;

    state.two_factor_repo.disable(identity.id).await?;

    tracing::info!(user_id = %identity.id, "2FA無効化完了");

    Ok(Json(DisableResponse { success: true }))
}

// === 状態取得 ===

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub enabled: bool,
}

/// GET /api/2fa/status
///
/// 2FAの有効状態を返す。レコードがなければ enabled = false
pub async fn status_2fa(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, AppError> {
    let identity = current_identity(&state, &headers).await?;

    let record = state.two_factor_repo.find_by_user_id(identity.id).await?;

    Ok(Json(StatusResponse {
        enabled: record.map(|r| r.enabled).unwrap_or(false),
    }))
}

// === ログイン前チェック ===

#[derive(Debug, Deserialize)]
pub struct CheckUserRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct CheckUserResponse {
    #[serde(rename = "requires2FA")]
    pub requires_2fa: bool,
}

/// POST /api/2fa/check-user
///
/// ログイン画面が第二要素の入力欄を表示するかを事前判定する。
/// ログインフロー途中で呼ばれるため認証不要。
/// 未知のメールアドレスでもエラーにせず requires2FA: false を返す
pub async fn check_user_2fa(
    State(state): State<AppState>,
    Json(request): Json<CheckUserRequest>,
) -> Result<Json<CheckUserResponse>, AppError> {
    validate_email(&request.email)?;

    let Some(profile) = state.profile_repo.find_by_email(&request.email).await? else {
        return Ok(Json(CheckUserResponse {
            requires_2fa: false,
        }));
    };

    let record = state.two_factor_repo.find_by_user_id(profile.id).await?;

    Ok(Json(CheckUserResponse {
        requires_2fa: record.map(|r| r.enabled).unwrap_or(false),
    }))
}

// === Helper Functions ===

/// Authorization ヘッダーの Bearer トークンから現在のユーザーを解決
async fn current_identity(state: &AppState, headers: &HeaderMap) -> Result<Identity, AppError> {
    let token = bearer_token(headers)?;
    state.identity_client.get_user(token).await
}

/// Authorization: Bearer <token> からトークンを取り出す
fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Authentication("missing bearer token".to_string()))
}

/// TOTPコードバリデーション
fn validate_totp_code(code: &str) -> Result<(), AppError> {
    if code.is_empty() {
        return Err(AppError::Validation("認証コードは必須です".to_string()));
    }
    if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation(
            "認証コードは6桁の数字で入力してください".to_string(),
        ));
    }
    Ok(())
}

/// メールアドレスバリデーション
fn validate_email(email: &str) -> Result<(), AppError> {
    if email.trim().is_empty() {
        return Err(AppError::Validation("メールアドレスは必須です".to_string()));
    }

    // 簡易的なメール形式チェック（@ が含まれているか）
    if !email.contains('@') {
        return Err(AppError::Validation(
            "有効なメールアドレスを入力してください".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_validate_empty_code() {
        assert!(validate_totp_code("").is_err());
    }

    #[test]
    fn test_validate_short_code() {
        assert!(validate_totp_code("12345").is_err());
    }

    #[test]
    fn test_validate_long_code() {
        assert!(validate_totp_code("1234567").is_err());
    }

    #[test]
    fn test_validate_non_digit_code() {
        assert!(validate_totp_code("12345a").is_err());
    }

    #[test]
    fn test_validate_valid_code() {
        assert!(validate_totp_code("123456").is_ok());
    }

    #[test]
    fn test_validate_empty_email() {
        assert!(validate_email("").is_err());
    }

    #[test]
    fn test_validate_email_without_at() {
        assert!(validate_email("invalid-email").is_err());
    }

    #[test]
    fn test_validate_valid_email() {
        assert!(validate_email("test@example.com").is_ok());
    }

    #[test]
    fn test_bearer_token_missing_header() {
        let headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_err());
    }

    #[test]
    fn test_bearer_token_wrong_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic dXNlcjpwYXNz"),
        );
        assert!(bearer_token(&headers).is_err());
    }

    #[test]
    fn test_bearer_token_empty_token() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(bearer_token(&headers).is_err());
    }

    #[test]
    fn test_bearer_token_present() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer token123"),
        );
        assert_eq!(bearer_token(&headers).unwrap(), "token123");
    }

    // Webクライアントはフィールド名を camelCase で期待している

    #[test]
    fn test_generate_response_field_names() {
        let response = GenerateResponse {
            secret: "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ".to_string(),
            qr_code: "data:image/png;base64,AAAA".to_string(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("qrCode").is_some());
        assert!(json.get("secret").is_some());
    }

    #[test]
    fn test_check_user_response_field_name() {
        let response = CheckUserResponse { requires_2fa: true };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json.get("requires2FA"), Some(&serde_json::Value::Bool(true)));
    }
}
