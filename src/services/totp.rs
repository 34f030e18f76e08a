use data_encoding::BASE32;
use rand::RngCore;
use totp_rs::{Algorithm, TOTP};

use crate::error::AppError;

/// シークレット長（バイト）。160ビットはTOTPの標準的な強度
const SECRET_LEN: usize = 20;
/// コード桁数
const DIGITS: usize = 6;
/// 許容する時間ステップのずれ（前後1ステップ = ±30秒）
const SKEW: u8 = 1;
/// 時間ステップ（秒）
const STEP: u64 = 30;

/// TOTP (Time-based One-Time Password) サービス
///
/// RFC 6238 準拠: HMAC-SHA1 / 6桁 / 30秒ステップ。
/// 検証は前後1ステップの時間ウィンドウを許容する（クロックずれ吸収のための
/// 限定的な緩和であり、任意幅のコード再利用を許すものではない）。
#[derive(Clone)]
pub struct TotpService {
    issuer: String,
}

impl TotpService {
    /// 新しい TotpService を作成
    ///
    /// # Arguments
    /// * `issuer` - TOTP発行者名（認証アプリに表示されるアプリ名）
    pub fn new(issuer: String) -> Self {
        Self { issuer }
    }

    /// 20バイト（160ビット）のランダムシークレットを生成し、Base32でエンコード
    pub fn generate_secret() -> String {
        let mut bytes = [0u8; SECRET_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        BASE32.encode(&bytes)
    }

    /// 認証アプリ登録用の otpauth URI を構築
    ///
    /// QRコードを読めないクライアント向けに、シークレット手入力と併用される
    pub fn provisioning_uri(&self, account: &str, secret: &str) -> Result<String, AppError> {
        Ok(self.build_totp(secret, Some(account))?.get_url())
    }

    /// QRコードを生成（PNG形式、data URI）
    ///
    /// # Arguments
    /// * `account` - アカウントラベル（通常はユーザーのメールアドレス）
    /// * `secret` - Base32エンコードされたシークレット
    pub fn qr_code_data_uri(&self, account: &str, secret: &str) -> Result<String, AppError> {
        let totp = self.build_totp(secret, Some(account))?;

        let qr_base64 = totp.get_qr_base64().map_err(|e| {
            tracing::error!(error = %e, "QRコード生成エラー");
            AppError::Internal(anyhow::anyhow!("qr code generation error"))
        })?;

        Ok(format!("data:image/png;base64,{}", qr_base64))
    }

    /// TOTPコードを現在時刻で検証
    pub fn verify_code(&self, secret: &str, code: &str) -> Result<bool, AppError> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| {
                tracing::error!(error = ?e, "システム時刻取得エラー");
                AppError::Internal(anyhow::anyhow!("system time error"))
            })?
            .as_secs();

        self.verify_code_at(secret, code, now)
    }

    /// TOTPコードを指定時刻で検証
    ///
    /// 受理されるのはステップ T-1 / T / T+1 のコードのみ。
    /// 時刻を引数に取るのは検証ロジックを実時計なしでテストするため
    pub fn verify_code_at(
        &self,
        secret: &str,
        code: &str,
        timestamp: u64,
    ) -> Result<bool, AppError> {
        // 入力検証: コードは6桁の数字のみ
        if code.len() != DIGITS || !code.chars().all(|c| c.is_ascii_digit()) {
            return Ok(false);
        }

        let totp = self.build_totp(secret, None)?;

        Ok(totp.check(code, timestamp))
    }

    /// TOTP オブジェクトを構築
    ///
    /// account が Some の場合は provisioning 用（issuer ラベル付き）、
    /// None の場合は検証専用
    fn build_totp(&self, secret: &str, account: Option<&str>) -> Result<TOTP, AppError> {
        let secret_bytes = BASE32.decode(secret.as_bytes()).map_err(|e| {
            tracing::error!(error = ?e, "シークレットのBase32デコードエラー");
            AppError::Internal(anyhow::anyhow!("invalid base32 secret"))
        })?;

        TOTP::new(
            Algorithm::SHA1,
            DIGITS,
            SKEW,
            STEP,
            secret_bytes,
            account.map(|_| self.issuer.clone()),
            account.unwrap_or_default().to_string(),
        )
        .map_err(|e| {
            tracing::error!(error = %e, "TOTP作成エラー");
            AppError::Internal(anyhow::anyhow!("totp creation error"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 6238 Appendix B の SHA-1 テストベクターで使われるシークレット
    const RFC_SECRET_RAW: &[u8] = b"12345678901234567890";

    fn rfc_secret() -> String {
        BASE32.encode(RFC_SECRET_RAW)
    }

    fn create_test_service() -> TotpService {
        TotpService::new("TestApp".to_string())
    }

    #[test]
    fn test_generate_secret_is_160bit_base32() {
        let secret = TotpService::generate_secret();
        // Base32エンコードされた20バイト = 32文字
        assert_eq!(secret.len(), 32);
        assert!(
            secret
                .chars()
                .all(|c| "ABCDEFGHIJKLMNOPQRSTUVWXYZ234567".contains(c))
        );
    }

    #[test]
    fn test_generate_secret_is_random() {
        assert_ne!(TotpService::generate_secret(), TotpService::generate_secret());
    }

    #[test]
    fn test_verify_rfc6238_vectors() {
        let service = create_test_service();
        let secret = rfc_secret();

        // (UNIX時刻, 6桁コード) — RFC 6238 Appendix B の下位6桁
        let vectors = [
            (59_u64, "287082"),
            (1_111_111_109, "081804"),
            (1_111_111_111, "050471"),
            (1_234_567_890, "005924"),
            (2_000_000_000, "279037"),
        ];

        for (timestamp, code) in vectors {
            assert!(
                service.verify_code_at(&secret, code, timestamp).unwrap(),
                "timestamp={timestamp}"
            );
        }
    }

    #[test]
    fn test_tolerance_window_accepts_adjacent_steps() {
        let service = create_test_service();
        let secret = rfc_secret();

        // 1111111109 のステップで生成されたコードは前後1ステップでも受理される
        let code = "081804";
        assert!(service.verify_code_at(&secret, code, 1_111_111_109 - 30).unwrap());
        assert!(service.verify_code_at(&secret, code, 1_111_111_109).unwrap());
        assert!(service.verify_code_at(&secret, code, 1_111_111_109 + 30).unwrap());
    }

    #[test]
    fn test_tolerance_window_rejects_two_steps_away() {
        let service = create_test_service();
        let secret = rfc_secret();

        // 2ステップ離れると不受理（ウィンドウ境界）
        let code = "081804";
        assert!(!service.verify_code_at(&secret, code, 1_111_111_109 - 60).unwrap());
        assert!(!service.verify_code_at(&secret, code, 1_111_111_109 + 60).unwrap());
    }

    #[test]
    fn test_code_for_one_secret_fails_for_another() {
        let service = create_test_service();
        let other_secret = BASE32.encode(b"09876543210987654321");

        // シークレット再発行後、旧シークレットのコードは通らない
        assert!(!service.verify_code_at(&other_secret, "287082", 59).unwrap());
    }

    #[test]
    fn test_verify_rejects_malformed_codes() {
        let service = create_test_service();
        let secret = rfc_secret();

        assert!(!service.verify_code_at(&secret, "", 59).unwrap());
        assert!(!service.verify_code_at(&secret, "12345", 59).unwrap());
        assert!(!service.verify_code_at(&secret, "1234567", 59).unwrap());
        assert!(!service.verify_code_at(&secret, "12345a", 59).unwrap());
    }

    #[test]
    fn test_provisioning_uri_contains_issuer_and_secret() {
        let service = create_test_service();
        let secret = rfc_secret();

        let uri = service
            .provisioning_uri("test@example.com", &secret)
            .unwrap();
        assert!(uri.starts_with("otpauth://totp/"));
        assert!(uri.contains("issuer=TestApp"));
        assert!(uri.contains(&secret));
    }

    #[test]
    fn test_qr_code_data_uri() {
        let service = create_test_service();
        let secret = TotpService::generate_secret();

        let data_uri = service
            .qr_code_data_uri("test@example.com", &secret)
            .unwrap();
        assert!(data_uri.starts_with("data:image/png;base64,"));
        assert!(data_uri.len() > "data:image/png;base64,".len());
    }
}
