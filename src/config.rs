use secrecy::SecretBox;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub database_url: SecretBox<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    // 認証バックエンド（Identity コラボレーター）設定
    /// 認証バックエンドのベースURL（例: https://xyz.supabase.co）
    pub auth_url: String,
    /// 認証バックエンドのAPIキー（apikey ヘッダーに付与）
    pub auth_api_key: SecretBox<String>,

    // 2FA (TOTP) 設定
    /// TOTP発行者名（認証アプリに表示される）
    #[serde(default = "default_totp_issuer")]
    pub totp_issuer: String,
    /// シークレット保管用のAES-256キー（Base64エンコード、32バイト）
    pub secret_sealing_key: SecretBox<String>,

    // CORS設定
    /// Webクライアントのオリジン（未設定時はクロスオリジン拒否）
    #[serde(default)]
    pub cors_allowed_origin: Option<String>,
}

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_TOTP_ISSUER: &str = "Twibby";

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_totp_issuer() -> String {
    DEFAULT_TOTP_ISSUER.to_string()
}

impl Config {
    pub fn load() -> Result<Self, envy::Error> {
        envy::from_env()
    }
}
