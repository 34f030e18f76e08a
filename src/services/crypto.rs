use aes_gcm::{
    Aes256Gcm, KeyInit, Nonce,
    aead::{Aead, OsRng},
};
use rand::RngCore;

use crate::error::AppError;

/// AES-GCM の nonce 長（96ビット）
const NONCE_LEN: usize = 12;

/// 保存用シークレットの封緘・開封
///
/// # Security
/// - TOTPシークレットはAES-256-GCMで封緘してDB保存する
/// - キーは設定から供給（Base64エンコードされた32バイト）
#[derive(Clone)]
pub struct SecretCipher {
    key: [u8; 32],
}

impl SecretCipher {
    /// Base64エンコードされた32バイトキーから構築
    pub fn from_base64(key_base64: &str) -> Result<Self, AppError> {
        use base64::{Engine as _, engine::general_purpose::STANDARD};

        let key_bytes = STANDARD.decode(key_base64).map_err(|e| {
            tracing::error!(error = ?e, "封緘キーのBase64デコードエラー");
            AppError::Internal(anyhow::anyhow!("invalid sealing key format"))
        })?;

        if key_bytes.len() != 32 {
            tracing::error!(expected = 32, actual = key_bytes.len(), "封緘キーの長さが不正");
            return Err(AppError::Internal(anyhow::anyhow!(
                "sealing key must be 32 bytes"
            )));
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&key_bytes);

        Ok(Self { key })
    }

    /// 平文を封緘する
    ///
    /// # Returns
    /// 96ビットnonce (12バイト) + 暗号文
    pub fn seal(&self, plaintext: &str) -> Result<Vec<u8>, AppError> {
        let cipher = self.cipher()?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher.encrypt(nonce, plaintext.as_bytes()).map_err(|e| {
            tracing::error!(error = ?e, "シークレット封緘エラー");
            AppError::Internal(anyhow::anyhow!("encryption error"))
        })?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);

        Ok(sealed)
    }

    /// 封緘されたデータを開封する
    pub fn open(&self, sealed: &[u8]) -> Result<String, AppError> {
        if sealed.len() < NONCE_LEN {
            tracing::error!(len = sealed.len(), "封緘データが短すぎる");
            return Err(AppError::Internal(anyhow::anyhow!("sealed data too short")));
        }

        let cipher = self.cipher()?;

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher.decrypt(nonce, ciphertext).map_err(|e| {
            tracing::error!(error = ?e, "シークレット開封エラー");
            AppError::Internal(anyhow::anyhow!("decryption error"))
        })?;

        String::from_utf8(plaintext).map_err(|e| {
            tracing::error!(error = ?e, "開封データのUTF-8変換エラー");
            AppError::Internal(anyhow::anyhow!("invalid utf8 after decryption"))
        })
    }

    fn cipher(&self) -> Result<Aes256Gcm, AppError> {
        Aes256Gcm::new_from_slice(&self.key).map_err(|e| {
            tracing::error!(error = ?e, "AES-GCM暗号化器の初期化エラー");
            AppError::Internal(anyhow::anyhow!("cipher initialization error"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    fn create_test_cipher() -> SecretCipher {
        let key_base64 = STANDARD.encode([7u8; 32]);
        SecretCipher::from_base64(&key_base64).unwrap()
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let cipher = create_test_cipher();

        let sealed = cipher.seal("GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ").unwrap();
        // 12バイトnonce + 暗号文 + 16バイトtag
        assert!(sealed.len() > NONCE_LEN);

        let opened = cipher.open(&sealed).unwrap();
        assert_eq!(opened, "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ");
    }

    #[test]
    fn test_seal_uses_fresh_nonce() {
        let cipher = create_test_cipher();

        let a = cipher.seal("same plaintext").unwrap();
        let b = cipher.seal("same plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_open_rejects_truncated_data() {
        let cipher = create_test_cipher();

        assert!(cipher.open(&[0u8; 4]).is_err());
    }

    #[test]
    fn test_open_rejects_tampered_data() {
        let cipher = create_test_cipher();

        let mut sealed = cipher.seal("secret").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        assert!(cipher.open(&sealed).is_err());
    }

    #[test]
    fn test_from_base64_rejects_short_key() {
        let short_key = STANDARD.encode([0u8; 16]);
        assert!(SecretCipher::from_base64(&short_key).is_err());
    }

    #[test]
    fn test_from_base64_rejects_invalid_encoding() {
        assert!(SecretCipher::from_base64("not-valid-base64!!!").is_err());
    }
}
