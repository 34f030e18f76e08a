pub mod crypto;
pub mod identity;
pub mod totp;

pub use crypto::SecretCipher;
pub use identity::{Identity, IdentityClient};
pub use totp::TotpService;
