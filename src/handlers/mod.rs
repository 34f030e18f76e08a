pub mod health;
pub mod two_factor;

pub use health::health_check;
pub use two_factor::{
    check_user_2fa, disable_2fa, enable_2fa, generate_2fa, status_2fa, verify_2fa,
};
