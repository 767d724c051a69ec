pub mod password_reset_link;
pub mod user;
pub mod verification_code;

pub use password_reset_link::PasswordResetLink;
pub use user::{DeleteOutcome, NewUser, Role, User, UserChanges, UserFilter};
pub use verification_code::VerificationCode;
