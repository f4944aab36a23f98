//! Supporting services used by handlers.
//!
//! ## Services
//!
//! - **tokens** - Token generation, digesting and resolution to a user
//! - **password** - Argon2 password hashing
//! - **email** - Outgoing mail via SMTP (lettre), or a logging stand-in
//!
//! ## Usage in Handlers
//!
//! ```ignore
//! async fn handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
//!     let user = tokens::resolve(state.repos.users.as_ref(), TokenScope::Activation, &plaintext).await?;
//!     state.email.send_welcome(&user.email, user.id, &token.plaintext).await?;
//! }
//! ```

mod email;
pub mod password;
pub mod tokens;

pub use email::{EmailSender, LogEmailSender, SmtpEmailSender, send_welcome_with_retry};

#[cfg(test)]
pub use email::MockEmailSender;
