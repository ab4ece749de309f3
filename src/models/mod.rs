pub mod credential;
pub mod event;
pub mod expiration;

pub use credential::{Credential, NewCredential};
pub use event::{Action, ActivityEvent};
pub use expiration::ExpirationStatus;
