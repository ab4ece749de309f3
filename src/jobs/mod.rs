pub mod expiration;
pub mod scheduler;
