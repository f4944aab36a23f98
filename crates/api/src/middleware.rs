pub mod admission;
pub mod auth;
