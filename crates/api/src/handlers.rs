//! HTTP handlers, one module per resource. Each exposes a `router()` with
//! full paths; `routes::router` merges them.

pub mod health;
pub mod movies;
pub mod tokens;
pub mod users;
