use std::sync::Arc;

use tokio_util::task::TaskTracker;

use crate::{config::Config, repos::Repos, services::EmailSender};

#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Database repositories.
    pub repos: Repos,
    /// Email sender.
    pub email: Arc<dyn EmailSender>,
    /// Background work (welcome emails) that must finish before the process
    /// exits.
    pub tasks: TaskTracker,
}
