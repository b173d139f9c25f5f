use std::sync::Arc;
use std::time::Instant;

use crate::config::AppConfig;
use crate::errorlog::ErrorLog;
use crate::gateway::Gateway;
use crate::intake::PlannerSessions;
use crate::session::SessionStore;

/// Everything handlers share. Cloned per request; all fields are handles.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub gateway: Arc<dyn Gateway>,
    pub sessions: Arc<SessionStore>,
    pub planner: Arc<PlannerSessions>,
    pub errors: Arc<ErrorLog>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, gateway: Arc<dyn Gateway>) -> Self {
        let sessions = SessionStore::new(config.admin.clone(), config.jwt_secret.clone());
        Self {
            config: Arc::new(config),
            gateway,
            sessions: Arc::new(sessions),
            planner: Arc::new(PlannerSessions::default()),
            errors: Arc::new(ErrorLog::default()),
            started_at: Instant::now(),
        }
    }
}
