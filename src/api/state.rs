use crate::config::StreamConfig;
use crate::monitor::Monitor;

#[derive(Clone)]
pub struct AppState {
    pub monitor: Monitor,
    pub stream: StreamConfig,
}
