use abtest::AnalysisParams;

pub mod health;
pub mod significance;

pub use health::health;
pub use significance::{significance, significance_csv};

/// Shared handler state. Requests carry everything they need; the service only
/// keeps the fallback analysis parameters and its start time.
pub struct AppState {
    pub defaults: AnalysisParams,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(defaults: AnalysisParams) -> Self {
        Self {
            defaults,
            start_time: std::time::Instant::now(),
        }
    }
}
