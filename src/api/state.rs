use std::sync::Arc;

use crate::alerts::SharedAlertStore;
use crate::detect::AlertRule;
use crate::pipeline::SharedBatch;
use crate::scheduler::SchedulerHandle;

#[derive(Clone)]
pub struct AppState {
    pub alerts: SharedAlertStore,
    pub scheduler: SchedulerHandle,
    pub batch: SharedBatch,
    pub rules: Arc<Vec<AlertRule>>,
}
