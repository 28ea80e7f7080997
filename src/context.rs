use crate::adapters::VolumeDriver;
use crate::config::AppConfig;
use crate::core::transfer_engine::{self, CopyEngine};
use crate::logging::RunLog;
use std::sync::Arc;

/// Everything one run needs, built once in `main` and handed to the orchestrator.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub driver: Arc<dyn VolumeDriver>,
    pub engine: Arc<dyn CopyEngine>,
    pub run_log: Option<Arc<RunLog>>,
}

impl AppContext {
    pub fn new(config: AppConfig, driver: Arc<dyn VolumeDriver>) -> Self {
        let engine = transfer_engine::create_engine(config.copy_engine);
        Self {
            config: Arc::new(config),
            driver,
            engine,
            run_log: None,
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn CopyEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_run_log(mut self, run_log: Arc<RunLog>) -> Self {
        self.run_log = Some(run_log);
        self
    }
}
