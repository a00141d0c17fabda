use crate::config::Config;
use crate::device::Registry;
use crate::pipeline::PipelineManager;
use crate::router::ProtocolRouter;
use crate::viewer::ViewerHub;

pub mod device;
pub mod pipeline;
pub mod register;
pub mod ws;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub registry: Registry,
    pub pipelines: PipelineManager,
    pub hub: ViewerHub,
    pub router: ProtocolRouter,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let registry = Registry::new();
        let pipelines = PipelineManager::new(config.recorder.clone());
        let hub = ViewerHub::new();
        let router = ProtocolRouter::new(
            registry.clone(),
            pipelines.clone(),
            hub.clone(),
            config.auth.allowed_origins.clone(),
        );
        Self {
            config,
            registry,
            pipelines,
            hub,
            router,
        }
    }
}
