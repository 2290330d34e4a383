use std::sync::Arc;

use workbench_kernel::{
    AlgorithmRegistry, EntityRepository, ModelFactory, PreferenceRegistry, ViewerRegistry, WindowManager, Workbench,
};

/// The live workbench a session is captured from and restored into.
#[derive(Clone)]
pub struct Collaborators {
    pub repository: Arc<dyn EntityRepository>,
    pub models: Arc<dyn ModelFactory>,
    pub algorithms: Arc<dyn AlgorithmRegistry>,
    pub preferences: Arc<dyn PreferenceRegistry>,
    pub windows: Arc<dyn WindowManager>,
    pub viewers: Arc<dyn ViewerRegistry>,
}

impl Collaborators {
    /// Use one [`Workbench`] as both the window manager and viewer registry.
    pub fn with_workbench(
        repository: Arc<dyn EntityRepository>,
        models: Arc<dyn ModelFactory>,
        algorithms: Arc<dyn AlgorithmRegistry>,
        preferences: Arc<dyn PreferenceRegistry>,
        workbench: Arc<Workbench>,
    ) -> Self {
        Self {
            repository,
            models,
            algorithms,
            preferences,
            windows: workbench.clone(),
            viewers: workbench,
        }
    }
}
