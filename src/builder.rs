use std::{path::PathBuf, sync::Arc};

use tokio::runtime::{Builder, Handle, Runtime};

use crate::{
    Config, Engine, NodeflowError, Result,
    invoker::{Invoke, NodeRuntime},
};

pub struct EngineBuilder {
    config: Config,
    rt: Option<Arc<Runtime>>,
    invoker: Option<Arc<dyn Invoke>>,
    node_runtime: Option<Arc<dyn NodeRuntime>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::with_config(Config::default())
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            rt: None,
            invoker: None,
            node_runtime: None,
        }
    }

    pub fn interpreter(
        mut self,
        interpreter: &str,
    ) -> Self {
        self.config.interpreter = interpreter.to_string();
        self
    }

    pub fn node_dir<P: Into<PathBuf>>(
        mut self,
        dir: P,
    ) -> Self {
        self.config.node_dir = dir.into();
        self
    }

    pub fn scratch_dir<P: Into<PathBuf>>(
        mut self,
        dir: P,
    ) -> Self {
        self.config.scratch_dir = dir.into();
        self
    }

    pub fn env(
        mut self,
        key: &str,
        value: &str,
    ) -> Self {
        self.config.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn async_worker_thread_number(
        mut self,
        n: u16,
    ) -> Self {
        self.config.async_worker_thread_number = n;
        self
    }

    pub fn runtime(
        mut self,
        runtime: Arc<Runtime>,
    ) -> Self {
        self.rt = Some(runtime);
        self
    }

    /// Replace the process-backed invoker, e.g. with an in-process one.
    pub fn invoker(
        mut self,
        invoker: Arc<dyn Invoke>,
    ) -> Self {
        self.invoker = Some(invoker);
        self
    }

    /// Run node scripts with something other than the Python wrapper.
    pub fn node_runtime(
        mut self,
        runtime: Arc<dyn NodeRuntime>,
    ) -> Self {
        self.node_runtime = Some(runtime);
        self
    }

    /// Build the engine on the given runtime, else on the current one, else on a new one.
    pub fn build(&self) -> Result<Engine> {
        let (handle, runtime) = match (&self.rt, Handle::try_current()) {
            (Some(rt), _) => (rt.handle().clone(), Some(rt.clone())),
            (None, Ok(handle)) => (handle, None),
            (None, Err(_)) => {
                let rt = Builder::new_multi_thread()
                    .worker_threads(self.config.async_worker_thread_number.max(1).into())
                    .enable_all()
                    .build()
                    .map_err(|e| NodeflowError::Engine(format!("failed to build tokio runtime: {}", e)))?;
                let rt = Arc::new(rt);
                (rt.handle().clone(), Some(rt))
            }
        };

        Ok(Engine::new(self.config.clone(), self.invoker.clone(), self.node_runtime.clone(), handle, runtime))
    }
}
