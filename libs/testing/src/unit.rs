//! Test units.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use sortie_client::Client;

/// An async step that receives the shared client.
pub type Step = Arc<dyn Fn(Client) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

pub(crate) fn step<F, Fut>(f: F) -> Step
where
    F: Fn(Client) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |client| f(client).boxed())
}

/// One named test in a job.
///
/// The executor is the test body. If it fails and the unit does not
/// persist, the janitor runs and the job stops; with `persist` set the
/// job moves on to the next unit and the janitor is not run.
#[derive(Clone)]
pub struct TestUnit {
    name: String,
    description: String,
    executor: Step,
    janitor: Step,
    persist: bool,
}

impl TestUnit {
    pub fn new<F, Fut>(name: impl Into<String>, executor: F) -> Self
    where
        F: Fn(Client) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: String::new(),
            executor: step(executor),
            janitor: step(|_| async { Ok(()) }),
            persist: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Cleanup run when the executor fails and the unit does not persist.
    pub fn janitor<F, Fut>(mut self, janitor: F) -> Self
    where
        F: Fn(Client) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.janitor = step(janitor);
        self
    }

    /// Keep running later units when this one fails.
    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn persists(&self) -> bool {
        self.persist
    }

    pub(crate) fn executor(&self) -> Step {
        self.executor.clone()
    }

    pub(crate) fn janitor_step(&self) -> Step {
        self.janitor.clone()
    }
}

impl fmt::Debug for TestUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestUnit")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("persist", &self.persist)
            .finish_non_exhaustive()
    }
}
