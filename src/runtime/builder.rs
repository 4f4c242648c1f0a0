use crate::error::Exception;
use crate::fork::ForkContext;
use crate::instance::{Frontend, ImageKind, Instance, NoopFrontend};
use crate::platform::Platform;
use crate::runtime::core::Handle;

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

type Script = Box<dyn FnOnce(ForkContext) -> Pin<Box<dyn Future<Output = Result<(), Exception>>>>>;

/// Builder for configuring and creating an instance.
///
/// `InstanceBuilder` collects everything an execution needs before it
/// starts: the host platform, how the host runs the image, the protocol
/// front-end for server requests and the script itself.
///
/// # Examples
///
/// ```rust,ignore
/// let instance = InstanceBuilder::new(platform)
///     .image_kind(ImageKind::Cli)
///     .script(|fork| async move {
///         Handle::current().echo("hello");
///         Ok(())
///     })
///     .build();
/// ```
pub struct InstanceBuilder {
    platform: Rc<dyn Platform>,
    image_kind: ImageKind,
    frontend: Box<dyn Frontend>,
    script: Option<Script>,
    /// Number of task slots allocated up front.
    task_capacity: usize,
}

impl InstanceBuilder {
    /// Creates a builder for a oneshot image without a script.
    pub fn new(platform: impl Platform + 'static) -> Self {
        Self {
            platform: Rc::new(platform),
            image_kind: ImageKind::Oneshot,
            frontend: Box::new(NoopFrontend),
            script: None,
            task_capacity: 16,
        }
    }

    pub fn image_kind(mut self, kind: ImageKind) -> Self {
        self.image_kind = kind;
        self
    }

    /// Sets the front-end that parses server requests and builds replies.
    pub fn frontend(mut self, frontend: impl Frontend + 'static) -> Self {
        self.frontend = Box::new(frontend);
        self
    }

    /// Sets the script run once the prologue succeeds.
    ///
    /// The script runs as the first fork of the instance; an exception it
    /// returns fails the request.
    pub fn script<F, Fut>(mut self, script: F) -> Self
    where
        F: FnOnce(ForkContext) -> Fut + 'static,
        Fut: Future<Output = Result<(), Exception>> + 'static,
    {
        self.script = Some(Box::new(move |context| Box::pin(script(context))));
        self
    }

    /// Sets the number of task slots allocated up front.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn task_capacity(mut self, n: usize) -> Self {
        assert!(n > 0, "task_capacity must be > 0");

        self.task_capacity = n;
        self
    }

    /// Builds the instance.
    ///
    /// Nothing runs until the host first polls the instance.
    pub fn build(self) -> Instance {
        let handle = Handle::new(self.platform, self.image_kind, self.frontend, self.task_capacity);

        let main = handle.clone();
        let image_kind = self.image_kind;
        let script = self.script;
        handle.scheduler().spawn(Box::pin(async move {
            main.run_main(image_kind, script).await;
        }));

        Instance::new(handle)
    }
}

impl Handle {
    /// The top-level task: prologue, script, epilogue.
    ///
    /// The epilogue runs whatever happened before it.
    async fn run_main(&self, image_kind: ImageKind, script: Option<Script>) {
        match self.run_instance_prologue(image_kind).await {
            Ok(()) => {
                if let Some(script) = script {
                    let (_, fork) = self.create_fork(script);

                    if let Err(exception) = fork.wait().await {
                        tracing::error!(%exception, "unhandled exception");
                        self.mark_failed();
                    }
                }
            }
            Err(error) => {
                tracing::error!(%error, "instance prologue failed");
                self.mark_failed();
            }
        }

        self.run_instance_epilogue().await;
    }
}
