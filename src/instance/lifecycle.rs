use super::protocol::{RequestKind, StreamDisposition};
use crate::error::RuntimeError;
use crate::platform::TimePoint;
use crate::runtime::core::Handle;

/// How the host runs the image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImageKind {
    /// A command-line run: input and output go through one incoming stream.
    Cli,

    /// A request server: the first incoming stream carries the request.
    Server,

    #[default]
    Oneshot,

    Multishot,
}

impl ImageKind {
    /// The name script code sees as its SAPI.
    pub fn sapi_name(self) -> &'static str {
        match self {
            ImageKind::Cli => "cli",
            ImageKind::Server => "server",
            ImageKind::Oneshot => "oneshot",
            ImageKind::Multishot => "multishot",
        }
    }
}

/// What the current execution turned out to serve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InstanceKind {
    /// Not known yet, or the request could not be classified.
    #[default]
    Invalid,
    Cli,
    HttpServer,
    RpcServer,
    JobServer,
}

impl From<RequestKind> for InstanceKind {
    fn from(kind: RequestKind) -> Self {
        match kind {
            RequestKind::Http => InstanceKind::HttpServer,
            RequestKind::Rpc => InstanceKind::RpcServer,
            RequestKind::JobWorker => InstanceKind::JobServer,
        }
    }
}

/// Where the instance is in its life. Only ever moves forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    /// Built, or still in the prologue.
    #[default]
    NotStarted,

    /// The prologue succeeded; the script runs.
    Running,

    /// Shutdown functions or finalization are running.
    ShuttingDown,

    /// Every stream was released.
    Finished,
}

#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    pub(crate) image_kind: ImageKind,
    pub(crate) instance_kind: InstanceKind,
    pub(crate) request_kind: Option<RequestKind>,
    pub(crate) state: LifecycleState,
    pub(crate) failed: bool,
    pub(crate) request_time: Option<TimePoint>,
}

impl Lifecycle {
    pub(crate) fn new(image_kind: ImageKind) -> Self {
        Self {
            image_kind,
            ..Self::default()
        }
    }
}

impl Handle {
    pub fn image_kind(&self) -> ImageKind {
        self.lifecycle().image_kind
    }

    pub fn instance_kind(&self) -> InstanceKind {
        self.lifecycle().instance_kind
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.lifecycle().state
    }

    /// Host time at which the prologue started.
    pub fn request_time(&self) -> Option<TimePoint> {
        self.lifecycle().request_time
    }

    /// Returns `true` if the request failed; the instance then finishes
    /// with an error once every task is done.
    pub fn is_failed(&self) -> bool {
        self.lifecycle().failed
    }

    pub(crate) fn mark_failed(&self) {
        self.lifecycle_mut().failed = true;
    }

    /// Prepares the instance for running the script.
    ///
    /// CLI images claim their I/O stream; server images read and classify the
    /// request, then hand it to the protocol front-end.
    pub async fn run_instance_prologue(&self, kind: ImageKind) -> Result<(), RuntimeError> {
        let now = self.platform().instant();
        {
            let mut lifecycle = self.lifecycle_mut();
            lifecycle.image_kind = kind;
            lifecycle.request_time = Some(now);
        }
        tracing::debug!(sapi = kind.sapi_name(), "running instance prologue");

        let prepared = match kind {
            ImageKind::Cli => self.init_cli_instance().await,
            ImageKind::Server => self.init_server_instance().await,
            ImageKind::Oneshot | ImageKind::Multishot => Ok(()),
        };

        if prepared.is_ok() {
            let mut lifecycle = self.lifecycle_mut();
            if lifecycle.state == LifecycleState::NotStarted {
                lifecycle.state = LifecycleState::Running;
            }
        }

        prepared
    }

    async fn init_cli_instance(&self) -> Result<(), RuntimeError> {
        self.lifecycle_mut().instance_kind = InstanceKind::Cli;

        let stream = self.wait_for_incoming_stream().await;
        self.streams_mut().set_standard(Some(stream));

        Ok(())
    }

    async fn init_server_instance(&self) -> Result<(), RuntimeError> {
        let stream = self.wait_for_incoming_stream().await;
        let payload = self.read_all(stream).await?;

        let kind = match RequestKind::classify(&payload) {
            Ok(kind) => kind,
            Err(error) => {
                tracing::error!(%stream, "{error}");
                return Err(error.into());
            }
        };

        {
            let mut lifecycle = self.lifecycle_mut();
            lifecycle.instance_kind = kind.into();
            lifecycle.request_kind = Some(kind);
        }
        self.streams_mut().set_standard(Some(stream));
        tracing::debug!(%stream, ?kind, bytes = payload.len(), "classified server request");

        let disposition = self.frontend_mut().init(kind, &payload)?;
        if disposition == StreamDisposition::NoReply {
            self.release_stream(stream);
        }

        Ok(())
    }

    /// Runs the shutdown phase and releases every stream.
    ///
    /// Shutdown functions run once; finalization happens once after them.
    /// Calling the epilogue again, from any task, has no effect.
    pub async fn run_instance_epilogue(&self) {
        self.epilogue(false).await
    }

    /// `interrupted` is set when the host forced the instance back into the
    /// shutdown phase, in which case a shutdown already in progress is
    /// resumed instead of being left to its aborted owner.
    pub(crate) async fn epilogue(&self, interrupted: bool) {
        let state = self.lifecycle_state();
        match state {
            LifecycleState::Finished => return,
            LifecycleState::ShuttingDown if !interrupted => return,
            LifecycleState::NotStarted | LifecycleState::Running | LifecycleState::ShuttingDown => {
                self.lifecycle_mut().state = LifecycleState::ShuttingDown;
            }
        }

        while let Some(function) = self.next_shutdown_function() {
            function().await;
        }

        if self.lifecycle_state() == LifecycleState::Finished {
            return;
        }

        let image_kind = self.image_kind();
        match image_kind {
            ImageKind::Oneshot | ImageKind::Multishot => {}
            ImageKind::Cli => self.finalize_cli_instance().await,
            ImageKind::Server => self.finalize_server_instance().await,
        }

        self.release_all_streams();
        self.lifecycle_mut().state = LifecycleState::Finished;
        tracing::debug!(sapi = image_kind.sapi_name(), "instance shut down");
    }

    /// Ends the shutdown phase without running what is left of it.
    ///
    /// Used when the task running the epilogue faulted; every stream is
    /// still released.
    pub(crate) fn abandon_shutdown(&self) {
        let skipped = self.drain_shutdown_functions();
        tracing::error!(skipped, "shutdown did not finish, releasing streams");

        self.release_all_streams();
        self.lifecycle_mut().state = LifecycleState::Finished;
    }

    async fn finalize_cli_instance(&self) {
        let output = self.take_output();

        let Some(stream) = self.standard_stream() else {
            if !output.is_empty() {
                tracing::error!(bytes = output.len(), "can't write output: no standard stream");
            }
            return;
        };

        if let Err(error) = self.write_all(stream, &output).await {
            tracing::error!(%stream, %error, "can't write output to stream");
        }
    }

    async fn finalize_server_instance(&self) {
        let Some(kind) = self.lifecycle().request_kind else {
            tracing::error!(kind = ?self.instance_kind(), "unexpected instance kind");
            return;
        };

        let reply = self.frontend_mut().finalize(kind);
        let reply = match reply {
            Ok(reply) => reply,
            Err(error) => {
                tracing::error!(%error, "can't finalize the response");
                return;
            }
        };

        if reply.is_empty() {
            return;
        }

        match self.standard_stream() {
            Some(stream) => {
                if let Err(error) = self.write_all(stream, &reply).await {
                    tracing::error!(%stream, %error, "can't write the response to stream");
                }
            }
            None => tracing::warn!(bytes = reply.len(), "dropping a response: no standard stream"),
        }
    }
}
