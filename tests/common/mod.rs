#![allow(dead_code)]

use lightrt::platform::{InMemoryPlatform, PollStatus};
use lightrt::{Instance, InstanceBuilder};

use tracing_subscriber::EnvFilter;

/// Routes runtime logs to the test output; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// An instance without a script, already polled past its prologue and
/// epilogue, so tests can drive the scheduler by hand.
pub fn idle_instance() -> (InMemoryPlatform, Instance) {
    init_tracing();

    let host = InMemoryPlatform::new();
    let instance = InstanceBuilder::new(host.clone()).build();
    assert_eq!(instance.poll(), PollStatus::FinishedOk);

    (host, instance)
}

/// Polls until the instance stops making progress on its own.
pub fn poll_until_settled(instance: &Instance) -> PollStatus {
    loop {
        match instance.poll() {
            PollStatus::Reschedule => continue,
            status => return status,
        }
    }
}
