mod common;

use common::{init_tracing, poll_until_settled};
use lightrt::error::{Exception, ProtocolError};
use lightrt::platform::{InMemoryPlatform, PollStatus, StreamKind, TimePoint};
use lightrt::{
    Frontend, Handle, ImageKind, InstanceBuilder, InstanceKind, RequestKind, LifecycleState,
    StreamDisposition,
};

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

/// Remembers every request it parses and answers with a fixed reply.
#[derive(Clone)]
struct RecordingFrontend {
    requests: Rc<RefCell<Vec<(RequestKind, Vec<u8>)>>>,
    disposition: StreamDisposition,
    reply: &'static [u8],
}

impl RecordingFrontend {
    fn new(disposition: StreamDisposition, reply: &'static [u8]) -> Self {
        Self {
            requests: Rc::new(RefCell::new(Vec::new())),
            disposition,
            reply,
        }
    }
}

impl Frontend for RecordingFrontend {
    fn init(&mut self, kind: RequestKind, payload: &[u8]) -> Result<StreamDisposition, ProtocolError> {
        self.requests.borrow_mut().push((kind, payload.to_vec()));
        Ok(self.disposition)
    }

    fn finalize(&mut self, _kind: RequestKind) -> Result<Vec<u8>, ProtocolError> {
        Ok(self.reply.to_vec())
    }
}

fn request(kind: RequestKind, body: &[u8]) -> Vec<u8> {
    let mut payload = kind.magic().to_le_bytes().to_vec();
    payload.extend_from_slice(body);
    payload
}

#[test]
fn test_cli_output_goes_to_the_standard_stream() {
    init_tracing();
    let host = InMemoryPlatform::new();
    let stream = host.incoming(b"");

    let instance = InstanceBuilder::new(host.clone())
        .image_kind(ImageKind::Cli)
        .script(|_| async {
            let handle = Handle::current();
            assert_eq!(handle.instance_kind(), InstanceKind::Cli);
            assert_eq!(handle.lifecycle_state(), LifecycleState::Running);

            handle.echo("hello, ");
            handle.echo(b"world");
            Ok(())
        })
        .build();

    assert_eq!(instance.poll(), PollStatus::FinishedOk);
    assert_eq!(host.written(stream), b"hello, world");
    assert_eq!(host.free_count(stream), 1);
    assert_eq!(instance.handle().lifecycle_state(), LifecycleState::Finished);
}

#[test]
fn test_cli_waits_for_its_stream() {
    init_tracing();
    let host = InMemoryPlatform::new();

    let instance = InstanceBuilder::new(host.clone())
        .image_kind(ImageKind::Cli)
        .script(|_| async {
            Handle::current().echo("late");
            Ok(())
        })
        .build();

    assert_eq!(instance.poll(), PollStatus::Blocked);

    let stream = host.incoming(b"");
    assert_eq!(instance.poll(), PollStatus::FinishedOk);
    assert_eq!(host.written(stream), b"late");
}

#[test]
fn test_server_requests_are_classified() {
    let cases = [
        (RequestKind::Http, InstanceKind::HttpServer),
        (RequestKind::Rpc, InstanceKind::RpcServer),
        (RequestKind::JobWorker, InstanceKind::JobServer),
    ];

    for (kind, expected) in cases {
        init_tracing();
        let host = InMemoryPlatform::new();
        let payload = request(kind, b"body");
        let stream = host.incoming(&payload);

        let frontend = RecordingFrontend::new(StreamDisposition::Reply, b"response");
        let requests = frontend.requests.clone();

        let seen = Rc::new(Cell::new(InstanceKind::Invalid));
        let record = seen.clone();
        let instance = InstanceBuilder::new(host.clone())
            .image_kind(ImageKind::Server)
            .frontend(frontend)
            .script(move |_| async move {
                let handle = Handle::current();
                assert_eq!(handle.standard_stream(), Some(stream));
                record.set(handle.instance_kind());
                Ok(())
            })
            .build();

        assert_eq!(instance.poll(), PollStatus::FinishedOk, "{kind:?}");
        assert_eq!(seen.get(), expected);
        assert_eq!(*requests.borrow(), vec![(kind, payload.clone())]);
        assert_eq!(host.written(stream), b"response");
        assert_eq!(host.free_count(stream), 1);
    }
}

#[test]
fn test_no_reply_request_releases_its_stream_early() {
    init_tracing();
    let host = InMemoryPlatform::new();
    let stream = host.incoming(&request(RequestKind::JobWorker, b"job"));

    let instance = InstanceBuilder::new(host.clone())
        .image_kind(ImageKind::Server)
        .frontend(RecordingFrontend::new(StreamDisposition::NoReply, b"ignored"))
        .script(move |_| async move {
            let handle = Handle::current();
            assert!(!handle.is_open(stream));
            assert_eq!(handle.standard_stream(), None);
            Ok(())
        })
        .build();

    assert_eq!(host.free_count(stream), 0);
    assert_eq!(instance.poll(), PollStatus::FinishedOk);

    assert_eq!(host.free_count(stream), 1);
    assert!(host.written(stream).is_empty());
}

#[test]
fn test_unknown_request_fails_the_instance() {
    init_tracing();
    let host = InMemoryPlatform::new();
    let stream = host.incoming(&0xdead_beef_u32.to_le_bytes());

    let ran = Rc::new(Cell::new(false));
    let flag = ran.clone();
    let instance = InstanceBuilder::new(host.clone())
        .image_kind(ImageKind::Server)
        .script(move |_| async move {
            flag.set(true);
            Ok(())
        })
        .build();

    let shutdown = Rc::new(Cell::new(0));
    let counter = shutdown.clone();
    instance.handle().register_shutdown_function(move || async move {
        counter.set(counter.get() + 1);
    });

    assert_eq!(instance.poll(), PollStatus::FinishedError);

    assert!(!ran.get());
    assert_eq!(shutdown.get(), 1);
    assert!(instance.handle().is_failed());
    assert_eq!(instance.handle().instance_kind(), InstanceKind::Invalid);
    assert_eq!(host.free_count(stream), 1);
}

#[test]
fn test_script_exception_fails_the_instance() {
    init_tracing();
    let host = InMemoryPlatform::new();

    let shutdown = Rc::new(Cell::new(false));
    let flag = shutdown.clone();
    let instance = InstanceBuilder::new(host.clone())
        .script(move |_| async move {
            Handle::current().register_shutdown_function(move || async move { flag.set(true) });
            Err(Exception::new("RuntimeException", "script gave up"))
        })
        .build();

    assert_eq!(instance.poll(), PollStatus::FinishedError);
    assert!(shutdown.get());
}

#[test]
fn test_faulting_script_fails_the_instance() {
    init_tracing();
    let host = InMemoryPlatform::new();

    let fail = true;
    let instance = InstanceBuilder::new(host.clone())
        .script(move |_| async move {
            if fail {
                panic!("script crashed");
            }
            Ok(())
        })
        .build();

    assert_eq!(instance.poll(), PollStatus::FinishedError);
}

#[test]
fn test_faulting_script_still_shuts_down() {
    init_tracing();
    let host = InMemoryPlatform::new();

    let shutdown = Rc::new(Cell::new(0));
    let counter = shutdown.clone();
    let opened = Rc::new(Cell::new(None));
    let record = opened.clone();
    let fail = true;
    let instance = InstanceBuilder::new(host.clone())
        .script(move |_| async move {
            let handle = Handle::current();
            handle.register_shutdown_function(move || async move {
                counter.set(counter.get() + 1);
            });
            record.set(Some(handle.open_stream("10.0.0.1:80", &StreamKind::Tcp).unwrap()));
            if fail {
                panic!("script crashed");
            }
            Ok(())
        })
        .build();

    assert_eq!(instance.poll(), PollStatus::FinishedError);

    let stream = opened.get().unwrap();
    assert_eq!(shutdown.get(), 1);
    assert_eq!(host.free_count(stream), 1);
    assert!(instance.handle().open_descriptors().is_empty());
    assert_eq!(instance.handle().lifecycle_state(), LifecycleState::Finished);
}

#[test]
fn test_faulting_shutdown_function_still_releases_streams() {
    init_tracing();
    let host = InMemoryPlatform::new();
    let stream = host.incoming(b"");

    let shutdown = Rc::new(Cell::new(0));
    let counter = shutdown.clone();
    let instance = InstanceBuilder::new(host.clone())
        .image_kind(ImageKind::Cli)
        .script(move |_| async move {
            let handle = Handle::current();
            let fail = true;
            handle.register_shutdown_function(move || async move {
                if fail {
                    panic!("shutdown function crashed");
                }
            });
            handle.register_shutdown_function(move || async move {
                counter.set(counter.get() + 1);
            });
            Ok(())
        })
        .build();

    assert_eq!(instance.poll(), PollStatus::FinishedError);

    assert_eq!(shutdown.get(), 1);
    assert_eq!(host.free_count(stream), 1);
    assert_eq!(instance.handle().lifecycle_state(), LifecycleState::Finished);
}

#[test]
fn test_dropping_an_instance_releases_its_streams() {
    init_tracing();
    let host = InMemoryPlatform::new();

    let opened = Rc::new(Cell::new(None));
    let record = opened.clone();
    let instance = InstanceBuilder::new(host.clone())
        .script(move |_| async move {
            let handle = Handle::current();
            record.set(Some(handle.open_stream("10.0.0.1:80", &StreamKind::Tcp).unwrap()));
            handle.sleep(Duration::from_secs(60)).await.unwrap();
            Ok(())
        })
        .build();

    assert_eq!(instance.poll(), PollStatus::Blocked);
    let open = instance.handle().open_descriptors();
    assert_eq!(open.len(), 2);
    assert!(open.contains(&opened.get().unwrap()));

    drop(instance);

    for descriptor in open {
        assert_eq!(host.free_count(descriptor), 1);
    }
}

#[test]
fn test_pending_timer_callback_does_not_block_shutdown() {
    init_tracing();
    let host = InMemoryPlatform::new();

    let fired = Rc::new(Cell::new(false));
    let flag = fired.clone();
    let instance = InstanceBuilder::new(host.clone())
        .script(move |_| async move {
            Handle::current().set_timer_callback(1000, move || flag.set(true));
            Ok(())
        })
        .build();

    assert_eq!(instance.poll(), PollStatus::FinishedOk);

    let handle = instance.handle();
    assert_eq!(handle.scheduler().task_count(), 0);
    assert_eq!(handle.fork_count(), 0);

    let freed = host.freed();
    assert_eq!(freed.len(), 1);
    assert_eq!(host.free_count(freed[0]), 1);

    host.advance(Duration::from_secs(1));
    assert_eq!(instance.poll(), PollStatus::FinishedOk);
    assert!(!fired.get());
}

#[test]
fn test_epilogue_runs_once() {
    init_tracing();
    let host = InMemoryPlatform::new();
    let stream = host.incoming(b"");

    let shutdown = Rc::new(Cell::new(0));
    let counter = shutdown.clone();
    let instance = InstanceBuilder::new(host.clone())
        .image_kind(ImageKind::Cli)
        .script(move |_| async move {
            let handle = Handle::current();
            handle.register_shutdown_function(move || async move {
                counter.set(counter.get() + 1);
            });
            handle.echo("bye");

            handle.run_instance_epilogue().await;
            assert_eq!(handle.lifecycle_state(), LifecycleState::Finished);
            handle.run_instance_epilogue().await;
            Ok(())
        })
        .build();

    assert_eq!(instance.poll(), PollStatus::FinishedOk);

    assert_eq!(shutdown.get(), 1);
    assert_eq!(host.written(stream), b"bye");
    assert_eq!(host.free_count(stream), 1);
}

#[test]
fn test_shutdown_functions_run_in_order() {
    init_tracing();
    let host = InMemoryPlatform::new();

    let order = Rc::new(RefCell::new(Vec::new()));
    let record = order.clone();
    let instance = InstanceBuilder::new(host.clone())
        .script(move |_| async move {
            let handle = Handle::current();
            for id in 0..2 {
                let record = record.clone();
                let nested = handle.clone();
                handle.register_shutdown_function(move || async move {
                    record.borrow_mut().push(id);
                    if id == 0 {
                        // Registered while shutting down; still runs.
                        let record = record.clone();
                        nested.register_shutdown_function(move || async move {
                            record.borrow_mut().push(2);
                        });
                    }
                });
            }
            Ok(())
        })
        .build();

    assert_eq!(instance.poll(), PollStatus::FinishedOk);
    assert_eq!(*order.borrow(), vec![0, 1, 2]);
}

#[test]
fn test_forced_shutdown_runs_shutdown_functions() {
    init_tracing();
    let host = InMemoryPlatform::new();

    let shutdown = Rc::new(Cell::new(0));
    let counter = shutdown.clone();
    let instance = InstanceBuilder::new(host.clone())
        .script(move |_| async move {
            let handle = Handle::current();
            handle.register_shutdown_function(move || async move {
                counter.set(counter.get() + 1);
            });
            handle.sleep(Duration::from_secs(60)).await.unwrap();
            Ok(())
        })
        .build();

    assert_eq!(instance.poll(), PollStatus::Blocked);
    let timer = instance.handle().open_descriptors();
    assert_eq!(timer.len(), 1);

    instance.force_shutdown();
    assert_eq!(poll_until_settled(&instance), PollStatus::FinishedOk);

    assert_eq!(shutdown.get(), 1);
    assert_eq!(host.free_count(timer[0]), 1);
    assert_eq!(instance.handle().lifecycle_state(), LifecycleState::Finished);
}

#[test]
fn test_host_yield_request_reschedules() {
    init_tracing();
    let host = InMemoryPlatform::new();
    host.set_please_yield(true);

    let instance = InstanceBuilder::new(host.clone())
        .script(|_| async {
            lightrt::yield_now().await;
            Ok(())
        })
        .build();

    assert_eq!(instance.poll(), PollStatus::Reschedule);
    assert_eq!(instance.poll(), PollStatus::Reschedule);

    host.set_please_yield(false);
    assert_eq!(instance.poll(), PollStatus::FinishedOk);
}

#[test]
fn test_request_metadata() {
    init_tracing();
    let host = InMemoryPlatform::new();
    host.advance(Duration::from_millis(7));

    let instance = InstanceBuilder::new(host.clone()).build();
    let handle = instance.handle();
    assert_eq!(handle.request_time(), None);
    assert_eq!(handle.lifecycle_state(), LifecycleState::NotStarted);

    assert_eq!(instance.poll(), PollStatus::FinishedOk);

    assert_eq!(handle.image_kind(), ImageKind::Oneshot);
    assert_eq!(handle.image_kind().sapi_name(), "oneshot");
    assert_eq!(handle.instance_kind(), InstanceKind::Invalid);
    assert_eq!(handle.request_time(), Some(TimePoint(7_000_000)));
    assert_eq!(handle.lifecycle_state(), LifecycleState::Finished);
}
