mod common;

use common::{idle_instance, init_tracing, poll_until_settled};
use lightrt::error::{HostError, RuntimeError};
use lightrt::platform::{Descriptor, InMemoryPlatform, PollStatus, StreamKind};
use lightrt::{Handle, InstanceBuilder, WaitFor, WaitKey};

use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn test_release_all_frees_each_descriptor_once() {
    let (host, instance) = idle_instance();
    let handle = instance.handle();

    let component = handle.open_stream("storage", &StreamKind::Component).unwrap();
    let tcp = handle.open_stream("10.0.0.1:80", &StreamKind::Tcp).unwrap();
    let udp = handle.open_stream("10.0.0.2:53", &StreamKind::Udp).unwrap();
    let timer = handle.set_timer(std::time::Duration::from_secs(1)).unwrap();

    handle.release_stream(tcp);
    assert!(!handle.is_open(tcp));

    handle.release_all_streams();

    assert!(handle.open_descriptors().is_empty());
    for descriptor in [component, tcp, udp, timer] {
        assert_eq!(host.free_count(descriptor), 1, "descriptor {descriptor}");
    }

    let kinds: Vec<_> = host.connections().into_iter().map(|(kind, ..)| kind).collect();
    assert_eq!(kinds, vec![StreamKind::Component, StreamKind::Tcp, StreamKind::Udp]);
}

#[test]
fn test_failed_open_changes_nothing() {
    let (host, instance) = idle_instance();
    let handle = instance.handle();
    host.refuse("offline");

    assert_eq!(
        handle.open_stream("offline", &StreamKind::Component),
        Err(HostError::NO_DEVICE)
    );
    assert_eq!(
        handle.open_stream("", &StreamKind::Tcp),
        Err(HostError::INVALID_ARGUMENT)
    );
    assert_eq!(
        handle.set_timer(std::time::Duration::ZERO),
        Err(HostError::INVALID_ARGUMENT)
    );

    assert!(handle.open_descriptors().is_empty());
    assert!(host.connections().is_empty());
}

#[test]
#[should_panic]
fn test_double_release_aborts() {
    let (_host, instance) = idle_instance();
    let handle = instance.handle();

    let stream = handle.open_stream("storage", &StreamKind::Component).unwrap();
    handle.release_stream(stream);
    handle.release_stream(stream);
}

#[test]
fn test_take_incoming_stream_on_empty_queue() {
    let (_host, instance) = idle_instance();

    assert_eq!(instance.handle().take_incoming_stream(), None);
    assert_eq!(instance.handle().incoming_len(), 0);
}

#[test]
fn test_incoming_streams_are_claimed_in_host_order() {
    init_tracing();
    let host = InMemoryPlatform::new();
    let first = host.incoming(b"first");
    let second = host.incoming(b"second");

    let claimed = Rc::new(RefCell::new(Vec::new()));
    let record = claimed.clone();
    let instance = InstanceBuilder::new(host.clone())
        .script(move |_| async move {
            let handle = Handle::current();
            for _ in 0..2 {
                let stream = handle.wait_for_incoming_stream().await;
                let payload = handle.read_all(stream).await.unwrap();
                record.borrow_mut().push((stream, payload));
            }
            assert_eq!(handle.take_incoming_stream(), None);
            Ok(())
        })
        .build();

    assert_eq!(poll_until_settled(&instance), PollStatus::FinishedOk);
    assert_eq!(
        *claimed.borrow(),
        vec![
            (first, b"first".to_vec()),
            (second, b"second".to_vec()),
        ]
    );
    assert_eq!(host.free_count(first), 1);
    assert_eq!(host.free_count(second), 1);
}

#[test]
fn test_untracked_update_wakes_incoming_waiter() {
    init_tracing();
    let host = InMemoryPlatform::new();

    let seen: Rc<RefCell<Option<(Descriptor, bool, usize)>>> = Rc::new(RefCell::new(None));
    let record = seen.clone();
    let instance = InstanceBuilder::new(host.clone())
        .script(move |_| async move {
            let handle = Handle::current();
            WaitFor::new(handle.clone(), WaitKey::IncomingStream).await;

            let queued = handle.incoming_len();
            let Some(stream) = handle.take_incoming_stream() else {
                panic!("no incoming stream after the wakeup");
            };
            assert_eq!(handle.incoming_len(), 0);

            *record.borrow_mut() = Some((stream, handle.is_open(stream), queued));
            Ok(())
        })
        .build();

    assert_eq!(instance.poll(), PollStatus::Blocked);
    assert!(seen.borrow().is_none());

    let incoming = host.incoming_open(b"");
    assert_eq!(instance.poll(), PollStatus::FinishedOk);

    assert_eq!(*seen.borrow(), Some((incoming, true, 1)));
    assert_eq!(host.free_count(incoming), 1);
}

#[test]
fn test_read_all_waits_for_more_data() {
    init_tracing();
    let host = InMemoryPlatform::new();
    let stream = host.incoming_open(b"hello ");

    let received = Rc::new(RefCell::new(Vec::new()));
    let record = received.clone();
    let instance = InstanceBuilder::new(host.clone())
        .script(move |_| async move {
            let handle = Handle::current();
            let stream = handle.wait_for_incoming_stream().await;
            *record.borrow_mut() = handle.read_all(stream).await.unwrap();
            handle.write_all(stream, b"ack").await.unwrap();
            Ok(())
        })
        .build();

    assert_eq!(instance.poll(), PollStatus::Blocked);

    host.push_data(stream, b"world");
    assert_eq!(instance.poll(), PollStatus::Blocked);

    host.close_read(stream);
    assert_eq!(instance.poll(), PollStatus::FinishedOk);

    assert_eq!(*received.borrow(), b"hello world");
    assert_eq!(host.written(stream), b"ack");
}

#[test]
fn test_write_to_closed_stream_is_short() {
    let (host, instance) = idle_instance();
    let handle = instance.handle().clone();

    let stream = handle.open_stream("storage", &StreamKind::Component).unwrap();
    host.close_write(stream);

    let result = Rc::new(RefCell::new(None));
    let record = result.clone();
    let task_handle = handle.clone();
    handle.spawn(async move {
        *record.borrow_mut() = Some(task_handle.write_all(stream, b"data").await);
    });
    while handle.schedule(lightrt::ScheduleEvent::NoEvent) == lightrt::ScheduleStatus::Resumed {}

    assert_eq!(
        result.borrow_mut().take(),
        Some(Err(RuntimeError::ShortWrite {
            descriptor: stream,
            written: 0,
            expected: 4,
        }))
    );
}

#[test]
fn test_releasing_the_standard_stream_clears_it() {
    init_tracing();
    let host = InMemoryPlatform::new();
    let stream = host.incoming(b"");

    let instance = InstanceBuilder::new(host.clone())
        .image_kind(lightrt::ImageKind::Cli)
        .script(move |_| async move {
            let handle = Handle::current();
            assert_eq!(handle.standard_stream(), Some(stream));

            handle.release_stream(stream);
            assert_eq!(handle.standard_stream(), None);
            Ok(())
        })
        .build();

    assert_eq!(instance.poll(), PollStatus::FinishedOk);
    assert_eq!(host.free_count(stream), 1);
}
