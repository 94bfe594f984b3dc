//! Drives a real `TaskQueue` against a real socket whose peer pauses before
//! reading, forcing at least one `WouldBlock` before the queue drains —
//! the same backpressure shape the event loop hits when a server-side
//! terminal is slow to read chat output.

use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::thread;
use std::time::Duration;

use oicb_protocol::connection::Connection;
use oicb_protocol::task_queue::{DrainOutcome, OutputTask, TaskQueue};

fn spawn_slow_reader(read_delay: Duration) -> (SocketAddr, thread::JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind(SocketAddr::from((IpAddr::V4(Ipv4Addr::LOCALHOST), 0))).expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept connection");
        thread::sleep(read_delay);
        let mut received = Vec::new();
        stream.read_to_end(&mut received).ok();
        received
    });

    (addr, handle)
}

#[test]
fn queued_bytes_eventually_flush_after_would_block_backpressure() {
    let (addr, reader) = spawn_slow_reader(Duration::from_millis(400));
    let stream = mio::net::TcpStream::connect(addr).expect("connect");
    let mut conn = Connection::new(stream);

    let payload = vec![9_u8; 4 * 1024 * 1024];
    let mut queue = TaskQueue::new();
    queue.enqueue(OutputTask::new(payload.clone()));

    let mut saw_would_block = false;
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    loop {
        match queue.drain(&mut conn) {
            DrainOutcome::Drained => break,
            DrainOutcome::WouldBlock => {
                saw_would_block = true;
                assert!(std::time::Instant::now() < deadline, "queue never drained");
                thread::sleep(Duration::from_millis(5));
            }
            DrainOutcome::Failed(e) => panic!("unexpected write failure: {e}"),
        }
    }
    assert!(saw_would_block, "test payload should have forced at least one would-block before the reader woke up");

    drop(conn);
    let received = reader.join().expect("reader thread panicked");
    assert_eq!(received.len(), payload.len());
    assert_eq!(received, payload);
}

#[test]
fn independent_queues_for_two_streams_do_not_interfere() {
    let (fast_addr, fast_reader) = spawn_slow_reader(Duration::from_millis(0));
    let (slow_addr, slow_reader) = spawn_slow_reader(Duration::from_millis(500));

    let fast_stream = mio::net::TcpStream::connect(fast_addr).expect("connect fast");
    let slow_stream = mio::net::TcpStream::connect(slow_addr).expect("connect slow");
    let mut fast_conn = Connection::new(fast_stream);
    let mut slow_conn = Connection::new(slow_stream);

    let mut fast_queue = TaskQueue::new();
    fast_queue.enqueue(OutputTask::new(b"fast-keepalive".to_vec()));

    let big = vec![7_u8; 4 * 1024 * 1024];
    let mut slow_queue = TaskQueue::new();
    slow_queue.enqueue(OutputTask::new(big.clone()));

    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    loop {
        let fast_done = matches!(fast_queue.drain(&mut fast_conn), DrainOutcome::Drained);
        let slow_done = matches!(slow_queue.drain(&mut slow_conn), DrainOutcome::Drained);
        if fast_done && slow_done {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "queues never both drained");
        thread::sleep(Duration::from_millis(5));
    }

    drop(fast_conn);
    drop(slow_conn);

    let fast_received = fast_reader.join().expect("fast reader panicked");
    let slow_received = slow_reader.join().expect("slow reader panicked");
    assert_eq!(fast_received, b"fast-keepalive".to_vec());
    assert_eq!(slow_received, big);
}
