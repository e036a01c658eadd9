//! Integration tests.

use instrument_link::{
    ChannelOption,
    Client,
    Error,
    FlowControl,
    LinkState,
    Parity,
    SerialConfig,
    StopBits,
};
use mock::serial::TestPort;
use mock::wait_until;

use std::collections::HashSet;
use std::thread;
use std::time::Duration;

const FAKE_PORT: &str = "fakeport";

/// Opens a client on a new test port with the default configuration, runs `f` with both, and
/// verifies that dropping the client closes the port exactly once.
fn run_test<F: FnOnce(&Client, &TestPort)>(f: F) {
    let port = TestPort::new();
    let (client, result) = Client::with_open_fn(SerialConfig::new(FAKE_PORT), port.open_fn());
    assert!(result.is_ok());
    assert!(client.is_active());

    f(&client, &port);

    drop(client);
    assert!(!port.is_open());
    assert_eq!(1, port.close_count());
}

/// Reads from `client` until `len` bytes were received.
fn read_exactly(client: &Client, len: usize) -> Vec<u8> {
    let mut received = Vec::new();
    assert!(wait_until(|| {
        received.extend(client.read_all());
        received.len() >= len
    }));
    received
}

/// Waits for the client to finish closing.
fn wait_closed(client: &Client) {
    assert!(wait_until(|| client.state() == LinkState::Closed));
}

#[test]
fn test_write_order() {
    run_test(|client, port| {
        client.write_byte(b'A');
        client.write_byte(b'B');

        assert!(wait_until(|| port.writes().len() == 2));
        // One write call per byte, in order
        assert_eq!(vec![vec![b'A'], vec![b'B']], port.writes());
    });
}

#[test]
fn test_write_slice() {
    run_test(|client, port| {
        client.write(b"*IDN?");
        client.write(&[]);

        assert!(wait_until(|| port.written().len() == 5));
        assert_eq!(b"*IDN?".to_vec(), port.written());
        assert!(port.writes().iter().all(|w| w.len() == 1));
    });
}

#[test]
fn test_write_waits_for_completion() {
    run_test(|client, port| {
        port.pause_writes();
        client.write(b"XYZ");

        // The first byte is in flight and nothing else is written while it is
        assert!(wait_until(|| port.is_write_waiting()));
        thread::sleep(Duration::from_millis(20));
        assert!(port.writes().is_empty());

        port.resume_writes();
        assert!(wait_until(|| port.written() == b"XYZ"));
        assert_eq!(3, port.writes().len());
    });
}

#[test]
fn test_read_all() {
    run_test(|client, port| {
        assert!(client.read_all().is_empty());

        port.push_read(b"XYZ");

        // The bytes of a single read arrive together
        let mut received = Vec::new();
        assert!(wait_until(|| {
            received = client.read_all();
            !received.is_empty()
        }));
        assert_eq!(b"XYZ".to_vec(), received);
        assert!(client.read_all().is_empty());
    });
}

#[test]
fn test_read_one() {
    run_test(|client, port| {
        assert_eq!(None, client.read_one());

        port.push_read(&[1, 2]);
        assert!(wait_until(|| client.available() == 2));

        assert_eq!(Some(1), client.read_one());
        assert_eq!(Some(2), client.read_one());
        assert_eq!(None, client.read_one());
    });
}

#[test]
fn test_read_large() {
    run_test(|client, port| {
        // More than fits in a single read
        let data: Vec<u8> = (0..2000).map(|i| i as u8).collect();
        port.push_read(&data);

        assert_eq!(data, read_exactly(client, data.len()));
    });
}

#[test]
fn test_read_partitions_stream() {
    run_test(|client, port| {
        let data: Vec<u8> = (0..=255).collect();
        let mut received = Vec::new();

        // Repeated reads while data keeps arriving see every byte exactly once, in order
        for chunk in data.chunks(7) {
            port.push_read(chunk);
            received.extend(client.read_all());
        }
        assert!(wait_until(|| {
            received.extend(client.read_all());
            received.len() >= data.len()
        }));

        assert_eq!(data, received);
    });
}

#[test]
fn test_purge() {
    run_test(|client, port| {
        port.push_read(b"old");
        assert!(wait_until(|| client.available() == 3));

        // Hold the first byte in flight
        port.pause_writes();
        client.write(b"ABC");
        assert!(wait_until(|| port.is_write_waiting()));

        client.purge();
        assert!(client.read_all().is_empty());

        // A byte queued after the purge is not mistaken for the one in flight
        client.write_byte(b'D');
        port.resume_writes();

        assert!(wait_until(|| port.writes().len() == 2));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(vec![vec![b'A'], vec![b'D']], port.writes());
        assert!(client.is_active());
    });
}

#[test]
fn test_close() {
    run_test(|client, port| {
        client.close();
        // Inactive as soon as close returns, even though the port is released later
        assert!(!client.is_active());
        assert_ne!(LinkState::Active, client.state());

        wait_closed(client);
        assert!(!port.is_open());

        // Everything is a harmless no-op now
        client.write_byte(b'A');
        client.write(b"BC");
        client.purge();
        client.close();
        assert!(client.read_all().is_empty());
        assert_eq!(None, client.read_one());

        thread::sleep(Duration::from_millis(20));
        assert!(port.writes().is_empty());
        assert_eq!(LinkState::Closed, client.state());
        assert_eq!(1, port.close_count());
    });
}

#[test]
fn test_write_right_after_close() {
    run_test(|client, port| {
        client.close();
        // Nothing can be queued once close has returned
        client.write_byte(b'A');
        client.write(b"BC");

        wait_closed(client);
        thread::sleep(Duration::from_millis(20));
        assert!(port.writes().is_empty());
    });
}

#[test]
fn test_close_with_write_in_flight() {
    run_test(|client, port| {
        port.pause_writes();
        client.write_byte(b'A');
        assert!(wait_until(|| port.is_write_waiting()));

        // The pending write is cancelled rather than holding up the close
        client.close();
        wait_closed(client);
        assert!(port.writes().is_empty());
    });
}

#[test]
fn test_read_fault() {
    run_test(|client, port| {
        port.set_read_error(true);

        wait_closed(client);
        assert!(!port.is_open());

        client.write_byte(b'A');
        assert!(!client.is_active());
    });
}

#[test]
fn test_write_fault() {
    run_test(|client, port| {
        port.set_write_error(true);
        assert!(client.is_active());

        // The link only fails once a write is attempted
        client.write(b"AB");
        wait_closed(client);

        assert!(port.writes().is_empty());
        assert!(!port.is_open());
    });
}

#[test]
fn test_data_received_before_fault_is_kept() {
    run_test(|client, port| {
        port.push_read(b"OK");
        assert!(wait_until(|| client.available() == 2));

        port.set_read_error(true);
        wait_closed(client);

        assert_eq!(b"OK".to_vec(), client.read_all());
    });
}

#[test]
fn test_concurrent_writers() {
    run_test(|client, port| {
        const THREADS: u8 = 4;
        const PER_THREAD: u8 = 50;

        thread::scope(|s| {
            for t in 0..THREADS {
                s.spawn(move || {
                    for i in 0..PER_THREAD {
                        client.write_byte(t * PER_THREAD + i);
                    }
                });
            }
        });

        let total = usize::from(THREADS) * usize::from(PER_THREAD);
        assert!(wait_until(|| port.writes().len() == total));

        // Each thread's bytes keep their order
        let written = port.written();
        for t in 0..THREADS {
            let range = t * PER_THREAD..(t + 1) * PER_THREAD;
            let own: Vec<u8> = written.iter().copied().filter(|b| range.contains(b)).collect();
            assert_eq!(range.collect::<Vec<_>>(), own);
        }
    });
}

#[test]
fn test_concurrent_readers() {
    run_test(|client, port| {
        let data: Vec<u8> = (0..200).collect();
        port.push_read(&data);
        assert!(wait_until(|| client.available() == data.len()));

        let popped: Vec<u8> = thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(|| {
                        let mut own = Vec::new();
                        while let Some(b) = client.read_one() {
                            own.push(b);
                        }
                        own
                    })
                })
                .collect();

            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });

        // No byte is handed out twice
        let unique: HashSet<u8> = popped.iter().copied().collect();
        assert_eq!(data.len(), popped.len());
        assert_eq!(data.len(), unique.len());
    });
}

#[test]
fn test_concurrent_close() {
    run_test(|client, port| {
        // Explicit closes racing with a fault still close the port only once
        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| client.close());
            }
            s.spawn(|| port.set_read_error(true));
        });

        wait_closed(client);
        assert!(!port.is_open());
    });
}

#[test]
fn test_options_applied() {
    let port = TestPort::new();
    let config = SerialConfig::new(FAKE_PORT)
        .baud_rate(115_200)
        .flow_control(FlowControl::Software)
        .parity(Parity::Even)
        .stop_bits(StopBits::Two);

    let (client, result) = Client::with_open_fn(config, port.open_fn());
    assert!(result.is_ok());
    assert_eq!(FAKE_PORT, client.path());

    assert_eq!(
        vec![
            ChannelOption::BaudRate(115_200),
            ChannelOption::FlowControl(serialport::FlowControl::Software),
            ChannelOption::Parity(serialport::Parity::Even),
            ChannelOption::StopBits(serialport::StopBits::Two),
            ChannelOption::DataBits(serialport::DataBits::Eight),
        ],
        port.options(),
    );
}

#[test]
fn test_option_failure() {
    let port = TestPort::new();
    port.reject_options(|o| matches!(o, ChannelOption::Parity(_)));

    let (client, result) = Client::with_open_fn(SerialConfig::new(FAKE_PORT), port.open_fn());

    match result {
        Err(Error::Configure(failures)) => {
            assert_eq!(1, failures.len());
            assert_eq!(ChannelOption::Parity(serialport::Parity::None), failures[0].option);
        }
        _ => panic!("expected a configuration error"),
    }

    // The other options were still applied and the client still works
    assert_eq!(4, port.options().len());
    assert!(client.is_active());

    client.write_byte(b'A');
    assert!(wait_until(|| port.written() == b"A"));
}

#[test]
fn test_open_failure() {
    let port = TestPort::new();
    port.set_open_error(true);

    let (client, result) = Client::with_open_fn(SerialConfig::new(FAKE_PORT), port.open_fn());

    match result {
        Err(Error::Open { path, .. }) => assert_eq!(FAKE_PORT, path),
        _ => panic!("expected an open error"),
    }

    // Inactive right away, and nothing is ever read or written
    assert!(!client.is_active());
    assert_eq!(LinkState::Closed, client.state());

    client.write_byte(b'A');
    client.close();
    client.purge();
    assert!(client.read_all().is_empty());
    assert_eq!(None, client.read_one());

    drop(client);
    assert!(port.writes().is_empty());
    assert_eq!(0, port.close_count());
}

#[test]
fn test_open_nonexistent_port() {
    let (client, result) = Client::open(SerialConfig::new("/nonexistent/serial/port"));

    assert!(matches!(result, Err(Error::Open { .. })));
    assert!(!client.is_active());
}
