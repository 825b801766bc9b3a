mod common;

use std::io::{Read, Write};
use std::net::Shutdown;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn concurrent_connections_receive_only_their_own_bytes() {
    let server = common::EchoServerTest::start();
    let mut a = server.connect();
    let mut b = server.connect();

    // Interleave sends across the two connections.
    a.write_all(b"alpha-1").expect("send on a");
    b.write_all(b"beta-1").expect("send on b");
    a.write_all(b"alpha-2").expect("send on a");
    b.write_all(b"beta-2").expect("send on b");

    let mut buf_a = [0u8; 14];
    a.read_exact(&mut buf_a).expect("read a");
    assert_eq!(&buf_a, b"alpha-1alpha-2");

    let mut buf_b = [0u8; 12];
    b.read_exact(&mut buf_b).expect("read b");
    assert_eq!(&buf_b, b"beta-1beta-2");
}

#[test]
fn orderly_shutdown_releases_the_connection() {
    let server = common::EchoServerTest::start();
    let mut stream = server.connect();

    stream.write_all(b"bye").expect("send");
    let mut buf = [0u8; 3];
    stream.read_exact(&mut buf).expect("read echo");
    assert_eq!(&buf, b"bye");

    // Half-close our write side; the server must tear the connection down
    // without echoing further, which we observe as EOF on our read side.
    stream.shutdown(Shutdown::Write).expect("shutdown write");
    let n = stream.read(&mut buf).expect("read after shutdown");
    assert_eq!(n, 0);
}

#[test]
fn disconnect_does_not_disturb_other_connections() {
    let server = common::EchoServerTest::start();
    let mut survivor = server.connect();

    let mut doomed = server.connect();
    doomed.write_all(b"going away").expect("send on doomed");
    drop(doomed);

    survivor.write_all(b"still here").expect("send on survivor");
    let mut buf = [0u8; 10];
    survivor.read_exact(&mut buf).expect("read survivor echo");
    assert_eq!(&buf, b"still here");
}

#[cfg(target_os = "linux")]
#[test]
fn descriptors_return_to_baseline_after_connections_close() {
    let server = common::EchoServerTest::start();

    // Let the startup probe connection finish closing before sampling.
    thread::sleep(Duration::from_millis(200));
    let baseline = fd_count(server.pid());

    for _ in 0..8 {
        let mut stream = server.connect();
        stream.write_all(b"x").expect("send");
        let mut buf = [0u8; 1];
        stream.read_exact(&mut buf).expect("read echo");
        drop(stream);
    }

    // Teardown happens on the reactor's next dispatch; poll until the
    // count settles back.
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if fd_count(server.pid()) <= baseline {
            break;
        }
        if Instant::now() > deadline {
            panic!("descriptor count did not return to baseline");
        }
        thread::sleep(Duration::from_millis(50));
    }
}

#[cfg(target_os = "linux")]
fn fd_count(pid: u32) -> usize {
    std::fs::read_dir(format!("/proc/{pid}/fd"))
        .expect("read fd dir")
        .count()
}
