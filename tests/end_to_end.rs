//! Full pipeline from configuration: envelope backend, LiveLink over UDP,
//! artifacts on disk, control over the Unix socket.

use facelink::artifacts::{AUDIO_FILE, SHAPES_FILE};
use facelink::audio::wav;
use facelink::config::{Config, InferenceBackend};
use facelink::daemon::DaemonState;
use facelink::daemon::handler::DaemonCommandHandler;
use facelink::frame::JAW_OPEN;
use facelink::ipc::{Command, IpcServer, Response, send_command};
use facelink::pipeline::{PlaybackOutcome, Scheduler};
use std::net::UdpSocket;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const SUBJECT: &str = "e2e-face";

fn tone(sample_rate: u32, secs: f32, amplitude: f32) -> Vec<u8> {
    let n = (sample_rate as f32 * secs) as usize;
    let samples: Vec<i16> = (0..n)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (amplitude * (2.0 * std::f32::consts::PI * 220.0 * t).sin() * 32767.0) as i16
        })
        .collect();
    wav::encode_pcm16(sample_rate, &samples).unwrap()
}

fn config(receiver: &UdpSocket, artifacts: &TempDir) -> Config {
    let mut config = Config::default();
    config.inference.backend = InferenceBackend::Envelope;
    config.transport.address = receiver.local_addr().unwrap().to_string();
    config.transport.subject_name = SUBJECT.to_string();
    config.audio.enabled = false;
    config.artifacts.enabled = true;
    config.artifacts.dir = Some(artifacts.path().to_path_buf());
    config
}

fn receiver() -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket
        .set_read_timeout(Some(Duration::from_millis(200)))
        .unwrap();
    socket
}

/// Every datagram waiting on the socket.
fn drain(socket: &UdpSocket) -> Vec<Vec<u8>> {
    let mut packets = Vec::new();
    let mut buf = [0u8; 2048];
    while let Ok(len) = socket.recv(&mut buf) {
        packets.push(buf[..len].to_vec());
    }
    packets
}

/// Offset of the first shape value in a LiveLink packet for `SUBJECT`.
fn shapes_offset() -> usize {
    // version, "$" + uuid, name length, name, frame, sub-frame, fps, denominator, count
    4 + 37 + 4 + SUBJECT.len() + 16 + 1
}

fn jaw_open(packet: &[u8]) -> f32 {
    let at = shapes_offset() + JAW_OPEN * 4;
    f32::from_be_bytes(packet[at..at + 4].try_into().unwrap())
}

#[test]
fn tone_animates_the_jaw_on_the_wire() {
    let socket = receiver();
    let artifacts = TempDir::new().unwrap();
    let mut scheduler = Scheduler::from_config(&config(&socket, &artifacts)).unwrap();
    let reports = scheduler.with_reports();
    scheduler.start().unwrap();

    let audio = tone(16000, 1.0, 0.5);
    let id = scheduler.submit(audio.clone()).unwrap();
    let report = reports.recv_timeout(Duration::from_secs(10)).unwrap();
    scheduler.shutdown();

    assert_eq!(report.id, id);
    assert_eq!(report.frames, 60);
    assert_eq!(report.outcome, PlaybackOutcome::Completed);

    let packets = drain(&socket);
    assert!(!packets.is_empty());
    for packet in &packets {
        assert_eq!(packet.len(), shapes_offset() + 61 * 4);
        assert_eq!(packet[shapes_offset() - 1], 61);
        assert!(packet.windows(SUBJECT.len()).any(|w| w == SUBJECT.as_bytes()));
    }

    // Neutral idle keeps the jaw shut; the loud tone opens it
    let open = packets.iter().filter(|p| jaw_open(p) > 0.5).count();
    assert!(open >= 30, "only {} packets with an open jaw", open);
    assert!(packets.iter().any(|p| jaw_open(p) == 0.0));

    let saved: Vec<_> = std::fs::read_dir(artifacts.path())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(saved.len(), 1);
    assert_eq!(std::fs::read(saved[0].join(AUDIO_FILE)).unwrap(), audio);
    let csv = std::fs::read_to_string(saved[0].join(SHAPES_FILE)).unwrap();
    // Header plus one row per frame
    assert_eq!(csv.lines().count(), 61);
}

#[test]
fn silence_too_short_is_dropped_and_idle_continues() {
    let socket = receiver();
    let artifacts = TempDir::new().unwrap();
    let mut scheduler = Scheduler::from_config(&config(&socket, &artifacts)).unwrap();
    scheduler.start().unwrap();

    let short = wav::encode_pcm16(16000, &[0i16; 1000]).unwrap();
    scheduler.submit(short).unwrap();

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while scheduler.status().dropped == 0 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    let status = scheduler.status();
    assert_eq!(status.dropped, 1);
    assert_eq!(status.played, 0);
    assert!(status.idle_running);
    scheduler.shutdown();

    assert!(!drain(&socket).is_empty());
    assert_eq!(std::fs::read_dir(artifacts.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn control_socket_drives_the_pipeline() {
    let socket = receiver();
    let artifacts = TempDir::new().unwrap();
    let config = config(&socket, &artifacts);
    let scheduler = tokio::task::spawn_blocking(move || {
        let mut scheduler = Scheduler::from_config(&config).unwrap();
        scheduler.start().unwrap();
        scheduler
    })
    .await
    .unwrap();
    let scheduler = Arc::new(scheduler);

    let dir = TempDir::new().unwrap();
    let socket_path = dir.path().join("facelink.sock");
    let server = Arc::new(IpcServer::new(socket_path.clone()).unwrap());
    let handler = DaemonCommandHandler::new(DaemonState::new(scheduler.clone()));
    let server_task = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.start(handler).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let audio = tone(16000, 1.0, 0.5);
    let shapes = send_command(&socket_path, Command::shapes(&audio))
        .await
        .unwrap();
    match shapes {
        Response::Blendshapes { frames } => {
            assert_eq!(frames.len(), 60);
            assert!(frames.iter().all(|row| row.len() == 68));
        }
        other => panic!("Expected Blendshapes, got {:?}", other),
    }

    let queued = send_command(&socket_path, Command::submit(&audio))
        .await
        .unwrap();
    assert_eq!(queued, Response::Queued { id: 1 });

    let cleared = send_command(&socket_path, Command::Clear).await.unwrap();
    assert!(matches!(cleared, Response::Cleared { .. }));

    match send_command(&socket_path, Command::Status).await.unwrap() {
        Response::Status { status } => assert_eq!(status.accepted, 1),
        other => panic!("Expected Status, got {:?}", other),
    }

    server.stop().await.unwrap();
    server_task.await.unwrap().unwrap();
    tokio::task::spawn_blocking(move || scheduler.shutdown())
        .await
        .unwrap();
}
