//! Stream lifecycle tests.
//!
//! Exercise the producer/consumer contract end to end over synthetic sources:
//! ordering, backpressure, release semantics, metadata reporting and
//! early termination on decode failure.

use std::time::{Duration, Instant};

use framestream::{
    FrameCount, FrameStream, ReadOutcome, SourceId, StreamError, StreamState, SyntheticConfig,
    SyntheticSource,
};

const CLIP: &str = "stub://clip?frames=10&fps=30&width=640&height=480";

fn live_stream(queue_size: usize) -> FrameStream {
    let source = SyntheticSource::new(SyntheticConfig::live(30.0, 16, 12));
    FrameStream::with_source(Box::new(source), queue_size).expect("live stream")
}

fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

// ==================== Scenario: ten frame clip ====================

#[test]
fn clip_reports_metadata_and_delivers_every_frame() {
    let mut stream = FrameStream::new(CLIP, 4).expect("open clip");

    assert_eq!(stream.get_resolution(), (640, 480));
    assert_eq!(stream.get_fps(), 30);
    assert!(!stream.is_live());

    stream.begin_stream().expect("begin stream");
    assert_eq!(stream.state(), StreamState::Running);
    assert_eq!(stream.count_frames(), FrameCount::Total(10));

    for expected in 0..10u64 {
        let frame = match stream.read().expect("read") {
            ReadOutcome::Frame(frame) => frame,
            other => panic!("expected frame {expected}, got {other:?}"),
        };
        assert_eq!(frame.index, expected);
        assert_eq!(frame.pixels()[0], expected as u8);
        assert_eq!(frame.shape(), (480, 640, 3));
    }

    assert!(matches!(stream.read().unwrap(), ReadOutcome::EndOfStream));
    assert!(!stream.more());
    assert_eq!(stream.state(), StreamState::Released);
}

#[test]
fn exactly_n_reads_succeed_before_more_turns_false() {
    let mut stream = FrameStream::new("stub://clip?frames=25&width=8&height=8", 3).unwrap();
    stream.begin_stream().unwrap();

    let mut indices = Vec::new();
    while stream.more() {
        match stream.read().unwrap() {
            ReadOutcome::Frame(frame) => indices.push(frame.index),
            ReadOutcome::EndOfStream => break,
            ReadOutcome::TimedOut => unreachable!("read() never times out"),
        }
    }

    assert_eq!(indices, (0..25).collect::<Vec<_>>());
    assert!(!stream.more());
}

#[test]
fn frames_iterator_drains_in_order() {
    let mut stream = FrameStream::new("stub://clip?frames=12&width=4&height=4", 5).unwrap();
    stream.begin_stream().unwrap();
    let indices: Vec<u64> = stream.frames().map(|frame| frame.index).collect();
    assert_eq!(indices, (0..12).collect::<Vec<_>>());
}

// ==================== Backpressure ====================

#[test]
fn buffered_frames_never_exceed_queue_size() {
    for queue_size in [1usize, 2, 7] {
        let mut stream =
            FrameStream::new("stub://clip?frames=40&width=4&height=4", queue_size).unwrap();
        stream.begin_stream().unwrap();

        let mut reads = 0;
        loop {
            let status = stream.status();
            assert!(status.buffered <= queue_size, "{status:?}");
            assert_eq!(status.capacity, queue_size);
            std::thread::sleep(Duration::from_millis(1));
            match stream.read().unwrap() {
                ReadOutcome::Frame(_) => reads += 1,
                _ => break,
            }
        }
        assert_eq!(reads, 40);
    }
}

#[test]
fn full_queue_stops_decoding() {
    let mut stream = live_stream(4);
    stream.begin_stream().unwrap();
    assert!(wait_for(|| stream.status().buffered == 4));
    std::thread::sleep(Duration::from_millis(100));

    // One extra frame may be held by the producer while it waits for space.
    let produced = stream.status().frames_produced;
    assert_eq!(produced, 4);
    stream.release().unwrap();
}

// ==================== Release ====================

#[test]
fn release_is_idempotent() {
    let mut stream = FrameStream::new(CLIP, 4).unwrap();
    stream.begin_stream().unwrap();
    stream.release().unwrap();
    stream.release().unwrap();
    stream.release().unwrap();
    assert_eq!(stream.state(), StreamState::Released);
}

#[test]
fn release_right_after_begin_terminates_promptly() {
    let mut stream = live_stream(2);
    let started = Instant::now();
    stream.begin_stream().unwrap();
    stream.release().unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn release_unblocks_producer_waiting_on_full_queue() {
    let mut stream = live_stream(2);
    stream.begin_stream().unwrap();
    assert!(wait_for(|| stream.status().buffered == 2));

    let started = Instant::now();
    stream.release().unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn no_frames_are_produced_after_release() {
    let mut stream = live_stream(8);
    stream.begin_stream().unwrap();
    assert!(wait_for(|| stream.status().frames_produced > 0));
    stream.release().unwrap();

    let produced = stream.status().frames_produced;
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(stream.status().frames_produced, produced);
}

#[test]
fn buffered_frames_remain_readable_after_release() {
    let mut stream = live_stream(3);
    stream.begin_stream().unwrap();
    assert!(wait_for(|| stream.status().buffered == 3));
    stream.release().unwrap();

    assert!(stream.more());
    let drained = stream.frames().count();
    assert_eq!(drained, 3);
    assert!(!stream.more());
    assert!(matches!(stream.read().unwrap(), ReadOutcome::EndOfStream));
}

#[test]
fn metadata_is_zeroed_after_release() {
    let mut stream = FrameStream::new(CLIP, 4).unwrap();
    stream.begin_stream().unwrap();
    stream.release().unwrap();

    assert_eq!(stream.get_fps(), 0);
    assert_eq!(stream.count_frames(), FrameCount::Total(0));
    assert_eq!(stream.get_resolution(), (640, 480));
}

#[test]
fn dropping_a_running_stream_joins_the_producer() {
    let mut stream = live_stream(2);
    stream.begin_stream().unwrap();
    let started = Instant::now();
    drop(stream);
    assert!(started.elapsed() < Duration::from_secs(1));
}

// ==================== Live sources ====================

#[test]
fn live_source_frame_count_is_not_applicable() {
    let mut stream = live_stream(4);
    assert!(stream.is_live());
    assert_eq!(stream.count_frames(), FrameCount::Live);

    stream.begin_stream().unwrap();
    assert_eq!(stream.count_frames(), FrameCount::Live);
    assert_eq!(stream.count_frames().total(), None);

    stream.release().unwrap();
    assert_eq!(stream.count_frames(), FrameCount::Live);
}

#[test]
fn stub_live_source_streams_until_released() {
    let mut stream = FrameStream::new("stub://cam?live=1&width=8&height=8", 4).unwrap();
    assert!(stream.is_live());
    assert_eq!(stream.count_frames(), FrameCount::Live);
    assert_eq!(stream.get_fps(), 30);
    stream.begin_stream().unwrap();
    for expected in 0..20u64 {
        let frame = stream.read().unwrap().into_frame().expect("live frame");
        assert_eq!(frame.index, expected);
    }
    assert!(stream.more());
    stream.release().unwrap();
    assert_eq!(stream.count_frames(), FrameCount::Live);
}

#[test]
fn frames_on_unstarted_stream_is_empty() {
    let stream = FrameStream::new(CLIP, 4).unwrap();
    assert_eq!(stream.frames().count(), 0);
    assert!(matches!(stream.read(), Err(StreamError::NotStarted)));
}

#[test]
fn read_timeout_reports_slow_source() {
    let mut stream =
        FrameStream::new("stub://cam?live=1&realtime=1&fps=2&width=4&height=4", 4).unwrap();
    stream.begin_stream().unwrap();

    assert!(stream.read().unwrap().into_frame().is_some());
    assert!(matches!(
        stream.read_timeout(Duration::from_millis(50)).unwrap(),
        ReadOutcome::TimedOut
    ));
    stream.release().unwrap();
}

#[cfg(not(feature = "ingest-v4l2"))]
#[test]
fn device_index_without_capture_backend_fails_to_open() {
    let err = FrameStream::new(0, 4).err().expect("open must fail");
    assert!(matches!(err, StreamError::SourceOpen { .. }));
}

// ==================== Construction errors ====================

#[test]
fn invalid_identifiers_fail_at_construction() {
    assert!(matches!(
        FrameStream::new(-1, 4),
        Err(StreamError::InvalidSource(_))
    ));
    assert!(matches!(
        FrameStream::new("", 4),
        Err(StreamError::InvalidSource(_))
    ));
    assert!(matches!(
        FrameStream::new("rtsp://camera/stream", 4),
        Err(StreamError::InvalidSource(_))
    ));
}

#[test]
fn malformed_stub_fails_to_open() {
    assert!(matches!(
        FrameStream::new("stub://clip?frames=lots", 4),
        Err(StreamError::SourceOpen { .. })
    ));
}

#[test]
fn zero_queue_size_fails_at_construction() {
    let id: SourceId = CLIP.parse().unwrap();
    assert!(matches!(
        FrameStream::open(&id, 0),
        Err(StreamError::InvalidQueueSize(0))
    ));
}

// ==================== Decode failures ====================

#[test]
fn decode_failure_ends_stream_and_is_reported() {
    let mut stream =
        FrameStream::new("stub://broken?frames=20&fail_at=5&width=4&height=4", 8).unwrap();
    stream.begin_stream().unwrap();

    let read = stream.frames().count();
    assert_eq!(read, 5);
    assert!(!stream.more());

    let failure = stream.failure().expect("failure recorded");
    assert!(failure.contains("frame 5"), "{failure}");
    assert_eq!(stream.status().failure, Some(failure));
}

#[test]
fn clean_end_reports_no_failure() {
    let mut stream = FrameStream::new("stub://clip?frames=3&width=4&height=4", 2).unwrap();
    stream.begin_stream().unwrap();
    assert_eq!(stream.frames().count(), 3);
    assert!(stream.failure().is_none());
}
