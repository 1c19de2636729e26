use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use framestream::config::StreamConfig;
use framestream::{FrameCount, SourceId, DEFAULT_QUEUE_SIZE};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "FRAMESTREAM_CONFIG",
        "FRAMESTREAM_SOURCE",
        "FRAMESTREAM_QUEUE_SIZE",
        "FRAMESTREAM_READ_TIMEOUT_MS",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(json.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = StreamConfig::load().expect("load config");
    assert_eq!(cfg.source, SourceId::Device(0));
    assert_eq!(cfg.queue_size, DEFAULT_QUEUE_SIZE);
    assert_eq!(cfg.read_timeout, None);
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "source": "videos/clip.mp4",
            "queue_size": 64,
            "read_timeout_ms": 250
        }"#,
    );
    std::env::set_var("FRAMESTREAM_CONFIG", file.path());

    let cfg = StreamConfig::load().expect("load config");
    assert_eq!(cfg.source, SourceId::Path(PathBuf::from("videos/clip.mp4")));
    assert_eq!(cfg.queue_size, 64);
    assert_eq!(cfg.read_timeout, Some(Duration::from_millis(250)));

    std::env::set_var("FRAMESTREAM_SOURCE", "2");
    std::env::set_var("FRAMESTREAM_QUEUE_SIZE", "16");
    let cfg = StreamConfig::load().expect("load config with overrides");
    assert_eq!(cfg.source, SourceId::Device(2));
    assert_eq!(cfg.queue_size, 16);
    assert_eq!(cfg.read_timeout, Some(Duration::from_millis(250)));

    clear_env();
}

#[test]
fn numeric_source_in_file_is_a_device() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(r#"{ "source": 1 }"#);
    let cfg = StreamConfig::load_from(file.path()).expect("load config");
    assert_eq!(cfg.source, SourceId::Device(1));
    assert!(cfg.source.is_live());
}

#[test]
fn digit_string_source_matches_env_parsing() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(r#"{ "source": "0" }"#);
    let from_file = StreamConfig::load_from(file.path()).expect("load config");
    assert_eq!(from_file.source, SourceId::Device(0));

    std::env::set_var("FRAMESTREAM_SOURCE", "0");
    let from_env = StreamConfig::load().expect("load config");
    assert_eq!(from_env.source, from_file.source);

    let negative = write_config(r#"{ "source": "-2" }"#);
    std::env::remove_var("FRAMESTREAM_SOURCE");
    assert!(StreamConfig::load_from(negative.path()).is_err());
    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    for json in [
        r#"{ "queue_size": 0 }"#,
        r#"{ "source": -4 }"#,
        r#"{ "source": "" }"#,
        r#"{ "source": "http://camera/feed" }"#,
        r#"{ "read_timeout_ms": 0 }"#,
        r#"{ "queue": 3 }"#,
        r#"not json"#,
    ] {
        let file = write_config(json);
        assert!(
            StreamConfig::load_from(file.path()).is_err(),
            "{json} should be rejected"
        );
    }

    std::env::set_var("FRAMESTREAM_QUEUE_SIZE", "many");
    assert!(StreamConfig::load().is_err());
    clear_env();

    std::env::set_var("FRAMESTREAM_SOURCE", "-1");
    assert!(StreamConfig::load().is_err());
    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("FRAMESTREAM_CONFIG", "/nonexistent/framestream.json");
    let err = StreamConfig::load().unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));
    clear_env();
}

#[test]
fn config_opens_a_stream() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var(
        "FRAMESTREAM_SOURCE",
        "stub://clip?frames=6&fps=24&width=32&height=24",
    );
    std::env::set_var("FRAMESTREAM_QUEUE_SIZE", "2");
    let cfg = StreamConfig::load().expect("load config");
    clear_env();

    let mut stream = cfg.open_stream().expect("open stream");
    assert_eq!(stream.get_resolution(), (32, 24));
    assert_eq!(stream.get_fps(), 24);
    assert_eq!(stream.count_frames(), FrameCount::Total(6));
    stream.begin_stream().expect("begin stream");
    assert_eq!(stream.frames().count(), 6);
    assert_eq!(stream.status().capacity, 2);
}
