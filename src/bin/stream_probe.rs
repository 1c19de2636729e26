//! stream_probe - open a video source and pull frames through a FrameStream
//!
//! This tool:
//! 1. Resolves the source from flags, environment, or FRAMESTREAM_CONFIG
//! 2. Prints the source's resolution, frame rate, and length
//! 3. Streams frames until the source ends, --max-frames is reached, or Ctrl-C
//! 4. Releases the stream and prints a summary

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use framestream::config::StreamConfig;
use framestream::ui::Ui;
use framestream::{FrameCount, ReadOutcome, SourceId};

/// Poll interval for the Ctrl-C flag when no read timeout is configured.
const DEFAULT_POLL: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Stream frames from a device, video file, or stub:// source and report throughput"
)]
struct Args {
    /// Device index, local file path, or stub:// source. Overrides the config.
    #[arg(long)]
    source: Option<String>,

    /// Bounded queue capacity in frames. Overrides the config.
    #[arg(long)]
    queue_size: Option<usize>,

    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,

    /// Output style: auto, plain, or pretty.
    #[arg(long, env = "FRAMESTREAM_UI")]
    ui: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = Ui::from_args(args.ui.as_deref(), std::io::stderr().is_terminal());

    let mut cfg = StreamConfig::load()?;
    if let Some(source) = args.source.as_deref() {
        cfg.source = source.parse::<SourceId>()?;
    }
    if let Some(queue_size) = args.queue_size {
        cfg.queue_size = queue_size;
    }

    let mut stream = {
        let _stage = ui.stage(&format!("open {}", cfg.source));
        cfg.open_stream()
            .with_context(|| format!("failed to open {}", cfg.source))?
    };

    let (width, height) = stream.get_resolution();
    let length = match stream.count_frames() {
        FrameCount::Total(n) => format!("{} frames", n),
        FrameCount::Unknown => "unknown length".to_string(),
        FrameCount::Live => "live".to_string(),
    };
    println!(
        "source: {} ({}x{} @ {} fps, {}), queue {}",
        cfg.source,
        width,
        height,
        stream.get_fps(),
        length,
        cfg.queue_size
    );

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;

    let poll = cfg.read_timeout.unwrap_or(DEFAULT_POLL);
    let started = Instant::now();
    let mut frames = 0u64;
    let mut bytes = 0usize;
    {
        let stage = ui.stage("stream frames");
        stream.begin_stream()?;
        loop {
            if interrupted.load(Ordering::SeqCst) {
                log::info!("interrupt received, releasing stream");
                break;
            }
            if args.max_frames.is_some_and(|max| frames >= max) {
                break;
            }
            match stream.read_timeout(poll)? {
                ReadOutcome::Frame(frame) => {
                    frames += 1;
                    bytes += frame.byte_len();
                    if frames % 30 == 0 {
                        stage.progress(&format!("{} frames", frames));
                    }
                }
                ReadOutcome::TimedOut => {
                    log::debug!("no frame within {:?}", poll);
                }
                ReadOutcome::EndOfStream => break,
            }
        }
        stream.release()?;
    }

    let elapsed = started.elapsed().as_secs_f64();
    let status = stream.status();
    println!(
        "read {} frames ({:.1} MiB) in {:.2}s ({:.1} fps); producer decoded {}",
        frames,
        bytes as f64 / (1024.0 * 1024.0),
        elapsed,
        if elapsed > 0.0 { frames as f64 / elapsed } else { 0.0 },
        status.frames_produced
    );
    if let Some(failure) = status.failure {
        log::warn!("stream ended early: {}", failure);
    }

    Ok(())
}
