//! Dry-run export through the loopback backend.
//!
//! `cargo run --example loopback_export -- [session_opts.json]`

use avexport::{EncodeParams, ExportSession, LoopbackBackend, LoopbackOpts, SessionOpts};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let opts = match std::env::args().nth(1) {
        Some(path) => SessionOpts::from_path(path)?,
        None => SessionOpts::default(),
    };

    let backend = LoopbackBackend::new(LoopbackOpts::default());
    let probe = backend.probe();
    let mut session = ExportSession::new(Box::new(backend), opts);

    let params = EncodeParams {
        width: 1280,
        height: 720,
        frame_rate_num: 60,
        frame_rate_den: 1,
        video_bitrate_kbps: 8_000,
        audio_bitrate_kbps: 160,
        stereo: true,
        audio_path: "loopback.raw".into(),
        output_path: "loopback.mp4".into(),
    };
    // Two seconds of silence.
    session.begin_encoding_with_pcm(&params, vec![0; 44_100 * 2 * 2 * 2])?;
    for _ in 0..120 {
        session.add_frame()?;
    }
    let summary = session.end_encoding(false)?;

    let record = probe
        .snapshot()
        .container
        .map(|c| c.snapshot())
        .unwrap_or_default();
    println!(
        "frames={} video_samples={} audio_samples={} muxed={} violations={}",
        summary.frames,
        summary.video.samples_written,
        summary.audio.samples_written,
        record.samples.len(),
        record.violations.len()
    );
    Ok(())
}
