use super::*;

fn params() -> EncodeParams {
    EncodeParams {
        width: 1280,
        height: 720,
        frame_rate_num: 30,
        frame_rate_den: 1,
        video_bitrate_kbps: 4_000,
        audio_bitrate_kbps: 128,
        stereo: true,
        audio_path: PathBuf::from("song.raw"),
        output_path: PathBuf::from("song.mp4"),
    }
}

#[test]
fn defaults_match_hardware_export_settings() {
    let opts = SessionOpts::default();
    assert_eq!(opts.output_timeout(), Duration::from_millis(10));
    assert_eq!(opts.input_timeout(), Duration::from_millis(10));
    assert!(opts.flush_to_end_of_stream);
    assert_eq!(opts.audio_sample_rate, 44_100);
    assert_eq!(opts.audio_bytes_per_sample, 2);
    assert_eq!(opts.video_i_frame_interval_secs, 4);
    assert_eq!(opts.video_profile, H264Profile::High);
    assert_eq!(opts.video_level, H264Level(31));
    assert_eq!(opts.audio_profile, AudioCodec::AacLc);
}

#[test]
fn json_fills_missing_fields_with_defaults() {
    let opts = SessionOpts::from_json_str(
        r#"{ "output_poll_timeout_us": 2500, "video_profile": "main", "feeder_thread_name": "pcm" }"#,
    )
    .unwrap();
    assert_eq!(opts.output_timeout(), Duration::from_micros(2500));
    assert_eq!(opts.video_profile, H264Profile::Main);
    assert_eq!(opts.feeder_thread_name, "pcm");
    assert_eq!(opts.input_poll_timeout_us, 10_000);
    assert_eq!(opts.context_attributes, ContextAttributes::default());

    let from_reader = SessionOpts::from_reader("{}".as_bytes()).unwrap();
    assert_eq!(from_reader, SessionOpts::default());
}

#[test]
fn malformed_json_is_a_config_error() {
    let err = SessionOpts::from_json_str("{ not json").unwrap_err();
    assert!(matches!(err, ExportError::Config(_)));
    let err = SessionOpts::from_path("/nonexistent/avexport/opts.json").unwrap_err();
    assert!(err.to_string().contains("open session options JSON"));
}

#[test]
fn valid_params_derive_encoder_configs() {
    let opts = SessionOpts::default();
    let p = params();
    p.validate().unwrap();

    let video = p.video_config(&opts).unwrap();
    assert_eq!(video.bitrate_bps, 4_000_000);
    assert_eq!(video.frame_rate, FrameRate::new(30, 1).unwrap());
    assert_eq!(video.i_frame_interval_secs, 4);

    let audio = p.audio_config(&opts).unwrap();
    assert_eq!(audio.bitrate_bps, 128_000);
    assert_eq!(audio.channels, 2);
    assert_eq!(audio.sample_rate, 44_100);

    assert_eq!(p.audio_layout(&opts).unwrap().bytes_per_second(), 176_400);
}

fn assert_rejected(name: &str, mutate: impl FnOnce(&mut EncodeParams)) {
    let mut p = params();
    mutate(&mut p);
    let err = p.validate().unwrap_err();
    assert!(matches!(err, ExportError::Config(_)), "{name}: {err}");
}

#[test]
fn invalid_params_are_rejected() {
    assert_rejected("zero width", |p| p.width = 0);
    assert_rejected("odd height", |p| p.height = 721);
    assert_rejected("zero numerator", |p| p.frame_rate_num = 0);
    assert_rejected("zero denominator", |p| p.frame_rate_den = 0);
    assert_rejected("too fast", |p| p.frame_rate_num = u32::MAX);
    assert_rejected("zero video bitrate", |p| p.video_bitrate_kbps = 0);
    assert_rejected("zero audio bitrate", |p| p.audio_bitrate_kbps = 0);
}

#[test]
fn bitrate_overflow_is_a_config_error() {
    let mut p = params();
    p.video_bitrate_kbps = u32::MAX;
    assert!(matches!(
        p.video_config(&SessionOpts::default()),
        Err(ExportError::Config(_))
    ));
}
