use super::*;
use crate::codec::buffer::SampleFlags;

fn info(size: usize, pts: i64) -> BufferInfo {
    BufferInfo {
        offset: 0,
        size,
        presentation_time_us: pts,
        flags: SampleFlags::NONE,
    }
}

#[test]
fn records_tracks_and_samples_in_arrival_order() {
    let mut c = InMemoryContainer::new();
    let handle = c.handle();

    let v = c.add_track(&MediaFormat::video("video/avc", 64, 64)).unwrap();
    let a = c
        .add_track(&MediaFormat::audio("audio/mp4a-latm", 44_100, 2))
        .unwrap();
    assert_eq!(v, TrackIndex(0));
    assert_eq!(a, TrackIndex(1));

    c.start().unwrap();
    c.write_sample(a, &[1, 2], &info(2, 0)).unwrap();
    c.write_sample(v, &[3, 4, 5], &info(3, 0)).unwrap();
    c.stop().unwrap();
    c.release().unwrap();

    let rec = handle.snapshot();
    assert_eq!(rec.start_calls, 1);
    assert_eq!(rec.stop_calls, 1);
    assert!(rec.released);
    assert_eq!(rec.samples.len(), 2);
    assert_eq!(rec.samples[0].track, a);
    assert_eq!(rec.samples_for(v).count(), 1);
    assert_eq!(rec.track_where(|f| f.is_audio()), Some(a));
    assert!(rec.violations.is_empty());
}

#[test]
fn rejects_protocol_violations() {
    let mut c = InMemoryContainer::new();
    let handle = c.handle();
    let v = c.add_track(&MediaFormat::video("video/avc", 64, 64)).unwrap();

    assert!(c.write_sample(v, &[0], &info(1, 0)).is_err());
    c.start().unwrap();
    assert!(c.start().is_err());
    assert!(c.add_track(&MediaFormat::audio("audio/mp4a-latm", 44_100, 1)).is_err());
    assert!(c.write_sample(TrackIndex(7), &[0], &info(1, 0)).is_err());
    assert!(c.write_sample(v, &[0, 0], &info(1, 0)).is_err());

    let rec = handle.snapshot();
    assert_eq!(rec.violations.len(), 5);
    assert!(rec.samples.is_empty());
}
