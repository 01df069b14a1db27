use super::*;

#[test]
fn raw_codes_map_to_protocol_statuses() {
    let info = BufferInfo {
        offset: 4,
        size: 16,
        presentation_time_us: 33_333,
        flags: SampleFlags::NONE,
    };

    assert_eq!(
        OutputStatus::from_raw(INFO_TRY_AGAIN_LATER, info),
        OutputStatus::TryAgainLater
    );
    assert_eq!(
        OutputStatus::from_raw(INFO_OUTPUT_FORMAT_CHANGED, info),
        OutputStatus::FormatChanged
    );
    assert_eq!(
        OutputStatus::from_raw(INFO_OUTPUT_BUFFERS_CHANGED, info),
        OutputStatus::BuffersChanged
    );
    assert_eq!(
        OutputStatus::from_raw(-17, info),
        OutputStatus::Unexpected(-17)
    );
    assert_eq!(
        OutputStatus::from_raw(3, info),
        OutputStatus::Sample { index: 3, info }
    );
}

#[test]
fn buffer_range_covers_payload() {
    let info = BufferInfo {
        offset: 8,
        size: 24,
        ..Default::default()
    };
    assert_eq!(info.range(), 8..32);
}
