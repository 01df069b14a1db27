use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        ExportError::config("x")
            .to_string()
            .contains("configuration error:")
    );
    assert!(
        ExportError::resource("x")
            .to_string()
            .contains("resource error:")
    );
    assert!(ExportError::device("x").to_string().contains("device error:"));
    assert!(
        ExportError::encoder("x")
            .to_string()
            .contains("encoder error:")
    );
    assert!(
        ExportError::session("x")
            .to_string()
            .contains("session error:")
    );
    assert!(
        ExportError::aborted("x")
            .to_string()
            .contains("export aborted:")
    );
}

#[test]
fn only_aborted_counts_as_abort() {
    assert!(ExportError::aborted("gate closed").is_abort());
    assert!(!ExportError::device("lost").is_abort());
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = ExportError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}
