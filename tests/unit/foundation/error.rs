use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        RestoreError::out_of_range("x")
            .to_string()
            .contains("out of range:")
    );
    assert!(RestoreError::gpu("x").to_string().contains("gpu error:"));
    assert!(
        RestoreError::invariant("x")
            .to_string()
            .contains("internal invariant violated:")
    );
    assert!(
        RestoreError::Disposed(ImageId(7))
            .to_string()
            .contains("image #7 is disposed")
    );
}

#[test]
fn only_invariant_errors_report_as_invariant() {
    assert!(RestoreError::invariant("x").is_invariant());
    assert!(!RestoreError::gpu("x").is_invariant());
    assert!(!RestoreError::out_of_range("x").is_invariant());
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = RestoreError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}
