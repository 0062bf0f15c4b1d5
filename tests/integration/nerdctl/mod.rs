//! Nerdctl integration tests
//!
//! Need nerdctl with a reachable containerd; enabled with `--features nerdctl`.

#[cfg(all(test, feature = "nerdctl"))]
mod tests {
    use crate::integration::common::*;
    use std::fs;
    use undockerizer::notifier::Notifier;
    use undockerizer::sources::{NerdctlSource, Source};

    #[test]
    fn test_nerdctl_image_export() {
        let source = NerdctlSource::new().expect("Should create NerdctlSource");
        assert_eq!(source.name(), "nerdctl");

        let (tarball_path, temp_dir) = source
            .get_image_tarball(TEST_IMAGES[0], &Notifier::silent())
            .expect("Should export image tarball");

        let metadata = fs::metadata(&tarball_path).expect("Should get file metadata");
        assert!(metadata.len() > 0, "Tarball should not be empty");
        assert!(temp_dir.is_some(), "TempDir should be provided");
    }

    #[test]
    fn test_nerdctl_nonexistent_image() {
        let source = NerdctlSource::new().unwrap();
        let result = source.get_image_tarball(NONEXISTENT_IMAGE, &Notifier::silent());
        assert!(result.is_err(), "Should fail for nonexistent image");
    }
}
