use support_desk::storage::{
    MAX_ATTACHMENT_BYTES, MockStorageService, S3StorageClient, StorageService, UploadRejection,
    attachment_key, sanitize_key, validate_upload,
};
use uuid::Uuid;

#[cfg(test)]
mod validation_tests {
    use super::*;

    #[test]
    fn test_accepts_up_to_limit() {
        assert_eq!(validate_upload("a.pdf", "application/pdf", 1), Ok(()));
        assert_eq!(
            validate_upload("a.pdf", "application/pdf", MAX_ATTACHMENT_BYTES),
            Ok(())
        );
    }

    #[test]
    fn test_rejects_oversized_and_empty() {
        assert_eq!(
            validate_upload("a.pdf", "application/pdf", MAX_ATTACHMENT_BYTES + 1),
            Err(UploadRejection::TooLarge)
        );
        assert_eq!(
            validate_upload("a.pdf", "application/pdf", 0),
            Err(UploadRejection::Empty)
        );
    }

    #[test]
    fn test_rejects_missing_metadata() {
        assert_eq!(
            validate_upload(" ", "image/png", 10),
            Err(UploadRejection::MissingMetadata)
        );
        assert_eq!(
            validate_upload("a.png", "", 10),
            Err(UploadRejection::MissingMetadata)
        );
    }
}

#[cfg(test)]
mod key_tests {
    use super::*;

    #[test]
    fn test_attachment_key_layout() {
        let ticket = Uuid::new_v4();

        let key = attachment_key(ticket, "Quarterly Report.PDF");

        let prefix = format!("tickets/{ticket}/");
        assert!(key.starts_with(&prefix));
        assert!(key.ends_with(".pdf"));
        let stem = key[prefix.len()..].trim_end_matches(".pdf");
        assert!(Uuid::parse_str(stem).is_ok());
    }

    #[test]
    fn test_attachment_key_drops_unsafe_extension() {
        let key = attachment_key(Uuid::new_v4(), "evil.p/../hp");
        assert!(key.ends_with(".bin"));
        assert!(!key.contains(".."));

        assert!(attachment_key(Uuid::new_v4(), "README").ends_with(".bin"));
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("../../etc/passwd"), "etc/passwd");
        assert_eq!(sanitize_key("tickets//a/./b.png"), "tickets/a/b.png");
    }
}

#[cfg(test)]
mod mock_tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_success() {
        let mock = MockStorageService::new();
        let key = "tickets/abc/screen.png";

        let url = mock.get_presigned_upload_url(key, "image/png").await.unwrap();

        assert!(url.contains("signature=fake"));
        assert!(url.contains(key));
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let mock = MockStorageService::new_failing();
        let result = mock.get_presigned_upload_url("a.png", "image/png").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mock_sanitization() {
        let mock = MockStorageService::new();
        let url = mock
            .get_presigned_upload_url("../../etc/passwd", "text/plain")
            .await
            .unwrap();
        assert!(!url.contains(".."));
    }
}

#[cfg(test)]
mod s3_tests {
    use super::*;

    #[tokio::test]
    async fn test_s3_presigned_url_format() {
        // Presigning is local; nothing is sent to the endpoint.
        let client = S3StorageClient::new(
            "http://localhost:9000",
            "us-east-1",
            "testkey",
            "testsecret",
            "testbucket",
        )
        .await;

        let key = attachment_key(Uuid::new_v4(), "log.txt");
        let url = client
            .get_presigned_upload_url(&key, "text/plain")
            .await
            .unwrap();

        assert!(url.contains("localhost:9000"));
        assert!(url.contains("testbucket"));
        assert!(url.contains(&key));
        assert!(url.contains("X-Amz-Signature"));
    }
}
