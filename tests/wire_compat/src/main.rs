fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use appvault_protocol::{
        ApiErrorBody, CommittedArtifact, HealthResponse, Platform, StartUploadRequest,
        StartUploadResponse, UploadMetadata,
    };

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    fn parse_fixture<T: serde::de::DeserializeOwned>(name: &str) -> T {
        serde_json::from_value(load_fixture(name))
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"))
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values (order-independent).
    fn roundtrip_test<T>(name: &str)
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  server: {fixture}\n  Rust:   {reserialized}"
        );
    }

    #[test]
    fn fixture_start_upload_request() {
        roundtrip_test::<StartUploadRequest>("start_upload_request.json");
    }

    #[test]
    fn start_request_built_from_metadata_matches_fixture() {
        let metadata = UploadMetadata {
            app_identifier: "com.example.app".into(),
            version: "1.4.0".into(),
            version_code: 140,
            platform: Platform::Android,
            is_mandatory: false,
            changelog: vec!["Faster sync".into(), "Bug fixes".into()],
        };
        let request = StartUploadRequest::new(&metadata, "app-release.apk", 12 * 1024 * 1024)
            .unwrap();
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            load_fixture("start_upload_request.json")
        );
    }

    #[test]
    fn fixture_start_upload_response() {
        roundtrip_test::<StartUploadResponse>("start_upload_response.json");
        let resp: StartUploadResponse = parse_fixture("start_upload_response.json");
        assert!(!resp.upload_id.is_empty());
    }

    #[test]
    fn fixture_committed_artifact() {
        roundtrip_test::<CommittedArtifact>("committed_artifact.json");
    }

    #[test]
    fn fixture_committed_artifact_legacy_fields() {
        let artifact: CommittedArtifact = parse_fixture("committed_artifact_legacy.json");
        assert_eq!(artifact.platform, Platform::Ios);
        assert_eq!(artifact.final_size, 48_234_496);
        assert_eq!(artifact.content_hash.as_deref().map(str::len), Some(64));
        assert!(artifact.download_url.is_none());
        assert!(artifact.version_id.is_none());

        // Re-serialized with the current field names.
        let value = serde_json::to_value(&artifact).unwrap();
        assert!(value.get("final_size").is_some());
        assert!(value.get("file_size").is_none());
    }

    #[test]
    fn fixture_committed_artifact_mixed_fields() {
        let artifact: CommittedArtifact = parse_fixture("committed_artifact_mixed.json");
        assert_eq!(artifact.final_size, 12 * 1024 * 1024);
        assert_eq!(artifact.content_hash.as_deref().map(str::len), Some(64));
        assert_eq!(artifact.version_id, Some(58));
    }

    #[test]
    fn fixture_api_error_detail() {
        roundtrip_test::<ApiErrorBody>("api_error_detail.json");
        let body: ApiErrorBody = parse_fixture("api_error_detail.json");
        assert!(body.message().starts_with("Version 1.4.0 already exists"));
    }

    #[test]
    fn fixture_api_error_validation_list() {
        roundtrip_test::<ApiErrorBody>("api_error_validation.json");
        let body: ApiErrorBody = parse_fixture("api_error_validation.json");
        assert!(body.message().contains("version_code"));
    }

    #[test]
    fn fixture_health_response() {
        roundtrip_test::<HealthResponse>("health_response.json");
        let health: HealthResponse = parse_fixture("health_response.json");
        assert_eq!(health.status, "healthy");
        assert_eq!(health.extra["storage"], "ok");
    }

    #[test]
    fn unknown_platform_rejected() {
        let mut fixture = load_fixture("committed_artifact.json");
        fixture["platform"] = serde_json::json!("windows");
        assert!(serde_json::from_value::<CommittedArtifact>(fixture).is_err());
    }
}
