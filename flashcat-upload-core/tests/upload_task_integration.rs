use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use flashcat_upload_core::config::{ApiKey, ApiKeySource};
use flashcat_upload_core::contract::{
    AppIdentity, ArtifactKind, ArtifactToUpload, MockArtifactProvider, MockRepositoryDetector,
    MockUploader, UploadRequest,
};
use flashcat_upload_core::repository::RepositoryInfo;
use flashcat_upload_core::upload_task::{run_upload_task, UploadTaskConfig};
use flashcat_upload_core::{BoxError, ConfigurationError, FlashcatSite, UploadTaskError};
use tempfile::tempdir;

/// What the uploader saw for each call, copied out of the borrowed request.
#[derive(Debug, Clone, PartialEq)]
struct SeenUpload {
    site: FlashcatSite,
    file: PathBuf,
    repository_file: Option<PathBuf>,
    repository_file_existed: bool,
    api_key: String,
    build_id: String,
    repository: Option<RepositoryInfo>,
    gzip_enabled: bool,
    emulate_network_call: bool,
}

fn record(seen: &Arc<Mutex<Vec<SeenUpload>>>, req: &UploadRequest<'_>) {
    seen.lock().unwrap().push(SeenUpload {
        site: req.site,
        file: req.artifact.file.clone(),
        repository_file: req.repository_file.map(Path::to_path_buf),
        repository_file_existed: req.repository_file.map(|p| p.exists()).unwrap_or(false),
        api_key: req.api_key.to_string(),
        build_id: req.app.build_id.clone(),
        repository: req.repository.cloned(),
        gzip_enabled: req.gzip_enabled,
        emulate_network_call: req.emulate_network_call,
    });
}

fn task_config(dir: &Path) -> UploadTaskConfig {
    UploadTaskConfig {
        api_key: ApiKey::new("key123", ApiKeySource::Environment),
        app: AppIdentity {
            service_name: "com.example.app".into(),
            version_name: "1.2.0".into(),
            version_code: 12,
            variant: "release".into(),
            build_id: "build-42".into(),
        },
        source_roots: vec![dir.join("src")],
        repository_file: dir.join("out/flashcat/repository.json"),
        ..UploadTaskConfig::default()
    }
}

fn artifacts(names: &[&str]) -> MockArtifactProvider {
    let files: Vec<ArtifactToUpload> = names
        .iter()
        .map(|name| ArtifactToUpload::new(ArtifactKind::JvmMappingFile, format!("/build/{name}")))
        .collect();
    let mut provider = MockArtifactProvider::new();
    provider.expect_files().times(1).return_const(files);
    provider
}

fn no_repositories() -> MockRepositoryDetector {
    let mut detector = MockRepositoryDetector::new();
    detector
        .expect_detect_repositories()
        .times(1)
        .returning(|_, _| Vec::new());
    detector
}

fn repository() -> RepositoryInfo {
    RepositoryInfo {
        remote_url: "https://github.com/example/app.git".into(),
        commit_hash: "0123456789abcdef0123456789abcdef01234567".into(),
        source_files: vec!["src/App.kt".into()],
    }
}

fn err(message: &str) -> BoxError {
    message.to_string().into()
}

#[tokio::test]
async fn empty_artifact_list_succeeds_without_uploading() {
    let dir = tempdir().unwrap();
    let config = task_config(dir.path());

    let provider = artifacts(&[]);
    let mut detector = MockRepositoryDetector::new();
    detector.expect_detect_repositories().times(0);
    let mut uploader = MockUploader::new();
    uploader.expect_upload().times(0);

    let report = run_upload_task(&config, &provider, &detector, &uploader)
        .await
        .expect("empty run should succeed");

    assert!(report.uploaded.is_empty());
    assert_eq!(report.repository_file, None);
    assert!(!config.repository_file.exists());
}

#[tokio::test]
async fn configuration_errors_stop_the_run_before_any_upload() {
    let dir = tempdir().unwrap();
    let mut config = task_config(dir.path());
    config.api_key = ApiKey::new("abc\"def", ApiKeySource::GradleProperty);

    let mut provider = MockArtifactProvider::new();
    provider.expect_files().times(0);
    let mut detector = MockRepositoryDetector::new();
    detector.expect_detect_repositories().times(0);
    let mut uploader = MockUploader::new();
    uploader.expect_upload().times(0);

    let result = run_upload_task(&config, &provider, &detector, &uploader).await;

    assert!(matches!(
        result,
        Err(UploadTaskError::Configuration(
            ConfigurationError::InvalidApiKeyFormat
        ))
    ));
}

#[tokio::test]
async fn missing_build_id_stops_the_run() {
    let dir = tempdir().unwrap();
    let mut config = task_config(dir.path());
    config.app.build_id = String::new();

    let mut provider = MockArtifactProvider::new();
    provider.expect_files().times(0);
    let detector = MockRepositoryDetector::new();
    let mut uploader = MockUploader::new();
    uploader.expect_upload().times(0);

    let result = run_upload_task(&config, &provider, &detector, &uploader).await;

    assert!(matches!(
        result,
        Err(UploadTaskError::Configuration(
            ConfigurationError::MissingBuildId
        ))
    ));
}

#[tokio::test]
async fn all_artifacts_uploaded_in_discovery_order() {
    let dir = tempdir().unwrap();
    let mut config = task_config(dir.path());
    config.site = Some("STAGING".into());

    let provider = artifacts(&["one.txt", "two.txt", "three.txt"]);
    let detector = no_repositories();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut uploader = MockUploader::new();
    let sink = seen.clone();
    uploader
        .expect_upload()
        .times(3)
        .returning(move |req: UploadRequest<'_>| {
            record(&sink, &req);
            Ok(())
        });

    let report = run_upload_task(&config, &provider, &detector, &uploader)
        .await
        .expect("should succeed");

    assert_eq!(report.site, FlashcatSite::Staging);
    assert_eq!(report.uploaded.len(), 3);
    let seen = seen.lock().unwrap();
    let files: Vec<_> = seen.iter().map(|s| s.file.clone()).collect();
    assert_eq!(
        files,
        vec![
            PathBuf::from("/build/one.txt"),
            PathBuf::from("/build/two.txt"),
            PathBuf::from("/build/three.txt"),
        ]
    );
    assert!(seen.iter().all(|s| s.site == FlashcatSite::Staging
        && s.api_key == "key123"
        && s.build_id == "build-42"
        && s.gzip_enabled
        && !s.emulate_network_call));
}

#[tokio::test]
async fn single_failure_is_reported_as_is_after_all_uploads_ran() {
    let dir = tempdir().unwrap();
    let config = task_config(dir.path());

    let provider = artifacts(&["one.txt", "two.txt", "three.txt"]);
    let detector = no_repositories();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut uploader = MockUploader::new();
    let sink = seen.clone();
    uploader
        .expect_upload()
        .times(3)
        .returning(move |req: UploadRequest<'_>| {
            record(&sink, &req);
            if req.artifact.file.ends_with("two.txt") {
                Err(err("upload of two.txt rejected: 413"))
            } else {
                Ok(())
            }
        });

    let result = run_upload_task(&config, &provider, &detector, &uploader).await;

    match result {
        Err(UploadTaskError::Upload(e)) => {
            assert_eq!(e.to_string(), "upload of two.txt rejected: 413")
        }
        other => panic!("expected the single upload error, got {other:?}"),
    }
    assert_eq!(seen.lock().unwrap().len(), 3, "#1 and #3 must still be attempted");
}

#[tokio::test]
async fn multiple_failures_are_consolidated_in_processing_order() {
    let dir = tempdir().unwrap();
    let config = task_config(dir.path());

    let provider = artifacts(&["one.txt", "two.txt", "three.txt", "four.txt"]);
    let detector = no_repositories();
    let mut uploader = MockUploader::new();
    uploader
        .expect_upload()
        .times(4)
        .returning(|req: UploadRequest<'_>| {
            let name = req.artifact.file.file_name().unwrap().to_string_lossy().into_owned();
            if name == "two.txt" {
                Ok(())
            } else {
                Err(err(&format!("failed {name}")))
            }
        });

    let error = run_upload_task(&config, &provider, &detector, &uploader)
        .await
        .expect_err("three uploads failed");

    let causes: Vec<String> = error.upload_failures().iter().map(|e| e.to_string()).collect();
    assert_eq!(
        causes,
        vec!["failed one.txt", "failed three.txt", "failed four.txt"]
    );
    assert!(matches!(error, UploadTaskError::MultipleUploads(ref c) if c.len() == 3));
    let message = error.to_string();
    assert!(message.starts_with("Multiple errors occurred during upload"));
    assert!(message.contains("failed three.txt"));
}

#[tokio::test]
async fn no_repositories_means_no_repository_file() {
    let dir = tempdir().unwrap();
    let config = task_config(dir.path());

    let provider = artifacts(&["one.txt", "two.txt"]);
    let detector = no_repositories();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut uploader = MockUploader::new();
    let sink = seen.clone();
    uploader
        .expect_upload()
        .times(2)
        .returning(move |req: UploadRequest<'_>| {
            record(&sink, &req);
            Ok(())
        });

    let report = run_upload_task(&config, &provider, &detector, &uploader)
        .await
        .unwrap();

    assert_eq!(report.repository_file, None);
    assert!(!config.repository_file.exists());
    for call in seen.lock().unwrap().iter() {
        assert_eq!(call.repository_file, None);
        assert_eq!(call.repository, None);
    }
}

#[tokio::test]
async fn detected_repositories_are_written_before_uploading() {
    let dir = tempdir().unwrap();
    let mut config = task_config(dir.path());
    config.remote_repository_url = Some("https://github.com/example/app.git".into());
    config.source_roots = vec![
        dir.path().join("src"),
        dir.path().join("src"),
        dir.path().join("other/../src"),
    ];
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::create_dir_all(dir.path().join("other")).unwrap();

    let provider = artifacts(&["one.txt"]);
    let mut detector = MockRepositoryDetector::new();
    let second = RepositoryInfo {
        remote_url: "https://github.com/example/lib.git".into(),
        ..repository()
    };
    let detected = vec![repository(), second];
    detector
        .expect_detect_repositories()
        .withf(|roots, url| {
            roots.len() == 1 && *url == Some("https://github.com/example/app.git")
        })
        .times(1)
        .returning(move |_, _| detected.clone());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut uploader = MockUploader::new();
    let sink = seen.clone();
    uploader
        .expect_upload()
        .times(1)
        .returning(move |req: UploadRequest<'_>| {
            record(&sink, &req);
            Ok(())
        });

    let report = run_upload_task(&config, &provider, &detector, &uploader)
        .await
        .unwrap();

    assert_eq!(report.repository_file, Some(config.repository_file.clone()));
    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].repository_file, Some(config.repository_file.clone()));
    assert!(seen[0].repository_file_existed);
    assert_eq!(seen[0].repository, Some(repository()));

    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&config.repository_file).unwrap()).unwrap();
    assert_eq!(written["version"], 1);
    assert_eq!(written["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn repository_file_write_failure_aborts_before_uploads() {
    let dir = tempdir().unwrap();
    let mut config = task_config(dir.path());
    let blocker = dir.path().join("not-a-dir");
    fs::write(&blocker, "file").unwrap();
    config.repository_file = blocker.join("repository.json");

    let provider = artifacts(&["one.txt"]);
    let mut detector = MockRepositoryDetector::new();
    detector
        .expect_detect_repositories()
        .returning(|_, _| vec![repository()]);
    let mut uploader = MockUploader::new();
    uploader.expect_upload().times(0);

    let result = run_upload_task(&config, &provider, &detector, &uploader).await;

    match result {
        Err(UploadTaskError::RepositoryFile { path, .. }) => {
            assert_eq!(path, config.repository_file)
        }
        other => panic!("expected a repository file error, got {other:?}"),
    }
}

#[tokio::test]
async fn transport_flags_are_passed_through() {
    let dir = tempdir().unwrap();
    let mut config = task_config(dir.path());
    config.gzip_enabled = false;
    config.emulate_network_call = true;
    config.environment_site = Some("jira.flashcat.cloud".into());

    let provider = artifacts(&["one.txt"]);
    let detector = no_repositories();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut uploader = MockUploader::new();
    let sink = seen.clone();
    uploader
        .expect_upload()
        .times(1)
        .returning(move |req: UploadRequest<'_>| {
            record(&sink, &req);
            Ok(())
        });

    run_upload_task(&config, &provider, &detector, &uploader)
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert!(!seen[0].gzip_enabled);
    assert!(seen[0].emulate_network_call);
    assert_eq!(seen[0].site, FlashcatSite::Staging);
}
