use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use catalog_core::contract::ArtifactLocation;
use catalog_core::error::{RenderError, UploadError};
use catalog_runtime::adapters::content_store::ContentStore;
use catalog_runtime::handlers::manifest::PublishManifest;
use catalog_runtime::handlers::publish::{
    discover_source_trees, publish_artifacts, PublishConfig, RetryPolicy,
};
use catalog_runtime::handlers::render::{load_base_template, render_template};
use serde_json::Value;

/// Versioned in-memory bucket: every write gets a new version id.
struct InMemoryBucket {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    writes: Mutex<u32>,
}

impl InMemoryBucket {
    fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            writes: Mutex::new(0),
        }
    }

    fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .expect("poisoned mutex")
            .get(key)
            .cloned()
    }
}

impl ContentStore for InMemoryBucket {
    fn upload(
        &self,
        container: &str,
        key: &str,
        body: &[u8],
    ) -> Result<ArtifactLocation, UploadError> {
        let mut writes = self.writes.lock().expect("poisoned mutex");
        *writes += 1;
        self.objects
            .lock()
            .expect("poisoned mutex")
            .insert(key.to_string(), body.to_vec());
        Ok(ArtifactLocation::new(container, key).with_version(Some(format!("v{}", *writes))))
    }
}

fn write_file(path: &Path, body: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, body).expect("write file");
}

struct Fixture {
    _root: tempfile::TempDir,
    repos: PathBuf,
    workspace: PathBuf,
    base_template: PathBuf,
    output_dir: PathBuf,
}

fn fixture(base_template: &str) -> Fixture {
    let root = tempfile::tempdir().expect("tempdir");
    let repos = root.path().join("repos");
    write_file(&repos.join("model_build/buildspec.yml"), "version: 0.2\n");
    write_file(
        &repos.join("model_build/pipelines/train.py"),
        "print('train')\n",
    );
    write_file(&repos.join("model_deploy/buildspec.yml"), "version: 0.2\n");
    write_file(
        &repos.join("feature_ingestion/app.py"),
        "print('ingest')\n",
    );
    let workspace = root.path().join("demo-workspace");
    write_file(&workspace.join("notebooks/explore.ipynb"), "{}\n");
    let base_path = root.path().join("base-template.json");
    write_file(&base_path, base_template);
    let output_dir = root.path().join("build");

    Fixture {
        repos,
        workspace,
        base_template: base_path,
        output_dir,
        _root: root,
    }
}

fn config() -> PublishConfig {
    PublishConfig {
        container: "mlops-asset-bucket".to_string(),
        key_prefix: "product-assets/".to_string(),
        retry: RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        },
    }
}

const BASE_TEMPLATE: &str = r#"{
  "Parameters": {"SageMakerProjectName": {"Type": "String"}},
  "Resources": {
    "ModelBuildRepo": {
      "Type": "AWS::CodeCommit::Repository",
      "Properties": {
        "Code": {
          "S3": {
            "Bucket": "{{ModelBuild.Bucket}}",
            "Key": "{{ModelBuild}}",
            "ObjectVersion": "{{ModelBuild.Version}}"
          }
        }
      }
    },
    "ModelDeployRepo": {
      "Type": "AWS::CodeCommit::Repository",
      "Properties": {"Code": {"S3": {"Bucket": "{{ModelDeploy.Bucket}}", "Key": "{{ModelDeploy.Key}}"}}}
    },
    "FeatureIngestionRepo": {
      "Type": "AWS::CodeCommit::Repository",
      "Properties": {"Code": {"S3": {"Bucket": "{{FeatureIngestion.Bucket}}", "Key": "{{FeatureIngestion}}"}}}
    },
    "SeedWorkspace": {
      "Type": "Custom::SeedWorkspace",
      "Properties": {"Source": "{{workspace.Uri}}"}
    }
  }
}"#;

#[test]
fn publishes_sources_and_renders_resolved_template() {
    let fixture = fixture(BASE_TEMPLATE);
    let bucket = InMemoryBucket::new();

    let sources = discover_source_trees(&fixture.repos).expect("discover");
    let published =
        publish_artifacts(&sources, &fixture.workspace, &config(), &bucket).expect("publish");
    let base = load_base_template(&fixture.base_template).expect("load base");
    let output = fixture.output_dir.join("product-template.json");
    let rendered =
        render_template(&published.catalog, &published.workspace, &base, &output).expect("render");

    let names: Vec<&str> = published.catalog.iter().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["FeatureIngestion", "ModelBuild", "ModelDeploy"]);

    let document: Value =
        serde_json::from_slice(&fs::read(&output).expect("read output")).expect("valid json");
    let model_build = published.catalog.get("ModelBuild").expect("model build entry");
    let code = &document["Resources"]["ModelBuildRepo"]["Properties"]["Code"]["S3"];
    assert_eq!(code["Bucket"], "mlops-asset-bucket");
    assert_eq!(code["Key"], model_build.key.as_str());
    assert_eq!(
        code["ObjectVersion"],
        model_build.version.as_deref().unwrap_or_default()
    );
    assert_eq!(
        document["Resources"]["SeedWorkspace"]["Properties"]["Source"],
        published.workspace.uri().as_str()
    );
    assert_eq!(
        document["Metadata"]["ProductArtifacts"]
            .as_array()
            .map(Vec::len),
        Some(3)
    );
    assert!(!document.to_string().contains("{{"));
    assert_eq!(rendered.artifact_versions.len(), 3);

    // The uploaded object is the packaged source tree.
    let archive = bucket.object(&model_build.key).expect("uploaded archive");
    let mut zip = zip::ZipArchive::new(Cursor::new(archive)).expect("valid zip");
    let mut train = String::new();
    zip.by_name("pipelines/train.py")
        .expect("entry present")
        .read_to_string(&mut train)
        .expect("read entry");
    assert_eq!(train, "print('train')\n");
}

#[test]
fn rerun_with_unchanged_sources_produces_same_keys_and_template_shape() {
    let fixture = fixture(r#"{"Resources": {"Key": "{{ModelBuild}}", "Ws": "{{workspace}}"}}"#);
    let base = load_base_template(&fixture.base_template).expect("load base");
    let sources = discover_source_trees(&fixture.repos).expect("discover");

    let first_bucket = InMemoryBucket::new();
    let second_bucket = InMemoryBucket::new();
    let first =
        publish_artifacts(&sources, &fixture.workspace, &config(), &first_bucket).expect("publish");
    let second = publish_artifacts(&sources, &fixture.workspace, &config(), &second_bucket)
        .expect("publish");

    let first_out = fixture.output_dir.join("first.json");
    let second_out = fixture.output_dir.join("second.json");
    render_template(&first.catalog, &first.workspace, &base, &first_out).expect("render");
    render_template(&second.catalog, &second.workspace, &base, &second_out).expect("render");

    assert_eq!(
        fs::read(&first_out).expect("read"),
        fs::read(&second_out).expect("read")
    );
    let key = &first.catalog.get("ModelBuild").expect("entry").key;
    assert_eq!(first_bucket.object(key), second_bucket.object(key));
}

#[test]
fn template_referencing_unpublished_artifact_fails_without_output() {
    let fixture = fixture(r#"{"Resources": {"Features": {"Key": "{{FeatureRepo}}"}}}"#);
    let bucket = InMemoryBucket::new();

    let sources = discover_source_trees(&fixture.repos).expect("discover");
    let published =
        publish_artifacts(&sources, &fixture.workspace, &config(), &bucket).expect("publish");
    let base = load_base_template(&fixture.base_template).expect("load base");
    let output = fixture.output_dir.join("product-template.json");

    let error = render_template(&published.catalog, &published.workspace, &base, &output)
        .expect_err("unresolved placeholder");

    match error {
        RenderError::UnresolvedPlaceholder { placeholder } => {
            assert!(placeholder.contains("FeatureRepo"))
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!output.exists());
}

#[test]
fn manifest_hands_off_catalog_and_template() {
    let fixture = fixture(r#"{"Resources": {"Key": "{{ModelDeploy}}"}}"#);
    let bucket = InMemoryBucket::new();

    let sources = discover_source_trees(&fixture.repos).expect("discover");
    let published =
        publish_artifacts(&sources, &fixture.workspace, &config(), &bucket).expect("publish");
    let base = load_base_template(&fixture.base_template).expect("load base");
    let rendered = render_template(
        &published.catalog,
        &published.workspace,
        &base,
        &fixture.output_dir.join("product-template.json"),
    )
    .expect("render");

    let manifest_path = fixture.output_dir.join("manifest.json");
    PublishManifest::new("2.1", &published, &rendered, "2026-10-16T00:00:00+00:00")
        .write_to(&manifest_path)
        .expect("write manifest");

    let manifest: PublishManifest =
        serde_json::from_slice(&fs::read(&manifest_path).expect("read")).expect("parse");
    assert_eq!(manifest.seed_bucket, "mlops-asset-bucket");
    assert_eq!(manifest.product_version, "2.1");
    assert_eq!(manifest.artifacts, published.catalog);
    assert_eq!(manifest.template_path, rendered.path);
}
