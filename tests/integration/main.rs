//! Integration tests for Windlass

mod rotation_provider_tests {
    use chrono::{DateTime, Duration, Utc};
    use serde_json::{json, Value};
    use windlass::provider::{MultiRotate, ResourceProvider, RotationState};

    #[tokio::test]
    async fn lifecycle_converges_after_create() {
        let provider = MultiRotate;

        let checked = provider
            .check(Value::Null, json!({ "count": 2, "rotationPeriodDays": 30 }))
            .await;
        assert!(checked.failures.is_empty());

        let created = provider.create(checked.inputs.clone()).await.unwrap();
        assert!(created.id.parse::<DateTime<Utc>>().is_ok());

        let diff = provider
            .diff(&created.id, created.outs.clone(), checked.inputs.clone())
            .await
            .unwrap();
        assert!(!diff.changes);

        // Converged state updates to itself.
        let updated = provider
            .update(&created.id, created.outs.clone(), checked.inputs)
            .await
            .unwrap();
        let before: RotationState = serde_json::from_value(created.outs).unwrap();
        let after: RotationState = serde_json::from_value(updated.outs).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn invalid_declarations_surface_as_failures() {
        let checked = MultiRotate
            .check(Value::Null, json!({ "count": 0, "rotationPeriodDays": 2.5 }))
            .await;

        let mut failing: Vec<_> = checked
            .failures
            .iter()
            .map(|f| f.property.as_str())
            .collect();
        failing.sort_unstable();
        assert_eq!(failing, vec!["count", "rotationPeriodDays"]);
    }

    #[tokio::test]
    async fn expired_slot_rotates_once() {
        let provider = MultiRotate;
        let long_ago = Utc::now() - Duration::days(100);
        let olds = json!({
            "index": 0,
            "rotationPeriodDays": 30,
            "timestamps": [long_ago, long_ago],
            "currentTimestamp": long_ago,
        });
        let news = json!({ "count": 2, "rotationPeriodDays": 30 });

        let diff = provider.diff("id", olds.clone(), news.clone()).await.unwrap();
        assert!(diff.changes);

        let before_update = Utc::now();
        let updated = provider.update("id", olds, news).await.unwrap();
        let state: RotationState = serde_json::from_value(updated.outs).unwrap();

        assert_eq!(state.index, 1);
        assert_eq!(state.timestamps[0], long_ago);
        assert!(state.timestamps[1] >= before_update);
        assert_eq!(state.current_timestamp, state.timestamps[1]);
    }

    #[tokio::test]
    async fn foreign_recorded_state_is_rebuilt() {
        let provider = MultiRotate;
        let news = json!({ "count": 2, "rotationPeriodDays": 30 });

        // Outputs written by another provider may not even be an object.
        for olds in [Value::Null, json!("garbage"), json!({ "timestamps": "x" })] {
            let diff = provider
                .diff("id", olds.clone(), news.clone())
                .await
                .unwrap();
            assert!(diff.changes, "olds: {}", olds);

            let updated = provider.update("id", olds.clone(), news.clone()).await.unwrap();
            let state: RotationState = serde_json::from_value(updated.outs).unwrap();
            assert_eq!(state.index, 0, "olds: {}", olds);
            assert_eq!(state.timestamps.len(), 2, "olds: {}", olds);
            assert_eq!(state.current_timestamp, state.timestamps[0]);
        }
    }

    #[tokio::test]
    async fn growth_keeps_existing_slots() {
        let provider = MultiRotate;
        let created = provider
            .create(json!({ "count": 1, "rotationPeriodDays": 60 }))
            .await
            .unwrap();
        let first: RotationState = serde_json::from_value(created.outs.clone()).unwrap();

        let news = json!({ "count": 3, "rotationPeriodDays": 60 });
        let diff = provider
            .diff(&created.id, created.outs.clone(), news.clone())
            .await
            .unwrap();
        assert!(diff.changes);

        let updated = provider
            .update(&created.id, created.outs, news)
            .await
            .unwrap();
        let grown: RotationState = serde_json::from_value(updated.outs).unwrap();

        assert_eq!(grown.timestamps.len(), 3);
        assert_eq!(grown.timestamps[0], first.timestamps[0]);
        assert_eq!(grown.index, 0);
    }
}

mod artifact_pipeline_tests {
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;
    use windlass::cache::ArtifactStore;
    use windlass::config::Settings;
    use windlass::fetch::RemoteContent;
    use windlass::github::{FileRef, GithubFiles};
    use windlass::WindlassResult;

    struct StaticContent {
        body: String,
        calls: AtomicUsize,
    }

    impl StaticContent {
        fn new(body: &str) -> Arc<Self> {
            Arc::new(Self {
                body: body.to_string(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RemoteContent for StaticContent {
        async fn fetch_text(&self, _url: &str) -> WindlassResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.body.clone())
        }
    }

    #[tokio::test]
    async fn browsed_file_lands_in_cache_once() {
        let root = TempDir::new().unwrap();
        let settings = Settings::explicit(root.path(), None);
        let browser = GithubFiles::with_fetcher(&settings, StaticContent::new("unused"));

        let handle = browser.file_at(
            "grafana/helm-charts",
            "charts/loki/values.yaml",
            &FileRef::Tag("v1.2.3".to_string()),
        );

        let content = StaticContent::new("replicas: 3\n");
        let store = ArtifactStore::with_fetcher(root.path(), content.clone());

        let first = store.resolve(&handle).await.unwrap();
        let second = store.resolve(&handle).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(content.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            store.read_to_string(&handle).await.unwrap(),
            "replicas: 3\n"
        );
        let entry = first.file_name().unwrap().to_str().unwrap();
        assert!(entry.contains("values.yaml"));
        assert!(entry.contains("tag-grafana-helm-charts-v1-2-3"));
    }

    #[tokio::test]
    async fn folder_listing_resolves_in_order() {
        let root = TempDir::new().unwrap();
        let settings = Settings::explicit(root.path(), None);

        let listing = json!([
            {
                "name": "a.yaml",
                "sha": "aaaa1111",
                "download_url": "https://raw.example.com/a.yaml"
            },
            {
                "name": "b.yaml",
                "sha": "bbbb2222",
                "download_url": "https://raw.example.com/b.yaml"
            }
        ]);
        let browser =
            GithubFiles::with_fetcher(&settings, StaticContent::new(&listing.to_string()));

        let handles = browser
            .folder_files("octocat/hello", "manifests", "main")
            .await
            .unwrap();
        assert_eq!(handles.len(), 2);

        let content = StaticContent::new("kind: List\n");
        let store = ArtifactStore::with_fetcher(root.path().join("files"), content.clone());
        let paths = store.resolve_all(&handles).await.unwrap();

        assert_eq!(paths.len(), 2);
        let first = paths[0].file_name().unwrap().to_str().unwrap();
        let second = paths[1].file_name().unwrap().to_str().unwrap();
        assert!(first.starts_with("a.yaml"));
        assert!(second.starts_with("b.yaml"));
        assert_eq!(content.calls.load(Ordering::SeqCst), 2);
    }
}

mod chart_pipeline_tests {
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;
    use windlass::cache::{ChartCache, ChartFetcher};
    use windlass::helm::{ChartApi, ChartDescriptor, ChartSource, StackContext};
    use windlass::WindlassResult;

    struct FakeHelm {
        pulls: AtomicUsize,
    }

    impl FakeHelm {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                pulls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ChartFetcher for FakeHelm {
        async fn pull(
            &self,
            chart: &str,
            _version: &str,
            _repo: Option<&str>,
            dest: &Path,
        ) -> WindlassResult<()> {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            // helm pull --untar unpacks into a subdirectory named after the chart
            let short = chart.rsplit('/').next().unwrap_or(chart);
            std::fs::create_dir_all(dest.join(short)).unwrap();
            Ok(())
        }
    }

    #[tokio::test]
    async fn second_prepare_reuses_pulled_chart() {
        let root = TempDir::new().unwrap();
        let helm = FakeHelm::new();
        let cache = ChartCache::with_fetcher(root.path(), helm.clone());
        let ctx = StackContext {
            project: "platform".to_string(),
            stack: "prod".to_string(),
        };
        let source = ChartSource {
            chart: "ingress-nginx".to_string(),
            version: "4.10.0".to_string(),
            repo: Some("https://kubernetes.github.io/ingress-nginx".to_string()),
        };

        let first = ChartDescriptor::prepare(ChartApi::V4, "ingress", &source, &cache, ctx.clone())
            .await
            .unwrap();
        let second = ChartDescriptor::prepare(ChartApi::V3, "ingress", &source, &cache, ctx)
            .await
            .unwrap();

        assert_eq!(helm.pulls.load(Ordering::SeqCst), 1);
        assert_eq!(first.local_path, second.local_path);
        assert!(first.local_path.is_dir());
        assert!(first.local_path.ends_with("ingress-nginx"));
    }

    #[tokio::test]
    async fn version_bump_pulls_again() {
        let root = TempDir::new().unwrap();
        let helm = FakeHelm::new();
        let cache = ChartCache::with_fetcher(root.path(), helm.clone());

        cache.chart_dir("redis", "18.0.0", None).await.unwrap();
        cache.chart_dir("redis", "18.0.0", None).await.unwrap();
        cache.chart_dir("redis", "19.0.1", None).await.unwrap();

        assert_eq!(helm.pulls.load(Ordering::SeqCst), 2);
    }
}
