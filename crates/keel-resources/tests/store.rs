use std::sync::Arc;

use keel_core::test_support::{FailingFetcher, GatedFetcher, StaticFetcher};
use keel_core::{FetchResponse, FrameworkKind};
use keel_resources::{cache_dir, urls, ResourceStore, VERSION_INFO_FILE};
use serde_json::json;

const FW: FrameworkKind = FrameworkKind::SapUi5;
const VERSION: &str = "1.96.4";

fn routed_fetcher(libraries: &[(&str, serde_json::Value)]) -> Arc<StaticFetcher> {
    let fetcher = StaticFetcher::new().with_route(
        urls::version_info(FW, VERSION),
        FetchResponse::json_ok(json!({
            "version": VERSION,
            "libraries": libraries
                .iter()
                .map(|(name, _)| json!({"name": name}))
                .collect::<Vec<_>>(),
        })),
    );
    for (name, document) in libraries {
        fetcher.insert(
            urls::library(FW, VERSION, name),
            FetchResponse::json_ok(document.clone()),
        );
    }
    Arc::new(fetcher)
}

#[tokio::test]
async fn assembles_all_libraries() {
    let fetcher = routed_fetcher(&[
        ("sap.m", json!({"symbols": ["Button"]})),
        ("sap.ui.core", json!({"symbols": ["Control"]})),
    ]);
    let store = ResourceStore::new(fetcher.clone());

    let set = store.library_set(FW, VERSION, None).await;
    assert_eq!(set.len(), 2);
    assert_eq!(set["sap.m"], json!({"symbols": ["Button"]}));
}

#[tokio::test]
async fn concurrent_calls_share_one_fetch_per_library() {
    let inner = routed_fetcher(&[
        ("sap.m", json!({"symbols": ["Button"]})),
        ("sap.ui.core", json!({"symbols": ["Control"]})),
    ]);
    let (gated, gate) = GatedFetcher::new(inner.clone());
    let store = ResourceStore::new(Arc::new(gated));

    let calls = (0..4).map(|_| store.library_set(FW, VERSION, None));
    let joined = futures::future::join_all(calls);
    let opener = async {
        // Let every caller reach the single-flight map before any I/O
        // completes, then release the network.
        tokio::task::yield_now().await;
        gate.open();
    };
    let (results, ()) = tokio::join!(joined, opener);

    for result in &results {
        assert_eq!(result.len(), 2);
        assert_eq!(*result, results[0]);
    }
    assert_eq!(inner.call_count(&urls::library(FW, VERSION, "sap.m")), 1);
    assert_eq!(
        inner.call_count(&urls::library(FW, VERSION, "sap.ui.core")),
        1
    );
    assert_eq!(inner.call_count(&urls::version_info(FW, VERSION)), 1);
}

#[tokio::test]
async fn disk_cache_survives_a_dead_network() {
    let tmp = tempfile::tempdir().unwrap();

    // Warm the disk cache through a working fetcher.
    let fetcher = routed_fetcher(&[("sap.m", json!({"symbols": ["Button"]}))]);
    let store = ResourceStore::new(fetcher);
    let warm = store.library_set(FW, VERSION, Some(tmp.path())).await;
    assert_eq!(warm.len(), 1);

    // A fresh store with a failing fetcher must serve the cached content.
    let store = ResourceStore::new(Arc::new(FailingFetcher));
    let cached = store.library_set(FW, VERSION, Some(tmp.path())).await;
    assert_eq!(cached["sap.m"], json!({"symbols": ["Button"]}));
}

#[tokio::test]
async fn missing_version_info_yields_an_empty_set() {
    let store = ResourceStore::new(Arc::new(FailingFetcher));
    let set = store.library_set(FW, VERSION, None).await;
    assert!(set.is_empty());
}

#[tokio::test]
async fn not_found_library_is_memoized_on_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(
        StaticFetcher::new()
            .with_route(
                urls::version_info(FW, VERSION),
                FetchResponse::json_ok(json!({
                    "version": VERSION,
                    "libraries": [{"name": "sap.m"}, {"name": "sap.gone"}],
                })),
            )
            .with_route(
                urls::library(FW, VERSION, "sap.m"),
                FetchResponse::json_ok(json!({"symbols": []})),
            )
            .with_route(
                urls::library(FW, VERSION, "sap.gone"),
                FetchResponse::not_found(),
            ),
    );
    let store = ResourceStore::new(fetcher.clone());

    let first = store.library_set(FW, VERSION, Some(tmp.path())).await;
    assert!(first.contains_key("sap.m"));
    assert!(!first.contains_key("sap.gone"));

    // Bypass the in-process memo: the 404 placeholder on disk must prevent a
    // second network fetch, and the library stays absent.
    let second = store
        .refresh_library_set(FW, VERSION, Some(tmp.path()))
        .await;
    assert!(!second.contains_key("sap.gone"));
    assert_eq!(fetcher.call_count(&urls::library(FW, VERSION, "sap.gone")), 1);
}

#[tokio::test]
async fn other_fetch_failures_leave_the_disk_cache_untouched() {
    let tmp = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(
        StaticFetcher::new()
            .with_route(
                urls::version_info(FW, VERSION),
                FetchResponse::json_ok(json!({
                    "version": VERSION,
                    "libraries": [{"name": "sap.flaky"}],
                })),
            )
            .with_route(
                urls::library(FW, VERSION, "sap.flaky"),
                FetchResponse::new(503, None),
            ),
    );
    let store = ResourceStore::new(fetcher);

    let set = store.library_set(FW, VERSION, Some(tmp.path())).await;
    assert!(set.is_empty());
    // No placeholder for a transient failure: a later call may retry.
    let placeholder = cache_dir(tmp.path(), FW, VERSION).join("sap.flaky.json");
    assert!(!placeholder.exists());
}

#[tokio::test]
async fn version_info_is_written_back_to_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let fetcher = routed_fetcher(&[("sap.m", json!({}))]);
    let store = ResourceStore::new(fetcher);

    store.library_set(FW, VERSION, Some(tmp.path())).await;
    let on_disk = cache_dir(tmp.path(), FW, VERSION).join(VERSION_INFO_FILE);
    assert!(on_disk.exists());
}
