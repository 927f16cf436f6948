use std::sync::Arc;
use std::time::Duration;

use tinylink_core::{BatchEntry, LinkError, LinkStore};
use tinylink_generator::HashGenerator;
use tinylink_shortener::{LinkService, PoolSettings};
use tinylink_storage::{FileStore, InMemoryStore};

type MemoryService = LinkService<InMemoryStore, HashGenerator>;

fn memory_service() -> MemoryService {
    LinkService::new(
        Arc::new(InMemoryStore::new()),
        HashGenerator::default(),
        PoolSettings::default(),
    )
}

fn entry(id: &str, url: &str) -> BatchEntry {
    BatchEntry {
        correlation_id: id.to_string(),
        original_url: url.to_string(),
    }
}

async fn wait_until_deleted(service: &MemoryService, code: &str) {
    awaitility::at_most(Duration::from_secs(5))
        .poll_interval(Duration::from_millis(20))
        .until_async(|| async move {
            matches!(
                service.get_long_url(code).await,
                Err(LinkError::AlreadyDeleted)
            )
        })
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn create_resolve_delete_lifecycle() {
    let service = memory_service();

    let code = service
        .create_short_url("https://example.com", "u1")
        .await
        .unwrap();

    let err = service
        .create_short_url("https://example.com", "u1")
        .await
        .unwrap_err();
    assert_eq!(err, LinkError::AlreadyExists(code.clone()));
    assert_eq!(err.existing_code(), Some(code.as_str()));

    assert_eq!(
        service.get_long_url(&code).await.unwrap(),
        "https://example.com"
    );

    service.delete_urls("u1", vec![code.clone()]).await.unwrap();
    wait_until_deleted(&service, &code).await;

    // Tombstones are permanent.
    assert_eq!(
        service.get_long_url(&code).await,
        Err(LinkError::AlreadyDeleted)
    );
}

#[tokio::test]
async fn unknown_code_is_not_found() {
    let service = memory_service();
    assert_eq!(
        service.get_long_url("nope").await,
        Err(LinkError::NotFound)
    );
}

#[tokio::test]
async fn same_url_for_different_owners_gets_separate_links() {
    let service = memory_service();

    let first = service
        .create_short_url("https://example.com", "u1")
        .await
        .unwrap();
    let second = service
        .create_short_url("https://example.com", "u2")
        .await
        .unwrap();

    assert_ne!(first, second);
    assert_eq!(service.get_user_urls("u1").await.unwrap().len(), 1);
    assert_eq!(service.get_user_urls("u2").await.unwrap().len(), 1);
}

#[tokio::test]
async fn delete_is_idempotent() {
    let service = memory_service();
    let code = service
        .create_short_url("https://example.com", "u1")
        .await
        .unwrap();

    for _ in 0..3 {
        service.delete_urls("u1", vec![code.clone()]).await.unwrap();
    }
    service.shutdown().await;

    assert_eq!(
        service.get_long_url(&code).await,
        Err(LinkError::AlreadyDeleted)
    );
    let record = service.store().get(&code).await.unwrap();
    assert!(record.deleted);
    assert_eq!(record.owner_id, "u1");
}

#[tokio::test]
async fn owners_cannot_delete_each_others_links() {
    let service = memory_service();
    let code = service
        .create_short_url("https://example.com", "owner-b")
        .await
        .unwrap();

    service
        .delete_urls("owner-a", vec![code.clone(), "unknown".to_string()])
        .await
        .unwrap();
    service.shutdown().await;

    assert_eq!(
        service.get_long_url(&code).await.unwrap(),
        "https://example.com"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn deleted_pair_gets_a_fresh_code() {
    let service = memory_service();
    let first = service
        .create_short_url("https://example.com", "u1")
        .await
        .unwrap();

    service.delete_urls("u1", vec![first.clone()]).await.unwrap();
    wait_until_deleted(&service, &first).await;

    let second = service
        .create_short_url("https://example.com", "u1")
        .await
        .unwrap();
    assert_ne!(first, second);
    assert_eq!(
        service.get_long_url(&first).await,
        Err(LinkError::AlreadyDeleted)
    );
    assert_eq!(
        service.get_long_url(&second).await.unwrap(),
        "https://example.com"
    );
}

#[tokio::test]
async fn batch_with_blank_url_writes_nothing() {
    let service = memory_service();

    let err = service
        .batch_create_short_url(&[entry("a", "https://x.com"), entry("b", "")], "u1")
        .await
        .unwrap_err();

    assert_eq!(err, LinkError::EmptyValue);
    assert_eq!(service.get_user_urls("u1").await, Err(LinkError::NotFound));
    assert!(service.store().is_empty());
}

#[tokio::test]
async fn batch_reuses_existing_and_repeated_urls() {
    let service = memory_service();
    let existing = service
        .create_short_url("https://a.example", "u1")
        .await
        .unwrap();

    let outcome = service
        .batch_create_short_url(
            &[
                entry("1", "https://a.example"),
                entry("2", "https://b.example"),
                entry("3", "https://b.example"),
            ],
            "u1",
        )
        .await
        .unwrap();
    assert!(outcome.any_existing);

    let results = &outcome.results;
    let ids: Vec<&str> = results.iter().map(|r| r.correlation_id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
    assert_eq!(results[0].code, existing);
    assert_eq!(results[1].code, results[2].code);
    assert_ne!(results[1].code, existing);

    let links = service.get_user_urls("u1").await.unwrap();
    assert_eq!(links.len(), 2);
    assert_eq!(
        service.get_long_url(&results[1].code).await.unwrap(),
        "https://b.example"
    );
}

#[tokio::test]
async fn batch_signals_pairs_created_earlier() {
    let service = memory_service();

    let first = service
        .batch_create_short_url(&[entry("1", "https://a.example")], "u1")
        .await
        .unwrap();
    assert!(!first.any_existing);

    let again = service
        .batch_create_short_url(&[entry("1", "https://a.example")], "u1")
        .await
        .unwrap();
    assert!(again.any_existing);
    assert_eq!(again.results, first.results);

    // Repeats inside one batch are not "existing".
    let repeated = service
        .batch_create_short_url(
            &[entry("1", "https://b.example"), entry("2", "https://b.example")],
            "u1",
        )
        .await
        .unwrap();
    assert!(!repeated.any_existing);
    assert_eq!(repeated.results[0].code, repeated.results[1].code);
}

#[tokio::test]
async fn concurrent_creates_agree_on_one_code() {
    let service = Arc::new(memory_service());
    let mut handles = vec![];

    for _ in 0..32 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            match service.create_short_url("https://example.com", "u1").await {
                Ok(code) => (code, true),
                Err(LinkError::AlreadyExists(code)) => (code, false),
                Err(other) => panic!("unexpected error: {other}"),
            }
        }));
    }

    let mut codes = vec![];
    let mut created = 0;
    for handle in handles {
        let (code, fresh) = handle.await.unwrap();
        codes.push(code);
        if fresh {
            created += 1;
        }
    }

    assert_eq!(created, 1);
    assert!(codes.iter().all(|code| code == &codes[0]));
    assert_eq!(service.store().len(), 1);
}

#[tokio::test]
async fn deletes_survive_a_full_queue() {
    let settings = PoolSettings::builder()
        .workers(2)
        .queue_capacity(2)
        .batch_size(3)
        .drain_window(Duration::from_millis(5))
        .build();
    let service = LinkService::new(
        Arc::new(InMemoryStore::new()),
        HashGenerator::default(),
        settings,
    );

    let mut codes = vec![];
    for i in 0..40 {
        codes.push(
            service
                .create_short_url(&format!("https://example.com/{i}"), "u1")
                .await
                .unwrap(),
        );
    }

    for code in &codes {
        service.delete_urls("u1", vec![code.clone()]).await.unwrap();
    }
    service.shutdown().await;

    for code in &codes {
        assert_eq!(
            service.get_long_url(code).await,
            Err(LinkError::AlreadyDeleted)
        );
    }
    assert_eq!(service.get_user_urls("u1").await, Err(LinkError::NotFound));
}

#[tokio::test]
async fn delete_after_shutdown_is_rejected() {
    let service = memory_service();
    service.shutdown().await;

    assert_eq!(
        service.delete_urls("u1", vec!["abc".to_string()]).await,
        Err(LinkError::NotInitialized)
    );
}

#[tokio::test]
async fn file_backed_service_persists_deletions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("links.jsonl");

    let store = Arc::new(FileStore::open(&path).await.unwrap());
    let service = LinkService::new(
        Arc::clone(&store),
        HashGenerator::default(),
        PoolSettings::default(),
    );

    let kept = service
        .create_short_url("https://kept.example", "u1")
        .await
        .unwrap();
    let gone = service
        .create_short_url("https://gone.example", "u1")
        .await
        .unwrap();
    service.delete_urls("u1", vec![gone.clone()]).await.unwrap();
    service.shutdown().await;
    store.close().await.unwrap();

    assert_eq!(
        service.check_db_connection().await,
        Err(LinkError::NotInitialized)
    );

    let reopened = Arc::new(FileStore::open(&path).await.unwrap());
    let service = LinkService::new(reopened, HashGenerator::default(), PoolSettings::default());

    assert_eq!(
        service.get_long_url(&kept).await.unwrap(),
        "https://kept.example"
    );
    assert_eq!(
        service.get_long_url(&gone).await,
        Err(LinkError::AlreadyDeleted)
    );
    let links = service.get_user_urls("u1").await.unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].code, kept);
}
