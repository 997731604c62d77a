mod common;

use std::time::Duration;

use common::eventually;
use common::start_node;
use common::test_settings;
use d_config::SecretEntry;

#[tokio::test]
async fn test_secret_cache_follows_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = test_settings(dir.path());
    settings.secret_cache.rebuild_interval_in_ms = 100;

    let node = start_node(settings, None, |_, secret_store| {
        secret_store.upsert(&SecretEntry::new(1, "app1", "s1", 1_000))?;
        secret_store.upsert(&SecretEntry::new(2, "app1", "s2", 1_000).disabled())?;
        Ok(())
    })
    .await
    .unwrap();

    let cache = node.node.secret_cache().clone();
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.available_secrets("app1"), vec!["s1".to_string()]);

    // Re-enabled at a later timestamp
    node.secret_store
        .upsert(&SecretEntry::new(2, "app1", "s2", 2_000))
        .unwrap();
    assert!(eventually(Duration::from_secs(2), || cache.available_secrets("app1").len() == 2).await);
    assert!(cache.cursor() >= 2_000);

    // Hard deletes are only seen by reconciliation
    node.secret_store.delete(1).unwrap();
    assert!(eventually(Duration::from_secs(2), || cache.get(1).is_none()).await);
    assert_eq!(cache.available_secrets("app1"), vec!["s2".to_string()]);

    node.shutdown().await.unwrap();
}
