use super::*;
use crate::ChangeLogStore;
use crate::ChangeRecord;
use crate::SecretEntry;
use crate::SecretStore;

#[tokio::test]
async fn change_log_appends_with_increasing_ids() {
    let log = MemoryChangeLog::new();
    assert_eq!(log.find_newest_id().await.unwrap(), None);

    let a = log.append("app1+default+ns1");
    let b = log.append("app1+default+ns2");

    assert!(b.id > a.id);
    assert_eq!(log.find_newest_id().await.unwrap(), Some(b.id));
}

#[tokio::test]
async fn change_log_find_after_is_exclusive_and_bounded() {
    let log = MemoryChangeLog::new();
    for i in 0..5 {
        log.append(format!("subject-{i}"));
    }

    let page = log.find_after(2, 2).await.unwrap();
    let ids: Vec<u64> = page.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![3, 4]);

    assert!(log.find_after(5, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn change_log_find_by_ids_skips_unknown() {
    let log = MemoryChangeLog::new();
    log.insert(ChangeRecord::new(7, "s7", 1));
    log.insert(ChangeRecord::new(9, "s9", 1));

    let found = log.find_by_ids(&[7, 8, 9]).await.unwrap();
    let ids: Vec<u64> = found.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![7, 9]);

    // appends continue after the largest explicit id
    assert_eq!(log.append("next").id, 10);
}

#[tokio::test]
async fn secret_store_orders_by_last_modified_then_id() {
    let store = MemorySecretStore::new();
    store.upsert(SecretEntry::new(3, "app", "s3", 20));
    store.upsert(SecretEntry::new(1, "app", "s1", 30));
    store.upsert(SecretEntry::new(2, "app", "s2", 20));
    store.upsert(SecretEntry::new(4, "app", "s4", 10));

    let page = store.find_modified_since(20, 10).await.unwrap();
    let ids: Vec<u64> = page.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![2, 3, 1]);

    let limited = store.find_modified_since(0, 2).await.unwrap();
    assert_eq!(limited.iter().map(|e| e.id).collect::<Vec<_>>(), vec![4, 2]);

    let ties = store.find_modified_at(20).await.unwrap();
    assert_eq!(ties.iter().map(|e| e.id).collect::<Vec<_>>(), vec![2, 3]);
}

#[tokio::test]
async fn secret_store_reports_existing_ids() {
    let store = MemorySecretStore::new();
    store.upsert(SecretEntry::new(1, "app", "s1", 1));
    store.upsert(SecretEntry::new(2, "app", "s2", 1));
    store.delete(2);

    let existing = store.find_existing_ids(&[1, 2, 3]).await.unwrap();
    assert_eq!(existing.len(), 1);
    assert!(existing.contains(&1));
}
