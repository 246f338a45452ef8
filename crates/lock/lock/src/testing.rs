use std::time::Duration;

use crate::error::LockError;
use crate::key::lock_key;
use crate::store::{LockScript, LockStore, SetOutcome};

fn test_key(id: &str) -> String {
    lock_key(&format!("conformance-{id}"))
}

/// Run the full lock store conformance test suite.
///
/// Call this from your backend's test module with a fresh store instance.
///
/// # Errors
///
/// Returns an error if the store reports a fault during any test.
pub async fn run_store_conformance_tests(store: &dyn LockStore) -> Result<(), LockError> {
    test_get_missing(store).await?;
    test_set_if_absent_new(store).await?;
    test_set_if_absent_existing(store).await?;
    test_release_matching_token(store).await?;
    test_release_mismatched_token(store).await?;
    test_release_missing_key(store).await?;
    test_extend_matching_token(store).await?;
    test_extend_mismatched_token(store).await?;
    Ok(())
}

async fn test_get_missing(store: &dyn LockStore) -> Result<(), LockError> {
    let val = store.get(&test_key("missing")).await?;
    assert!(val.is_none(), "get on missing key should return None");
    Ok(())
}

async fn test_set_if_absent_new(store: &dyn LockStore) -> Result<(), LockError> {
    let key = test_key("set-new");
    let outcome = store
        .set_if_absent(&key, "owner-a", Duration::from_secs(30))
        .await?;
    assert_eq!(outcome, SetOutcome::Acquired, "absent key should be set");
    assert_eq!(store.get(&key).await?.as_deref(), Some("owner-a"));
    Ok(())
}

async fn test_set_if_absent_existing(store: &dyn LockStore) -> Result<(), LockError> {
    let key = test_key("set-existing");
    store
        .set_if_absent(&key, "owner-a", Duration::from_secs(30))
        .await?;
    let outcome = store
        .set_if_absent(&key, "owner-b", Duration::from_secs(30))
        .await?;
    assert!(
        !outcome.is_acquired(),
        "set_if_absent on existing key should not acquire"
    );
    assert_eq!(
        store.get(&key).await?.as_deref(),
        Some("owner-a"),
        "first owner should remain"
    );
    Ok(())
}

async fn test_release_matching_token(store: &dyn LockStore) -> Result<(), LockError> {
    let key = test_key("release-match");
    store
        .set_if_absent(&key, "owner-a", Duration::from_secs(30))
        .await?;
    let reply = store
        .eval(LockScript::Release, &key, &["owner-a".to_owned()])
        .await?;
    assert_eq!(reply, 1, "release with matching token should delete");
    assert!(store.get(&key).await?.is_none(), "key should be gone");
    Ok(())
}

async fn test_release_mismatched_token(store: &dyn LockStore) -> Result<(), LockError> {
    let key = test_key("release-mismatch");
    store
        .set_if_absent(&key, "owner-a", Duration::from_secs(30))
        .await?;
    let reply = store
        .eval(LockScript::Release, &key, &["owner-b".to_owned()])
        .await?;
    assert_eq!(reply, 0, "release with foreign token should be a no-op");
    assert_eq!(
        store.get(&key).await?.as_deref(),
        Some("owner-a"),
        "key should survive a foreign release"
    );
    Ok(())
}

async fn test_release_missing_key(store: &dyn LockStore) -> Result<(), LockError> {
    let reply = store
        .eval(
            LockScript::Release,
            &test_key("release-missing"),
            &["owner-a".to_owned()],
        )
        .await?;
    assert_eq!(reply, 0, "release of an absent key should be a no-op");
    Ok(())
}

async fn test_extend_matching_token(store: &dyn LockStore) -> Result<(), LockError> {
    let key = test_key("extend-match");
    store
        .set_if_absent(&key, "owner-a", Duration::from_secs(5))
        .await?;
    let reply = store
        .eval(
            LockScript::Extend,
            &key,
            &["owner-a".to_owned(), "60".to_owned()],
        )
        .await?;
    assert_eq!(reply, 1, "extend with matching token should succeed");
    assert_eq!(store.get(&key).await?.as_deref(), Some("owner-a"));
    Ok(())
}

async fn test_extend_mismatched_token(store: &dyn LockStore) -> Result<(), LockError> {
    let key = test_key("extend-mismatch");
    store
        .set_if_absent(&key, "owner-a", Duration::from_secs(5))
        .await?;
    let reply = store
        .eval(
            LockScript::Extend,
            &key,
            &["owner-b".to_owned(), "60".to_owned()],
        )
        .await?;
    assert_eq!(reply, 0, "extend with foreign token should be a no-op");

    let reply = store
        .eval(
            LockScript::Extend,
            &test_key("extend-missing"),
            &["owner-a".to_owned(), "60".to_owned()],
        )
        .await?;
    assert_eq!(reply, 0, "extend of an absent key should be a no-op");
    Ok(())
}
