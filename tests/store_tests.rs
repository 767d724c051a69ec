mod common;

use chrono::{Duration, Utc};
use uuid::Uuid;

use storefront::db::{PgStore, StoreError, UserStore};
use storefront::models::{DeleteOutcome, NewUser, Role, User, UserChanges, UserFilter};

use common::{drop_test_db, test_db};

async fn create(store: &PgStore, email: &str, username: &str) -> User {
    store
        .create_user(NewUser::local(email, username, "hash".to_string()))
        .await
        .expect("create user failed")
}

#[tokio::test]
async fn duplicate_email_is_a_conflict() {
    let Some(db) = test_db().await else { return };
    let store = PgStore::new(db.pool.clone());

    let user = create(&store, "a@x.com", "a").await;
    assert_eq!(user.role, Role::Customer);
    assert!(!user.email_verified);

    let err = store
        .create_user(NewUser::local("a@x.com", "other", "hash".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict));

    drop_test_db(db).await;
}

#[tokio::test]
async fn refresh_hash_swap_only_replaces_the_current_value() {
    let Some(db) = test_db().await else { return };
    let store = PgStore::new(db.pool.clone());
    let user = create(&store, "a@x.com", "a").await;

    assert!(store.set_refresh_hash(user.id, Some("first")).await.unwrap());
    assert!(store.swap_refresh_hash(user.id, "first", "second").await.unwrap());

    // The old value no longer matches, so a second swap from it loses.
    assert!(!store.swap_refresh_hash(user.id, "first", "third").await.unwrap());
    let stored = store.find_user_by_id(user.id).await.unwrap().unwrap();
    assert_eq!(stored.refresh_token_hash.as_deref(), Some("second"));

    // A cleared hash never matches.
    assert!(store.set_refresh_hash(user.id, None).await.unwrap());
    assert!(!store.swap_refresh_hash(user.id, "second", "fourth").await.unwrap());
    let stored = store.find_user_by_id(user.id).await.unwrap().unwrap();
    assert!(stored.refresh_token_hash.is_none());

    assert!(!store.set_refresh_hash(Uuid::now_v7(), Some("x")).await.unwrap());

    drop_test_db(db).await;
}

#[tokio::test]
async fn admins_cannot_be_deleted() {
    let Some(db) = test_db().await else { return };
    let store = PgStore::new(db.pool.clone());
    let admin = create(&store, "admin@x.com", "admin").await;
    let customer = create(&store, "c@x.com", "c").await;

    let promoted = store.set_role(admin.id, Role::Admin).await.unwrap().unwrap();
    assert_eq!(promoted.role, Role::Admin);

    assert_eq!(
        store.delete_user(admin.id).await.unwrap(),
        DeleteOutcome::Protected
    );
    assert!(store.find_user_by_id(admin.id).await.unwrap().is_some());

    assert_eq!(
        store.delete_user(customer.id).await.unwrap(),
        DeleteOutcome::Deleted
    );
    assert_eq!(
        store.delete_user(customer.id).await.unwrap(),
        DeleteOutcome::NotFound
    );
    assert!(store.set_role(customer.id, Role::Manager).await.unwrap().is_none());

    drop_test_db(db).await;
}

#[tokio::test]
async fn partial_updates_leave_other_columns_alone() {
    let Some(db) = test_db().await else { return };
    let store = PgStore::new(db.pool.clone());
    let user = create(&store, "a@x.com", "a").await;

    let updated = store
        .update_user(
            user.id,
            UserChanges {
                username: Some("renamed".to_string()),
                email_verified: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.username, "renamed");
    assert!(updated.email_verified);
    assert_eq!(updated.email, "a@x.com");
    assert_eq!(updated.password_hash.as_deref(), Some("hash"));

    let missing = store
        .update_user(Uuid::now_v7(), UserChanges::default())
        .await
        .unwrap();
    assert!(missing.is_none());

    drop_test_db(db).await;
}

#[tokio::test]
async fn listing_filters_by_role_and_search() {
    let Some(db) = test_db().await else { return };
    let store = PgStore::new(db.pool.clone());
    let alice = create(&store, "alice@shop.test", "alice").await;
    create(&store, "bob@shop.test", "bob").await;
    create(&store, "carol@mail.test", "carol").await;
    store.set_role(alice.id, Role::Manager).await.unwrap();

    let managers = store
        .list_users(&UserFilter {
            role: Some(Role::Manager),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(managers.len(), 1);
    assert_eq!(managers[0].id, alice.id);

    let shop = store
        .list_users(&UserFilter {
            search: Some(" SHOP.test ".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    let mut emails: Vec<_> = shop.iter().map(|u| u.email.as_str()).collect();
    emails.sort();
    assert_eq!(emails, vec!["alice@shop.test", "bob@shop.test"]);

    let by_name = store
        .list_users(&UserFilter {
            search: Some("caro".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_name.len(), 1);
    assert_eq!(by_name[0].username, "carol");

    let second_page = store
        .list_users(&UserFilter {
            page: Some(2),
            per_page: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(second_page.len(), 1);

    drop_test_db(db).await;
}

#[tokio::test]
async fn replacing_a_code_purges_earlier_ones() {
    let Some(db) = test_db().await else { return };
    let store = PgStore::new(db.pool.clone());
    let user = create(&store, "a@x.com", "a").await;
    let expires_at = Utc::now() + Duration::minutes(2);

    store
        .replace_verification_code(user.id, "first", expires_at)
        .await
        .unwrap();
    let latest = store
        .replace_verification_code(user.id, "second", expires_at)
        .await
        .unwrap();

    let codes = store.verification_codes(user.id).await.unwrap();
    assert_eq!(codes.len(), 1);
    assert_eq!(codes[0].id, latest.id);
    assert_eq!(codes[0].code_hash, "second");

    store.delete_verification_code(latest.id).await.unwrap();
    assert!(store.verification_codes(user.id).await.unwrap().is_empty());

    drop_test_db(db).await;
}

#[tokio::test]
async fn reset_links_are_replaced_and_found_by_hash() {
    let Some(db) = test_db().await else { return };
    let store = PgStore::new(db.pool.clone());
    let user = create(&store, "a@x.com", "a").await;
    let expires_at = Utc::now() + Duration::minutes(5);

    store.replace_reset_link(user.id, "old", expires_at).await.unwrap();
    let link = store.replace_reset_link(user.id, "new", expires_at).await.unwrap();

    assert!(store.find_reset_link("old").await.unwrap().is_none());
    let found = store.find_reset_link("new").await.unwrap().unwrap();
    assert_eq!(found.id, link.id);
    assert_eq!(found.user_id, user.id);

    store.delete_reset_link(link.id).await.unwrap();
    assert!(store.find_reset_link("new").await.unwrap().is_none());

    drop_test_db(db).await;
}

#[tokio::test]
async fn purge_removes_only_expired_rows() {
    let Some(db) = test_db().await else { return };
    let store = PgStore::new(db.pool.clone());
    let stale = create(&store, "stale@x.com", "stale").await;
    let fresh = create(&store, "fresh@x.com", "fresh").await;
    let now = Utc::now();

    store
        .replace_verification_code(stale.id, "code", now - Duration::seconds(1))
        .await
        .unwrap();
    store
        .replace_reset_link(stale.id, "link", now - Duration::seconds(1))
        .await
        .unwrap();
    store
        .replace_verification_code(fresh.id, "code", now + Duration::minutes(2))
        .await
        .unwrap();

    assert_eq!(store.purge_expired(now).await.unwrap(), 2);
    assert!(store.verification_codes(stale.id).await.unwrap().is_empty());
    assert!(store.find_reset_link("link").await.unwrap().is_none());
    assert_eq!(store.verification_codes(fresh.id).await.unwrap().len(), 1);

    drop_test_db(db).await;
}
