//! End-to-end tests against a live PostgreSQL with `pgcrypto`
//!
//! Run with `DATABASE_URL` set and `cargo test -- --ignored`.

use shadow_audit_common::ActionKind;
use shadow_audit_core::config::AuditConfig;
use shadow_audit_core::keys::{generate_key, install_key, key_count};
use shadow_audit_core::{
    AuditFilter, AuditLifecycleManager, AuditState, CellValue, EncryptionKey, ReadOptions,
    RemoveOptions,
};
use sqlx::PgPool;

async fn audited_manager(pool: &PgPool) -> AuditLifecycleManager {
    let manager = AuditLifecycleManager::from_pool(pool.clone(), &AuditConfig::default()).unwrap();
    manager.bootstrap().await.unwrap();

    let key = EncryptionKey::new(generate_key()).unwrap();
    install_key(
        manager.executor().as_ref(),
        &manager.control().secret_table,
        &key,
    )
    .await
    .unwrap();
    manager
}

#[sqlx::test]
#[ignore] // Requires database
async fn test_bootstrap_is_idempotent(pool: PgPool) {
    let manager = AuditLifecycleManager::from_pool(pool, &AuditConfig::default()).unwrap();
    manager.bootstrap().await.unwrap();
    manager.bootstrap().await.unwrap();

    let count = key_count(
        manager.executor().as_ref(),
        &manager.control().secret_table,
    )
    .await
    .unwrap();
    assert_eq!(count, 0);
}

#[sqlx::test]
#[ignore] // Requires database
async fn test_audit_records_every_change(pool: PgPool) {
    sqlx::raw_sql("CREATE TABLE orders (id INT PRIMARY KEY, customer_email TEXT, total NUMERIC)")
        .execute(&pool)
        .await
        .unwrap();

    let manager = audited_manager(&pool).await;
    let orders = manager.parse_table("orders").unwrap();
    manager.create(&orders).await.unwrap();
    assert_eq!(manager.status(&orders).await.state(), AuditState::Active);

    sqlx::raw_sql(
        "INSERT INTO orders VALUES (1, 'a@example.com', 10);
         UPDATE orders SET total = 12 WHERE id = 1;
         DELETE FROM orders WHERE id = 1;",
    )
    .execute(&pool)
    .await
    .unwrap();

    let reader = manager.reader();
    let rows = reader.read_rows(&orders, &ReadOptions::default()).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(
        rows.labels(),
        vec!["id", "customer_email", "total", "$actor", "$action_at", "$action"]
    );

    // newest first
    let actions: Vec<_> = rows.rows.iter().map(|r| r[5].to_string()).collect();
    assert_eq!(actions, vec!["DELETE", "UPDATE", "INSERT"]);
    assert!(rows.rows.iter().all(|r| r[1] == CellValue::Masked));

    // DELETE records the old row image
    assert_eq!(rows.rows[0][2], CellValue::Text("12".into()));

    let deletes = reader
        .read_rows(
            &orders,
            &ReadOptions {
                filter: AuditFilter {
                    actor: None,
                    action: Some(ActionKind::Delete),
                },
                decrypt_sensitive: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes.rows[0][1], CellValue::Text("a@example.com".into()));
}

#[sqlx::test]
#[ignore] // Requires database
async fn test_remove_then_recreate(pool: PgPool) {
    sqlx::raw_sql("CREATE TABLE notes (id INT, body TEXT)")
        .execute(&pool)
        .await
        .unwrap();

    let manager = audited_manager(&pool).await;
    let notes = manager.parse_table("notes").unwrap();
    manager.create(&notes).await.unwrap();

    manager.remove(&notes, RemoveOptions::default()).await.unwrap();
    assert_eq!(manager.status(&notes).await.state(), AuditState::Removed);

    // writes after removal are not recorded
    sqlx::raw_sql("INSERT INTO notes VALUES (1, 'hello')")
        .execute(&pool)
        .await
        .unwrap();
    let rows = manager
        .reader()
        .read_rows(&notes, &ReadOptions::default())
        .await
        .unwrap();
    assert!(rows.is_empty());

    manager.create(&notes).await.unwrap();
    manager
        .remove(&notes, RemoveOptions { drop_shadow: true })
        .await
        .unwrap();
    assert_eq!(manager.status(&notes).await.state(), AuditState::NoAudit);
    assert!(manager.registry().list().await.unwrap().is_empty());
}

#[sqlx::test]
#[ignore] // Requires database
async fn test_listing_hides_shadow_tables(pool: PgPool) {
    sqlx::raw_sql("CREATE TABLE a (id INT); CREATE TABLE b (id INT);")
        .execute(&pool)
        .await
        .unwrap();

    let manager = audited_manager(&pool).await;
    let a = manager.parse_table("a").unwrap();
    manager.create(&a).await.unwrap();

    let tables: Vec<String> = manager
        .list_tables("public")
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.table)
        .collect();
    assert_eq!(tables, vec!["a", "b"]);
}
