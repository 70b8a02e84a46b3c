//! Lifecycle tests against the in-memory database
//!
//! These tests verify:
//! - Status checks on tables that were never audited
//! - Create, rebuild and remove, including partial failures
//! - Bulk operations with per-table accounting and progress callbacks
//! - Table listing without shadow and control tables

mod common;

use common::FakeDatabase;
use shadow_audit_common::TableRef;
use shadow_audit_core::{AuditError, AuditState, NameCipher, RemoveOptions};

fn table(name: &str) -> TableRef {
    TableRef::new("public", name).unwrap()
}

#[tokio::test]
async fn test_status_without_audit_is_all_false() {
    let db = FakeDatabase::new();
    let manager = db.manager();

    let status = manager.status(&table("ghost")).await;
    assert!(!status.table_exists);
    assert!(!status.shadow_table_exists);
    assert!(!status.triggers_exist);
    assert!(!status.function_exists);
    assert_eq!(status.state(), AuditState::NoAudit);
}

#[tokio::test]
async fn test_status_of_plain_table() {
    let db = FakeDatabase::new();
    db.add_table("public", "orders", &["id", "total"]);

    let status = db.manager().status(&table("orders")).await;
    assert!(status.table_exists);
    assert_eq!(status.state(), AuditState::NoAudit);
}

#[tokio::test]
async fn test_create_missing_table_issues_no_ddl() {
    let db = FakeDatabase::new();
    let manager = db.manager();

    let err = manager.create(&table("missing")).await.unwrap_err();
    assert!(matches!(err, AuditError::TableNotFound(_)));
    assert!(db.statements().is_empty());
}

#[tokio::test]
async fn test_create_builds_all_structures() {
    let db = FakeDatabase::new();
    db.add_table("public", "orders", &["id", "customer_email", "total"]);
    let manager = db.manager();

    let names = manager.create(&table("orders")).await.unwrap();

    let shadow = names.shadow_table.name.as_str();
    assert!(db.has_table("public", shadow));
    assert_eq!(db.trigger_count("public", "orders"), 3);

    let status = manager.status(&table("orders")).await;
    assert!(status.table_exists);
    assert!(status.shadow_table_exists);
    assert!(status.triggers_exist);
    assert!(status.function_exists);
    assert_eq!(status.state(), AuditState::Active);

    // shadow name is recomputable from the key alone
    let cipher = NameCipher::new(&FakeDatabase::key());
    assert_eq!(cipher.decrypt_name(shadow).unwrap(), "aud_orders");

    // no plaintext column name reaches the shadow table definition
    let create = db
        .statements()
        .into_iter()
        .find(|s| s.starts_with("CREATE TABLE \"public\""))
        .unwrap();
    assert!(!create.contains("customer_email"));
    assert_eq!(create.matches(" BYTEA").count(), 6);

    // registry entry recorded
    assert!(db
        .statements()
        .iter()
        .any(|s| s.contains("INSERT INTO \"public\".\"shadow_audit_registry\"")));
}

#[tokio::test]
async fn test_create_twice_rebuilds() {
    let db = FakeDatabase::new();
    db.add_table("public", "orders", &["id"]);
    let manager = db.manager();

    manager.create(&table("orders")).await.unwrap();
    manager.create(&table("orders")).await.unwrap();

    assert_eq!(db.trigger_count("public", "orders"), 3);
    assert_eq!(
        manager.status(&table("orders")).await.state(),
        AuditState::Active
    );
}

#[tokio::test]
async fn test_failed_trigger_step_leaves_partial_state() {
    let db = FakeDatabase::new();
    db.add_table("public", "orders", &["id"]);
    let manager = db.manager();
    db.fail_on("CREATE TRIGGER");

    let err = manager.create(&table("orders")).await.unwrap_err();
    match &err {
        AuditError::AuditCreation { table, message } => {
            assert_eq!(table, "public.orders");
            assert!(message.contains("creating triggers"));
            assert!(message.contains("injected failure"));
        },
        other => panic!("unexpected error: {other:?}"),
    }

    let status = manager.status(&table("orders")).await;
    assert!(status.shadow_table_exists);
    assert!(status.function_exists);
    assert!(!status.triggers_exist);
    assert_eq!(status.state(), AuditState::Partial);

    // re-running create is the recovery path
    db.clear_failures();
    manager.create(&table("orders")).await.unwrap();
    assert_eq!(
        manager.status(&table("orders")).await.state(),
        AuditState::Active
    );
}

#[tokio::test]
async fn test_failed_function_step_keeps_cause() {
    let db = FakeDatabase::new();
    db.add_table("public", "orders", &["id"]);
    db.fail_on("CREATE OR REPLACE FUNCTION");

    let err = db.manager().create(&table("orders")).await.unwrap_err();
    assert!(err.to_string().contains("creating trigger function"));
    assert!(!db.manager().status(&table("orders")).await.function_exists);
}

#[tokio::test]
async fn test_reserved_column_name_is_rejected() {
    let db = FakeDatabase::new();
    db.add_table("public", "odd", &["id", "$actor"]);

    let err = db.manager().create(&table("odd")).await.unwrap_err();
    assert!(matches!(err, AuditError::AuditCreation { .. }));
    assert!(err.to_string().contains("reserved"));
    assert!(db.statements().is_empty());
}

#[tokio::test]
async fn test_remove_keeps_shadow_table() {
    let db = FakeDatabase::new();
    db.add_table("public", "orders", &["id", "total"]);
    let manager = db.manager();

    manager.create(&table("orders")).await.unwrap();
    manager
        .remove(&table("orders"), RemoveOptions::default())
        .await
        .unwrap();

    let status = manager.status(&table("orders")).await;
    assert!(!status.triggers_exist);
    assert!(!status.function_exists);
    assert!(status.shadow_table_exists);
    assert!(status.table_exists);
    assert_eq!(status.state(), AuditState::Removed);

    assert!(db
        .statements()
        .iter()
        .any(|s| s.starts_with("UPDATE \"public\".\"shadow_audit_registry\" SET active = FALSE")));
}

#[tokio::test]
async fn test_remove_with_drop_shadow() {
    let db = FakeDatabase::new();
    db.add_table("public", "orders", &["id"]);
    let manager = db.manager();

    let names = manager.create(&table("orders")).await.unwrap();
    manager
        .remove(&table("orders"), RemoveOptions { drop_shadow: true })
        .await
        .unwrap();

    assert!(!db.has_table("public", names.shadow_table.name.as_str()));
    assert_eq!(
        manager.status(&table("orders")).await.state(),
        AuditState::NoAudit
    );
    assert!(db
        .statements()
        .iter()
        .any(|s| s.starts_with("DELETE FROM \"public\".\"shadow_audit_registry\"")));
}

#[tokio::test]
async fn test_remove_tolerates_trigger_failures() {
    let db = FakeDatabase::new();
    let manager = db.manager();

    // source table gone: every DROP TRIGGER fails, the function drop still runs
    manager
        .remove(&table("vanished"), RemoveOptions::default())
        .await
        .unwrap();
    assert!(db
        .statements()
        .iter()
        .any(|s| s.starts_with("DROP FUNCTION IF EXISTS")));
}

#[tokio::test]
async fn test_remove_surfaces_function_drop_failure() {
    let db = FakeDatabase::new();
    db.add_table("public", "orders", &["id"]);
    let manager = db.manager();
    manager.create(&table("orders")).await.unwrap();
    db.fail_on("DROP FUNCTION");

    let err = manager
        .remove(&table("orders"), RemoveOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AuditError::AuditRemoval { .. }));
}

#[tokio::test]
async fn test_bulk_create_accounts_per_table() {
    let db = FakeDatabase::new();
    db.add_table("public", "t1", &["id"]);
    let manager = db.manager();

    let mut progress = Vec::new();
    let outcome = manager
        .bulk_create(&[table("t1"), table("t2")], |done, total, t| {
            progress.push((done, total, t.table.clone()));
        })
        .await;

    assert_eq!(outcome.total, 2);
    assert_eq!(outcome.succeeded, vec![table("t1")]);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].table, table("t2"));
    assert!(matches!(outcome.failed[0].error, AuditError::TableNotFound(_)));
    assert!(!outcome.is_success());

    assert_eq!(
        progress,
        vec![(1, 2, "t1".to_string()), (2, 2, "t2".to_string())]
    );
}

#[tokio::test]
async fn test_bulk_remove_and_status_many() {
    let db = FakeDatabase::new();
    db.add_table("public", "a", &["id"]);
    db.add_table("public", "b", &["id"]);
    let manager = db.manager();
    let tables = vec![table("a"), table("b")];

    let created = manager.bulk_create(&tables, |_, _, _| {}).await;
    assert!(created.is_success());

    let mut calls = 0;
    let removed = manager
        .bulk_remove(&tables, RemoveOptions::default(), |_, _, _| calls += 1)
        .await;
    assert_eq!(removed.succeeded.len(), 2);
    assert_eq!(calls, 2);

    let statuses = manager.status_many(&tables).await;
    assert_eq!(statuses.len(), 2);
    assert!(statuses
        .iter()
        .all(|(_, s)| s.state() == AuditState::Removed));
}

#[tokio::test]
async fn test_list_tables_hides_shadow_and_control_tables() {
    let db = FakeDatabase::new();
    db.add_table("public", "orders", &["id"]);
    db.add_table("public", "customers", &["id"]);
    db.add_table("public", "shadow_audit_secret", &["id", "secret"]);
    let manager = db.manager();
    manager.create(&table("orders")).await.unwrap();

    let tables = manager.list_tables("public").await.unwrap();
    assert_eq!(tables, vec![table("customers"), table("orders")]);
}

#[tokio::test]
async fn test_missing_key_fails_create() {
    use shadow_audit_core::{ControlObjects, StaticKeyProvider};
    use std::sync::Arc;

    let db = FakeDatabase::new();
    db.add_table("public", "orders", &["id"]);
    let manager = shadow_audit_core::AuditLifecycleManager::new(
        db.clone(),
        db.clone(),
        Arc::new(StaticKeyProvider::missing()),
        ControlObjects::default(),
    );

    let err = manager.create(&table("orders")).await.unwrap_err();
    assert!(matches!(err, AuditError::AuditCreation { .. }));
    assert!(db.statements().is_empty());

    // status still answers
    let status = manager.status(&table("orders")).await;
    assert!(status.table_exists);
    assert!(!status.shadow_table_exists);
}

#[tokio::test]
async fn test_bootstrap_runs_control_ddl() {
    let db = FakeDatabase::new();
    db.manager().bootstrap().await.unwrap();

    let statements = db.statements();
    assert_eq!(statements[0], "CREATE EXTENSION IF NOT EXISTS pgcrypto");
    assert!(statements
        .iter()
        .any(|s| s.contains("shadow_audit_try_decrypt")));
}
