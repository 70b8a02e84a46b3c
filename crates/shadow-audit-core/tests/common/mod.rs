//! In-memory stand-in for PostgreSQL used by the integration tests
//!
//! `FakeDatabase` implements both [`SqlExecutor`] and [`Catalog`]. It keeps a
//! tiny model of tables, functions and triggers, updates it from the DDL the
//! audit components render, and answers catalog lookups from that model. Every
//! statement is recorded so tests can assert on what was (or was not) issued.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::FakeDatabase;
//!
//! let db = FakeDatabase::new();
//! db.add_table("public", "orders", &["id", "total"]);
//! let manager = db.manager();
//! ```

#![allow(dead_code)]

use async_trait::async_trait;
use shadow_audit_common::TableRef;
use shadow_audit_core::db::{DbError, DbResult, Row, SqlExecutor, SqlParam};
use shadow_audit_core::{
    AuditLifecycleManager, Catalog, ColumnDescriptor, ControlObjects, EncryptionKey,
    StaticKeyProvider,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

pub const TEST_SECRET: &str = "integration-test-secret";

type ObjectKey = (String, String);

#[derive(Debug, Clone, Default)]
struct State {
    tables: BTreeMap<ObjectKey, Vec<String>>,
    functions: BTreeSet<ObjectKey>,
    /// (schema, table) -> trigger name -> function it executes
    triggers: BTreeMap<ObjectKey, BTreeMap<String, ObjectKey>>,
}

#[derive(Default)]
pub struct FakeDatabase {
    state: Mutex<State>,
    statements: Mutex<Vec<String>>,
    fetches: Mutex<Vec<(String, Vec<SqlParam>)>>,
    fetch_rows: Mutex<Vec<Row>>,
    fail_on: Mutex<Vec<String>>,
}

impl FakeDatabase {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn key() -> EncryptionKey {
        EncryptionKey::new(TEST_SECRET).unwrap()
    }

    /// A manager over this fake with a fixed key and default control objects.
    pub fn manager(self: &Arc<Self>) -> AuditLifecycleManager {
        AuditLifecycleManager::new(
            self.clone(),
            self.clone(),
            Arc::new(StaticKeyProvider::new(Self::key())),
            ControlObjects::default(),
        )
    }

    pub fn add_table(&self, schema: &str, table: &str, columns: &[&str]) {
        self.state.lock().unwrap().tables.insert(
            (schema.to_string(), table.to_string()),
            columns.iter().map(|c| c.to_string()).collect(),
        );
    }

    pub fn has_table(&self, schema: &str, table: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .tables
            .contains_key(&(schema.to_string(), table.to_string()))
    }

    pub fn trigger_count(&self, schema: &str, table: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .triggers
            .get(&(schema.to_string(), table.to_string()))
            .map_or(0, |t| t.len())
    }

    /// Any statement containing `fragment` fails.
    pub fn fail_on(&self, fragment: &str) {
        self.fail_on.lock().unwrap().push(fragment.to_string());
    }

    pub fn clear_failures(&self) {
        self.fail_on.lock().unwrap().clear();
    }

    /// Rows returned by every subsequent fetch.
    pub fn set_fetch_rows(&self, rows: Vec<Row>) {
        *self.fetch_rows.lock().unwrap() = rows;
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> Vec<(String, Vec<SqlParam>)> {
        self.fetches.lock().unwrap().clone()
    }

    fn check_failure(&self, sql: &str) -> DbResult<()> {
        let fail_on = self.fail_on.lock().unwrap();
        match fail_on.iter().find(|f| sql.contains(f.as_str())) {
            Some(fragment) => Err(DbError::Query(sqlx::Error::Protocol(format!(
                "injected failure on '{}'",
                fragment
            )))),
            None => Ok(()),
        }
    }

    fn apply(&self, state: &mut State, sql: &str) -> DbResult<()> {
        self.check_failure(sql)?;
        self.statements.lock().unwrap().push(sql.to_string());

        let idents = quoted_idents(sql);
        let pair = |i: usize| -> ObjectKey { (idents[i].clone(), idents[i + 1].clone()) };

        if sql.starts_with("DROP TABLE IF EXISTS") {
            let key = pair(0);
            state.tables.remove(&key);
            state.triggers.remove(&key);
        } else if sql.starts_with("CREATE TABLE IF NOT EXISTS") {
            // control tables are not modelled
        } else if sql.starts_with("CREATE TABLE") {
            let key = pair(0);
            if state.tables.contains_key(&key) {
                return Err(query_error(format!("relation \"{}\" already exists", key.1)));
            }
            state.tables.insert(key, idents[2..].to_vec());
        } else if sql.starts_with("CREATE OR REPLACE FUNCTION") {
            state.functions.insert(pair(0));
        } else if sql.starts_with("DROP FUNCTION IF EXISTS") {
            let function = pair(0);
            state.functions.remove(&function);
            for triggers in state.triggers.values_mut() {
                triggers.retain(|_, f| *f != function);
            }
        } else if sql.starts_with("DROP TRIGGER IF EXISTS") {
            let table = pair(1);
            if !state.tables.contains_key(&table) {
                return Err(query_error(format!("relation \"{}\" does not exist", table.1)));
            }
            if let Some(triggers) = state.triggers.get_mut(&table) {
                triggers.remove(&idents[0]);
            }
        } else if sql.starts_with("CREATE TRIGGER") {
            let table = pair(1);
            let function = pair(3);
            if !state.tables.contains_key(&table) {
                return Err(query_error(format!("relation \"{}\" does not exist", table.1)));
            }
            if !state.functions.contains(&function) {
                return Err(query_error(format!("function {}() does not exist", function.1)));
            }
            let triggers = state.triggers.entry(table).or_default();
            if triggers.contains_key(&idents[0]) {
                return Err(query_error(format!("trigger \"{}\" already exists", idents[0])));
            }
            triggers.insert(idents[0].clone(), function);
        }

        Ok(())
    }
}

fn query_error(message: String) -> DbError {
    DbError::Query(sqlx::Error::Protocol(message))
}

/// Every double-quoted identifier in `sql`, unescaped, in order of appearance.
///
/// Only the statement header is scanned for `CREATE OR REPLACE FUNCTION`, so
/// identifiers inside the function body are ignored.
fn quoted_idents(sql: &str) -> Vec<String> {
    let scanned = if sql.starts_with("CREATE OR REPLACE FUNCTION") {
        sql.lines().next().unwrap_or_default()
    } else {
        sql
    };

    let mut idents = Vec::new();
    let mut chars = scanned.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '"' {
            continue;
        }
        let mut ident = String::new();
        while let Some(c) = chars.next() {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    ident.push('"');
                } else {
                    break;
                }
            } else {
                ident.push(c);
            }
        }
        idents.push(ident);
    }
    idents
}

#[async_trait]
impl SqlExecutor for FakeDatabase {
    async fn fetch(&self, sql: &str, params: &[SqlParam]) -> DbResult<Vec<Row>> {
        self.check_failure(sql)?;
        self.fetches
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        Ok(self.fetch_rows.lock().unwrap().clone())
    }

    async fn execute(&self, sql: &str, _params: &[SqlParam]) -> DbResult<u64> {
        let mut state = self.state.lock().unwrap();
        self.apply(&mut state, sql)?;
        Ok(1)
    }

    async fn execute_batch(&self, statements: &[String]) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        let mut working = state.clone();
        for statement in statements {
            self.apply(&mut working, statement)?;
        }
        *state = working;
        Ok(())
    }
}

#[async_trait]
impl Catalog for FakeDatabase {
    async fn columns(&self, table: &TableRef) -> DbResult<Vec<ColumnDescriptor>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tables
            .get(&(table.schema.clone(), table.table.clone()))
            .map(|columns| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(i, name)| ColumnDescriptor::new(name.as_str(), "text", i as i64 + 1))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn table_exists(&self, table: &TableRef) -> bool {
        self.has_table(&table.schema, &table.table)
    }

    async fn function_exists(&self, schema: &str, function: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .functions
            .contains(&(schema.to_string(), function.to_string()))
    }

    async fn triggers_exist(&self, table: &TableRef, triggers: &[String]) -> bool {
        self.state
            .lock()
            .unwrap()
            .triggers
            .get(&(table.schema.clone(), table.table.clone()))
            .is_some_and(|defined| triggers.iter().any(|t| defined.contains_key(t)))
    }

    async fn list_tables(&self, schema: &str) -> DbResult<Vec<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .tables
            .keys()
            .filter(|(s, _)| s == schema)
            .map(|(_, t)| t.clone())
            .collect())
    }
}
