// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use gridedit_app::{
    CellValue, ColumnDescriptor, ColumnType, ForeignKeyOption, JsonRow, QueryPage, RowQuery,
    RowWindow, TableBackend,
};
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

const FIRST_NAMES: [&str; 16] = [
    "Avery", "Jordan", "Taylor", "Riley", "Morgan", "Casey", "Alex", "Quinn", "Parker", "Drew",
    "Kai", "Elliot", "Robin", "Cameron", "Hayden", "Rowan",
];
const LAST_NAMES: [&str; 18] = [
    "Walker", "Martin", "Hill", "Evans", "Lopez", "Gray", "Ward", "Young", "Diaz", "Reed",
    "Campbell", "Turner", "Flores", "Bennett", "Price", "Morris", "Foster", "Brooks",
];
const DEPARTMENTS: [&str; 6] = [
    "Engineering",
    "Finance",
    "Operations",
    "Sales",
    "Support",
    "Research",
];
const PRODUCTS: [&str; 12] = [
    "Widget",
    "Gadget",
    "Sprocket",
    "Flange",
    "Gasket",
    "Bracket",
    "Spindle",
    "Valve",
    "Coupler",
    "Bearing",
    "Rotor",
    "Actuator",
];
const ORDER_STATUSES: [&str; 4] = ["pending", "shipped", "delivered", "returned"];
const TAG_COLORS: [&str; 5] = ["red", "green", "blue", "amber", "slate"];

pub const DEMO_USER_COUNT: usize = 40;
/// Large enough that the demo `orders` table is served by the paged source.
pub const DEMO_ORDER_COUNT: usize = 2500;

/// One call against the backend, recorded in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operation {
    ListTables,
    RowCount,
    Schema,
    FetchRows,
    QueryRows,
    CreateRow,
    UpdateRow,
    DeleteRow,
    ForeignKeys,
}

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    columns: Vec<ColumnDescriptor>,
    rows: Vec<JsonRow>,
}

impl MemoryTable {
    fn key_names(&self) -> Vec<&str> {
        let keys = self
            .columns
            .iter()
            .filter(|column| column.is_key)
            .map(|column| column.name.as_str())
            .collect::<Vec<_>>();
        if keys.is_empty() {
            self.columns
                .iter()
                .map(|column| column.name.as_str())
                .collect()
        } else {
            keys
        }
    }

    fn position(&self, row: &JsonRow) -> Option<usize> {
        let keys = self.key_names();
        self.rows.iter().position(|stored| {
            keys.iter().all(|key| {
                stored.get(*key).unwrap_or(&Value::Null) == row.get(*key).unwrap_or(&Value::Null)
            })
        })
    }

    fn normalize(&self, row: &JsonRow) -> JsonRow {
        self.columns
            .iter()
            .map(|column| {
                (
                    column.name.clone(),
                    row.get(&column.name).cloned().unwrap_or(Value::Null),
                )
            })
            .collect()
    }
}

#[derive(Debug, Default)]
struct Inner {
    tables: BTreeMap<String, MemoryTable>,
    relations: BTreeMap<String, Vec<ForeignKeyOption>>,
    failures: BTreeSet<Operation>,
    failing_relations: BTreeSet<String>,
    offline: bool,
    requests: Vec<Operation>,
}

/// A `TableBackend` kept in memory, with switches for simulating failures.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("memory backend lock poisoned"))
    }

    /// Records the call and fails it when the backend is offline or the operation is broken.
    fn begin(&self, operation: Operation) -> Result<MutexGuard<'_, Inner>> {
        let mut inner = self.lock()?;
        inner.requests.push(operation);
        if inner.offline {
            bail!("backend is offline");
        }
        if inner.failures.contains(&operation) {
            bail!("injected failure for {operation:?}");
        }
        Ok(inner)
    }

    pub fn insert_table(
        &self,
        name: &str,
        columns: Vec<ColumnDescriptor>,
        rows: Vec<Value>,
    ) -> Result<()> {
        let rows = rows.into_iter().map(json_row).collect::<Result<Vec<_>>>()?;
        let mut inner = self.lock()?;
        inner
            .tables
            .insert(name.to_owned(), MemoryTable { columns, rows });
        Ok(())
    }

    pub fn set_relation(&self, name: &str, options: Vec<ForeignKeyOption>) -> Result<()> {
        self.lock()?.relations.insert(name.to_owned(), options);
        Ok(())
    }

    pub fn fail(&self, operation: Operation) -> Result<()> {
        self.lock()?.failures.insert(operation);
        Ok(())
    }

    pub fn recover(&self, operation: Operation) -> Result<()> {
        self.lock()?.failures.remove(&operation);
        Ok(())
    }

    pub fn fail_relation(&self, name: &str) -> Result<()> {
        self.lock()?.failing_relations.insert(name.to_owned());
        Ok(())
    }

    pub fn set_offline(&self, offline: bool) -> Result<()> {
        self.lock()?.offline = offline;
        Ok(())
    }

    pub fn requests(&self) -> Result<Vec<Operation>> {
        Ok(self.lock()?.requests.clone())
    }

    pub fn request_count(&self, operation: Operation) -> Result<usize> {
        Ok(self
            .lock()?
            .requests
            .iter()
            .filter(|recorded| **recorded == operation)
            .count())
    }

    pub fn clear_requests(&self) -> Result<()> {
        self.lock()?.requests.clear();
        Ok(())
    }

    /// Snapshot of a table's stored rows.
    pub fn stored_rows(&self, table: &str) -> Result<Vec<JsonRow>> {
        let inner = self.lock()?;
        let stored = inner
            .tables
            .get(table)
            .with_context(|| format!("no table {table}"))?;
        Ok(stored.rows.clone())
    }
}

fn table<'a>(inner: &'a Inner, name: &str) -> Result<&'a MemoryTable> {
    inner
        .tables
        .get(name)
        .with_context(|| format!("table {name} not found"))
}

fn table_mut<'a>(inner: &'a mut Inner, name: &str) -> Result<&'a mut MemoryTable> {
    inner
        .tables
        .get_mut(name)
        .with_context(|| format!("table {name} not found"))
}

impl TableBackend for MemoryBackend {
    fn list_tables(&self) -> Result<Vec<String>> {
        let inner = self.begin(Operation::ListTables)?;
        Ok(inner.tables.keys().cloned().collect())
    }

    fn row_count(&self, name: &str) -> Result<usize> {
        let inner = self.begin(Operation::RowCount)?;
        Ok(table(&inner, name)?.rows.len())
    }

    fn table_schema(&self, name: &str) -> Result<Vec<ColumnDescriptor>> {
        let inner = self.begin(Operation::Schema)?;
        Ok(table(&inner, name)?.columns.clone())
    }

    fn fetch_rows(&self, name: &str, window: Option<RowWindow>) -> Result<Vec<JsonRow>> {
        let inner = self.begin(Operation::FetchRows)?;
        let rows = &table(&inner, name)?.rows;
        Ok(match window {
            Some(window) => rows
                .iter()
                .skip(window.offset)
                .take(window.limit)
                .cloned()
                .collect(),
            None => rows.clone(),
        })
    }

    fn query_rows(&self, name: &str, query: &RowQuery) -> Result<QueryPage> {
        let inner = self.begin(Operation::QueryRows)?;
        let stored = table(&inner, name)?;
        let mut matching = Vec::new();
        for row in &stored.rows {
            let mut keep = true;
            for filter in &query.filters {
                let cell = CellValue::from_json(row.get(&filter.field).unwrap_or(&Value::Null))?;
                if !filter.matches(&cell) {
                    keep = false;
                    break;
                }
            }
            if keep {
                matching.push(row);
            }
        }
        Ok(QueryPage {
            count: matching.len(),
            data: matching
                .into_iter()
                .skip(query.offset)
                .take(query.limit)
                .cloned()
                .collect(),
        })
    }

    fn create_row(&self, name: &str, row: &JsonRow) -> Result<()> {
        let mut inner = self.begin(Operation::CreateRow)?;
        let stored = table_mut(&mut inner, name)?;
        if stored.position(row).is_some() {
            bail!("duplicate key in {name}");
        }
        let normalized = stored.normalize(row);
        stored.rows.push(normalized);
        Ok(())
    }

    fn update_row(&self, name: &str, row: &JsonRow) -> Result<()> {
        let mut inner = self.begin(Operation::UpdateRow)?;
        let stored = table_mut(&mut inner, name)?;
        let Some(index) = stored.position(row) else {
            bail!("no matching row in {name}");
        };
        let normalized = stored.normalize(row);
        stored.rows[index] = normalized;
        Ok(())
    }

    fn delete_row(&self, name: &str, row: &JsonRow) -> Result<()> {
        let mut inner = self.begin(Operation::DeleteRow)?;
        let stored = table_mut(&mut inner, name)?;
        let Some(index) = stored.position(row) else {
            bail!("no matching row in {name}");
        };
        stored.rows.remove(index);
        Ok(())
    }

    fn foreign_key_options(&self, relation: &str) -> Result<Vec<ForeignKeyOption>> {
        let inner = self.begin(Operation::ForeignKeys)?;
        if inner.failing_relations.contains(relation) {
            bail!("injected failure for relation {relation}");
        }
        inner
            .relations
            .get(relation)
            .cloned()
            .with_context(|| format!("relation {relation} not found"))
    }
}

/// Unwraps a JSON object literal into a wire row.
pub fn json_row(value: Value) -> Result<JsonRow> {
    match value {
        Value::Object(map) => Ok(map),
        other => bail!("expected a JSON object, got {other}"),
    }
}

/// `users(id*, name, manager_id -> users)`, the smallest table exercising every column role.
pub fn users_backend() -> Result<MemoryBackend> {
    let backend = MemoryBackend::new();
    backend.insert_table(
        "users",
        vec![
            ColumnDescriptor::new("id", ColumnType::Number).key(),
            ColumnDescriptor::new("name", ColumnType::Text),
            ColumnDescriptor::new("manager_id", ColumnType::Number).foreign_key("users"),
        ],
        vec![
            json!({"id": 1, "name": "Ada", "manager_id": null}),
            json!({"id": 2, "name": "Grace", "manager_id": 1}),
            json!({"id": 3, "name": "Barbara", "manager_id": 9}),
        ],
    )?;
    backend.set_relation(
        "users",
        vec![
            ForeignKeyOption {
                id: CellValue::Integer(1),
                name: "Ada".to_owned(),
            },
            ForeignKeyOption {
                id: CellValue::Integer(2),
                name: "Grace".to_owned(),
            },
        ],
    )?;
    Ok(backend)
}

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }

    fn int_range(&mut self, low: i64, high: i64) -> i64 {
        let span = (high - low).max(0) as usize + 1;
        low + self.int_n(span) as i64
    }

    fn bool(&mut self) -> bool {
        (self.next_u64() & 1) == 1
    }

    fn pick<'a>(&mut self, values: &[&'a str]) -> &'a str {
        values[self.int_n(values.len())]
    }

    fn date_string(&mut self, year: i64) -> String {
        let month = self.int_range(1, 12);
        let day = self.int_range(1, 28);
        format!("{year}-{month:02}-{day:02}")
    }
}

/// Builds the deterministic dataset behind `--demo`.
#[derive(Debug, Clone)]
pub struct DemoFaker {
    rng: DeterministicRng,
}

impl DemoFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
        }
    }

    pub fn backend(&mut self) -> Result<MemoryBackend> {
        let backend = MemoryBackend::new();

        let departments = DEPARTMENTS
            .iter()
            .enumerate()
            .map(|(index, name)| {
                json!({
                    "id": index + 1,
                    "name": name,
                    "budget": self.rng.int_range(50, 900) * 1000,
                })
            })
            .collect::<Vec<_>>();
        backend.insert_table(
            "departments",
            vec![
                ColumnDescriptor::new("id", ColumnType::Number).key(),
                ColumnDescriptor::new("name", ColumnType::Text),
                ColumnDescriptor::new("budget", ColumnType::Number),
            ],
            departments,
        )?;
        backend.set_relation(
            "departments",
            DEPARTMENTS
                .iter()
                .enumerate()
                .map(|(index, name)| ForeignKeyOption {
                    id: CellValue::Integer(index as i64 + 1),
                    name: (*name).to_owned(),
                })
                .collect(),
        )?;

        let mut user_names = Vec::with_capacity(DEMO_USER_COUNT);
        let mut users = Vec::with_capacity(DEMO_USER_COUNT);
        for index in 0..DEMO_USER_COUNT {
            let id = index as i64 + 1;
            let first = self.rng.pick(&FIRST_NAMES);
            let last = self.rng.pick(&LAST_NAMES);
            let name = format!("{first} {last}");
            let hired_year = self.rng.int_range(2015, 2025);
            let manager = if index < 4 {
                Value::Null
            } else {
                json!(self.rng.int_range(1, 4))
            };
            users.push(json!({
                "id": id,
                "name": name,
                "email": format!("{}.{}{id}@example.com", first.to_lowercase(), last.to_lowercase()),
                "active": self.rng.int_n(5) != 0,
                "hired": self.rng.date_string(hired_year),
                "department_id": self.rng.int_range(1, DEPARTMENTS.len() as i64),
                "manager_id": manager,
            }));
            user_names.push(ForeignKeyOption {
                id: CellValue::Integer(id),
                name,
            });
        }
        backend.insert_table(
            "users",
            vec![
                ColumnDescriptor::new("id", ColumnType::Number).key(),
                ColumnDescriptor::new("name", ColumnType::Text),
                ColumnDescriptor::new("email", ColumnType::Text),
                ColumnDescriptor::new("active", ColumnType::Boolean),
                ColumnDescriptor::new("hired", ColumnType::DateString),
                ColumnDescriptor::new("department_id", ColumnType::Number)
                    .foreign_key("departments"),
                ColumnDescriptor::new("manager_id", ColumnType::Number).foreign_key("users"),
            ],
            users,
        )?;
        backend.set_relation("users", user_names)?;

        let orders = (0..DEMO_ORDER_COUNT)
            .map(|index| {
                let quantity = self.rng.int_range(1, 20);
                let unit_cents = self.rng.int_range(199, 9_999);
                json!({
                    "id": index + 1,
                    "user_id": self.rng.int_range(1, DEMO_USER_COUNT as i64),
                    "product": self.rng.pick(&PRODUCTS),
                    "quantity": quantity,
                    "total": (quantity * unit_cents) as f64 / 100.0,
                    "ordered": self.rng.date_string(2025),
                    "status": self.rng.pick(&ORDER_STATUSES),
                })
            })
            .collect::<Vec<_>>();
        backend.insert_table(
            "orders",
            vec![
                ColumnDescriptor::new("id", ColumnType::Number).key(),
                ColumnDescriptor::new("user_id", ColumnType::Number).foreign_key("users"),
                ColumnDescriptor::new("product", ColumnType::Text),
                ColumnDescriptor::new("quantity", ColumnType::Number),
                ColumnDescriptor::new("total", ColumnType::Number),
                ColumnDescriptor::new("ordered", ColumnType::DateString),
                ColumnDescriptor::new("status", ColumnType::Text),
            ],
            orders,
        )?;

        // No key column: rows are identified by every value.
        let tags = TAG_COLORS
            .iter()
            .map(|color| {
                json!({
                    "label": self.rng.pick(&PRODUCTS).to_lowercase(),
                    "color": color,
                    "pinned": self.rng.bool(),
                })
            })
            .collect::<Vec<_>>();
        backend.insert_table(
            "tags",
            vec![
                ColumnDescriptor::new("label", ColumnType::Text),
                ColumnDescriptor::new("color", ColumnType::Text),
                ColumnDescriptor::new("pinned", ColumnType::Boolean),
            ],
            tags,
        )?;

        Ok(backend)
    }
}

pub fn demo_backend() -> Result<MemoryBackend> {
    DemoFaker::new(42).backend()
}

#[cfg(test)]
mod tests {
    use super::{
        DEMO_ORDER_COUNT, DEMO_USER_COUNT, DemoFaker, MemoryBackend, Operation, json_row,
        users_backend,
    };
    use anyhow::Result;
    use gridedit_app::{
        ColumnDescriptor, ColumnFilter, ColumnType, RowQuery, RowWindow, TableBackend,
    };
    use serde_json::json;

    #[test]
    fn demo_dataset_is_deterministic() -> Result<()> {
        let left = DemoFaker::new(7).backend()?;
        let right = DemoFaker::new(7).backend()?;
        assert_eq!(left.stored_rows("users")?, right.stored_rows("users")?);
        assert_eq!(left.row_count("users")?, DEMO_USER_COUNT);
        assert_eq!(left.row_count("orders")?, DEMO_ORDER_COUNT);
        assert_eq!(
            left.list_tables()?,
            vec!["departments", "orders", "tags", "users"]
        );
        Ok(())
    }

    #[test]
    fn windows_slice_in_storage_order() -> Result<()> {
        let backend = users_backend()?;
        let rows = backend.fetch_rows(
            "users",
            Some(RowWindow {
                offset: 1,
                limit: 5,
            }),
        )?;
        let ids = rows.iter().map(|row| row["id"].clone()).collect::<Vec<_>>();
        assert_eq!(ids, vec![json!(2), json!(3)]);
        Ok(())
    }

    #[test]
    fn query_counts_all_matches_before_paging() -> Result<()> {
        let backend = users_backend()?;
        let name = ColumnDescriptor::new("name", ColumnType::Text);
        let page = backend.query_rows(
            "users",
            &RowQuery {
                limit: 1,
                offset: 0,
                filters: vec![ColumnFilter::parse(&name, "a")?],
            },
        )?;
        assert_eq!(page.count, 3);
        assert_eq!(page.data.len(), 1);
        Ok(())
    }

    #[test]
    fn mutations_match_on_key_columns() -> Result<()> {
        let backend = users_backend()?;
        let fresh = json_row(json!({"id": 4, "name": "Edsger"}))?;
        backend.create_row("users", &fresh)?;
        assert!(backend.create_row("users", &fresh).is_err(), "duplicate key");

        backend.update_row("users", &json_row(json!({"id": 4, "name": "E.W.D."}))?)?;
        let stored = backend.stored_rows("users")?;
        assert_eq!(stored[3]["name"], json!("E.W.D."));
        assert_eq!(stored[3]["manager_id"], json!(null));

        backend.delete_row("users", &json_row(json!({"id": 4}))?)?;
        assert_eq!(backend.row_count("users")?, 3);
        assert!(backend.delete_row("users", &json_row(json!({"id": 4}))?).is_err());
        Ok(())
    }

    #[test]
    fn injected_failures_are_recorded_and_recoverable() -> Result<()> {
        let backend = MemoryBackend::new();
        backend.fail(Operation::ListTables)?;
        assert!(backend.list_tables().is_err());
        backend.recover(Operation::ListTables)?;
        assert!(backend.list_tables()?.is_empty());

        backend.set_offline(true)?;
        assert!(backend.row_count("users").is_err());
        assert_eq!(
            backend.requests()?,
            vec![
                Operation::ListTables,
                Operation::ListTables,
                Operation::RowCount
            ]
        );
        Ok(())
    }
}
