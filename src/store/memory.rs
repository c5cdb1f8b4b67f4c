use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::traits::RemoteStore;
use super::types::{compact_columns, Match, Table, ESTATE_COLUMNS};
use crate::error::StoreError;

/// In-process stand-in for the hosted store.
///
/// Resolves the nested estate select by joining its own tables through the
/// foreign keys below, so callers see the same row shape as from PostgREST.
pub struct MemoryStore {
    tables: Mutex<HashMap<Table, Vec<Value>>>,
    next_id: AtomicI64,
    failure: Mutex<Option<String>>,
    pub calls: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1000),
            failure: Mutex::new(None),
            calls: AtomicU64::new(0),
        }
    }
}

impl MemoryStore {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with rows as given; ids are taken verbatim
    pub fn with_rows(rows: Vec<(Table, Vec<Value>)>) -> Self {
        Self {
            tables: Mutex::new(rows.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Make the next call fail with `message`
    #[cfg(test)]
    pub async fn fail_next(&self, message: &str) {
        *self.failure.lock().await = Some(message.to_string());
    }

    #[cfg(test)]
    pub async fn rows(&self, table: Table) -> Vec<Value> {
        self.tables.lock().await.get(&table).cloned().unwrap_or_default()
    }

    async fn begin(&self) -> Result<(), StoreError> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Memory store call #{}", call);
        match self.failure.lock().await.take() {
            Some(message) => Err(StoreError::Api {
                status: 500,
                message,
            }),
            None => Ok(()),
        }
    }

    fn joined_estates(tables: &HashMap<Table, Vec<Value>>) -> Vec<Value> {
        let empty = Vec::new();
        let table = |t: Table| tables.get(&t).unwrap_or(&empty);
        let by_id = |t: Table, id: Option<&Value>| -> Option<Value> {
            let id = id?;
            table(t).iter().find(|row| row.get("id") == Some(id)).cloned()
        };
        let pick = |row: Option<Value>, fields: &[&str]| -> Value {
            match row {
                Some(row) => {
                    let picked: Map<String, Value> = fields
                        .iter()
                        .map(|f| (f.to_string(), row.get(*f).cloned().unwrap_or(Value::Null)))
                        .collect();
                    Value::Object(picked)
                }
                None => Value::Null,
            }
        };

        table(Table::Estates)
            .iter()
            .map(|estate| {
                let mut row = estate.clone();
                let id = estate.get("id");

                let images: Vec<Value> = table(Table::EstateImageRel)
                    .iter()
                    .filter(|rel| rel.get("estate_id") == id)
                    .map(|rel| {
                        let image = by_id(Table::Images, rel.get("image_id"));
                        json!({
                            "image_id": rel.get("image_id").cloned().unwrap_or(Value::Null),
                            "images": pick(image, &["image_url"]),
                        })
                    })
                    .collect();

                if let Value::Object(map) = &mut row {
                    map.insert("estate_image_rel".into(), Value::Array(images));
                    map.insert(
                        "energy_labels".into(),
                        pick(by_id(Table::EnergyLabels, estate.get("energy_label_id")), &["letter"]),
                    );
                    map.insert(
                        "cities".into(),
                        pick(by_id(Table::Cities, estate.get("city_id")), &["name", "zipcode"]),
                    );
                    map.insert(
                        "estate_types".into(),
                        pick(by_id(Table::EstateTypes, estate.get("type_id")), &["name"]),
                    );
                    map.insert(
                        "employees".into(),
                        by_id(Table::Employees, estate.get("employee_id")).unwrap_or(Value::Null),
                    );
                }
                row
            })
            .collect()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn select(&self, table: Table, columns: &str) -> Result<Vec<Value>, StoreError> {
        self.begin().await?;
        let tables = self.tables.lock().await;

        let rows = if table == Table::Estates
            && compact_columns(columns) == compact_columns(ESTATE_COLUMNS)
        {
            Self::joined_estates(&tables)
        } else {
            tables.get(&table).cloned().unwrap_or_default()
        };

        debug!("Selected {} rows from memory table {}", rows.len(), table.as_str());
        Ok(rows)
    }

    async fn insert(&self, table: Table, rows: Vec<Value>) -> Result<(), StoreError> {
        self.begin().await?;
        let mut tables = self.tables.lock().await;
        let target = tables.entry(table).or_default();

        for mut row in rows {
            if let Value::Object(map) = &mut row {
                map.entry("id")
                    .or_insert_with(|| json!(self.next_id.fetch_add(1, Ordering::Relaxed)));
                map.entry("created_at")
                    .or_insert_with(|| json!(Utc::now().to_rfc3339()));
            }
            target.push(row);
        }
        Ok(())
    }

    async fn update(&self, table: Table, patch: Value, filter: &Match) -> Result<(), StoreError> {
        self.begin().await?;
        filter.require_filter("UPDATE")?;
        let mut tables = self.tables.lock().await;

        if let (Some(rows), Value::Object(fields)) = (tables.get_mut(&table), patch) {
            for row in rows.iter_mut().filter(|row| filter.matches(row)) {
                if let Value::Object(map) = row {
                    map.extend(fields.clone());
                }
            }
        }
        Ok(())
    }

    async fn delete(&self, table: Table, filter: &Match) -> Result<(), StoreError> {
        self.begin().await?;
        filter.require_filter("DELETE")?;
        let mut tables = self.tables.lock().await;

        if let Some(rows) = tables.get_mut(&table) {
            rows.retain(|row| !filter.matches(row));
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "Memory"
    }
}

impl MemoryStore {
    /// Store filled with a handful of listings around Funen, for running
    /// the CLI without a backend
    pub fn demo() -> Self {
        info!("📋 Using built-in demo listings");

        let estate = |id: i64, address: &str, city: i64, kind: i64, label: i64, agent: i64,
                      price: f64, floor_space: f64, rooms: i32, created: &str| {
            json!({
                "id": id,
                "address": address,
                "price": price,
                "payout": (price * 0.05).round(),
                "gross": (price * 0.004).round(),
                "net": (price * 0.0035).round(),
                "cost": (price * 0.0012).round(),
                "floor_space": floor_space,
                "ground_space": floor_space * 4.0,
                "basement_space": 0,
                "num_rooms": rooms,
                "num_floors": 1,
                "year_construction": 1968,
                "year_rebuilt": 2015,
                "description": format!("Lys og velholdt bolig på {}.", address),
                "latitude": 55.3959,
                "longitude": 10.3883,
                "floorplan": null,
                "num_clicks": id * 17,
                "created_at": created,
                "city_id": city,
                "type_id": kind,
                "energy_label_id": label,
                "employee_id": agent,
            })
        };

        Self::with_rows(vec![
            (
                Table::Cities,
                vec![
                    json!({ "id": 1, "name": "Odense", "zipcode": "5000" }),
                    json!({ "id": 2, "name": "Svendborg", "zipcode": "5700" }),
                    json!({ "id": 3, "name": "Nyborg", "zipcode": "5800" }),
                ],
            ),
            (
                Table::EstateTypes,
                vec![
                    json!({ "id": 1, "name": "Villa" }),
                    json!({ "id": 2, "name": "Ejerlejlighed" }),
                    json!({ "id": 3, "name": "Andelsbolig" }),
                ],
            ),
            (
                Table::EnergyLabels,
                vec![
                    json!({ "id": 1, "letter": "A" }),
                    json!({ "id": 2, "letter": "B" }),
                    json!({ "id": 3, "letter": "C" }),
                    json!({ "id": 4, "letter": "D" }),
                ],
            ),
            (
                Table::Employees,
                vec![
                    json!({ "id": 1, "firstname": "Anne", "lastname": "Holm", "position": "Indehaver, Statsaut. ejendomsmægler", "email": "anne@homelands.dk", "phone": "+45 7070 4000", "image_url": null }),
                    json!({ "id": 2, "firstname": "Peter", "lastname": "Skov", "position": "Ejendomsmægler", "email": "peter@homelands.dk", "phone": "+45 7070 4001", "image_url": null }),
                    json!({ "id": 3, "firstname": "Sofie", "lastname": "Lund", "position": "Sagsbehandler", "email": "sofie@homelands.dk", "phone": "+45 7070 4002", "image_url": null }),
                ],
            ),
            (
                Table::Images,
                vec![
                    json!({ "id": 1, "image_url": "https://images.homelands.dk/villavej-2-front.jpg" }),
                    json!({ "id": 2, "image_url": "https://images.homelands.dk/villavej-2-have.jpg" }),
                    json!({ "id": 3, "image_url": "https://images.homelands.dk/strandvej-9.jpg" }),
                ],
            ),
            (
                Table::EstateImageRel,
                vec![
                    json!({ "estate_id": 1, "image_id": 1 }),
                    json!({ "estate_id": 1, "image_id": 2 }),
                    json!({ "estate_id": 2, "image_id": 3 }),
                ],
            ),
            (
                Table::Estates,
                vec![
                    estate(1, "Villavej 2", 1, 1, 2, 1, 3_495_000.0, 142.0, 5, "2024-08-14T09:30:00Z"),
                    estate(2, "Strandvej 9", 2, 1, 1, 2, 5_950_000.0, 188.0, 6, "2024-09-02T12:00:00Z"),
                    estate(3, "Havnegade 1", 3, 2, 3, 2, 1_895_000.0, 76.0, 3, "2024-07-21T08:15:00Z"),
                    estate(4, "Kongensgade 44, 2. th", 1, 3, 4, 3, 995_000.0, 64.0, 2, "2024-10-01T10:45:00Z"),
                    estate(5, "Skovbrynet 17", 2, 1, 2, 1, 2_750_000.0, 131.0, 4, "2024-06-11T14:20:00Z"),
                ],
            ),
            (
                Table::Reviews,
                vec![
                    json!({ "id": 1, "name": "Mette Larsen", "title": "Tryg handel", "content": "Anne guidede os sikkert gennem hele salget.", "user_id": "demo-user-1", "created_at": "2024-05-03T10:00:00Z" }),
                    json!({ "id": 2, "name": "Jens Poulsen", "title": "Hurtigt salg", "content": "Huset var solgt på tre uger.", "user_id": "demo-user-2", "created_at": "2024-09-18T16:30:00Z" }),
                ],
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn nested_select_joins_relations() {
        let store = MemoryStore::demo();
        let rows = store.select(Table::Estates, ESTATE_COLUMNS).await.unwrap();

        let first = &rows[0];
        assert_eq!(first["cities"]["name"], "Odense");
        assert_eq!(first["estate_types"]["name"], "Villa");
        assert_eq!(first["energy_labels"]["letter"], "B");
        assert_eq!(first["employees"]["firstname"], "Anne");
        assert_eq!(first["estate_image_rel"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_relations_join_as_null() {
        let store = MemoryStore::with_rows(vec![
            (Table::Estates, vec![json!({ "id": 9, "address": "Ukendt 1", "city_id": 42 })]),
            (Table::EstateImageRel, vec![json!({ "estate_id": 9, "image_id": 77 })]),
        ]);
        let rows = store.select(Table::Estates, ESTATE_COLUMNS).await.unwrap();

        assert!(rows[0]["cities"].is_null());
        assert!(rows[0]["employees"].is_null());
        assert!(rows[0]["estate_image_rel"][0]["images"].is_null());
    }

    #[tokio::test]
    async fn insert_assigns_ids_and_delete_matches() {
        let store = MemoryStore::new();
        store
            .insert(Table::NewsletterEmails, vec![json!({ "email": "a@b.dk" })])
            .await
            .unwrap();

        let rows = store.rows(Table::NewsletterEmails).await;
        let id = rows[0]["id"].as_i64().unwrap();
        assert!(rows[0].get("created_at").is_some());

        store.delete(Table::NewsletterEmails, &Match::id(id)).await.unwrap();
        assert!(store.rows(Table::NewsletterEmails).await.is_empty());
    }

    #[tokio::test]
    async fn unfiltered_writes_are_refused() {
        let store = MemoryStore::demo();

        let err = store.delete(Table::Reviews, &Match::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "DELETE requires a WHERE clause (status 400)");
        let err = store
            .update(Table::Reviews, json!({ "title": "x" }), &Match::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "UPDATE requires a WHERE clause (status 400)");

        assert_eq!(store.rows(Table::Reviews).await.len(), 2);
        assert_eq!(store.rows(Table::Reviews).await[0]["title"], "Tryg handel");
    }

    #[tokio::test]
    async fn fail_next_affects_exactly_one_call() {
        let store = MemoryStore::new();
        store.fail_next("boom").await;

        let err = store.select(Table::Reviews, "*").await.unwrap_err();
        assert_eq!(err.to_string(), "boom (status 500)");
        assert!(store.select(Table::Reviews, "*").await.is_ok());
        assert_eq!(store.calls.load(Ordering::Relaxed), 2);
    }
}
