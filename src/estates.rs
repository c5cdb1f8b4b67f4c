//! Estate listings: fetch the joined rows, flatten them, and narrow them
//! down by a free-text query.

use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::StoreError;
use crate::models::rows::EstateRow;
use crate::models::Estate;
use crate::store::{select_as, RemoteStore, Table, ESTATE_COLUMNS};

/// Flatten one joined row.
///
/// Missing relations become `None`; image relations whose image row is
/// gone, or has no URL, are left out so `images` only holds real URLs.
pub fn normalize(row: EstateRow) -> Estate {
    let images = row
        .estate_image_rel
        .unwrap_or_default()
        .into_iter()
        .filter_map(|rel| rel.images.and_then(|image| image.image_url))
        .collect();

    let (city, zipcode) = match row.cities {
        Some(city) => (city.name, city.zipcode),
        None => (None, None),
    };

    Estate {
        id: row.id,
        address: row.address,
        price: row.price,
        payout: row.payout,
        gross: row.gross,
        net: row.net,
        cost: row.cost,
        floor_space: row.floor_space,
        ground_space: row.ground_space,
        basement_space: row.basement_space,
        num_rooms: row.num_rooms,
        num_floors: row.num_floors,
        year_construction: row.year_construction,
        year_rebuilt: row.year_rebuilt,
        description: row.description,
        latitude: row.latitude,
        longitude: row.longitude,
        floorplan: row.floorplan,
        num_clicks: row.num_clicks,
        created_at: row.created_at,
        images,
        energy_label: row.energy_labels.and_then(|label| label.letter),
        city,
        zipcode,
        estate_type: row.estate_types.and_then(|kind| kind.name),
        employee: row.employees,
    }
}

/// True when address, city or estate type contains `needle`.
///
/// `needle` must already be lowercase. Absent fields never match.
pub fn matches(estate: &Estate, needle: &str) -> bool {
    [&estate.address, &estate.city, &estate.estate_type]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(needle))
}

/// Keep the estates matching `query`, in their original order.
///
/// An absent or blank query keeps everything. Any other query is matched
/// as given, surrounding whitespace included.
pub fn filter_estates(estates: Vec<Estate>, query: Option<&str>) -> Vec<Estate> {
    let needle = match query.filter(|q| !q.trim().is_empty()) {
        Some(q) => q.to_lowercase(),
        None => return estates,
    };

    estates
        .into_iter()
        .filter(|estate| matches(estate, &needle))
        .collect()
}

/// Listing order offered on the estates page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    PriceAsc,
    PriceDesc,
    /// Largest floor space first
    Size,
    /// Longest on the market first
    DaysDesc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "price_asc" => Ok(SortOrder::PriceAsc),
            "price_desc" => Ok(SortOrder::PriceDesc),
            "size" => Ok(SortOrder::Size),
            "days_desc" => Ok(SortOrder::DaysDesc),
            other => Err(format!(
                "unknown sort order '{}' (expected price_asc, price_desc, size or days_desc)",
                other
            )),
        }
    }
}

/// Order estates by `order`. Stable; estates lacking the key go last.
pub fn sort_estates(estates: &mut [Estate], order: SortOrder) {
    fn last_if_missing<T: PartialOrd>(a: Option<T>, b: Option<T>, reverse: bool) -> Ordering {
        match (a, b) {
            (Some(a), Some(b)) => {
                let ord = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
                if reverse {
                    ord.reverse()
                } else {
                    ord
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    estates.sort_by(|a, b| match order {
        SortOrder::PriceAsc => last_if_missing(a.price, b.price, false),
        SortOrder::PriceDesc => last_if_missing(a.price, b.price, true),
        SortOrder::Size => last_if_missing(a.floor_space, b.floor_space, true),
        SortOrder::DaysDesc => last_if_missing(a.created_at, b.created_at, false),
    });
}

/// What to list: free-text filter, optional ordering and a cap
#[derive(Debug, Clone, Default)]
pub struct EstateQuery {
    pub text: Option<String>,
    pub sort: Option<SortOrder>,
    pub limit: Option<usize>,
}

/// Estate listings backed by the remote store
pub struct EstateCatalog {
    store: Arc<dyn RemoteStore>,
}

impl EstateCatalog {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Every estate matching `query`, in source order.
    ///
    /// Any store error fails the whole call; nothing is returned partially.
    pub async fn fetch(&self, query: Option<&str>) -> Result<Vec<Estate>, StoreError> {
        info!(
            "Fetching estates from {} (query: {:?})",
            self.store.backend_name(),
            query.unwrap_or("")
        );

        let rows: Vec<EstateRow> =
            select_as(self.store.as_ref(), Table::Estates, ESTATE_COLUMNS).await?;
        let total = rows.len();

        let estates = filter_estates(rows.into_iter().map(normalize).collect(), query);
        debug!("{} of {} estates match", estates.len(), total);
        Ok(estates)
    }

    /// Like [`fetch`](Self::fetch), with sorting and a result cap applied
    /// only when asked for
    pub async fn fetch_with(&self, query: &EstateQuery) -> Result<Vec<Estate>, StoreError> {
        let mut estates = self.fetch(query.text.as_deref()).await?;

        if let Some(order) = query.sort {
            sort_estates(&mut estates, order);
        }
        if let Some(limit) = query.limit {
            estates.truncate(limit);
        }
        Ok(estates)
    }

    pub async fn find(&self, id: i64) -> Result<Estate, StoreError> {
        self.fetch(None)
            .await?
            .into_iter()
            .find(|estate| estate.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("Estate {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn estate(id: i64, address: Option<&str>, city: Option<&str>, kind: Option<&str>) -> Estate {
        normalize(
            serde_json::from_value(json!({
                "id": id,
                "address": address,
                "cities": city.map(|name| json!({ "name": name, "zipcode": "5000" })),
                "estate_types": kind.map(|name| json!({ "name": name })),
            }))
            .unwrap(),
        )
    }

    fn sample() -> Vec<Estate> {
        vec![
            estate(1, Some("Villavej 2"), None, None),
            estate(2, Some("Strandvej 9"), None, Some("Villa")),
            estate(3, Some("Havnegade 1"), Some("Odense"), None),
        ]
    }

    #[test]
    fn villa_query_keeps_first_two_in_order() {
        let ids: Vec<i64> = filter_estates(sample(), Some("villa"))
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn query_is_case_insensitive() {
        let ids: Vec<i64> = filter_estates(sample(), Some("ODENSE"))
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![3]);
    }

    #[test]
    fn empty_query_returns_everything_unchanged() {
        assert_eq!(filter_estates(sample(), None), sample());
        assert_eq!(filter_estates(sample(), Some("")), sample());
        assert_eq!(filter_estates(sample(), Some("   ")), sample());
    }

    #[test]
    fn padded_query_is_matched_as_typed() {
        assert!(filter_estates(sample(), Some("gade 1 ")).is_empty());
        assert!(filter_estates(sample(), Some(" havnegade")).is_empty());

        let ids: Vec<i64> = filter_estates(sample(), Some("gade 1"))
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![3]);
    }

    #[test]
    fn every_result_matches_and_is_a_subset() {
        let all = sample();
        for query in ["vej", "a", "1", "x", "gade"] {
            let needle = query.to_lowercase();
            for found in filter_estates(all.clone(), Some(query)) {
                assert!(all.contains(&found));
                assert!(matches(&found, &needle));
            }
        }
    }

    #[test]
    fn absent_fields_never_match() {
        let bare = estate(9, None, None, None);
        assert!(!matches(&bare, ""));
        assert!(filter_estates(vec![bare], Some("a")).is_empty());
    }

    #[test]
    fn null_relations_normalize_to_none() {
        let row: EstateRow = serde_json::from_value(json!({
            "id": 4,
            "address": "Ukendt 1",
            "estate_image_rel": null,
            "energy_labels": null,
            "cities": null,
            "estate_types": null,
            "employees": null,
        }))
        .unwrap();

        let estate = normalize(row);
        assert!(estate.images.is_empty());
        assert_eq!(estate.energy_label, None);
        assert_eq!(estate.city, None);
        assert_eq!(estate.zipcode, None);
        assert_eq!(estate.estate_type, None);
        assert_eq!(estate.employee, None);
    }

    #[test]
    fn images_keep_join_order_and_skip_nulls() {
        let row: EstateRow = serde_json::from_value(json!({
            "id": 5,
            "estate_image_rel": [
                { "image_id": 1, "images": { "image_url": "front.jpg" } },
                { "image_id": 2, "images": null },
                { "image_id": 3, "images": { "image_url": null } },
                { "image_id": 4, "images": { "image_url": "garden.jpg" } },
            ],
        }))
        .unwrap();

        let estate = normalize(row);
        assert_eq!(estate.images, vec!["front.jpg", "garden.jpg"]);
        assert_eq!(estate.primary_image(), Some("front.jpg"));
    }

    #[test]
    fn sorting_is_stable_and_puts_missing_last() {
        let mut estates = sample();
        estates[0].price = Some(3_000_000.0);
        estates[1].price = None;
        estates[2].price = Some(1_000_000.0);

        sort_estates(&mut estates, SortOrder::PriceAsc);
        assert_eq!(estates.iter().map(|e| e.id).collect::<Vec<_>>(), vec![3, 1, 2]);

        sort_estates(&mut estates, SortOrder::PriceDesc);
        assert_eq!(estates.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 3, 2]);
    }

    #[test]
    fn parses_sort_orders() {
        assert_eq!("days_desc".parse::<SortOrder>(), Ok(SortOrder::DaysDesc));
        assert!("cheapest".parse::<SortOrder>().is_err());
    }

    #[tokio::test]
    async fn catalog_fetches_and_filters_demo_listings() {
        let catalog = EstateCatalog::new(Arc::new(MemoryStore::demo()));

        let all = catalog.fetch(None).await.unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].city.as_deref(), Some("Odense"));
        assert_eq!(all[0].images.len(), 2);

        let villas = catalog.fetch(Some("Villa")).await.unwrap();
        assert!(villas.iter().all(|e| matches(e, "villa")));
        assert_eq!(villas.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2, 5]);
    }

    #[tokio::test]
    async fn unsorted_listing_keeps_source_order() {
        let catalog = EstateCatalog::new(Arc::new(MemoryStore::demo()));
        let listed = catalog
            .fetch_with(&EstateQuery {
                limit: Some(3),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(listed.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn store_failure_returns_no_data() {
        let store = Arc::new(MemoryStore::demo());
        store.fail_next("permission denied for table estates").await;

        let catalog = EstateCatalog::new(store);
        let err = catalog.fetch(Some("villa")).await.unwrap_err();
        assert_eq!(err.to_string(), "permission denied for table estates (status 500)");
    }

    #[tokio::test]
    async fn null_employee_fields_do_not_fail_the_listing() {
        let store = MemoryStore::with_rows(vec![
            (
                Table::Estates,
                vec![json!({ "id": 1, "address": "Villavej 2", "employee_id": 7 })],
            ),
            (
                Table::Employees,
                vec![json!({ "id": 7, "firstname": "Anne", "lastname": "Holm", "position": null, "email": null, "phone": null })],
            ),
        ]);
        let catalog = EstateCatalog::new(Arc::new(store));

        let estates = catalog.fetch(None).await.unwrap();
        let employee = estates[0].employee.as_ref().unwrap();
        assert_eq!(employee.full_name(), "Anne Holm");
        assert_eq!(employee.phone, "");
    }

    #[tokio::test]
    async fn find_reports_missing_estate() {
        let catalog = EstateCatalog::new(Arc::new(MemoryStore::demo()));
        assert_eq!(catalog.find(3).await.unwrap().address.as_deref(), Some("Havnegade 1"));
        assert_eq!(catalog.find(99).await.unwrap_err().to_string(), "Estate 99 not found");
    }
}
