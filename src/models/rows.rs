//! Raw rows as returned by the nested estate select, before flattening.
//!
//! Every relation is optional: PostgREST returns `null` for a missing
//! foreign row and omits nothing, but hand-written fixtures and older
//! schema versions may leave keys out entirely.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{lenient_datetime, lenient_f64, Employee};

#[derive(Debug, Clone, Deserialize)]
pub struct EstateRow {
    pub id: i64,
    pub address: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub payout: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub gross: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub net: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub cost: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub floor_space: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub ground_space: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub basement_space: Option<f64>,
    pub num_rooms: Option<i32>,
    pub num_floors: Option<i32>,
    pub year_construction: Option<i32>,
    pub year_rebuilt: Option<i32>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub longitude: Option<f64>,
    pub floorplan: Option<String>,
    pub num_clicks: Option<i64>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub created_at: Option<DateTime<Utc>>,
    pub estate_image_rel: Option<Vec<ImageRel>>,
    pub energy_labels: Option<EnergyLabelRef>,
    pub cities: Option<CityRef>,
    pub estate_types: Option<EstateTypeRef>,
    pub employees: Option<Employee>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageRel {
    pub images: Option<ImageRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageRef {
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnergyLabelRef {
    pub letter: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CityRef {
    pub name: Option<String>,
    /// Stored as text in some deployments and as an integer in others
    #[serde(default, deserialize_with = "zipcode_text")]
    pub zipcode: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EstateTypeRef {
    pub name: Option<String>,
}

fn zipcode_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
