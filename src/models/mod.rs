pub mod rows;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Estate agent, referenced by estates and contact messages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Employee {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub firstname: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub lastname: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub position: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub phone: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl Employee {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.firstname, self.lastname).trim().to_string()
    }
}

/// Flattened, read-only estate listing.
///
/// Every nested relation of the joined row has been collapsed into a plain
/// optional field; `images` is never null, only empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Estate {
    pub id: i64,
    pub address: Option<String>,
    pub price: Option<f64>,
    pub payout: Option<f64>,
    pub gross: Option<f64>,
    pub net: Option<f64>,
    /// Monthly owner cost
    pub cost: Option<f64>,
    pub floor_space: Option<f64>,
    pub ground_space: Option<f64>,
    pub basement_space: Option<f64>,
    pub num_rooms: Option<i32>,
    pub num_floors: Option<i32>,
    pub year_construction: Option<i32>,
    pub year_rebuilt: Option<i32>,
    pub description: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub floorplan: Option<String>,
    pub num_clicks: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub images: Vec<String>,
    #[serde(rename = "energyLabel")]
    pub energy_label: Option<String>,
    pub city: Option<String>,
    pub zipcode: Option<String>,
    #[serde(rename = "estateType")]
    pub estate_type: Option<String>,
    pub employee: Option<Employee>,
}

impl Estate {
    pub fn primary_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }
}

/// Customer review shown on the front page.
///
/// Reviews added locally keep exactly the fields that were submitted, so
/// `id` stays empty until the list is fetched again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Review {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_datetime",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

/// Fields submitted when writing a review
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewReview {
    pub name: String,
    pub title: String,
    pub content: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<NewReview> for Review {
    fn from(review: NewReview) -> Self {
        Self {
            id: None,
            name: review.name,
            title: review.title,
            content: review.content,
            user_id: Some(review.user_id),
            created_at: review.created_at,
        }
    }
}

/// Partial update of a review; `None` fields are left as they are
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReviewPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ReviewPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none()
    }

    pub fn apply(&self, review: &mut Review) {
        if let Some(title) = &self.title {
            review.title = title.clone();
        }
        if let Some(content) = &self.content {
            review.content = content.clone();
        }
    }
}

/// Row written to `contact_messages`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContactMessage {
    pub name: String,
    pub email: String,
    pub employee_id: i64,
    pub message: String,
}

/// Row written to `newsletter_emails`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsletterEmail {
    pub email: String,
}

/// Reads `null` the same as a missing key
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts a JSON number, a numeric string, or null.
///
/// Postgres `numeric` columns and hand-entered coordinates both show up as
/// strings in some rows.
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(n)) => Some(n),
        Some(Raw::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

/// Accepts RFC 3339 timestamps as well as zone-less ones (read as UTC).
///
/// Anything unparseable becomes `None` rather than failing the row.
pub fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|text| {
        DateTime::parse_from_rfc3339(&text)
            .map(|at| at.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
    }))
}
