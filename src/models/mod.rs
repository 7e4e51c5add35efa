use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod attempt;
pub mod content;
pub mod economy;
pub mod progress;
pub mod question;

/// Learner document in the "learners" collection.
///
/// `hearts`, `tokens` and `experience` are materialized balances of the
/// append-only transaction ledgers; the ledgers stay authoritative for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Learner {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub hearts: i32,
    pub tokens: i32,
    pub experience: i32,
    /// Bumped on each first-time unit completion.
    #[serde(default)]
    pub streak: i32,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt", with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

// Serde converters for chrono::DateTime <-> mongodb::bson::DateTime
pub(crate) mod bson_datetime_as_chrono {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let bson_dt = bson::DateTime::from_millis(date.timestamp_millis());
        bson_dt.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bson_dt = bson::DateTime::deserialize(deserializer)?;
        DateTime::from_timestamp_millis(bson_dt.timestamp_millis())
            .ok_or_else(|| serde::de::Error::custom("timestamp out of range"))
    }
}

pub(crate) mod bson_datetime_as_chrono_option {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        date.map(|d| bson::DateTime::from_millis(d.timestamp_millis()))
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bson_dt = Option::<bson::DateTime>::deserialize(deserializer)?;
        bson_dt
            .map(|dt| {
                DateTime::from_timestamp_millis(dt.timestamp_millis())
                    .ok_or_else(|| serde::de::Error::custom("timestamp out of range"))
            })
            .transpose()
    }
}
