//! Shared domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Account record returned by the auth endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Server-assigned account identifier.
    pub id: i64,
    /// Email address used to sign in.
    pub email: String,
    /// Whether the account has administrative rights.
    #[serde(default)]
    pub is_admin: bool,
    /// Account creation timestamp.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Timestamp of the most recent sign-in.
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
    /// Free-form preference object owned by the server.
    #[serde(default)]
    pub preferences: Value,
}

/// A single stat multiplier inside a weight set.
///
/// A value of 1.0 is neutral; below 1.0 deprioritizes the stat and above
/// 1.0 prioritizes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weight {
    /// Stat identifier (e.g. `hp`, `heroic_str`).
    pub stat: String,
    /// Multiplier applied when ranking items.
    pub value: f64,
}

/// A user-authored, named collection of stat multipliers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightSet {
    /// Server-assigned identifier.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Stat multipliers; stats are unique within one set.
    pub weights: Vec<Weight>,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last-modified timestamp.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Payload for creating a weight set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWeightSet {
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Stat multipliers; stats must be unique.
    pub weights: Vec<Weight>,
}

/// Partial update for an existing weight set. Unset fields are left
/// untouched by the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeightSetPatch {
    /// Replacement display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Replacement description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Replacement multipliers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<Weight>>,
}
