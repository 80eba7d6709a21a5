use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The full feature list every plan grants. Sessions always carry this list,
/// whatever a checkout or login payload claimed.
pub const CANONICAL_FEATURES: [&str; 8] = [
    "Electronic medical records",
    "Patient registration & queue",
    "Appointment scheduling",
    "Prescription & pharmacy stock",
    "Billing & invoicing",
    "Clinical reports & analytics",
    "Multi-user role access",
    "Daily encrypted cloud backup",
];

pub fn canonical_features() -> Vec<String> {
    CANONICAL_FEATURES.iter().map(|f| f.to_string()).collect()
}

/// A purchased subscription plan, attached to a session once and never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub name: String,
    #[serde(rename = "price")]
    pub price_minor_units: i64,
    pub duration_months: u32,
    pub max_users: u32,
    pub max_patients: u32,
    pub setup_time: String,
    pub training_hours: u32,
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Starter,
    #[default]
    Professional,
    Enterprise,
}

impl PlanTier {
    pub const ALL: [PlanTier; 3] = [Self::Starter, Self::Professional, Self::Enterprise];

    pub fn plan(self) -> Plan {
        let (name, price, max_users, max_patients, setup_time, training_hours) = match self {
            Self::Starter => ("Starter", 2_500_000, 3, 2_000, "1 day", 2),
            Self::Professional => ("Professional", 5_000_000, 10, 10_000, "2 days", 8),
            Self::Enterprise => ("Enterprise", 12_000_000, 50, 1_000_000, "5 days", 24),
        };
        Plan {
            name: name.to_string(),
            price_minor_units: price,
            duration_months: 12,
            max_users,
            max_patients,
            setup_time: setup_time.to_string(),
            training_hours,
            features: canonical_features(),
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starter => "starter",
            Self::Professional => "professional",
            Self::Enterprise => "enterprise",
        };
        f.write_str(name)
    }
}

impl FromStr for PlanTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "starter" => Ok(Self::Starter),
            "professional" => Ok(Self::Professional),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(format!("unknown plan tier '{other}'")),
        }
    }
}
