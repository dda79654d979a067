use serde::{Deserialize, Serialize};

/// Customer-facing product category of a parent product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    Sneaker,
    Apparel,
    Accessory,
    Other,
}

impl ProductType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProductType::Sneaker => "sneaker",
            ProductType::Apparel => "apparel",
            ProductType::Accessory => "accessory",
            ProductType::Other => "other",
        }
    }

    /// Lenient parse: anything outside the known set becomes [`ProductType::Other`].
    #[must_use]
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sneaker" | "sneakers" => ProductType::Sneaker,
            "apparel" => ProductType::Apparel,
            "accessory" | "accessories" => ProductType::Accessory,
            _ => ProductType::Other,
        }
    }
}

impl std::fmt::Display for ProductType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical condition of a sellable unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    New,
    Used,
    Deadstock,
}

impl Condition {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Condition::New => "new",
            Condition::Used => "used",
            Condition::Deadstock => "deadstock",
        }
    }

    /// Returns `None` for anything outside `new`, `used`, `deadstock`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "new" => Some(Condition::New),
            "used" => Some(Condition::Used),
            "deadstock" => Some(Condition::Deadstock),
            _ => None,
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Unrecognized or missing confidence is treated as `Low`.
    #[must_use]
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("high") => Confidence::High,
            Some("medium") => Confidence::Medium,
            _ => Confidence::Low,
        }
    }
}

/// Validated structured guess for a raw product name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub cleaned_name: String,
    pub brand: String,
    pub model: String,
    pub product_type: ProductType,
    pub size: Option<String>,
    pub colorway: Option<String>,
    pub condition: Option<Condition>,
    pub variant_label: Option<String>,
    pub confidence: Confidence,
}

impl Classification {
    /// Whether the guess is trustworthy enough to build a parent/variant from.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.confidence != Confidence::Low
    }
}

/// One item of the upstream inventory feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawItem {
    pub external_id: String,
    pub display_name: String,
    /// Minor currency units.
    pub unit_price: Option<i64>,
    pub stock_count: i32,
}

impl RawItem {
    #[must_use]
    pub fn has_positive_price(&self) -> bool {
        self.unit_price.is_some_and(|p| p > 0)
    }
}

/// What started a background job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    Cli,
    Scheduler,
    Api,
}

impl TriggerSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerSource::Cli => "cli",
            TriggerSource::Scheduler => "scheduler",
            TriggerSource::Api => "api",
        }
    }
}
