use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

use stockcast_core::{CategoryId, ForecastError, ForecastResult, LocationId, ProductId};

/// Kind of stock movement recorded by the transactional store.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Sale,
    Return,
    Receipt,
    Adjustment,
}

/// One raw transaction line as returned by the transaction source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub date: NaiveDate,
    pub product_id: ProductId,
    pub category_id: Option<CategoryId>,
    pub location_id: Option<LocationId>,
    pub kind: TransactionKind,
    pub quantity: f64,
    pub unit_cost: f64,
    pub unit_price: Option<f64>,
}

impl TransactionRecord {
    pub fn sale(date: NaiveDate, product_id: ProductId, quantity: f64, unit_cost: f64) -> Self {
        Self {
            date,
            product_id,
            category_id: None,
            location_id: None,
            kind: TransactionKind::Sale,
            quantity,
            unit_cost,
            unit_price: None,
        }
    }

    pub fn with_category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_location(mut self, location_id: LocationId) -> Self {
        self.location_id = Some(location_id);
        self
    }

    pub fn with_kind(mut self, kind: TransactionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_unit_price(mut self, unit_price: f64) -> Self {
        self.unit_price = Some(unit_price);
        self
    }

    /// Signed demand contribution: sales add, returns subtract, stock movements are ignored.
    pub fn demand_quantity(&self) -> f64 {
        match self.kind {
            TransactionKind::Sale => self.quantity.abs(),
            TransactionKind::Return => -self.quantity.abs(),
            TransactionKind::Receipt | TransactionKind::Adjustment => 0.0,
        }
    }

    pub fn contributes_to_demand(&self) -> bool {
        matches!(self.kind, TransactionKind::Sale | TransactionKind::Return)
    }

    pub fn demand_value(&self, metric: DemandMetric) -> f64 {
        match metric {
            DemandMetric::Quantity => self.demand_quantity(),
            DemandMetric::Revenue => self.demand_quantity() * self.unit_price.unwrap_or(self.unit_cost),
        }
    }
}

/// Filter handed to the transaction source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Empty means "all products".
    pub product_ids: Vec<ProductId>,
    pub category_id: Option<CategoryId>,
    pub location_id: Option<LocationId>,
}

impl TransactionQuery {
    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            product_ids: Vec::new(),
            category_id: None,
            location_id: None,
        }
    }

    pub fn with_products(mut self, product_ids: Vec<ProductId>) -> Self {
        self.product_ids = product_ids;
        self
    }

    pub fn with_category(mut self, category_id: Option<CategoryId>) -> Self {
        self.category_id = category_id;
        self
    }

    pub fn with_location(mut self, location_id: Option<LocationId>) -> Self {
        self.location_id = location_id;
        self
    }

    pub fn matches(&self, record: &TransactionRecord) -> bool {
        record.date >= self.start
            && record.date <= self.end
            && (self.product_ids.is_empty() || self.product_ids.contains(&record.product_id))
            && self.category_id.is_none_or(|c| record.category_id == Some(c))
            && self.location_id.is_none_or(|l| record.location_id == Some(l))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    #[default]
    Daily,
    /// Buckets start on ISO-week Mondays.
    Weekly,
    /// Buckets start on the first of the month.
    Monthly,
}

impl Granularity {
    pub fn bucket(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Daily => date,
            Granularity::Weekly => {
                let back = date.weekday().num_days_from_monday() as u64;
                date.checked_sub_days(Days::new(back)).unwrap_or(date)
            }
            Granularity::Monthly => date.with_day(1).unwrap_or(date),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemandMetric {
    #[default]
    Quantity,
    Revenue,
}

/// Validated extraction request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesRequest {
    pub product_ids: Vec<ProductId>,
    pub category_id: Option<CategoryId>,
    pub location_id: Option<LocationId>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub granularity: Granularity,
    pub metric: DemandMetric,
    /// Not part of the cache signature.
    #[serde(skip)]
    pub cache_ttl: Option<Duration>,
}

impl TimeSeriesRequest {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            product_ids: Vec::new(),
            category_id: None,
            location_id: None,
            start,
            end,
            granularity: Granularity::Daily,
            metric: DemandMetric::Quantity,
            cache_ttl: None,
        }
    }

    pub fn with_products(mut self, product_ids: Vec<ProductId>) -> Self {
        self.product_ids = product_ids;
        self
    }

    pub fn with_category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_location(mut self, location_id: LocationId) -> Self {
        self.location_id = Some(location_id);
        self
    }

    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn with_metric(mut self, metric: DemandMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn validate(&self, max_range_days: i64) -> ForecastResult<()> {
        if self.start > self.end {
            return Err(ForecastError::validation(format!(
                "start date {} is after end date {}",
                self.start, self.end
            )));
        }
        let span = (self.end - self.start).num_days();
        if span > max_range_days {
            return Err(ForecastError::validation(format!(
                "date range of {span} days exceeds the maximum of {max_range_days}"
            )));
        }
        if self.cache_ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(ForecastError::validation("cache ttl must be positive"));
        }
        Ok(())
    }

    /// Canonical form used for the cache signature (sorted, deduplicated products).
    pub fn normalized(&self) -> Self {
        let mut n = self.clone();
        n.product_ids.sort();
        n.product_ids.dedup();
        n
    }

    pub fn to_query(&self) -> TransactionQuery {
        TransactionQuery::between(self.start, self.end)
            .with_products(self.product_ids.clone())
            .with_category(self.category_id)
            .with_location(self.location_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationMetadata {
    pub transaction_count: u32,
    pub revenue: f64,
}

/// One aggregated demand observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesObservation {
    pub date: NaiveDate,
    pub product_id: ProductId,
    pub value: f64,
    pub location_id: Option<LocationId>,
    pub category_id: Option<CategoryId>,
    pub metadata: ObservationMetadata,
}

/// Static attributes of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductAttributes {
    pub product_id: ProductId,
    pub name: String,
    pub category_id: Option<CategoryId>,
    pub unit_price: f64,
    pub cost_price: f64,
    pub lead_time_days: Option<u32>,
    pub shelf_life_days: Option<u32>,
}

/// Stock on hand at one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryLevel {
    pub location_id: LocationId,
    pub quantity: f64,
}

/// Numeric features for one product on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub product_id: ProductId,
    pub date: NaiveDate,
    pub values: BTreeMap<String, f64>,
}

impl FeatureVector {
    pub fn new(product_id: ProductId, date: NaiveDate) -> Self {
        Self {
            product_id,
            date,
            values: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    /// Later values win.
    pub fn merge(&mut self, other: &BTreeMap<String, f64>) {
        for (k, v) in other {
            self.values.insert(k.clone(), *v);
        }
    }

    /// Share of `expected` feature names present with a finite value.
    ///
    /// An empty expectation counts as complete.
    pub fn completeness(&self, expected: &[String]) -> f64 {
        if expected.is_empty() {
            return 1.0;
        }
        let present = expected
            .iter()
            .filter(|name| self.get(name).is_some_and(f64::is_finite))
            .count();
        present as f64 / expected.len() as f64
    }
}
