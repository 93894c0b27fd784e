use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, warn};

use stockcast_core::{CategoryId, ForecastResult, LocationId, ProductId, TenantId};

use crate::config::ExtractorConfig;
use crate::ports::{CacheStore, ProductCatalog, TransactionSource, cache_get, cache_set, signature_key};
use crate::timeseries::features;
use crate::timeseries::types::{
    FeatureVector, ObservationMetadata, TimeSeriesObservation, TimeSeriesRequest, TransactionRecord,
};

/// Converts raw transactions into ordered observations and feature vectors.
#[derive(Clone)]
pub struct TimeSeriesExtractor {
    transactions: Arc<dyn TransactionSource>,
    catalog: Arc<dyn ProductCatalog>,
    cache: Arc<dyn CacheStore>,
    config: ExtractorConfig,
}

#[derive(Default)]
struct Bucket {
    value: f64,
    revenue: f64,
    count: u32,
    category_id: Option<CategoryId>,
}

impl TimeSeriesExtractor {
    pub fn new(
        transactions: Arc<dyn TransactionSource>,
        catalog: Arc<dyn ProductCatalog>,
        cache: Arc<dyn CacheStore>,
        config: ExtractorConfig,
    ) -> Self {
        Self {
            transactions,
            catalog,
            cache,
            config,
        }
    }

    pub fn transactions(&self) -> &Arc<dyn TransactionSource> {
        &self.transactions
    }

    /// Extract observations sorted ascending by date (ties: product, location).
    ///
    /// Unknown products are skipped with a warning; a malformed range is a
    /// validation error.
    pub async fn extract(
        &self,
        tenant_id: TenantId,
        request: &TimeSeriesRequest,
    ) -> ForecastResult<Vec<TimeSeriesObservation>> {
        request.validate(self.config.max_range_days)?;

        let normalized = request.normalized();
        let key = signature_key("timeseries", tenant_id, &normalized)?;
        if let Some(hit) = cache_get::<Vec<TimeSeriesObservation>>(self.cache.as_ref(), &key).await {
            debug!(tenant = %tenant_id, key, "time series cache hit");
            return Ok(hit);
        }

        let mut query = normalized.to_query();
        if !normalized.product_ids.is_empty() {
            let known = self.known_products(tenant_id, &normalized.product_ids).await?;
            if known.is_empty() {
                warn!(tenant = %tenant_id, "none of the requested products exist; returning empty series");
                return Ok(Vec::new());
            }
            query = query.with_products(known);
        }

        let records = self.transactions.fetch_transactions(tenant_id, &query).await?;
        let observations = aggregate(&records, &normalized);

        let ttl = request.cache_ttl.unwrap_or(self.config.default_cache_ttl);
        cache_set(self.cache.as_ref(), &key, &observations, ttl).await;

        debug!(
            tenant = %tenant_id,
            records = records.len(),
            observations = observations.len(),
            "time series extracted"
        );
        Ok(observations)
    }

    /// Static attributes plus inventory aggregates, or `None` for an unknown product.
    pub async fn base_features(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> ForecastResult<Option<BTreeMap<String, f64>>> {
        let Some(attrs) = self.catalog.product_attributes(tenant_id, product_id).await? else {
            return Ok(None);
        };
        let levels = self.catalog.inventory_levels(tenant_id, product_id).await?;

        let mut values = features::static_features(&attrs);
        values.extend(features::inventory_features(&levels));
        Ok(Some(values))
    }

    /// Feature vectors per product per date.
    ///
    /// `history` (ascending, any products) feeds lag/rolling features when given.
    pub async fn extract_features(
        &self,
        tenant_id: TenantId,
        product_ids: &[ProductId],
        dates: &[NaiveDate],
        history: Option<&[TimeSeriesObservation]>,
    ) -> ForecastResult<Vec<FeatureVector>> {
        let mut out = Vec::with_capacity(product_ids.len() * dates.len());

        for &product_id in product_ids {
            let Some(base) = self.base_features(tenant_id, product_id).await? else {
                warn!(tenant = %tenant_id, product = %product_id, "product not found; skipping feature extraction");
                continue;
            };

            let product_history: Vec<TimeSeriesObservation> = history
                .map(|h| h.iter().filter(|o| o.product_id == product_id).cloned().collect())
                .unwrap_or_default();

            for &date in dates {
                let mut fv = FeatureVector::new(product_id, date);
                fv.merge(&base);
                fv.merge(&features::temporal_features(date));
                if !product_history.is_empty() {
                    fv.merge(&features::history_features(&product_history, date));
                }
                out.push(fv);
            }
        }

        Ok(out)
    }

    async fn known_products(
        &self,
        tenant_id: TenantId,
        product_ids: &[ProductId],
    ) -> ForecastResult<Vec<ProductId>> {
        let mut known = Vec::with_capacity(product_ids.len());
        for &product_id in product_ids {
            if self.catalog.product_attributes(tenant_id, product_id).await?.is_some() {
                known.push(product_id);
            } else {
                warn!(tenant = %tenant_id, product = %product_id, "product not found; skipping");
            }
        }
        Ok(known)
    }
}

/// Sum demand per (bucket, product, location); values clamped at zero.
///
/// A partial first bucket is dated at `request.start`, never before it.
pub(crate) fn aggregate(
    records: &[TransactionRecord],
    request: &TimeSeriesRequest,
) -> Vec<TimeSeriesObservation> {
    let mut buckets: BTreeMap<(NaiveDate, ProductId, Option<LocationId>), Bucket> = BTreeMap::new();

    for r in records {
        if r.date < request.start || r.date > request.end || !r.contributes_to_demand() {
            continue;
        }
        let bucket = request.granularity.bucket(r.date).max(request.start);
        let key = (bucket, r.product_id, r.location_id);
        let b = buckets.entry(key).or_default();
        b.value += r.demand_value(request.metric);
        b.revenue += r.demand_quantity() * r.unit_price.unwrap_or(r.unit_cost);
        b.count += 1;
        if b.category_id.is_none() {
            b.category_id = r.category_id;
        }
    }

    buckets
        .into_iter()
        .map(|((date, product_id, location_id), b)| TimeSeriesObservation {
            date,
            product_id,
            value: b.value.max(0.0),
            location_id,
            category_id: b.category_id,
            metadata: ObservationMetadata {
                transaction_count: b.count,
                revenue: b.revenue.max(0.0),
            },
        })
        .collect()
}
