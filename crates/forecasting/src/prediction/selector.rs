use std::sync::Arc;

use moka::future::Cache;
use tracing::{debug, warn};

use stockcast_core::{CategoryId, ForecastError, ForecastResult, LocationId, ModelId, ProductId, TenantId};

use crate::config::PredictorConfig;
use crate::ports::{ArtifactReader, ModelRegistry};
use crate::prediction::types::{ForecastModel, ModelArtifact, ModelType};

/// Picks the best servable model and memoises its artifact.
#[derive(Clone)]
pub struct ModelSelector {
    registry: Arc<dyn ModelRegistry>,
    artifacts: Arc<dyn ArtifactReader>,
    memo: Cache<ModelId, Arc<ModelArtifact>>,
}

impl ModelSelector {
    pub fn new(registry: Arc<dyn ModelRegistry>, artifacts: Arc<dyn ArtifactReader>, config: &PredictorConfig) -> Self {
        // Fixed-delay expiry from insertion; reads do not extend it.
        let memo = Cache::builder()
            .max_capacity(config.artifact_memo_capacity)
            .time_to_live(config.artifact_memo_ttl)
            .build();
        Self {
            registry,
            artifacts,
            memo,
        }
    }

    /// Lowest error first, then the most recently trained.
    pub async fn select(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        category_id: Option<CategoryId>,
        location_id: Option<LocationId>,
        model_type: Option<ModelType>,
    ) -> ForecastResult<ForecastModel> {
        let models = self.registry.list_models(tenant_id).await?;
        let chosen = rank(models, product_id, category_id, location_id, model_type).into_iter().next();
        match chosen {
            Some(model) => {
                debug!(tenant = %tenant_id, product = %product_id, model = %model.id, model_type = %model.model_type, "model selected");
                Ok(model)
            }
            None => Err(ForecastError::model_unavailable(format!("no servable model for product {product_id}"))),
        }
    }

    pub async fn artifact(&self, model: &ForecastModel) -> ForecastResult<Arc<ModelArtifact>> {
        let reader = Arc::clone(&self.artifacts);
        let artifact_ref = model.artifact_ref.clone();
        let artifact = self
            .memo
            .try_get_with(model.id, async move { reader.load(&artifact_ref).await.map(Arc::new) })
            .await
            .map_err(|e: Arc<ForecastError>| (*e).clone())?;
        if artifact.model_type != model.model_type {
            warn!(
                model = %model.id,
                registry = %model.model_type,
                artifact = %artifact.model_type,
                "artifact model type differs from registry; using registry type"
            );
        }
        Ok(artifact)
    }

    /// Drop the memoised artifact of one model.
    pub async fn invalidate(&self, model_id: ModelId) {
        self.memo.invalidate(&model_id).await;
    }
}

/// Servable, matching models ordered by selection preference.
pub fn rank(
    models: Vec<ForecastModel>,
    product_id: ProductId,
    category_id: Option<CategoryId>,
    location_id: Option<LocationId>,
    model_type: Option<ModelType>,
) -> Vec<ForecastModel> {
    let mut candidates: Vec<ForecastModel> = models
        .into_iter()
        .filter(|m| m.status.is_servable())
        .filter(|m| model_type.is_none_or(|t| t == m.model_type))
        .filter(|m| m.matches(product_id, category_id, location_id))
        .collect();
    candidates.sort_by(|a, b| {
        a.error_metric
            .total_cmp(&b.error_metric)
            .then(b.trained_at.cmp(&a.trained_at))
    });
    candidates
}
