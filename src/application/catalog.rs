//! Price quotes for product pages and the variant picker.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

use crate::domain::aggregates::{purchase_limit, AttributeValue, ProductError};
use crate::domain::pricing::{resolve_for, PriceQuote};
use crate::domain::value_objects::{ProductId, VariantId};
use crate::remote::{CatalogRemote, RemoteError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuoteError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Product(#[from] ProductError),

    #[error("no variant of {0} matches the selection")]
    NoMatchingVariant(ProductId),
}

/// A resolved price plus how many units a shopper may put in the cart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantQuote {
    pub variant_id: VariantId,
    pub price: PriceQuote,
    pub max_quantity: u32,
}

pub struct PriceQuoter {
    catalog: Arc<dyn CatalogRemote>,
}

impl std::fmt::Debug for PriceQuoter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.debug_struct("PriceQuoter").finish_non_exhaustive() }
}

impl PriceQuoter {
    pub fn new(catalog: Arc<dyn CatalogRemote>) -> Self { Self { catalog } }

    #[instrument(skip(self))]
    pub async fn quote(&self, product_id: &ProductId, variant_id: &VariantId, now: DateTime<Utc>) -> Result<VariantQuote, QuoteError> {
        let product = self.catalog.fetch_product(product_id).await?;
        let variant = product.variant(variant_id)?;
        Ok(VariantQuote {
            variant_id: variant.id.clone(),
            price: resolve_for(&product, variant, now),
            max_quantity: purchase_limit(variant, product.active_flash_sale(&variant.id, now)),
        })
    }

    /// Quote for whichever variant matches the picker's attribute selection.
    #[instrument(skip(self))]
    pub async fn quote_selection(
        &self,
        product_id: &ProductId,
        selection: &[AttributeValue],
        now: DateTime<Utc>,
    ) -> Result<VariantQuote, QuoteError> {
        let product = self.catalog.fetch_product(product_id).await?;
        let variant = product.variant_for_selection(selection).ok_or_else(|| QuoteError::NoMatchingVariant(product_id.clone()))?;
        Ok(VariantQuote {
            variant_id: variant.id.clone(),
            price: resolve_for(&product, variant, now),
            max_quantity: purchase_limit(variant, product.active_flash_sale(&variant.id, now)),
        })
    }
}
