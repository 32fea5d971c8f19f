//! Provider over a polled snapshot source

use async_trait::async_trait;
use std::sync::Arc;

use super::Provider;
use crate::cache::AggregationCache;
use crate::error::Result;
use crate::models::Series;
use crate::parser::Parser;
use crate::provider::source::SnapshotSource;

/// Fetches one snapshot per call and merges it into a shared aggregation cache
pub struct UrlProvider {
    source: Arc<dyn SnapshotSource>,
    parser: Parser,
    cache: AggregationCache,
}

impl UrlProvider {
    pub fn new(source: Arc<dyn SnapshotSource>, parser: Parser, cache: AggregationCache) -> Self {
        Self {
            source,
            parser,
            cache,
        }
    }
}

#[async_trait]
impl Provider for UrlProvider {
    async fn get(&mut self) -> Result<Vec<Series>> {
        let raw = self.source.get().await?;
        let batch = self.parser.parse(&raw)?;
        tracing::debug!(source = %self.source, series = batch.len(), "Fetched metrics snapshot");
        Ok(self.cache.add(batch))
    }

    fn describe(&self) -> String {
        self.source.to_string()
    }
}
