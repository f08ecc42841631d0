//! Read-side statistics reporting.
//!
//! The counters themselves are maintained by the gateway's atomic
//! increments; this wrapper just reads them back for operator tooling.

use std::sync::Arc;

use crate::storage::{EnchantmentStats, PersistenceGateway, StorageError};

/// Stateless reader over the statistics table.
pub struct StatisticsAggregator {
    gateway: Arc<PersistenceGateway>,
}

impl StatisticsAggregator {
    pub fn new(gateway: Arc<PersistenceGateway>) -> Self {
        Self { gateway }
    }

    /// Counters for one enchantment. Ids are matched case-insensitively;
    /// an id that was never counted reads as all zeros.
    pub async fn read(&self, enchantment_id: &str) -> Result<EnchantmentStats, StorageError> {
        self.gateway
            .read_statistics(&enchantment_id.to_uppercase())
            .await
    }

    /// Counters for a whole listing, in the order the ids were given.
    pub async fn summary(
        &self,
        enchantment_ids: &[String],
    ) -> Result<Vec<(String, EnchantmentStats)>, StorageError> {
        let mut rows = Vec::with_capacity(enchantment_ids.len());
        for id in enchantment_ids {
            let id = id.to_uppercase();
            let stats = self.gateway.read_statistics(&id).await?;
            rows.push((id, stats));
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StatisticKind;

    #[tokio::test]
    async fn reads_are_case_insensitive_and_zero_default() {
        let dir = tempfile::tempdir().unwrap();
        let gateway =
            Arc::new(PersistenceGateway::embedded(&dir.path().join("stats.db")).unwrap());
        let aggregator = StatisticsAggregator::new(gateway.clone());

        let blank = aggregator.read("never_seen").await.unwrap();
        assert_eq!(blank.applications, 0);
        assert_eq!(blank.removals, 0);
        assert_eq!(blank.triggers, 0);

        gateway
            .increment_statistic("LIFESTEAL", StatisticKind::Applications)
            .await
            .unwrap();
        gateway
            .increment_statistic("LIFESTEAL", StatisticKind::Triggers)
            .await
            .unwrap();

        let stats = aggregator.read("lifesteal").await.unwrap();
        assert_eq!(stats.applications, 1);
        assert_eq!(stats.triggers, 1);
        gateway.shutdown();
    }

    #[tokio::test]
    async fn summary_preserves_listing_order() {
        let dir = tempfile::tempdir().unwrap();
        let gateway =
            Arc::new(PersistenceGateway::embedded(&dir.path().join("stats.db")).unwrap());
        gateway
            .increment_statistic("HASTE", StatisticKind::Removals)
            .await
            .unwrap();

        let aggregator = StatisticsAggregator::new(gateway.clone());
        let rows = aggregator
            .summary(&["haste".to_string(), "IRON_SKIN".to_string()])
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, "HASTE");
        assert_eq!(rows[0].1.removals, 1);
        assert_eq!(rows[1].0, "IRON_SKIN");
        assert_eq!(rows[1].1.applications, 0);
        gateway.shutdown();
    }
}
