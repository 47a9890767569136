use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    ConsumptionForecaster, PriceForecaster, ProductionForecaster, SiteDataSource, SiteForecast, SiteInputs,
    StorageMonitor,
};
use crate::power_flow::round_down_to_quarter;

/// Joins the individual forecasters into one site snapshot
pub struct ForecastEngine {
    pub price_forecaster: Box<dyn PriceForecaster>,
    pub consumption_forecaster: Box<dyn ConsumptionForecaster>,
    pub production_forecaster: Box<dyn ProductionForecaster>,
    pub storage_monitor: Box<dyn StorageMonitor>,
}

impl ForecastEngine {
    pub fn new(
        price: Box<dyn PriceForecaster>,
        cons: Box<dyn ConsumptionForecaster>,
        prod: Box<dyn ProductionForecaster>,
        storage: Box<dyn StorageMonitor>,
    ) -> Self {
        Self {
            price_forecaster: price,
            consumption_forecaster: cons,
            production_forecaster: prod,
            storage_monitor: storage,
        }
    }
}

#[async_trait]
impl SiteDataSource for ForecastEngine {
    async fn fetch(&self, now: DateTime<Utc>) -> Result<SiteInputs> {
        let start = round_down_to_quarter(now);
        let (prices, production, consumption, unmanaged_consumption, storage) = tokio::try_join!(
            self.price_forecaster.predict_prices(start),
            self.production_forecaster.predict_production(start),
            self.consumption_forecaster.predict_consumption(start),
            self.consumption_forecaster.predict_unmanaged_consumption(start),
            self.storage_monitor.read_storage(),
        )?;
        Ok(SiteInputs {
            forecast: SiteForecast {
                start,
                prices,
                production,
                consumption,
                unmanaged_consumption,
            },
            storage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::{
        MockConsumptionForecaster, MockPriceForecaster, MockProductionForecaster, MockStorageMonitor, StorageSnapshot,
    };
    use chrono::TimeZone;

    fn storage() -> StorageSnapshot {
        StorageSnapshot {
            capacity_wh: 8_000,
            soc_percent: 40,
            min_soc_percent: 10,
            max_charge_power_w: 4_000,
            max_discharge_power_w: 4_000,
            max_grid_buy_power_w: 11_000,
        }
    }

    fn engine(prices: MockPriceForecaster) -> ForecastEngine {
        let mut production = MockProductionForecaster::new();
        production.expect_predict_production().returning(|_| Ok(vec![Some(0); 4]));
        let mut consumption = MockConsumptionForecaster::new();
        consumption
            .expect_predict_consumption()
            .returning(|_| Ok(vec![Some(1_000), None, Some(3_000), Some(500)]));
        consumption
            .expect_predict_unmanaged_consumption()
            .returning(|_| Ok(Vec::new()));
        let mut monitor = MockStorageMonitor::new();
        monitor.expect_read_storage().returning(|| Ok(storage()));
        ForecastEngine::new(
            Box::new(prices),
            Box::new(consumption),
            Box::new(production),
            Box::new(monitor),
        )
    }

    #[tokio::test]
    async fn test_fetch_starts_at_current_quarter() {
        let quarter = Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).unwrap();
        let mut prices = MockPriceForecaster::new();
        prices
            .expect_predict_prices()
            .withf(move |start| *start == quarter)
            .times(1)
            .returning(|_| Ok(vec![Some(90.0); 4]));

        let inputs = engine(prices)
            .fetch(quarter + chrono::Duration::minutes(8))
            .await
            .unwrap();
        assert_eq!(inputs.forecast.start, quarter);
        assert_eq!(inputs.forecast.prices.len(), 4);
        assert_eq!(inputs.forecast.consumption[1], None);
        assert_eq!(inputs.storage, storage());
    }

    #[tokio::test]
    async fn test_any_failing_forecaster_fails_the_fetch() {
        let mut prices = MockPriceForecaster::new();
        prices
            .expect_predict_prices()
            .returning(|_| Err(anyhow::anyhow!("day-ahead prices not published yet")));
        let err = engine(prices).fetch(Utc::now()).await.unwrap_err();
        assert!(err.to_string().contains("not published"));
    }
}
