use serde::Deserialize;
use tracing::info;

use fair_value_core::config::ValuationConfig;
use fair_value_core::data::{FinancialObservation, MarketSnapshot, ObservationStore, RateBook};

use super::file::read_structured;

/// On-disk shape of a dataset file.
#[derive(Debug, Deserialize)]
struct DatasetFile {
    observations: Vec<FinancialObservation>,
    #[serde(default)]
    rates: RateBook,
    #[serde(default)]
    market: MarketSnapshot,
}

/// Everything a batch run reads, loaded up front and then shared read-only.
pub struct Dataset {
    pub store: ObservationStore,
    pub rates: RateBook,
    pub market: MarketSnapshot,
}

impl Dataset {
    pub fn load(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let file: DatasetFile = read_structured(path)?;
        let store = ObservationStore::new(file.observations);
        info!(
            path,
            observations = store.len(),
            entities = store.entities().len(),
            "Loaded dataset"
        );
        Ok(Self {
            store,
            rates: file.rates,
            market: file.market,
        })
    }
}

/// Config from a JSON/YAML file, or the defaults when no file is given.
pub fn load_config(path: Option<&str>) -> Result<ValuationConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => read_structured::<ValuationConfig>(path)?,
        None => ValuationConfig::default(),
    };
    config.validate()?;
    Ok(config)
}
