mod provider_config;

pub use provider_config::{
    BackpressurePolicy, ConcurrencyAndBufferSize, NetworkConfig, ProviderConfig,
};
