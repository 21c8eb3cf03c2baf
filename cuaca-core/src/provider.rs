use crate::{Config, error::FetchError, provider::openweather::OpenWeatherProvider};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;

pub mod openweather;

/// Source of raw "current conditions + hourly" documents for the configured point.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    /// Fetch one parsed document. Shape checks are left to the normalizer.
    async fn fetch(&self) -> Result<Value, FetchError>;
}

/// Construct the primary provider from config.
pub fn provider_from_config(config: &Config) -> Result<Box<dyn WeatherProvider>, FetchError> {
    let api_key = config.api_key().ok_or(FetchError::MissingApiKey)?;

    let provider = OpenWeatherProvider::new(
        api_key,
        &config.provider.base_url,
        config.location.latitude,
        config.location.longitude,
        config.request_timeout(),
    )?;

    Ok(Box::new(provider))
}
