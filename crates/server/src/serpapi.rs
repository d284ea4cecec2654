//! Reqwest-backed SerpApi adapter for the flight and hotel price lookups.
//!
//! The adapter owns transport details only. Query validation and airport resolution happen
//! in [`FlightSearch::prepare`] and [`HotelSearch::prepare`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tripdesk_core::config::PricingConfig;
use tripdesk_core::pricing::{
    FlightOffer, FlightSearch, HotelOffer, HotelSearch, PriceLookup, PriceLookupError,
};

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct SerpApiPriceLookup {
    client: Client,
    base_url: String,
    api_key: SecretString,
    currency: String,
    language: String,
}

impl SerpApiPriceLookup {
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key,
            currency: "CNY".to_owned(),
            language: "zh-cn".to_owned(),
        })
    }

    /// `None` when pricing is disabled or no key is configured.
    pub fn from_config(config: &PricingConfig) -> Result<Option<Self>, reqwest::Error> {
        let Some(api_key) = config.api_key.clone().filter(|_| config.enabled) else {
            return Ok(None);
        };

        let mut lookup =
            Self::new(config.base_url.clone(), api_key, Duration::from_secs(config.timeout_secs))?;
        lookup.currency = config.currency.clone();
        lookup.language = config.language.clone();
        Ok(Some(lookup))
    }

    async fn fetch(&self, params: Vec<(&'static str, String)>) -> Result<String, PriceLookupError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&params)
            .query(&[
                ("currency", self.currency.as_str()),
                ("hl", self.language.as_str()),
                ("api_key", self.api_key.expose_secret()),
            ])
            .send()
            .await
            .map_err(|error| PriceLookupError::Transport(error.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| PriceLookupError::Transport(error.without_url().to_string()))?;
        if !status.is_success() {
            return Err(PriceLookupError::Upstream(
                upstream_message(&body).unwrap_or_else(|| format!("HTTP {status}")),
            ));
        }
        Ok(body)
    }
}

#[async_trait]
impl PriceLookup for SerpApiPriceLookup {
    async fn search_flights(
        &self,
        search: FlightSearch,
    ) -> Result<Vec<FlightOffer>, PriceLookupError> {
        let query = search.prepare()?;

        let mut params = vec![
            ("engine", "google_flights".to_owned()),
            ("departure_id", query.departure_id),
            ("arrival_id", query.arrival_id),
            ("outbound_date", query.outbound_date.format(DATE_FORMAT).to_string()),
            ("type", query.search_type.to_string()),
            ("travel_class", query.travel_class.to_string()),
        ];
        if let Some(return_date) = query.return_date {
            params.push(("return_date", return_date.format(DATE_FORMAT).to_string()));
        }

        let body = self.fetch(params).await?;
        parse_flights(&body)
    }

    async fn search_hotels(&self, search: HotelSearch) -> Result<Vec<HotelOffer>, PriceLookupError> {
        let query = search.prepare()?;

        let params = vec![
            ("engine", "google_hotels".to_owned()),
            ("q", query.q),
            ("check_in_date", query.check_in_date.format(DATE_FORMAT).to_string()),
            ("check_out_date", query.check_out_date.format(DATE_FORMAT).to_string()),
            ("adults", query.adults.to_string()),
        ];

        let body = self.fetch(params).await?;
        parse_hotels(&body)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorDto {
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FlightsDto {
    error: Option<String>,
    #[serde(default)]
    best_flights: Vec<FlightGroupDto>,
    #[serde(default)]
    other_flights: Vec<FlightGroupDto>,
}

#[derive(Debug, Deserialize)]
struct FlightGroupDto {
    price: Option<f64>,
    total_duration: Option<u32>,
    #[serde(default)]
    flights: Vec<FlightLegDto>,
}

#[derive(Debug, Deserialize)]
struct FlightLegDto {
    airline: Option<String>,
    flight_number: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct HotelsDto {
    error: Option<String>,
    #[serde(default)]
    properties: Vec<PropertyDto>,
}

#[derive(Debug, Deserialize)]
struct PropertyDto {
    name: Option<String>,
    overall_rating: Option<f64>,
    reviews: Option<u32>,
    rate_per_night: Option<RateDto>,
}

#[derive(Debug, Deserialize)]
struct RateDto {
    extracted_lowest: Option<f64>,
}

fn upstream_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorDto>(body).ok().and_then(|dto| dto.error)
}

fn money(value: f64) -> Option<Decimal> {
    Decimal::try_from(value).ok().map(|amount| amount.round_dp(2))
}

fn decode_error(error: serde_json::Error) -> PriceLookupError {
    PriceLookupError::Upstream(format!("unexpected response shape: {error}"))
}

fn parse_flights(body: &str) -> Result<Vec<FlightOffer>, PriceLookupError> {
    let dto: FlightsDto = serde_json::from_str(body).map_err(decode_error)?;
    if let Some(error) = dto.error {
        return Err(PriceLookupError::Upstream(error));
    }

    Ok(dto
        .best_flights
        .into_iter()
        .chain(dto.other_flights)
        .filter_map(|group| {
            let price = group.price.and_then(money)?;
            let first_leg = group.flights.first();
            Some(FlightOffer {
                airline: first_leg.and_then(|leg| leg.airline.clone()).unwrap_or_default(),
                flight_number: first_leg
                    .and_then(|leg| leg.flight_number.clone())
                    .unwrap_or_default(),
                price,
                total_duration_minutes: group.total_duration,
            })
        })
        .collect())
}

fn parse_hotels(body: &str) -> Result<Vec<HotelOffer>, PriceLookupError> {
    let dto: HotelsDto = serde_json::from_str(body).map_err(decode_error)?;
    if let Some(error) = dto.error {
        return Err(PriceLookupError::Upstream(error));
    }

    Ok(dto
        .properties
        .into_iter()
        .filter_map(|property| {
            Some(HotelOffer {
                name: property.name?,
                overall_rating: property.overall_rating,
                reviews: property.reviews,
                rate_per_night: property
                    .rate_per_night
                    .and_then(|rate| rate.extracted_lowest)
                    .and_then(money),
            })
        })
        .collect())
}
