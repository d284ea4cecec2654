//! Contract for the external flight/hotel price search used to pre-fill budgets.
//!
//! Lookups are advisory: callers turn every failure into a [`BudgetEstimate::Unavailable`]
//! and carry on with request submission.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::request::{CabinClass, FlightDetails, HotelDetails, TripType};

const CITY_CODES: &[(&str, &str)] = &[
    ("北京", "BJS"),
    ("BEIJING", "BJS"),
    ("上海", "SHA"),
    ("SHANGHAI", "SHA"),
    ("广州", "CAN"),
    ("GUANGZHOU", "CAN"),
    ("深圳", "SZX"),
    ("SHENZHEN", "SZX"),
    ("成都", "CTU"),
    ("CHENGDU", "CTU"),
    ("杭州", "HGH"),
    ("HANGZHOU", "HGH"),
    ("昆明", "KMG"),
    ("KUNMING", "KMG"),
    ("西安", "XIY"),
    ("XIAN", "XIY"),
    ("重庆", "CKG"),
    ("CHONGQING", "CKG"),
    ("武汉", "WUH"),
    ("WUHAN", "WUH"),
    ("长沙", "CSX"),
    ("CHANGSHA", "CSX"),
    ("南京", "NKG"),
    ("NANJING", "NKG"),
    ("厦门", "XMN"),
    ("XIAMEN", "XMN"),
    ("青岛", "TAO"),
    ("QINGDAO", "TAO"),
    ("大连", "DLC"),
    ("DALIAN", "DLC"),
    ("天津", "TSN"),
    ("TIANJIN", "TSN"),
    ("三亚", "SYX"),
    ("SANYA", "SYX"),
    ("海口", "HAK"),
    ("HAIKOU", "HAK"),
    ("乌鲁木齐", "URC"),
    ("URUMQI", "URC"),
    ("哈尔滨", "HRB"),
    ("HARBIN", "HRB"),
    ("沈阳", "SHE"),
    ("SHENYANG", "SHE"),
    ("长春", "CGQ"),
    ("CHANGCHUN", "CGQ"),
    ("兰州", "LHW"),
    ("LANZHOU", "LHW"),
    ("贵阳", "KWE"),
    ("GUIYANG", "KWE"),
    ("南宁", "NNG"),
    ("NANNING", "NNG"),
    ("福州", "FOC"),
    ("FUZHOU", "FOC"),
    ("太原", "TYN"),
    ("TAIYUAN", "TYN"),
    ("济南", "TNA"),
    ("JINAN", "TNA"),
    ("合肥", "HFE"),
    ("HEFEI", "HFE"),
    ("石家庄", "SJW"),
    ("SHIJIAZHUANG", "SJW"),
    ("南昌", "KHN"),
    ("NANCHANG", "KHN"),
    ("郑州", "CGO"),
    ("ZHENGZHOU", "CGO"),
    ("香港", "HKG"),
    ("HONGKONG", "HKG"),
    ("澳门", "MFM"),
    ("MACAU", "MFM"),
    ("台北", "TPE"),
    ("TAIPEI", "TPE"),
    ("东京", "TYO"),
    ("TOKYO", "TYO"),
    ("大阪", "OSA"),
    ("OSAKA", "OSA"),
    ("首尔", "SEL"),
    ("SEOUL", "SEL"),
    ("新加坡", "SIN"),
    ("SINGAPORE", "SIN"),
    ("曼谷", "BKK"),
    ("BANGKOK", "BKK"),
    ("伦敦", "LON"),
    ("LONDON", "LON"),
    ("纽约", "NYC"),
    ("NEWYORK", "NYC"),
    ("巴黎", "PAR"),
    ("PARIS", "PAR"),
    ("洛杉矶", "LAX"),
    ("LOSANGELES", "LAX"),
    ("旧金山", "SFO"),
    ("SANFRANCISCO", "SFO"),
    ("迪拜", "DXB"),
    ("DUBAI", "DXB"),
    ("悉尼", "SYD"),
    ("SYDNEY", "SYD"),
];

/// City name (Chinese or English, spaces ignored) or bare IATA code to a 3-letter code.
pub fn resolve_airport_code(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    let folded: String =
        trimmed.chars().filter(|ch| !ch.is_whitespace()).collect::<String>().to_uppercase();
    if let Some((_, code)) =
        CITY_CODES.iter().find(|(city, _)| *city == trimmed || *city == folded)
    {
        return Some((*code).to_owned());
    }

    let is_iata = folded.len() == 3 && folded.chars().all(|ch| ch.is_ascii_uppercase());
    is_iata.then_some(folded)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PriceLookupError {
    #[error("invalid price query: {0}")]
    InvalidQuery(String),
    #[error("could not resolve `{city}` to an airport code")]
    UnknownAirport { city: String },
    #[error("price lookup transport failure: {0}")]
    Transport(String),
    #[error("price lookup service returned an error: {0}")]
    Upstream(String),
    #[error("price lookup is disabled")]
    Disabled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightSearch {
    pub departure_city: String,
    pub arrival_city: String,
    pub departure_date: Option<NaiveDate>,
    pub return_date: Option<NaiveDate>,
    pub trip_type: TripType,
    pub cabin_class: CabinClass,
}

impl From<&FlightDetails> for FlightSearch {
    fn from(details: &FlightDetails) -> Self {
        Self {
            departure_city: details.departure_city.clone(),
            arrival_city: details.arrival_city.clone(),
            departure_date: Some(details.departure_date),
            return_date: details.return_date,
            trip_type: details.trip_type,
            cabin_class: details.cabin_class,
        }
    }
}

/// A flight search resolved into upstream query parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlightQuery {
    pub departure_id: String,
    pub arrival_id: String,
    pub outbound_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    /// 1 = round trip, 2 = one way.
    pub search_type: u8,
    /// 1 = economy, 3 = business, 4 = first.
    pub travel_class: u8,
}

impl FlightSearch {
    pub fn prepare(&self) -> Result<FlightQuery, PriceLookupError> {
        if self.departure_city.trim().is_empty() || self.arrival_city.trim().is_empty() {
            return Err(PriceLookupError::InvalidQuery(
                "departure city, arrival city and departure date are required".to_owned(),
            ));
        }
        let Some(outbound_date) = self.departure_date else {
            return Err(PriceLookupError::InvalidQuery(
                "departure city, arrival city and departure date are required".to_owned(),
            ));
        };

        let departure_id = resolve_airport_code(&self.departure_city)
            .ok_or_else(|| PriceLookupError::UnknownAirport { city: self.departure_city.clone() })?;
        let arrival_id = resolve_airport_code(&self.arrival_city)
            .ok_or_else(|| PriceLookupError::UnknownAirport { city: self.arrival_city.clone() })?;

        let round_trip = self.trip_type == TripType::RoundTrip;
        if round_trip && self.return_date.is_none() {
            return Err(PriceLookupError::InvalidQuery(
                "round trip searches require a return date".to_owned(),
            ));
        }

        let travel_class = match self.cabin_class {
            CabinClass::Economy => 1,
            CabinClass::Business => 3,
            CabinClass::First => 4,
        };

        Ok(FlightQuery {
            departure_id,
            arrival_id,
            outbound_date,
            return_date: if round_trip { self.return_date } else { None },
            search_type: if round_trip { 1 } else { 2 },
            travel_class,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotelSearch {
    pub city: String,
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub guests: u32,
    pub keywords: Option<String>,
}

impl From<&HotelDetails> for HotelSearch {
    fn from(details: &HotelDetails) -> Self {
        Self {
            city: details.city.clone(),
            check_in: Some(details.check_in_date),
            check_out: Some(details.check_out_date),
            guests: details.guest_count,
            keywords: details.location_preference.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HotelQuery {
    pub q: String,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub adults: u32,
}

impl HotelSearch {
    pub fn prepare(&self) -> Result<HotelQuery, PriceLookupError> {
        let city = self.city.trim();
        let (Some(check_in_date), Some(check_out_date)) = (self.check_in, self.check_out) else {
            return Err(PriceLookupError::InvalidQuery(
                "city, check-in and check-out dates are required".to_owned(),
            ));
        };
        if city.is_empty() {
            return Err(PriceLookupError::InvalidQuery(
                "city, check-in and check-out dates are required".to_owned(),
            ));
        }

        let query = match self.keywords.as_deref().map(str::trim).filter(|kw| !kw.is_empty()) {
            Some(keywords) => format!("{city} {keywords}"),
            None => city.to_owned(),
        };
        let q = if query.contains("酒店") || query.contains("hotel") {
            query
        } else {
            format!("hotels in {query}")
        };

        Ok(HotelQuery { q, check_in_date, check_out_date, adults: self.guests.max(1) })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightOffer {
    pub airline: String,
    pub flight_number: String,
    pub price: Decimal,
    pub total_duration_minutes: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HotelOffer {
    pub name: String,
    pub overall_rating: Option<f64>,
    pub reviews: Option<u32>,
    pub rate_per_night: Option<Decimal>,
}

#[async_trait]
pub trait PriceLookup: Send + Sync {
    async fn search_flights(&self, search: FlightSearch)
        -> Result<Vec<FlightOffer>, PriceLookupError>;

    async fn search_hotels(&self, search: HotelSearch) -> Result<Vec<HotelOffer>, PriceLookupError>;
}

/// Used when `pricing.enabled = false`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledPriceLookup;

#[async_trait]
impl PriceLookup for DisabledPriceLookup {
    async fn search_flights(
        &self,
        _search: FlightSearch,
    ) -> Result<Vec<FlightOffer>, PriceLookupError> {
        Err(PriceLookupError::Disabled)
    }

    async fn search_hotels(
        &self,
        _search: HotelSearch,
    ) -> Result<Vec<HotelOffer>, PriceLookupError> {
        Err(PriceLookupError::Disabled)
    }
}

pub fn cheapest_flight_budget(offers: &[FlightOffer]) -> Option<Decimal> {
    offers.iter().map(|offer| offer.price).min()
}

pub fn cheapest_hotel_budget(offers: &[HotelOffer]) -> Option<Decimal> {
    offers.iter().filter_map(|offer| offer.rate_per_night).min()
}

pub fn star_rating_for(overall_rating: f64) -> Option<&'static str> {
    if overall_rating >= 4.5 {
        Some("5 Star")
    } else if overall_rating >= 4.0 {
        Some("4 Star")
    } else if overall_rating >= 3.0 {
        Some("3 Star")
    } else {
        None
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BudgetEstimate {
    Available {
        amount: Decimal,
        currency: String,
        star_rating: Option<&'static str>,
        offers_considered: usize,
    },
    Unavailable {
        reason: String,
    },
}

impl BudgetEstimate {
    pub fn from_flights(offers: &[FlightOffer], currency: &str) -> Self {
        match cheapest_flight_budget(offers) {
            Some(amount) => Self::Available {
                amount,
                currency: currency.to_owned(),
                star_rating: None,
                offers_considered: offers.len(),
            },
            None => Self::Unavailable { reason: "no flights matched the search".to_owned() },
        }
    }

    pub fn from_hotels(offers: &[HotelOffer], currency: &str) -> Self {
        let cheapest = offers
            .iter()
            .filter_map(|offer| offer.rate_per_night.map(|rate| (rate, offer)))
            .min_by(|left, right| left.0.cmp(&right.0));
        match cheapest {
            Some((amount, offer)) => Self::Available {
                amount,
                currency: currency.to_owned(),
                star_rating: offer.overall_rating.and_then(star_rating_for),
                offers_considered: offers.len(),
            },
            None => Self::Unavailable { reason: "no hotel rates matched the search".to_owned() },
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available { .. })
    }
}
