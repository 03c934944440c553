//! HTTP adapter for the crew portal gateway.
//!
//! The gateway does the scraping and speaks JSON; this client only maps
//! endpoints and status codes onto `FlicaService`.

use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::calendar::YearMonth;
use crate::config::BidRound;
use crate::error::BidError;
use crate::model::{FlicaTask, OpentimeRequest, PairingKey, Schedule, Trip};
use crate::traits::FlicaService;

#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PortalClient {
    config: PortalConfig,
    client: reqwest::blocking::Client,
}

impl PortalClient {
    pub fn new(config: PortalConfig) -> Result<Self, BidError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, BidError> {
        let body = self
            .client
            .get(self.url(path))
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json::<T>())?;
        Ok(body)
    }
}

fn round_segment(round: BidRound) -> &'static str {
    match round {
        BidRound::Sap => "sap",
        BidRound::Sbb => "sbb",
        BidRound::FirstCome => "first-come",
    }
}

#[derive(Debug, Serialize)]
struct SwapRequest<'a> {
    round: BidRound,
    year_month: YearMonth,
    today: NaiveDate,
    add: &'a [PairingKey],
    drop: &'a [PairingKey],
}

impl FlicaService for PortalClient {
    fn fetch_schedule(&self, year_month: YearMonth) -> Result<Schedule, BidError> {
        self.get_json(&format!("schedule/{}", year_month))
    }

    fn fetch_open_time(
        &self,
        domicile: &str,
        rank: &str,
        round: BidRound,
        year_month: YearMonth,
    ) -> Result<Vec<FlicaTask>, BidError> {
        let response = self
            .client
            .get(self.url(&format!("opentime/{}/{}", round_segment(round), year_month)))
            .query(&[("domicile", domicile), ("rank", rank)])
            .send()?;
        if response.status() == StatusCode::CONFLICT {
            return Err(BidError::NotYetAvailable {
                what: "opentime".to_string(),
                year_month: year_month.to_string(),
            });
        }
        Ok(response.error_for_status()?.json()?)
    }

    fn fetch_opentime_request_statuses(
        &self,
        round: BidRound,
        year_month: YearMonth,
    ) -> Result<Vec<OpentimeRequest>, BidError> {
        self.get_json(&format!("requests/{}/{}", round_segment(round), year_month))
    }

    fn submit_swap(
        &self,
        round: BidRound,
        year_month: YearMonth,
        today: NaiveDate,
        add_keys: &[PairingKey],
        drop_keys: &[PairingKey],
    ) -> Result<String, BidError> {
        let request = SwapRequest {
            round,
            year_month,
            today,
            add: add_keys,
            drop: drop_keys,
        };
        let body = self
            .client
            .post(self.url("swaps"))
            .json(&request)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.text())?;
        Ok(body)
    }

    fn fetch_pairing_list(&self, year_month: YearMonth) -> Result<Vec<Trip>, BidError> {
        self.get_json(&format!("pairings/{}", year_month))
    }

    fn fetch_pairing_detail(&self, key: &PairingKey) -> Result<Trip, BidError> {
        let response = self
            .client
            .get(self.url(&format!("pairings/{}/{}", key.date, key.name)))
            .send()?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(BidError::UnknownPairing(key.clone()));
        }
        Ok(response.error_for_status()?.json()?)
    }
}
