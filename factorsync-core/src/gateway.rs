//! HTTP gateway provider.
//!
//! The terminal API only runs inside the vendor's desktop client, so it is
//! reached through a small bridge process that exposes `start`, `stop` and
//! `wsd` as JSON endpoints. Series come back field-major, mirroring the
//! terminal's own result object.

use crate::provider::{FactorProvider, FetchRequest, ProviderError, ProviderReply};
use crate::table::{parse_date, FactorTable};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Request body for the `wsd` endpoint.
#[derive(Debug, Serialize)]
struct WsdRequest<'a> {
    codes: &'a str,
    fields: Vec<&'a str>,
    begin_time: String,
    end_time: String,
    options: &'a str,
}

/// Response of the `wsd` endpoint.
#[derive(Debug, Deserialize)]
struct WsdResponse {
    error_code: i64,
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    times: Vec<String>,
    #[serde(default)]
    data: Vec<Vec<Option<f64>>>,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    error_code: i64,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct Empty {}

pub struct GatewayProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    started: bool,
}

impl GatewayProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Session(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            started: false,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<R, ProviderError> {
        let url = format!("{}/{endpoint}", self.base_url);
        let resp = self.client.post(&url).json(body).send().map_err(map_transport)?;

        let status = resp.status();
        if status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status == reqwest::StatusCode::GATEWAY_TIMEOUT
        {
            return Err(ProviderError::Timeout(format!("HTTP {status} from {endpoint}")));
        }
        if !status.is_success() {
            return Err(ProviderError::Network(format!("HTTP {status} from {endpoint}")));
        }

        resp.json().map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(e.to_string())
            } else {
                ProviderError::ResponseFormat(format!("{endpoint}: {e}"))
            }
        })
    }

    fn parse_response(resp: WsdResponse) -> Result<ProviderReply, ProviderError> {
        if resp.error_code != 0 {
            return Ok(ProviderReply::failed(resp.error_code));
        }

        if resp.data.len() != resp.fields.len() {
            return Err(ProviderError::ResponseFormat(format!(
                "{} series for {} fields",
                resp.data.len(),
                resp.fields.len()
            )));
        }

        let dates: Vec<NaiveDate> = resp
            .times
            .iter()
            .map(|t| parse_date(t))
            .collect::<Result<_, _>>()
            .map_err(|e| ProviderError::ResponseFormat(e.to_string()))?;

        let table = FactorTable::from_series(&resp.fields, &dates, &resp.data)
            .map_err(|e| ProviderError::ResponseFormat(e.to_string()))?;

        Ok(ProviderReply::ok(table))
    }
}

fn map_transport(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

impl FactorProvider for GatewayProvider {
    fn name(&self) -> &str {
        "terminal_gateway"
    }

    fn start(&mut self) -> Result<(), ProviderError> {
        let resp: SessionResponse = self.post("start", &Empty {})?;
        if resp.error_code != 0 {
            return Err(ProviderError::Session(format!(
                "start returned {}{}",
                resp.error_code,
                resp.message.map(|m| format!(": {m}")).unwrap_or_default()
            )));
        }
        self.started = true;
        debug!(base_url = %self.base_url, "gateway session started");
        Ok(())
    }

    fn stop(&mut self) {
        if !self.started {
            return;
        }
        self.started = false;
        let url = format!("{}/stop", self.base_url);
        // Best effort: the terminal drops idle sessions on its own.
        if let Err(e) = self.client.post(&url).json(&Empty {}).send() {
            debug!(error = %e, "gateway stop failed");
        }
    }

    fn fetch(&self, request: &FetchRequest) -> Result<ProviderReply, ProviderError> {
        if !self.started {
            return Err(ProviderError::NotStarted);
        }

        let body = WsdRequest {
            codes: &request.code,
            fields: request.fields.iter().map(|f| f.as_str()).collect(),
            begin_time: request.begin.format("%Y-%m-%d").to_string(),
            end_time: request.end.format("%Y-%m-%d").to_string(),
            options: &request.options,
        };
        let resp: WsdResponse = self.post("wsd", &body)?;
        Self::parse_response(resp)
    }
}
