//! A small client for the Prometheus HTTP API.
//!
//! Used to verify that rule changes have been picked up: rules propagate from the
//! stored documents into Prometheus asynchronously, so the `wait_for_*` helpers
//! poll until the expected state shows up.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::*;

use crate::polling::{poll, PollError};
use crate::{Error, Result};

/// Maximum length of a response body quoted in an error.
pub const MAX_LENGTH: usize = 1000;

/// Truncate `body` to at most [`MAX_LENGTH`] characters, marking the cut with `...`.
pub fn clamp_max(body: &str) -> String {
    if body.chars().count() <= MAX_LENGTH {
        return body.to_string();
    }
    let mut clamped: String = body.chars().take(MAX_LENGTH - 3).collect();
    clamped.push_str("...");
    clamped
}

#[derive(Deserialize, Debug, Clone)]
pub struct RulesResponse {
    pub status: String,
    pub data: RulesData,
}

#[derive(Deserialize, Debug, Clone)]
pub struct RulesData {
    #[serde(default)]
    pub groups: Vec<RuleGroupStatus>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RuleGroupStatus {
    pub name: String,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub interval: f64,
    #[serde(default)]
    pub limit: i64,
    #[serde(default)]
    pub evaluation_time: f64,
    pub last_evaluation: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rules: Vec<RuleStatus>,
}

/// A rule as Prometheus evaluates it.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RuleStatus {
    pub name: String,
    pub query: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub health: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub keep_firing_for: f64,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub alerts: Vec<AlertStatus>,
    #[serde(default)]
    pub evaluation_time: f64,
    pub last_evaluation: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AlertStatus {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub state: String,
    pub active_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub value: String,
}

/// A failed probe, annotated with what was being asked.
#[derive(thiserror::Error, Debug)]
#[error("{context}: {source}")]
pub struct ProbeError {
    pub context: String,
    #[source]
    pub source: Error,
}

impl ProbeError {
    fn new(context: impl Into<String>, source: Error) -> Self {
        Self {
            context: context.into(),
            source,
        }
    }
}

#[derive(Deserialize)]
struct QueryResponse {
    data: QueryData,
}

#[derive(Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<Value>,
}

fn query_result(body: &str) -> Result<Vec<Value>> {
    let response: QueryResponse = serde_json::from_str(body)?;
    Ok(response.data.result)
}

/// The value of the only timeseries in a query response body.
pub fn first_value_from_query(body: &str) -> Result<f64> {
    let result = query_result(body)?;
    if result.len() != 1 {
        return Err(Error::InvalidQueryResult(format!(
            "expected body to contain single timeseries but got {}",
            result.len()
        )));
    }

    let value = result[0]
        .get("value")
        .and_then(|sample| sample.get(1))
        .and_then(Value::as_str)
        .ok_or_else(|| Error::InvalidQueryResult("timeseries has no sample value".into()))?;

    value
        .parse()
        .map_err(|e| Error::InvalidQueryResult(format!("failed to parse query value {value:?}: {e}")))
}

/// The number of timeseries in a query response body.
pub fn result_size_from_query(body: &str) -> Result<usize> {
    Ok(query_result(body)?.len())
}

#[derive(Clone)]
pub struct PrometheusClient {
    base_url: Url,
    bearer_token: Option<String>,
    http_client: reqwest::Client,
}

impl PrometheusClient {
    pub fn new(base_url: Url, bearer_token: Option<String>) -> Self {
        Self {
            base_url,
            bearer_token,
            http_client: reqwest::Client::new(),
        }
    }

    /// `path` is appended to whatever path the base URL already has, so a
    /// Prometheus served behind a prefix such as `/prometheus` is reachable.
    fn api_url(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let joined = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
        url
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut request_builder = self
            .http_client
            .get(self.api_url(path))
            .header(reqwest::header::ACCEPT, "application/json");

        if let Some(bearer_token) = &self.bearer_token {
            request_builder = request_builder.bearer_auth(bearer_token);
        }

        request_builder
    }

    async fn body(&self, request: reqwest::RequestBuilder) -> Result<String> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK {
            return Err(Error::UnexpectedStatus {
                status: status.as_u16(),
                body: clamp_max(&body),
            });
        }
        Ok(body)
    }

    /// Run an instant query and return the raw response body.
    pub async fn query(&self, query: &str) -> Result<String> {
        self.body(self.request("/api/v1/query").query(&[("query", query)]))
            .await
    }

    /// The raw response body of the rules endpoint.
    pub async fn rules(&self) -> Result<String> {
        self.body(self.request("/api/v1/rules")).await
    }

    /// Every alerting rule named `alert_name`, across all rule groups.
    pub async fn list_alerting_rules(&self, alert_name: &str) -> Result<Vec<RuleStatus>> {
        let body = self
            .body(
                self.request("/api/v1/rules")
                    .query(&[("type", "alert"), ("rule_name[]", alert_name)]),
            )
            .await?;
        let response: RulesResponse = serde_json::from_str(&body)?;

        Ok(response
            .data
            .groups
            .into_iter()
            .flat_map(|group| group.rules)
            .collect())
    }

    /// Poll `query` until its only timeseries passes `validate`.
    pub async fn wait_for_query_return<V>(
        &self,
        interval: Duration,
        timeout: Duration,
        query: &str,
        validate: V,
    ) -> Result<(), PollError<ProbeError>>
    where
        V: Fn(f64) -> Result<(), String>,
    {
        let validate = &validate;
        poll(interval, timeout, move || async move {
            let body = self
                .query(query)
                .await
                .map_err(|e| ProbeError::new(format!("error getting response for query {query:?}"), e))?;
            let value = first_value_from_query(&body).map_err(|e| {
                ProbeError::new(
                    format!("error getting first value from response body {body:?} for query {query:?}"),
                    e,
                )
            })?;
            validate(value).map_err(|msg| {
                ProbeError::new(
                    format!("error validating response body {body:?} for query {query:?}"),
                    Error::InvalidQueryResult(msg),
                )
            })
        })
        .await
    }

    /// Poll `query` until it returns no timeseries at all.
    pub async fn wait_for_query_return_empty(
        &self,
        interval: Duration,
        timeout: Duration,
        query: &str,
    ) -> Result<(), PollError<ProbeError>> {
        poll(interval, timeout, move || async move {
            let body = self
                .query(query)
                .await
                .map_err(|e| ProbeError::new(format!("error getting response for query {query:?}"), e))?;
            let size = result_size_from_query(&body).map_err(|e| {
                ProbeError::new(
                    format!("error getting result size from body {body:?} for query {query:?}"),
                    e,
                )
            })?;
            if size > 0 {
                return Err(ProbeError::new(
                    format!("query {query:?}"),
                    Error::InvalidQueryResult(format!("expecting empty response but got {size} results")),
                ));
            }
            Ok::<(), ProbeError>(())
        })
        .await
    }

    /// Poll until Prometheus reports alerting rules named `alert_name` that pass `validate`.
    pub async fn wait_for_alerting_rule<V>(
        &self,
        interval: Duration,
        timeout: Duration,
        alert_name: &str,
        validate: V,
    ) -> Result<(), PollError<ProbeError>>
    where
        V: Fn(&[RuleStatus]) -> Result<(), String>,
    {
        let validate = &validate;
        poll(interval, timeout, move || async move {
            let rules = self
                .list_alerting_rules(alert_name)
                .await
                .map_err(|e| ProbeError::new(format!("error listing alerting rule {alert_name:?}"), e))?;
            validate(&rules).map_err(|msg| {
                ProbeError::new(
                    format!("error validating alerting rule {alert_name:?}"),
                    Error::InvalidQueryResult(msg),
                )
            })?;
            debug!(alert_name, rules = rules.len(), "Alerting rule is loaded");
            Ok::<(), ProbeError>(())
        })
        .await
    }
}
