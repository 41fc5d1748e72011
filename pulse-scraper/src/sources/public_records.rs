//! City open-data endpoints that return a JSON array of records.
//!
//! Endpoints disagree on field names, so each field is looked up through a
//! list of aliases. Records without an id or any usable title are dropped.

use super::{PullSource, SourceItem};
use crate::fetcher::Fetcher;
use crate::types::{PublicRecord, Result, ScraperError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use interfaces::DataType;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

const ID_FIELDS: &[&str] = &["id", "record_id", "permit_number", "license_number", "case_number"];
const TITLE_FIELDS: &[&str] = &["title", "description", "permit_type", "business_name", "name"];
const VALUE_FIELDS: &[&str] = &["value", "valuation", "estimated_value", "sale_price"];
const ADDRESS_FIELDS: &[&str] = &["address", "location", "site_address"];
const DATE_FIELDS: &[&str] = &["issued_date", "date", "recorded_at", "filed_date"];
const URL_FIELDS: &[&str] = &["url", "link"];

pub struct PublicRecordSource {
    data_type: DataType,
    url: String,
    fetcher: Arc<Fetcher>,
}

impl PublicRecordSource {
    pub fn new(data_type: DataType, url: impl Into<String>, fetcher: Arc<Fetcher>) -> Self {
        Self {
            data_type,
            url: url.into(),
            fetcher,
        }
    }

    /// Map a JSON document (a bare array, or an object wrapping one under
    /// `data`, `records` or `results`) to records.
    pub fn parse_records(&self, json: &str) -> Result<Vec<PublicRecord>> {
        let document: Value = serde_json::from_str(json)?;
        let rows = match document {
            Value::Array(rows) => rows,
            Value::Object(mut obj) => ["data", "records", "results"]
                .iter()
                .find_map(|key| match obj.remove(*key) {
                    Some(Value::Array(rows)) => Some(rows),
                    _ => None,
                })
                .ok_or_else(|| {
                    ScraperError::Parse(format!("{}: no record array in response", self.url))
                })?,
            _ => {
                return Err(ScraperError::Parse(format!(
                    "{}: expected a JSON array",
                    self.url
                )))
            }
        };

        let total = rows.len();
        let records: Vec<PublicRecord> = rows
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|row| self.record_from_row(row))
            .collect();
        if records.len() < total {
            debug!("Dropped {} unusable rows from {}", total - records.len(), self.url);
        }
        Ok(records)
    }

    fn record_from_row(&self, row: &Map<String, Value>) -> Option<PublicRecord> {
        let record_id = first_string(row, ID_FIELDS)?;
        let address = first_string(row, ADDRESS_FIELDS);
        let title = first_string(row, TITLE_FIELDS).or_else(|| {
            address
                .as_ref()
                .map(|a| format!("{} at {}", type_label(self.data_type), a))
        })?;
        let url = first_string(row, URL_FIELDS)
            .unwrap_or_else(|| format!("{}#{}", self.url, record_id));

        Some(PublicRecord {
            record_id,
            data_type: self.data_type,
            title,
            value: first_number(row, VALUE_FIELDS),
            address,
            recorded_at: first_date(row, DATE_FIELDS),
            url,
        })
    }
}

#[async_trait]
impl PullSource for PublicRecordSource {
    fn source_name(&self) -> String {
        let host = crate::utils::url::extract_domain(&self.url).unwrap_or_else(|| self.url.clone());
        format!("{} records ({})", type_label(self.data_type), host)
    }

    async fn pull(&self) -> Result<Vec<SourceItem>> {
        info!("Pulling {} records from {}", self.data_type, self.url);
        let body = self.fetcher.fetch_text(&self.url).await?;
        let records = self.parse_records(&body)?;
        Ok(records.into_iter().map(item_from_record).collect())
    }
}

fn item_from_record(record: PublicRecord) -> SourceItem {
    let mut body = format!("{}: {}.", type_label(record.data_type), record.title);
    if let Some(value) = record.value {
        body.push_str(&format!(" Valued at ${:.0}.", value));
    }
    if let Some(address) = &record.address {
        body.push_str(&format!(" Location: {}.", address));
    }

    SourceItem {
        title: record.title.clone(),
        body,
        url: record.url.clone(),
        published_at: record.recorded_at,
        record: Some(record),
    }
}

fn type_label(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Permit => "Building permit",
        DataType::License => "Business license",
        DataType::Liquor => "Liquor license",
        DataType::Zoning => "Zoning case",
        DataType::Sale => "Property sale",
    }
}

fn first_value<'a>(row: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| row.get(*k))
        .find(|v| !v.is_null())
}

fn first_string(row: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().filter_map(|k| row.get(*k)).find_map(|v| match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Accepts numbers and strings like `"$1,250,000.00"`.
fn first_number(row: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    match first_value(row, keys)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s.chars().filter(|c| !matches!(c, '$' | ',' | ' ')).collect();
            cleaned.parse().ok()
        }
        _ => None,
    }
}

/// RFC 3339 timestamps or bare `YYYY-MM-DD` dates (taken as midnight UTC).
fn first_date(row: &Map<String, Value>, keys: &[&str]) -> Option<DateTime<Utc>> {
    let raw = first_value(row, keys)?.as_str()?.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d")
                .ok()?
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc())
        })
}
