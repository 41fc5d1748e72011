//! Lead scoring for realtors.
//!
//! Scores are computed on every request from the public-record fields of a
//! post and are never stored.

use chrono::{DateTime, Utc};
use interfaces::{ContactStatus, DataType, LeadNote, ScrapedPost};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const BASE_SCORE: u32 = 50;
const HOT_THRESHOLD: u32 = 80;
const FUTURE_THRESHOLD: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadBucket {
    Hot,
    Warm,
    Future,
}

impl LeadBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadBucket::Hot => "hot",
            LeadBucket::Warm => "warm",
            LeadBucket::Future => "future",
        }
    }
}

fn value_points(value: Option<f64>) -> u32 {
    match value {
        Some(v) if v >= 500_000.0 => 30,
        Some(v) if v >= 100_000.0 => 20,
        Some(v) if v >= 50_000.0 => 10,
        _ => 0,
    }
}

fn type_points(data_type: Option<DataType>) -> u32 {
    match data_type {
        Some(DataType::Permit) => 15,
        Some(DataType::Liquor) => 10,
        Some(DataType::Zoning) => 5,
        _ => 0,
    }
}

fn recency_points(age_days: i64) -> u32 {
    match age_days {
        d if d <= 3 => 15,
        d if d <= 7 => 10,
        d if d <= 14 => 5,
        _ => 0,
    }
}

pub fn score_lead(post: &ScrapedPost, now: DateTime<Utc>) -> u32 {
    let scraped = post.scraped_date.unwrap_or(post.created_at);
    let age_days = (now - scraped).num_days().max(0);

    BASE_SCORE + value_points(post.data_value) + type_points(post.data_type) + recency_points(age_days)
}

pub fn bucket_for(score: u32) -> LeadBucket {
    if score >= HOT_THRESHOLD {
        LeadBucket::Hot
    } else if score < FUTURE_THRESHOLD {
        LeadBucket::Future
    } else {
        LeadBucket::Warm
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredLead {
    pub id: Uuid,
    pub title: String,
    pub summary: Option<String>,
    pub data_type: Option<DataType>,
    pub data_value: Option<f64>,
    pub data_address: Option<String>,
    pub source_name: String,
    pub source_url: String,
    pub scraped_date: Option<DateTime<Utc>>,
    pub score: u32,
    pub bucket: LeadBucket,
    pub note: Option<String>,
    pub contact_status: ContactStatus,
}

impl ScoredLead {
    pub fn new(post: ScrapedPost, now: DateTime<Utc>) -> Self {
        let score = score_lead(&post, now);
        Self {
            id: post.id,
            title: post.title,
            summary: post.summary,
            data_type: post.data_type,
            data_value: post.data_value,
            data_address: post.data_address,
            source_name: post.source_name,
            source_url: post.source_url,
            scraped_date: post.scraped_date.or(Some(post.created_at)),
            score,
            bucket: bucket_for(score),
            note: None,
            contact_status: ContactStatus::NotContacted,
        }
    }

    pub fn with_note(mut self, note: Option<&LeadNote>) -> Self {
        if let Some(note) = note {
            self.note = Some(note.note.clone()).filter(|n| !n.is_empty());
            self.contact_status = note.contact_status;
        }
        self
    }
}

/// Which leads to return.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadFilter {
    #[serde(rename = "type")]
    pub data_type: Option<String>,
    pub bucket: Option<LeadBucket>,
    pub min_score: Option<u32>,
    pub limit: Option<usize>,
}

impl LeadFilter {
    pub fn keeps(&self, lead: &ScoredLead) -> bool {
        self.bucket.is_none_or(|b| b == lead.bucket)
            && self.min_score.is_none_or(|min| lead.score >= min)
    }
}

/// Highest score first; ties go to the most recently scraped.
pub fn sort_leads(leads: &mut [ScoredLead]) {
    leads.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| b.scraped_date.cmp(&a.scraped_date))
    });
}

const CSV_HEADER: [&str; 11] = [
    "id",
    "title",
    "type",
    "value",
    "address",
    "score",
    "bucket",
    "scraped_date",
    "contact_status",
    "note",
    "source_url",
];

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// RFC 4180 CSV with a header row and CRLF line endings.
pub fn leads_to_csv(leads: &[ScoredLead]) -> String {
    let mut out = CSV_HEADER.join(",");
    out.push_str("\r\n");

    for lead in leads {
        let row = [
            lead.id.to_string(),
            lead.title.clone(),
            lead.data_type.map(|t| t.as_str().to_string()).unwrap_or_default(),
            lead.data_value.map(|v| format!("{:.0}", v)).unwrap_or_default(),
            lead.data_address.clone().unwrap_or_default(),
            lead.score.to_string(),
            lead.bucket.as_str().to_string(),
            lead.scraped_date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default(),
            lead.contact_status.as_str().to_string(),
            lead.note.clone().unwrap_or_default(),
            lead.source_url.clone(),
        ];
        let fields: Vec<String> = row.iter().map(|f| csv_field(f)).collect();
        out.push_str(&fields.join(","));
        out.push_str("\r\n");
    }
    out
}
