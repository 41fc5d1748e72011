use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Returned when a stored or submitted value does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Publication lifecycle of a scraped post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    PendingPhoto,
    Published,
    Deleted,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::PendingPhoto => "pending_photo",
            PostStatus::Published => "published",
            PostStatus::Deleted => "deleted",
        }
    }
}

impl FromStr for PostStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_photo" => Ok(PostStatus::PendingPhoto),
            "published" => Ok(PostStatus::Published),
            "deleted" => Ok(PostStatus::Deleted),
            other => Err(UnknownVariant::new("post status", other)),
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of public record a post was scraped from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Permit,
    License,
    Liquor,
    Zoning,
    Sale,
}

impl DataType {
    pub const ALL: [DataType; 5] = [
        DataType::Permit,
        DataType::License,
        DataType::Liquor,
        DataType::Zoning,
        DataType::Sale,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Permit => "permit",
            DataType::License => "license",
            DataType::Liquor => "liquor",
            DataType::Zoning => "zoning",
            DataType::Sale => "sale",
        }
    }

    /// Every stored spelling of this type, canonical name first.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            DataType::Permit => &["permit", "building_permit"],
            DataType::License => &["license", "business_license"],
            DataType::Liquor => &["liquor", "liquor_license"],
            DataType::Zoning => &["zoning"],
            DataType::Sale => &["sale", "property_sale"],
        }
    }
}

impl FromStr for DataType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        DataType::ALL
            .into_iter()
            .find(|t| t.aliases().contains(&name.as_str()))
            .ok_or_else(|| UnknownVariant::new("data type", s))
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    #[default]
    Free,
    Member,
    Realtor,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Member => "member",
            Plan::Realtor => "realtor",
        }
    }

    pub fn is_paying(&self) -> bool {
        !matches!(self, Plan::Free)
    }
}

impl FromStr for Plan {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Plan::Free),
            "member" => Ok(Plan::Member),
            "realtor" => Ok(Plan::Realtor),
            other => Err(UnknownVariant::new("plan", other)),
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a realtor is with a lead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    #[default]
    NotContacted,
    Contacted,
    InProgress,
    Closed,
    NotInterested,
}

impl ContactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactStatus::NotContacted => "not_contacted",
            ContactStatus::Contacted => "contacted",
            ContactStatus::InProgress => "in_progress",
            ContactStatus::Closed => "closed",
            ContactStatus::NotInterested => "not_interested",
        }
    }
}

impl FromStr for ContactStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_contacted" => Ok(ContactStatus::NotContacted),
            "contacted" => Ok(ContactStatus::Contacted),
            "in_progress" => Ok(ContactStatus::InProgress),
            "closed" => Ok(ContactStatus::Closed),
            "not_interested" => Ok(ContactStatus::NotInterested),
            other => Err(UnknownVariant::new("contact status", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
    #[default]
    New,
    Contacted,
    Qualified,
    Closed,
}

impl AssessmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssessmentStatus::New => "new",
            AssessmentStatus::Contacted => "contacted",
            AssessmentStatus::Qualified => "qualified",
            AssessmentStatus::Closed => "closed",
        }
    }
}

impl FromStr for AssessmentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(AssessmentStatus::New),
            "contacted" => Ok(AssessmentStatus::Contacted),
            "qualified" => Ok(AssessmentStatus::Qualified),
            "closed" => Ok(AssessmentStatus::Closed),
            other => Err(UnknownVariant::new("assessment status", other)),
        }
    }
}

/// A content row ingested from an RSS feed or a public-data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedPost {
    pub id: Uuid,
    pub title: String,
    pub summary: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub tags: Vec<String>,
    pub status: PostStatus,
    pub photo_url: Option<String>,
    pub source_name: String,
    pub source_url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub data_type: Option<DataType>,
    pub data_value: Option<f64>,
    pub data_address: Option<String>,
    pub scraped_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied by the scraper when inserting a post. New posts always
/// start out as `pending_photo`.
#[derive(Debug, Clone, Default)]
pub struct NewScrapedPost {
    pub title: String,
    pub summary: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub tags: Vec<String>,
    pub source_name: String,
    pub source_url: String,
    pub data_type: Option<DataType>,
    pub data_value: Option<f64>,
    pub data_address: Option<String>,
    pub scraped_date: Option<DateTime<Utc>>,
}

impl NewScrapedPost {
    pub fn into_post(self, id: Uuid, now: DateTime<Utc>) -> ScrapedPost {
        ScrapedPost {
            id,
            title: self.title,
            summary: self.summary,
            category: self.category,
            location: self.location,
            tags: self.tags,
            status: PostStatus::PendingPhoto,
            photo_url: None,
            source_name: self.source_name,
            source_url: self.source_url,
            published_at: None,
            data_type: self.data_type,
            data_value: self.data_value,
            data_address: self.data_address,
            scraped_date: self.scraped_date,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub user_id: Uuid,
    pub email: String,
    pub plan: Plan,
    pub stripe_customer_id: Option<String>,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadNote {
    pub user_id: Uuid,
    pub lead_id: Uuid,
    pub note: String,
    pub contact_status: ContactStatus,
    pub updated_at: DateTime<Utc>,
}

/// A submitted business assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub id: Uuid,
    pub contact_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub business_name: String,
    pub industry: String,
    pub annual_revenue: Option<f64>,
    pub cash_flow: Option<f64>,
    pub years_in_business: Option<i32>,
    pub employees: Option<i32>,
    pub reason_for_selling: Option<String>,
    pub timeline: Option<String>,
    pub status: AssessmentStatus,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAssessment {
    pub contact_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub business_name: String,
    pub industry: String,
    pub annual_revenue: Option<f64>,
    pub cash_flow: Option<f64>,
    pub years_in_business: Option<i32>,
    pub employees: Option<i32>,
    pub reason_for_selling: Option<String>,
    pub timeline: Option<String>,
}

impl NewAssessment {
    pub fn into_assessment(self, id: Uuid, now: DateTime<Utc>) -> Assessment {
        Assessment {
            id,
            contact_name: self.contact_name,
            email: self.email,
            phone: self.phone,
            business_name: self.business_name,
            industry: self.industry,
            annual_revenue: self.annual_revenue,
            cash_flow: self.cash_flow,
            years_in_business: self.years_in_business,
            employees: self.employees,
            reason_for_selling: self.reason_for_selling,
            timeline: self.timeline,
            status: AssessmentStatus::New,
            admin_notes: None,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_type_accepts_long_forms() {
        assert_eq!("Liquor_License".parse::<DataType>(), Ok(DataType::Liquor));
        assert_eq!("building_permit".parse::<DataType>(), Ok(DataType::Permit));
        assert!("restaurant".parse::<DataType>().is_err());
    }

    #[test]
    fn every_alias_parses_to_its_own_type() {
        for data_type in DataType::ALL {
            assert_eq!(data_type.aliases()[0], data_type.as_str());
            for alias in data_type.aliases() {
                assert_eq!(alias.parse::<DataType>(), Ok(data_type));
            }
        }
    }

    #[test]
    fn plan_defaults_to_free() {
        assert_eq!(Plan::default(), Plan::Free);
        assert!(!Plan::Free.is_paying());
        assert!(Plan::Realtor.is_paying());
    }

    #[test]
    fn status_strings_match_storage() {
        for status in [PostStatus::PendingPhoto, PostStatus::Published, PostStatus::Deleted] {
            assert_eq!(status.as_str().parse::<PostStatus>(), Ok(status));
        }
        let json = serde_json::to_string(&PostStatus::PendingPhoto).unwrap();
        assert_eq!(json, "\"pending_photo\"");
    }
}
