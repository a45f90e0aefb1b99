use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::*;

/// Department a new case starts in; matches the seeded directory.
pub const INITIAL_DEPARTMENT: &str = "PROTOCOLO";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Public,
    Restricted,
    Confidential,
}

impl AccessLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessLevel::Public => "public",
            AccessLevel::Restricted => "restricted",
            AccessLevel::Confidential => "confidential",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "public" => Some(AccessLevel::Public),
            "restricted" => Some(AccessLevel::Restricted),
            "confidential" => Some(AccessLevel::Confidential),
            _ => None,
        }
    }

    pub fn is_public(self) -> bool {
        matches!(self, AccessLevel::Public)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    InProgress,
    Awaiting,
    Archived,
}

impl CaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CaseStatus::InProgress => "in_progress",
            CaseStatus::Awaiting => "awaiting",
            CaseStatus::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "in_progress" => Some(CaseStatus::InProgress),
            "awaiting" => Some(CaseStatus::Awaiting),
            "archived" => Some(CaseStatus::Archived),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Priority::Low),
            "normal" => Some(Priority::Normal),
            "high" => Some(Priority::High),
            "urgent" => Some(Priority::Urgent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    Signed,
}

impl DocumentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::Signed => "signed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(DocumentStatus::Draft),
            "signed" => Some(DocumentStatus::Signed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentMode {
    Editor,
    Upload,
}

impl DocumentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentMode::Editor => "editor",
            DocumentMode::Upload => "upload",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "editor" => Some(DocumentMode::Editor),
            "upload" => Some(DocumentMode::Upload),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    Department,
    User,
    Party,
}

impl GrantType {
    pub fn as_str(self) -> &'static str {
        match self {
            GrantType::Department => "department",
            GrantType::User => "user",
            GrantType::Party => "party",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "department" => Some(GrantType::Department),
            "user" => Some(GrantType::User),
            "party" => Some(GrantType::Party),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = departments)]
#[diesel(primary_key(code))]
pub struct Department {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
#[diesel(primary_key(login))]
pub struct User {
    pub login: String,
    pub department: String,
    pub name: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub login: String,
    pub department: String,
    pub name: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = parties)]
pub struct Party {
    pub id: Uuid,
    pub kind: String,
    pub name: String,
    pub document_number: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub access_key: Option<String>,
    pub access_key_active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = parties)]
pub struct NewParty {
    pub id: Uuid,
    pub kind: String,
    pub name: String,
    pub document_number: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub access_key: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = cases)]
pub struct Case {
    pub id: Uuid,
    pub number: String,
    pub subject: String,
    pub access_level: String,
    pub legal_basis: Option<String>,
    pub notes: String,
    pub status: String,
    pub priority: String,
    pub department: String,
    pub assigned_user: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub pending: bool,
    pub pending_origin_department: Option<String>,
    pub pending_dest_department: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = cases)]
pub struct NewCase {
    pub id: Uuid,
    pub number: String,
    pub subject: String,
    pub access_level: String,
    pub legal_basis: Option<String>,
    pub notes: String,
    pub status: String,
    pub priority: String,
    pub department: String,
    pub assigned_user: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = case_parties)]
pub struct CaseParty {
    pub id: Uuid,
    pub seq: i64,
    pub case_id: Uuid,
    pub role: Option<String>,
    pub party_id: Option<Uuid>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = case_parties)]
pub struct NewCaseParty {
    pub id: Uuid,
    pub case_id: Uuid,
    pub role: Option<String>,
    pub party_id: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = case_documents)]
pub struct CaseDocument {
    pub case_id: Uuid,
    pub document_id: Uuid,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = case_documents)]
pub struct NewCaseDocument {
    pub case_id: Uuid,
    pub document_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = documents)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub doc_type: Option<String>,
    pub mode: String,
    pub status: String,
    pub file_name: Option<String>,
    pub content_base64: Option<String>,
    pub body: Option<String>,
    pub author: Option<String>,
    pub signed_by: Option<String>,
    pub signed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = documents)]
pub struct NewDocument {
    pub id: Uuid,
    pub title: String,
    pub doc_type: Option<String>,
    pub mode: String,
    pub status: String,
    pub author: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = routing_events)]
pub struct RoutingEvent {
    pub id: Uuid,
    pub case_id: Uuid,
    pub origin_department: String,
    pub dest_department: String,
    pub reason: Option<String>,
    pub priority: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub acting_user: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = routing_events)]
pub struct NewRoutingEvent {
    pub id: Uuid,
    pub case_id: Uuid,
    pub origin_department: String,
    pub dest_department: String,
    pub reason: Option<String>,
    pub priority: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub acting_user: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = access_grants)]
pub struct AccessGrant {
    pub id: Uuid,
    pub case_id: Uuid,
    pub grant_type: String,
    pub value: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = access_grants)]
pub struct NewAccessGrant {
    pub id: Uuid,
    pub case_id: Uuid,
    pub grant_type: String,
    pub value: Option<String>,
}
