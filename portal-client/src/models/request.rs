use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a patient's consultation request to a doctor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Revoked,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Revoked => "revoked",
            RequestStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A party on a request: either a bare id or a populated profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Party {
    Id(String),
    Profile(PartyProfile),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyProfile {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub specialization: Option<String>,
}

impl Party {
    pub fn id(&self) -> Option<&str> {
        match self {
            Party::Id(id) => Some(id),
            Party::Profile(profile) => profile.id.as_deref(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Party::Id(_) => None,
            Party::Profile(profile) => profile.name.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultationRequest {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default = "default_status")]
    pub status: RequestStatus,
    #[serde(rename = "patientId", default)]
    pub patient: Option<Party>,
    #[serde(rename = "doctorId", default)]
    pub doctor: Option<Party>,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<String>,
}

fn default_status() -> RequestStatus {
    RequestStatus::Pending
}
