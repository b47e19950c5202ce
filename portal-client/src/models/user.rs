use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Portal role a user signs in as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Doctor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown role '{0}', expected 'patient' or 'doctor'")]
pub struct ParseRoleError(String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "patient" => Ok(Role::Patient),
            "doctor" => Ok(Role::Doctor),
            _ => Err(ParseRoleError(s.to_string())),
        }
    }
}

fn require_password(password: &Secret<String>) -> Result<(), ValidationError> {
    if password.expose_secret().is_empty() {
        return Err(ValidationError::new("password_required"));
    }
    Ok(())
}

fn login_is_complete(request: &LoginRequest) -> Result<(), ValidationError> {
    require_password(&request.password)?;

    let missing = request
        .unique_id
        .as_deref()
        .is_none_or(|id| id.trim().is_empty());

    if request.role == Role::Doctor && missing {
        return Err(ValidationError::new("unique_id_required"));
    }
    Ok(())
}

fn doctor_signup_has_password(signup: &DoctorSignup) -> Result<(), ValidationError> {
    require_password(&signup.password)
}

fn patient_signup_has_password(signup: &PatientSignup) -> Result<(), ValidationError> {
    require_password(&signup.password)
}

/// Credentials for `/api/auth/login`. Doctors also present their unique id.
#[derive(Debug, Clone, Validate)]
#[validate(schema(function = "login_is_complete"))]
pub struct LoginRequest {
    #[validate(length(min = 1))]
    pub username: String,
    pub password: Secret<String>,
    pub role: Role,
    pub unique_id: Option<String>,
}

impl LoginRequest {
    pub fn to_body(&self) -> Value {
        let mut body = json!({
            "username": self.username,
            "password": self.password.expose_secret(),
            "role": self.role,
        });

        if self.role == Role::Doctor
            && let Some(unique_id) = &self.unique_id
        {
            body["uniqueId"] = json!(unique_id);
        }

        body
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub doctor_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl LoginResponse {
    /// The server's `id`, falling back to the role-specific id fields.
    pub fn user_id(&self) -> Option<&str> {
        self.id
            .as_deref()
            .or(self.patient_id.as_deref())
            .or(self.doctor_id.as_deref())
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Validate)]
#[validate(schema(function = "doctor_signup_has_password"))]
pub struct DoctorSignup {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    pub password: Secret<String>,
    #[validate(length(min = 1))]
    pub unique_id: String,
    #[validate(length(min = 1))]
    pub specialization: String,
}

impl DoctorSignup {
    pub fn to_body(&self) -> Value {
        json!({
            "name": self.name,
            "username": self.username,
            "email": self.email,
            "password": self.password.expose_secret(),
            "uniqueId": self.unique_id,
            "specialization": self.specialization,
        })
    }
}

#[derive(Debug, Clone, Validate)]
#[validate(schema(function = "patient_signup_has_password"))]
pub struct PatientSignup {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub username: String,
    pub password: Secret<String>,
}

impl PatientSignup {
    pub fn to_body(&self) -> Value {
        json!({
            "name": self.name,
            "email": self.email,
            "username": self.username,
            "password": self.password.expose_secret(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub specialization: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OtpResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}
