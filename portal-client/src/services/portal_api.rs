//! Typed wrappers for the care portal backend endpoints.

use crate::error::ApiError;
use crate::models::{
    ConsultationRequest, DeleteFileResponse, Doctor, DoctorSignup, FileListResponse, LoginRequest,
    LoginResponse, MessageResponse, OtpResponse, PatientFile, PatientSignup, RequestStatus,
    SummaryOptions, SummaryResponse,
};
use crate::services::gateway::{ApiGateway, ApiRequest, ApiResponse};
use crate::session::{ClearReason, Session};
use reqwest::multipart;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use validator::Validate;

#[derive(Debug, Clone)]
pub struct PortalApi {
    gateway: ApiGateway,
}

impl PortalApi {
    pub fn new(gateway: ApiGateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &ApiGateway {
        &self.gateway
    }

    // Auth

    /// Sign in and, when the server issues a token, store the session.
    ///
    /// A token without any user id is rejected so the stored triple is never
    /// half populated.
    #[instrument(skip(self, credentials, cancel), fields(username = %credentials.username, role = %credentials.role))]
    pub async fn login(
        &self,
        credentials: &LoginRequest,
        cancel: &CancellationToken,
    ) -> Result<LoginResponse, ApiError> {
        credentials.validate()?;

        let request = ApiRequest::post("/api/auth/login").with_body(credentials.to_body());
        let login: LoginResponse = decode(self.gateway.send_public(request, cancel).await?)?;

        if let Some(token) = login.token.as_deref() {
            let Some(user_id) = login.user_id() else {
                tracing::error!(role = %credentials.role, "Login response carried a token but no user id");
                return Err(ApiError::UnexpectedResponse);
            };

            self.gateway
                .session()
                .set(Session {
                    token: token.to_string(),
                    role: credentials.role,
                    user_id: user_id.to_string(),
                })
                .await?;
        }

        Ok(login)
    }

    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.gateway.session().clear(ClearReason::LoggedOut).await?;
        Ok(())
    }

    #[instrument(skip(self, signup, cancel), fields(username = %signup.username))]
    pub async fn doctor_signup(
        &self,
        signup: &DoctorSignup,
        cancel: &CancellationToken,
    ) -> Result<MessageResponse, ApiError> {
        signup.validate()?;
        let request = ApiRequest::post("/api/auth/doctor-signup").with_body(signup.to_body());
        decode(self.gateway.send_public(request, cancel).await?)
    }

    #[instrument(skip(self, signup, cancel), fields(username = %signup.username))]
    pub async fn patient_signup(
        &self,
        signup: &PatientSignup,
        cancel: &CancellationToken,
    ) -> Result<MessageResponse, ApiError> {
        signup.validate()?;
        let request = ApiRequest::post("/api/auth/patient-signup").with_body(signup.to_body());
        decode(self.gateway.send_public(request, cancel).await?)
    }

    #[instrument(skip(self, cancel))]
    pub async fn send_otp(
        &self,
        email: &str,
        cancel: &CancellationToken,
    ) -> Result<OtpResponse, ApiError> {
        let request = ApiRequest::post("/api/otp/send").with_body(json!({ "email": email }));
        decode(self.gateway.send_public(request, cancel).await?)
    }

    #[instrument(skip(self, otp, cancel))]
    pub async fn verify_otp(
        &self,
        email: &str,
        otp: &str,
        cancel: &CancellationToken,
    ) -> Result<MessageResponse, ApiError> {
        let request =
            ApiRequest::post("/api/otp/verify").with_body(json!({ "email": email, "otp": otp }));
        decode(self.gateway.send_public(request, cancel).await?)
    }

    // Doctors

    /// Doctors directory; accepts either a bare array or `{doctors: [...]}`.
    #[instrument(skip(self, cancel))]
    pub async fn get_doctors(&self, cancel: &CancellationToken) -> Result<Vec<Doctor>, ApiError> {
        let data = self
            .gateway
            .send(ApiRequest::get("/api/doctors"), cancel)
            .await?
            .into_json()?;

        let doctors = match data {
            Value::Array(items) => items,
            Value::Object(mut body) => match body.remove("doctors") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };

        Ok(serde_json::from_value(Value::Array(doctors))?)
    }

    // Consultation requests

    #[instrument(skip(self, cancel))]
    pub async fn apply_to_doctor(
        &self,
        doctor_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ConsultationRequest, ApiError> {
        let request = ApiRequest::post("/api/requests").with_body(json!({ "doctorId": doctor_id }));
        decode(self.gateway.send(request, cancel).await?)
    }

    #[instrument(skip(self, cancel))]
    pub async fn get_patient_requests(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ConsultationRequest>, ApiError> {
        let response = self
            .gateway
            .send(ApiRequest::get("/api/requests/patient"), cancel)
            .await?;
        decode_list(response)
    }

    #[instrument(skip(self, cancel))]
    pub async fn get_doctor_requests(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ConsultationRequest>, ApiError> {
        let response = self
            .gateway
            .send(ApiRequest::get("/api/requests/doctor"), cancel)
            .await?;
        decode_list(response)
    }

    #[instrument(skip(self, cancel))]
    pub async fn update_request_status(
        &self,
        request_id: &str,
        status: RequestStatus,
        cancel: &CancellationToken,
    ) -> Result<ConsultationRequest, ApiError> {
        let request = ApiRequest::patch(format!("/api/requests/{}", segment(request_id)?))
            .with_body(json!({ "status": status }));
        decode(self.gateway.send(request, cancel).await?)
    }

    #[instrument(skip(self, cancel))]
    pub async fn revoke_request(
        &self,
        request_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ConsultationRequest, ApiError> {
        let request = ApiRequest::patch(format!("/api/requests/{}/revoke", segment(request_id)?));
        decode(self.gateway.send(request, cancel).await?)
    }

    // Patient files

    #[instrument(skip(self, cancel))]
    pub async fn list_patient_files(
        &self,
        patient_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<PatientFile>, ApiError> {
        let request = ApiRequest::get(format!("/api/files/patient/{}/files", segment(patient_id)?));
        let listing: FileListResponse = decode(self.gateway.send_public(request, cancel).await?)?;

        match listing.files {
            Some(files) if listing.success => Ok(files),
            _ => Err(ApiError::Rejected(listing.message.unwrap_or_else(|| {
                "No files available for this patient.".to_string()
            }))),
        }
    }

    /// Upload a local file for encryption and storage.
    #[instrument(skip(self, file, cancel), fields(file = %file.display()))]
    pub async fn upload_patient_file(
        &self,
        patient_id: &str,
        file: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), ApiError> {
        let file_name = file
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ApiError::InvalidRequest(format!("not a file: {}", file.display())))?
            .to_string();
        let data = tokio::fs::read(file).await?;
        let size = data.len();

        let form = multipart::Form::new()
            .part("file", multipart::Part::bytes(data).file_name(file_name.clone()));
        self.gateway
            .send_multipart(
                &format!("/api/files/patient/{}/upload", segment(patient_id)?),
                form,
                cancel,
            )
            .await?;

        tracing::info!(patient_id, file = %file_name, size, "Patient file uploaded");
        Ok(())
    }

    #[instrument(skip(self, cancel))]
    pub async fn delete_patient_file(
        &self,
        patient_id: &str,
        file_id: &str,
        cancel: &CancellationToken,
    ) -> Result<DeleteFileResponse, ApiError> {
        let request = ApiRequest::delete(format!(
            "/api/files/patient/{}/file/{}",
            segment(patient_id)?,
            segment(file_id)?
        ));
        let deleted: DeleteFileResponse = decode(self.gateway.send_public(request, cancel).await?)?;

        if !deleted.success {
            let reason = deleted.message.as_deref().unwrap_or("unknown error");
            return Err(ApiError::Rejected(format!("Delete failed: {}", reason)));
        }
        Ok(deleted)
    }

    /// URL serving the decrypted file, for hand-off to a browser.
    pub fn patient_decrypted_download_url(
        &self,
        patient_id: &str,
        file_id: &str,
    ) -> Result<String, ApiError> {
        Ok(self
            .gateway
            .url(&patient_file_path(patient_id, file_id, FileVariant::Decrypted)?))
    }

    /// URL serving the file exactly as stored, still encrypted.
    pub fn patient_encrypted_download_url(
        &self,
        patient_id: &str,
        file_id: &str,
    ) -> Result<String, ApiError> {
        Ok(self
            .gateway
            .url(&patient_file_path(patient_id, file_id, FileVariant::Encrypted)?))
    }

    #[instrument(skip(self, dest_dir, cancel))]
    pub async fn download_patient_file(
        &self,
        patient_id: &str,
        file_id: &str,
        filename: Option<&str>,
        dest_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, ApiError> {
        let path = patient_file_path(patient_id, file_id, FileVariant::Decrypted)?;
        self.gateway
            .download_public(&path, filename, dest_dir, cancel)
            .await
    }

    /// Download the stored ciphertext without server-side decryption.
    #[instrument(skip(self, dest_dir, cancel))]
    pub async fn download_patient_encrypted_file(
        &self,
        patient_id: &str,
        file_id: &str,
        filename: Option<&str>,
        dest_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, ApiError> {
        let path = patient_file_path(patient_id, file_id, FileVariant::Encrypted)?;
        self.gateway
            .download_public(&path, filename, dest_dir, cancel)
            .await
    }

    // Doctor access to approved patients

    #[instrument(skip(self, cancel))]
    pub async fn get_approved_patient_files(
        &self,
        patient_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<PatientFile>, ApiError> {
        let request = ApiRequest::get(format!("/api/files/doctor/patient/{}", segment(patient_id)?));
        decode_list(self.gateway.send(request, cancel).await?)
    }

    #[instrument(skip(self, dest_dir, cancel))]
    pub async fn download_doctor_file(
        &self,
        patient_id: &str,
        file_id: &str,
        filename: Option<&str>,
        dest_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, ApiError> {
        let path = format!(
            "/api/files/doctor/patient/{}/file/{}",
            segment(patient_id)?,
            segment(file_id)?
        );
        self.gateway.download(&path, filename, dest_dir, cancel).await
    }

    // Summaries

    #[instrument(skip(self, cancel))]
    pub async fn summarize_doctor_file(
        &self,
        patient_id: &str,
        file_id: &str,
        options: SummaryOptions,
        cancel: &CancellationToken,
    ) -> Result<SummaryResponse, ApiError> {
        let request = ApiRequest::post(format!(
            "/api/summarize/doctor/patient/{}/file/{}",
            segment(patient_id)?,
            segment(file_id)?
        ))
        .with_body(serde_json::to_value(options)?);
        decode(self.gateway.send(request, cancel).await?)
    }

    #[instrument(skip(self, text, cancel), fields(text_len = text.len()))]
    pub async fn summarize_text(
        &self,
        text: &str,
        options: SummaryOptions,
        cancel: &CancellationToken,
    ) -> Result<SummaryResponse, ApiError> {
        let request = ApiRequest::post("/api/summarize/text").with_body(json!({
            "text": text,
            "useGollie": options.use_gollie,
            "schematic": options.schematic,
        }));
        decode(self.gateway.send(request, cancel).await?)
    }
}

#[derive(Debug, Clone, Copy)]
enum FileVariant {
    Decrypted,
    Encrypted,
}

fn patient_file_path(
    patient_id: &str,
    file_id: &str,
    variant: FileVariant,
) -> Result<String, ApiError> {
    let route = match variant {
        FileVariant::Decrypted => "download-decrypted",
        FileVariant::Encrypted => "download-encrypted",
    };
    Ok(format!(
        "/api/files/patient/{}/{}/{}",
        segment(patient_id)?,
        route,
        segment(file_id)?
    ))
}

/// Percent-encode an id as a single path segment. Empty ids and dot
/// segments are refused; URL normalization would resolve them to another
/// route.
fn segment(id: &str) -> Result<Cow<'_, str>, ApiError> {
    if id.is_empty() || id == "." || id == ".." {
        return Err(ApiError::InvalidRequest(format!("invalid id '{}'", id)));
    }
    Ok(urlencoding::encode(id))
}

fn decode<T: DeserializeOwned>(response: ApiResponse) -> Result<T, ApiError> {
    Ok(serde_json::from_value(response.into_json()?)?)
}

/// List endpoints: anything other than a JSON array reads as empty.
fn decode_list<T: DeserializeOwned>(response: ApiResponse) -> Result<Vec<T>, ApiError> {
    match response.into_json()? {
        items @ Value::Array(_) => Ok(serde_json::from_value(items)?),
        _ => Ok(Vec::new()),
    }
}
