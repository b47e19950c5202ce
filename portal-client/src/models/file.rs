use serde::{Deserialize, Serialize};

/// Metadata of an encrypted medical file stored for a patient.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientFile {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub original_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub uploaded_at: Option<String>,
}

impl PatientFile {
    pub fn display_name(&self) -> &str {
        self.original_name
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("Report")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileListResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub files: Option<Vec<PatientFile>>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteFileResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Options forwarded to the summarization service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryOptions {
    pub use_gollie: bool,
    pub schematic: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub summary: String,
}
