pub mod file;
pub mod request;
pub mod user;

pub use file::{DeleteFileResponse, FileListResponse, PatientFile, SummaryOptions, SummaryResponse};
pub use request::{ConsultationRequest, Party, PartyProfile, RequestStatus};
pub use user::{
    Doctor, DoctorSignup, LoginRequest, LoginResponse, MessageResponse, OtpResponse,
    ParseRoleError, PatientSignup, Role,
};
