//! Endpoint wrappers against a mocked care portal backend.

mod common;

use common::{api, request_count, sign_in, valid_token};
use portal_client::error::ApiError;
use portal_client::models::{LoginRequest, RequestStatus, Role, SummaryOptions};
use portal_client::session::{PATIENT_ID_KEY, Session, SessionEvent};
use secrecy::Secret;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, body_string_contains, header_regex, method, path},
};

fn credentials(role: Role, unique_id: Option<&str>) -> LoginRequest {
    LoginRequest {
        username: "alice".to_string(),
        password: Secret::new("pw".to_string()),
        role,
        unique_id: unique_id.map(str::to_string),
    }
}

// =============================================================================
// Auth
// =============================================================================

#[tokio::test]
async fn test_patient_login_stores_session() {
    let server = MockServer::start().await;
    let token = valid_token();
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({ "username": "alice", "password": "pw", "role": "patient" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": token,
            "id": "p1",
            "message": "Login successful"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api(&server);
    let mut events = api.gateway().session().subscribe();

    let login = api
        .login(&credentials(Role::Patient, None), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(login.user_id(), Some("p1"));
    let session = api.gateway().session();
    assert_eq!(
        session.get().await.unwrap(),
        Some(Session {
            token,
            role: Role::Patient,
            user_id: "p1".to_string()
        })
    );
    assert_eq!(
        session.entry(PATIENT_ID_KEY).await.unwrap().as_deref(),
        Some("p1")
    );
    assert_eq!(
        events.recv().await.unwrap(),
        SessionEvent::Established {
            role: Role::Patient,
            user_id: "p1".to_string()
        }
    );
}

#[tokio::test]
async fn test_doctor_login_sends_unique_id_and_drops_patient_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({
            "username": "alice",
            "password": "pw",
            "role": "doctor",
            "uniqueId": "DOC-7"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": valid_token(),
            "doctorId": "d1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api(&server);
    let session = api.gateway().session();
    sign_in(session, valid_token(), Role::Patient, "p1").await;

    api.login(&credentials(Role::Doctor, Some("DOC-7")), &CancellationToken::new())
        .await
        .unwrap();

    let stored = session.get().await.unwrap().unwrap();
    assert_eq!(stored.role, Role::Doctor);
    assert_eq!(stored.user_id, "d1");
    assert_eq!(session.entry(PATIENT_ID_KEY).await.unwrap(), None);
}

#[tokio::test]
async fn test_login_without_token_stores_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "OTP required" })))
        .mount(&server)
        .await;

    let api = api(&server);
    let login = api
        .login(&credentials(Role::Patient, None), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(login.message.as_deref(), Some("OTP required"));
    assert_eq!(api.gateway().session().get().await.unwrap(), None);
}

#[tokio::test]
async fn test_login_with_token_but_no_id_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": valid_token() })))
        .mount(&server)
        .await;

    let api = api(&server);
    let err = api
        .login(&credentials(Role::Patient, None), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::UnexpectedResponse));
    assert_eq!(api.gateway().session().token().await.unwrap(), None);
}

#[tokio::test]
async fn test_doctor_login_requires_unique_id_before_sending() {
    let server = MockServer::start().await;
    let api = api(&server);

    let err = api
        .login(&credentials(Role::Doctor, None), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Validation(_)));
    assert_eq!(request_count(&server).await, 0);
}

#[tokio::test]
async fn test_logout_clears_and_notifies() {
    let server = MockServer::start().await;
    let api = api(&server);
    let session = api.gateway().session();
    sign_in(session, valid_token(), Role::Doctor, "d1").await;
    let mut events = session.subscribe();

    api.logout().await.unwrap();

    assert_eq!(session.get().await.unwrap(), None);
    assert_eq!(events.recv().await.unwrap(), SessionEvent::LoggedOut);
}

// =============================================================================
// Doctors and requests
// =============================================================================

#[tokio::test]
async fn test_get_doctors_accepts_both_shapes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "_id": "d1", "name": "Dr. Rao", "specialization": "Cardiology" }
        ])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "doctors": [{ "_id": "d2" }, { "_id": "d3" }]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": 0 })))
        .mount(&server)
        .await;

    let api = api(&server);
    sign_in(api.gateway().session(), valid_token(), Role::Patient, "p1").await;
    let cancel = CancellationToken::new();

    let bare = api.get_doctors(&cancel).await.unwrap();
    assert_eq!(bare.len(), 1);
    assert_eq!(bare[0].specialization.as_deref(), Some("Cardiology"));

    let wrapped = api.get_doctors(&cancel).await.unwrap();
    let ids: Vec<_> = wrapped.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, ["d2", "d3"]);

    assert!(api.get_doctors(&cancel).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_apply_to_doctor_posts_doctor_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/requests"))
        .and(body_json(json!({ "doctorId": "d1" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "_id": "r1",
            "status": "pending",
            "patientId": "p1",
            "doctorId": "d1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api(&server);
    sign_in(api.gateway().session(), valid_token(), Role::Patient, "p1").await;

    let request = api
        .apply_to_doctor("d1", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(request.id, "r1");
    assert_eq!(request.status, RequestStatus::Pending);
}

#[tokio::test]
async fn test_doctor_requests_decode_populated_patients() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/requests/doctor"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "_id": "r1",
            "status": "approved",
            "patientId": { "_id": "p1", "name": "Asha", "email": "asha@example.com" },
            "doctorId": "d1"
        }])))
        .mount(&server)
        .await;

    let api = api(&server);
    sign_in(api.gateway().session(), valid_token(), Role::Doctor, "d1").await;

    let requests = api
        .get_doctor_requests(&CancellationToken::new())
        .await
        .unwrap();

    let patient = requests[0].patient.as_ref().unwrap();
    assert_eq!(patient.id(), Some("p1"));
    assert_eq!(patient.name(), Some("Asha"));
    assert_eq!(requests[0].doctor.as_ref().unwrap().id(), Some("d1"));
}

#[tokio::test]
async fn test_update_and_revoke_use_patch() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/requests/r1"))
        .and(body_json(json!({ "status": "approved" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "_id": "r1", "status": "approved" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/requests/r2/revoke"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "_id": "r2", "status": "revoked" })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api(&server);
    sign_in(api.gateway().session(), valid_token(), Role::Doctor, "d1").await;
    let cancel = CancellationToken::new();

    let approved = api
        .update_request_status("r1", RequestStatus::Approved, &cancel)
        .await
        .unwrap();
    assert_eq!(approved.status, RequestStatus::Approved);

    let revoked = api.revoke_request("r2", &cancel).await.unwrap();
    assert_eq!(revoked.status, RequestStatus::Revoked);
}

// =============================================================================
// Files
// =============================================================================

#[tokio::test]
async fn test_list_patient_files_without_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/files/patient/p1/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "files": [{ "_id": "f1", "originalName": "lab.pdf", "size": 1024 }]
        })))
        .mount(&server)
        .await;

    let files = api(&server)
        .list_patient_files("p1", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(files.len(), 1);
    assert_eq!(files[0].display_name(), "lab.pdf");
}

#[tokio::test]
async fn test_list_patient_files_reports_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/files/patient/p1/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "Patient not found"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/files/patient/p2/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": false })))
        .mount(&server)
        .await;

    let api = api(&server);
    let cancel = CancellationToken::new();

    let err = api.list_patient_files("p1", &cancel).await.unwrap_err();
    assert_eq!(err.to_string(), "Patient not found");

    let err = api.list_patient_files("p2", &cancel).await.unwrap_err();
    assert_eq!(err.to_string(), "No files available for this patient.");
}

#[tokio::test]
async fn test_delete_patient_file_failure_message() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/files/patient/p1/file/f1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "File not found"
        })))
        .mount(&server)
        .await;

    let err = api(&server)
        .delete_patient_file("p1", "f1", &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Delete failed: File not found");
}

#[tokio::test]
async fn test_upload_sends_multipart_file_part() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/files/patient/p1/upload"))
        .and(header_regex("content-type", "^multipart/form-data"))
        .and(body_string_contains("name=\"file\""))
        .and(body_string_contains("filename=\"lab.txt\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("lab.txt");
    std::fs::write(&file, "hemoglobin 13.5").unwrap();

    api(&server)
        .upload_patient_file("p1", &file, &CancellationToken::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_decrypted_download_url_is_absolute() {
    let server = MockServer::start().await;
    let api = api(&server);

    assert_eq!(
        api.patient_decrypted_download_url("p1", "f1").unwrap(),
        format!("{}/api/files/patient/p1/download-decrypted/f1", server.uri())
    );
    assert_eq!(
        api.patient_encrypted_download_url("p1", "f1").unwrap(),
        format!("{}/api/files/patient/p1/download-encrypted/f1", server.uri())
    );
}

#[tokio::test]
async fn test_encrypted_download_saves_ciphertext() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/files/patient/p1/download-encrypted/f1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(b"\x8a\x01ciphertext".to_vec(), "application/octet-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;
    let dest = tempfile::tempdir().unwrap();

    let saved = api(&server)
        .download_patient_encrypted_file(
            "p1",
            "f1",
            Some("lab.pdf.enc"),
            dest.path(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(saved, dest.path().join("lab.pdf.enc"));
    assert_eq!(std::fs::read(saved).unwrap(), b"\x8a\x01ciphertext");
}

#[tokio::test]
async fn test_ids_cannot_redirect_authenticated_calls() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/requests/x%2F..%2F..%2Fauth%2Flogin/revoke"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Request not found" })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api(&server);
    sign_in(api.gateway().session(), valid_token(), Role::Patient, "p1").await;
    let cancel = CancellationToken::new();

    let err = api
        .revoke_request("x/../../auth/login", &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Request not found");

    let err = api.revoke_request("..", &cancel).await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidRequest(_)));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].url.path().starts_with("/api/auth"));
}

#[tokio::test]
async fn test_approved_patient_files_require_session() {
    let server = MockServer::start().await;

    let err = api(&server)
        .get_approved_patient_files("p1", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::SessionExpired));
    assert_eq!(request_count(&server).await, 0);
}

// =============================================================================
// Summaries
// =============================================================================

#[tokio::test]
async fn test_summarize_doctor_file_forwards_options() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/summarize/doctor/patient/p1/file/f1"))
        .and(body_json(json!({ "useGollie": true, "schematic": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "summary": "Normal CBC." })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api(&server);
    sign_in(api.gateway().session(), valid_token(), Role::Doctor, "d1").await;

    let options = SummaryOptions {
        use_gollie: true,
        schematic: false,
    };
    let summary = api
        .summarize_doctor_file("p1", "f1", options, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.summary, "Normal CBC.");
}

#[tokio::test]
async fn test_summarize_text_includes_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/summarize/text"))
        .and(body_json(json!({ "text": "BP 120/80", "useGollie": false, "schematic": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "summary": "BP normal." })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api(&server);
    sign_in(api.gateway().session(), valid_token(), Role::Doctor, "d1").await;

    let options = SummaryOptions {
        use_gollie: false,
        schematic: true,
    };
    let summary = api
        .summarize_text("BP 120/80", options, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.summary, "BP normal.");
}
