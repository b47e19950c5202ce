//! care-portal CLI
//!
//! Command-line client for the care portal backend. Prints JSON on stdout.

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use portal_client::Portal;
use portal_client::config::get_configuration;
use portal_client::error::ApiError;
use portal_client::models::{
    DoctorSignup, LoginRequest, PatientSignup, RequestStatus, Role, SummaryOptions,
};
use portal_client::session::{ClearReason, Session};
use portal_core::observability::{init_tracing, shutdown_tracing};
use secrecy::Secret;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

/// Care portal command-line client
#[derive(Parser)]
#[command(name = "care-portal")]
#[command(version, about = "Care portal command-line client", long_about = None)]
struct Cli {
    /// Backend origin, overriding configuration (e.g. http://localhost:5000)
    #[arg(long, env = "CARE_PORTAL_API")]
    api: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and store the session
    Login {
        #[arg(short, long)]
        username: String,

        #[arg(short, long, env = "CARE_PORTAL_PASSWORD", hide_env_values = true)]
        password: String,

        /// patient or doctor
        #[arg(short, long, default_value = "patient")]
        role: Role,

        /// Doctor's registration id (required for doctors)
        #[arg(long)]
        unique_id: Option<String>,
    },

    /// Forget the stored session
    Logout,

    /// Show the stored session
    Whoami,

    /// Register a patient account
    SignupPatient {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: String,
        #[arg(long, env = "CARE_PORTAL_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Register a doctor account
    SignupDoctor {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: String,
        #[arg(long, env = "CARE_PORTAL_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        unique_id: String,
        #[arg(long)]
        specialization: String,
    },

    /// Email a one-time password
    SendOtp { email: String },

    /// Verify a one-time password
    VerifyOtp { email: String, otp: String },

    /// List doctors
    Doctors,

    /// Ask a doctor for a consultation
    Apply { doctor_id: String },

    /// List your consultation requests
    Requests,

    /// Approve a consultation request (doctors)
    Approve { request_id: String },

    /// Reject a consultation request (doctors)
    Reject { request_id: String },

    /// Withdraw a consultation request (patients)
    Revoke { request_id: String },

    /// List files: your own as a patient, an approved patient's as a doctor
    Files {
        #[arg(long)]
        patient: Option<String>,
    },

    /// Upload a file to your record (patients)
    Upload {
        file: PathBuf,
        #[arg(long)]
        patient: Option<String>,
    },

    /// Delete one of your files (patients)
    DeleteFile {
        file_id: String,
        #[arg(long)]
        patient: Option<String>,
    },

    /// Download a file, decrypted unless --encrypted is given
    Download {
        file_id: String,
        #[arg(long)]
        patient: Option<String>,
        /// Fetch the stored ciphertext instead (patients)
        #[arg(long)]
        encrypted: bool,
        /// File name to save as
        #[arg(long)]
        name: Option<String>,
        /// Directory to save into
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },

    /// Summarize an approved patient's file (doctors)
    Summarize {
        patient_id: String,
        file_id: String,
        #[arg(long)]
        gollie: bool,
        #[arg(long)]
        schematic: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenv().ok();
    let cli = Cli::parse();

    let mut settings = get_configuration().context("Failed to read configuration")?;
    if let Some(api) = cli.api {
        settings.api.base_url = api;
    }

    init_tracing(
        "care-portal",
        &settings.telemetry.log_level,
        settings.telemetry.otlp_endpoint.as_deref(),
    )?;

    let portal = Portal::from_settings(&settings).context("Failed to initialize portal client")?;

    let mut events = portal.session.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::info!(?event, "Session state changed");
        }
    });

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let outcome = run(cli.command, &portal, &cancel).await;

    // The batch exporter only ships spans on flush; a short CLI run would
    // otherwise lose all of them.
    if let Err(e) = tokio::task::spawn_blocking(shutdown_tracing).await {
        tracing::warn!(error = %e, "Failed to flush telemetry");
    }

    match outcome {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) if e.is_session_expired() => {
            if let Err(clear_err) = portal.session.clear(ClearReason::Expired).await {
                tracing::warn!(error = %clear_err, "Failed to purge expired session");
            }
            eprintln!("Session expired. Please log in again with `care-portal login`.");
            Ok(ExitCode::from(2))
        }
        Err(ApiError::Cancelled) => {
            eprintln!("Cancelled.");
            Ok(ExitCode::from(130))
        }
        Err(e) => Err(e.into()),
    }
}

async fn current_session(portal: &Portal) -> Result<Session, ApiError> {
    portal.session.get().await?.ok_or(ApiError::SessionExpired)
}

/// `--patient` when given, otherwise the signed-in patient's own id.
async fn patient_id(portal: &Portal, explicit: Option<String>) -> Result<String, ApiError> {
    if let Some(id) = explicit {
        return Ok(id);
    }

    let session = current_session(portal).await?;
    if session.role != Role::Patient {
        return Err(ApiError::InvalidRequest(
            "--patient is required when signed in as a doctor".to_string(),
        ));
    }
    Ok(session.user_id)
}

async fn run(command: Command, portal: &Portal, cancel: &CancellationToken) -> Result<Value, ApiError> {
    let api = &portal.api;

    let output = match command {
        Command::Login {
            username,
            password,
            role,
            unique_id,
        } => {
            let credentials = LoginRequest {
                username,
                password: Secret::new(password),
                role,
                unique_id,
            };
            let login = api.login(&credentials, cancel).await?;
            json!({
                "message": login.message,
                "role": role,
                "userId": login.user_id(),
                "sessionStored": login.token.is_some(),
            })
        }
        Command::Logout => {
            api.logout().await?;
            json!({ "message": "Logged out" })
        }
        Command::Whoami => match portal.session.get().await? {
            Some(session) => json!({ "role": session.role, "userId": session.user_id }),
            None => json!({ "role": null, "userId": null }),
        },
        Command::SignupPatient {
            name,
            email,
            username,
            password,
        } => {
            let signup = PatientSignup {
                name,
                email,
                username,
                password: Secret::new(password),
            };
            serde_json::to_value(api.patient_signup(&signup, cancel).await?)?
        }
        Command::SignupDoctor {
            name,
            email,
            username,
            password,
            unique_id,
            specialization,
        } => {
            let signup = DoctorSignup {
                name,
                username,
                email,
                password: Secret::new(password),
                unique_id,
                specialization,
            };
            serde_json::to_value(api.doctor_signup(&signup, cancel).await?)?
        }
        Command::SendOtp { email } => serde_json::to_value(api.send_otp(&email, cancel).await?)?,
        Command::VerifyOtp { email, otp } => {
            serde_json::to_value(api.verify_otp(&email, &otp, cancel).await?)?
        }
        Command::Doctors => serde_json::to_value(api.get_doctors(cancel).await?)?,
        Command::Apply { doctor_id } => {
            serde_json::to_value(api.apply_to_doctor(&doctor_id, cancel).await?)?
        }
        Command::Requests => {
            let requests = match current_session(portal).await?.role {
                Role::Doctor => api.get_doctor_requests(cancel).await?,
                Role::Patient => api.get_patient_requests(cancel).await?,
            };
            serde_json::to_value(requests)?
        }
        Command::Approve { request_id } => serde_json::to_value(
            api.update_request_status(&request_id, RequestStatus::Approved, cancel)
                .await?,
        )?,
        Command::Reject { request_id } => serde_json::to_value(
            api.update_request_status(&request_id, RequestStatus::Rejected, cancel)
                .await?,
        )?,
        Command::Revoke { request_id } => {
            serde_json::to_value(api.revoke_request(&request_id, cancel).await?)?
        }
        Command::Files { patient } => {
            let session = portal.session.get().await?;
            let files = match (session.map(|s| s.role), patient) {
                (Some(Role::Doctor), Some(patient)) => {
                    api.get_approved_patient_files(&patient, cancel).await?
                }
                (_, patient) => {
                    let patient = patient_id(portal, patient).await?;
                    api.list_patient_files(&patient, cancel).await?
                }
            };
            serde_json::to_value(files)?
        }
        Command::Upload { file, patient } => {
            let patient = patient_id(portal, patient).await?;
            api.upload_patient_file(&patient, &file, cancel).await?;
            json!({ "message": "File encrypted & uploaded successfully" })
        }
        Command::DeleteFile { file_id, patient } => {
            let patient = patient_id(portal, patient).await?;
            serde_json::to_value(api.delete_patient_file(&patient, &file_id, cancel).await?)?
        }
        Command::Download {
            file_id,
            patient,
            encrypted,
            name,
            out,
        } => {
            let session = portal.session.get().await?;
            let saved = match (session.map(|s| s.role), patient) {
                (Some(Role::Doctor), Some(_)) if encrypted => {
                    return Err(ApiError::InvalidRequest(
                        "--encrypted is only available for a patient's own files".to_string(),
                    ));
                }
                (Some(Role::Doctor), Some(patient)) => {
                    api.download_doctor_file(&patient, &file_id, name.as_deref(), &out, cancel)
                        .await?
                }
                (_, patient) => {
                    let patient = patient_id(portal, patient).await?;
                    if encrypted {
                        api.download_patient_encrypted_file(
                            &patient,
                            &file_id,
                            name.as_deref(),
                            &out,
                            cancel,
                        )
                        .await?
                    } else {
                        api.download_patient_file(&patient, &file_id, name.as_deref(), &out, cancel)
                            .await?
                    }
                }
            };
            json!({ "saved": saved })
        }
        Command::Summarize {
            patient_id,
            file_id,
            gollie,
            schematic,
        } => {
            let options = SummaryOptions {
                use_gollie: gollie,
                schematic,
            };
            serde_json::to_value(
                api.summarize_doctor_file(&patient_id, &file_id, options, cancel)
                    .await?,
            )?
        }
    };

    Ok(output)
}
