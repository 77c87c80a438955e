//! Shared data models for the CrowdGuard backend.
//!
//! This crate provides Serde-serializable types for:
//! - Accounts and the per-account scoping key
//! - Guards, cameras and per-gate settings
//! - Phone number normalization for alert delivery
//! - Analysis requests, results and dispatch outcomes

pub mod account;
pub mod alert;
pub mod analysis;
pub mod camera;
pub mod error;
pub mod gate;
pub mod guard;
pub mod phone;
pub mod user;

// Re-export common types
pub use account::AccountId;
pub use alert::{CountSource, DeliveryMode, DispatchOutcome};
pub use analysis::{AnalysisResponse, DetectionMode};
pub use camera::{Camera, CameraSource, CameraStatus, UpsertCamera};
pub use error::{ModelError, ModelResult};
pub use gate::{GateSettings, UpdateGateSettings, DEFAULT_ALERT_THRESHOLD};
pub use guard::{Guard, GuardId, GuardStatus, NewGuard};
pub use phone::PhoneNumber;
pub use user::{LoginRequest, ResetPasswordRequest, SignupRequest, User};
