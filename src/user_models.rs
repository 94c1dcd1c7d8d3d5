use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::Document;

/// Public profile document, one per account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: String, username: String, display_name: String) -> Self {
        Self {
            id,
            display_name,
            username,
            avatar_url: None,
            country: None,
            language: None,
            interests: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

impl Document for User {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Credentials behind a [`User`]. Never leaves the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(email: String, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email,
            password_hash,
            email_verified: false,
            created_at: Utc::now(),
        }
    }
}

impl Document for Account {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    VerifyEmail,
    ResetPassword,
}

/// Out-of-band one-time code, the kind mailed in verification and reset links.
#[derive(Debug, Clone)]
pub struct ActionCode {
    pub code: String,
    pub uid: String,
    pub kind: ActionKind,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub username: String,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
    pub email_verified: bool,
    /// Only present right after sign-up; stands in for the verification mail.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub verification_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordResetResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reset_code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPasswordResetRequest {
    pub code: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub code: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    pub username: Option<String>,
    pub country: Option<String>,
    pub language: Option<String>,
    pub interests: Option<Vec<String>>,
}
