//! Email/password accounts, bearer sessions and one-time action codes.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult, AuthErrorCode};
use crate::profile;
use crate::state::AppState;
use crate::storage::Store;
use crate::user_models::{
    Account, ActionCode, ActionKind, AuthResponse, SignInRequest, SignUpRequest,
    UpdateProfileRequest, User,
};
use crate::validation;

pub const SESSION_TTL_DAYS: i64 = 30;
pub const ACTION_CODE_TTL_MINUTES: i64 = 60;

#[derive(Debug, Clone)]
struct SessionEntry {
    uid: String,
    expires_at: chrono::DateTime<Utc>,
}

pub struct AuthService {
    store: Arc<Store>,
    bcrypt_cost: u32,
    sessions: RwLock<HashMap<String, SessionEntry>>,
    codes: RwLock<HashMap<String, ActionCode>>,
}

impl AuthService {
    pub fn new(store: Arc<Store>, bcrypt_cost: u32) -> Self {
        Self {
            store,
            bcrypt_cost,
            sessions: RwLock::new(HashMap::new()),
            codes: RwLock::new(HashMap::new()),
        }
    }

    pub async fn sign_up(&self, req: SignUpRequest) -> ApiResult<AuthResponse> {
        let email = req.email.trim().to_lowercase();
        let username = req.username.trim().to_string();
        let display_name = req.display_name.trim().to_string();

        validation::check_email(&email)?;
        validation::check_password(&req.password)?;
        validation::check_username(&username)?;
        validation::require("Display name", &display_name)?;

        let password_hash = bcrypt::hash(&req.password, self.bcrypt_cost)?;
        let account = Account::new(email.clone(), password_hash);
        let user = User::new(account.id.clone(), username.clone(), display_name);

        // Accounts before users, same order as every other multi-lock path.
        let mut accounts = self.store.accounts.lock().await;
        if accounts.iter().any(|a| a.email == email) {
            return Err(ApiError::Auth(AuthErrorCode::EmailAlreadyInUse));
        }
        let mut users = self.store.users.lock().await;
        if users.iter().any(|u| u.username.eq_ignore_ascii_case(&username)) {
            return Err(ApiError::Auth(AuthErrorCode::UsernameTaken));
        }

        accounts.push(account.clone());
        users.push(user.clone());
        accounts.commit()?;
        if let Err(e) = users.commit() {
            // Both guards are released by now; drop the account so the
            // email is not left claimed by a user that does not exist.
            if let Err(undo) = self.store.accounts.remove(&account.id).await {
                tracing::error!(uid = %account.id, error = %undo, "Failed to roll back account");
            }
            return Err(e.into());
        }

        tracing::info!(uid = %user.id, username = %user.username, "Account created");

        let token = self.issue_session(&user.id).await;
        let code = self.issue_code(&user.id, ActionKind::VerifyEmail).await;

        Ok(AuthResponse {
            token,
            user,
            email_verified: false,
            verification_code: Some(code),
        })
    }

    pub async fn sign_in(&self, req: SignInRequest) -> ApiResult<AuthResponse> {
        let email = req.email.trim().to_lowercase();

        let account = self
            .store
            .accounts
            .find_one(|a| a.email == email)
            .await?
            .ok_or(ApiError::Auth(AuthErrorCode::UserNotFound))?;

        if !bcrypt::verify(&req.password, &account.password_hash)? {
            tracing::debug!(uid = %account.id, "Rejected sign-in with wrong password");
            return Err(ApiError::Auth(AuthErrorCode::WrongPassword));
        }

        let user = self
            .store
            .users
            .get(&account.id)
            .await?
            .ok_or_else(|| ApiError::Internal(format!("Account {} has no profile", account.id)))?;

        let token = self.issue_session(&user.id).await;

        Ok(AuthResponse {
            token,
            user,
            email_verified: account.email_verified,
            verification_code: None,
        })
    }

    pub async fn sign_out(&self, token: &str) {
        self.sessions.write().await.remove(token);
    }

    /// Returns the uid behind a live session token.
    pub async fn resolve(&self, token: &str) -> Option<String> {
        let sessions = self.sessions.read().await;
        sessions
            .get(token)
            .filter(|s| s.expires_at > Utc::now())
            .map(|s| s.uid.clone())
    }

    /// Issues a reset code. Unknown emails succeed silently so the endpoint
    /// does not reveal which addresses have accounts.
    pub async fn send_password_reset(&self, email: &str) -> ApiResult<Option<String>> {
        let email = email.trim().to_lowercase();
        validation::check_email(&email)?;

        let Some(account) = self.store.accounts.find_one(|a| a.email == email).await? else {
            tracing::debug!("Password reset requested for unknown email");
            return Ok(None);
        };

        Ok(Some(self.issue_code(&account.id, ActionKind::ResetPassword).await))
    }

    pub async fn confirm_password_reset(&self, code: &str, new_password: &str) -> ApiResult<()> {
        validation::check_password(new_password)?;
        let uid = self.consume_code(code, ActionKind::ResetPassword).await?;

        let password_hash = bcrypt::hash(new_password, self.bcrypt_cost)?;
        self.store
            .accounts
            .update(&uid, |a| a.password_hash = password_hash)
            .await?
            .ok_or(ApiError::Auth(AuthErrorCode::UserNotFound))?;

        // Existing sessions die with the old password.
        self.sessions.write().await.retain(|_, s| s.uid != uid);

        tracing::info!(uid = %uid, "Password reset");
        Ok(())
    }

    pub async fn verify_email(&self, code: &str) -> ApiResult<()> {
        let uid = self.consume_code(code, ActionKind::VerifyEmail).await?;

        self.store
            .accounts
            .update(&uid, |a| a.email_verified = true)
            .await?
            .ok_or(ApiError::Auth(AuthErrorCode::UserNotFound))?;

        tracing::info!(uid = %uid, "Email verified");
        Ok(())
    }

    pub async fn is_email_verified(&self, uid: &str) -> ApiResult<bool> {
        Ok(self
            .store
            .accounts
            .get(uid)
            .await?
            .map(|a| a.email_verified)
            .unwrap_or(false))
    }

    pub async fn update_display_name(&self, uid: &str, display_name: &str) -> ApiResult<User> {
        let req = UpdateProfileRequest {
            display_name: Some(display_name.to_string()),
            ..Default::default()
        };
        profile::update_profile(&self.store, uid, req).await
    }

    /// Drops expired sessions and action codes.
    pub async fn purge_expired(&self) -> (usize, usize) {
        let now = Utc::now();

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        let sessions_removed = before - sessions.len();
        drop(sessions);

        let mut codes = self.codes.write().await;
        let before = codes.len();
        codes.retain(|_, c| c.expires_at > now);
        let codes_removed = before - codes.len();

        (sessions_removed, codes_removed)
    }

    async fn issue_session(&self, uid: &str) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.sessions.write().await.insert(
            token.clone(),
            SessionEntry {
                uid: uid.to_string(),
                expires_at: Utc::now() + Duration::days(SESSION_TTL_DAYS),
            },
        );
        token
    }

    async fn issue_code(&self, uid: &str, kind: ActionKind) -> String {
        let code = Uuid::new_v4().simple().to_string();
        self.codes.write().await.insert(
            code.clone(),
            ActionCode {
                code: code.clone(),
                uid: uid.to_string(),
                kind,
                expires_at: Utc::now() + Duration::minutes(ACTION_CODE_TTL_MINUTES),
            },
        );
        code
    }

    /// Codes are single use: a code is removed whether it turns out valid,
    /// expired, or of the wrong kind.
    async fn consume_code(&self, code: &str, kind: ActionKind) -> ApiResult<String> {
        let entry = self
            .codes
            .write()
            .await
            .remove(code.trim())
            .ok_or(ApiError::Auth(AuthErrorCode::InvalidActionCode))?;

        if entry.kind != kind {
            return Err(ApiError::Auth(AuthErrorCode::InvalidActionCode));
        }
        if entry.expires_at <= Utc::now() {
            return Err(ApiError::Auth(AuthErrorCode::ExpiredActionCode));
        }
        Ok(entry.uid)
    }

    #[cfg(test)]
    async fn expire_code(&self, code: &str) {
        if let Some(c) = self.codes.write().await.get_mut(code) {
            c.expires_at = Utc::now() - Duration::seconds(1);
        }
    }
}

/// The signed-in caller, resolved from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub uid: String,
    pub token: String,
}

pub fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?
            .to_string();

        let uid = state
            .auth
            .resolve(&token)
            .await
            .ok_or_else(|| ApiError::Unauthorized("Session expired, please sign in again".to_string()))?;

        Ok(AuthUser { uid, token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        AuthService::new(Arc::new(Store::in_memory()), 4)
    }

    fn signup(email: &str, username: &str) -> SignUpRequest {
        SignUpRequest {
            email: email.to_string(),
            password: "Abcdef1!".to_string(),
            username: username.to_string(),
            display_name: "Ana".to_string(),
        }
    }

    #[tokio::test]
    async fn sign_up_then_sign_in() {
        let auth = service();
        let created = auth.sign_up(signup("Ana@Example.com", "ana")).await.unwrap();
        assert_eq!(auth.resolve(&created.token).await, Some(created.user.id.clone()));

        let signed_in = auth
            .sign_in(SignInRequest {
                email: "ana@example.com".to_string(),
                password: "Abcdef1!".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(signed_in.user.id, created.user.id);

        auth.sign_out(&signed_in.token).await;
        assert!(auth.resolve(&signed_in.token).await.is_none());
    }

    #[tokio::test]
    async fn duplicate_email_and_username_rejected() {
        let auth = service();
        auth.sign_up(signup("ana@example.com", "ana")).await.unwrap();

        let err = auth.sign_up(signup("ana@example.com", "other")).await.unwrap_err();
        assert_eq!(err.error_code(), "email-already-in-use");

        let err = auth.sign_up(signup("bo@example.com", "ANA")).await.unwrap_err();
        assert_eq!(err.error_code(), "username-taken");
    }

    #[tokio::test]
    async fn weak_password_and_bad_username_rejected() {
        let auth = service();
        let mut req = signup("ana@example.com", "ana");
        req.password = "abcdefgh".to_string();
        assert_eq!(auth.sign_up(req).await.unwrap_err().error_code(), "weak-password");

        let req = signup("ana@example.com", "ana doe!");
        assert_eq!(auth.sign_up(req).await.unwrap_err().error_code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn wrong_password() {
        let auth = service();
        auth.sign_up(signup("ana@example.com", "ana")).await.unwrap();
        let err = auth
            .sign_in(SignInRequest {
                email: "ana@example.com".to_string(),
                password: "Wrong123!".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "wrong-password");
    }

    #[tokio::test]
    async fn verification_code_is_single_use() {
        let auth = service();
        let created = auth.sign_up(signup("ana@example.com", "ana")).await.unwrap();
        let code = created.verification_code.unwrap();

        auth.verify_email(&code).await.unwrap();
        assert!(auth.is_email_verified(&created.user.id).await.unwrap());

        let err = auth.verify_email(&code).await.unwrap_err();
        assert_eq!(err.error_code(), "invalid-action-code");
    }

    #[tokio::test]
    async fn password_reset_flow() {
        let auth = service();
        let created = auth.sign_up(signup("ana@example.com", "ana")).await.unwrap();

        assert!(auth.send_password_reset("nobody@example.com").await.unwrap().is_none());
        let code = auth.send_password_reset("ana@example.com").await.unwrap().unwrap();

        // A reset code is not a verification code.
        assert!(auth.verify_email(&code).await.is_err());

        let code = auth.send_password_reset("ana@example.com").await.unwrap().unwrap();
        auth.confirm_password_reset(&code, "Newpass9#").await.unwrap();
        assert!(auth.resolve(&created.token).await.is_none());

        auth.sign_in(SignInRequest {
            email: "ana@example.com".to_string(),
            password: "Newpass9#".to_string(),
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn expired_code() {
        let auth = service();
        auth.sign_up(signup("ana@example.com", "ana")).await.unwrap();
        let code = auth.send_password_reset("ana@example.com").await.unwrap().unwrap();
        auth.expire_code(&code).await;

        let err = auth.confirm_password_reset(&code, "Newpass9#").await.unwrap_err();
        assert_eq!(err.error_code(), "expired-action-code");
        assert_eq!(auth.purge_expired().await, (0, 0));
    }

    #[tokio::test]
    async fn display_name_update_is_validated() {
        let auth = service();
        let created = auth.sign_up(signup("ana@example.com", "ana")).await.unwrap();

        let user = auth.update_display_name(&created.user.id, " Ana Doe ").await.unwrap();
        assert_eq!(user.display_name, "Ana Doe");

        assert!(auth.update_display_name(&created.user.id, "  ").await.is_err());
    }

    #[tokio::test]
    async fn failed_profile_write_releases_the_email() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path()).unwrap());
        let auth = AuthService::new(store.clone(), 4);

        let users_file = dir.path().join("users.json");
        std::fs::create_dir(&users_file).unwrap();

        let err = auth.sign_up(signup("ana@example.com", "ana")).await.unwrap_err();
        assert_eq!(err.error_code(), "INTERNAL_ERROR");
        assert!(store.accounts.all().await.unwrap().is_empty());
        assert!(store.users.all().await.unwrap().is_empty());

        std::fs::remove_dir(&users_file).unwrap();
        auth.sign_up(signup("ana@example.com", "ana")).await.unwrap();
    }
}
