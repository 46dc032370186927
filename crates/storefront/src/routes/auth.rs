//! Authentication route handlers.
//!
//! Login and registration are forms inside the auth modal. The backend
//! decides; we keep the returned user in the session. Failures reopen the
//! modal on the page the visitor came from, with the reason shown inside it.

use axum::{
    Form,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use myrmeco_core::{Email, EmailError, Phone, PhoneError};
use serde::Deserialize;
use thiserror::Error;
use tower_sessions::Session;
use tracing::instrument;

use super::layout::{AuthMode, safe_return_path, with_auth_modal};
use crate::api::{ApiError, GENERIC_FAILURE, RegisterRequest};
use crate::error::{Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{OptionalUser, clear_current_user, set_current_user};
use crate::models::{CurrentUser, Flash, push_flash, session_keys};
use crate::services::visitor;
use crate::state::AppState;

/// Shortest password the registration form accepts.
pub const MIN_PASSWORD_LEN: usize = 6;

// =============================================================================
// Form Types
// =============================================================================

/// Login form data.
#[derive(Deserialize)]
pub struct LoginForm {
    /// Username, email, or phone number.
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub password: String,
    pub next: Option<String>,
}

/// Registration form data.
#[derive(Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub phone: Option<String>,
    pub next: Option<String>,
}

/// Logout form data.
#[derive(Debug, Deserialize)]
pub struct LogoutForm {
    pub next: Option<String>,
}

/// Why a registration form was refused before reaching the backend.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("Please fill in username, email, and password")]
    MissingFields,
    #[error("Please enter a valid email address")]
    Email(#[from] EmailError),
    #[error("Password must be at least {} characters", MIN_PASSWORD_LEN)]
    PasswordTooShort,
    #[error("Please enter a valid mobile number")]
    Phone(#[from] PhoneError),
}

impl RegisterForm {
    /// Phone number, if one was entered.
    #[must_use]
    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }

    /// Check the form before sending it to the backend.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> std::result::Result<(), RegistrationError> {
        if self.username.trim().is_empty()
            || self.email.trim().is_empty()
            || self.password.is_empty()
        {
            return Err(RegistrationError::MissingFields);
        }
        Email::parse(&self.email)?;
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(RegistrationError::PasswordTooShort);
        }
        if let Some(phone) = self.phone() {
            Phone::parse(phone)?;
        }
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Reopen the auth modal on `next` with `message` inside it.
async fn reopen_modal(session: &Session, next: &str, mode: AuthMode, message: &str) -> Response {
    if let Err(e) = session.insert(session_keys::AUTH_ERROR, message).await {
        tracing::warn!(error = %e, "Failed to store auth error");
    }
    Redirect::to(&with_auth_modal(next, mode)).into_response()
}

fn failure_message(error: &ApiError, fallback: &'static str) -> String {
    match error {
        ApiError::Http(_) | ApiError::RateLimited(_) => GENERIC_FAILURE.to_string(),
        _ => error.backend_message().unwrap_or(fallback).to_string(),
    }
}

// =============================================================================
// Login & Logout
// =============================================================================

/// Handle login form submission.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    let next = safe_return_path(form.next.as_deref()).to_string();
    let account = form.account.trim();

    if account.is_empty() || form.password.is_empty() {
        return Ok(reopen_modal(
            &session,
            &next,
            AuthMode::Login,
            "Please enter your account and password",
        )
        .await);
    }

    let body = match state.api().login(account, &form.password).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!("Login failed: {e}");
            let message = failure_message(&e, "Login failed, please check your account and password");
            return Ok(reopen_modal(&session, &next, AuthMode::Login, &message).await);
        }
    };

    let user = CurrentUser::from_login(&body);

    // New identity, new session id
    session.cycle_id().await?;
    set_current_user(&session, &user).await?;
    visitor::merge_guest_cart(&session, state.cart_sync(), &user).await?;

    set_sentry_user(&user.id, user.email.as_deref());
    tracing::info!(user_id = %user.id, "User logged in");

    let message = body
        .message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("Welcome back, {}", user.username));
    push_flash(&session, Flash::success(message)).await;

    Ok(Redirect::to(&next).into_response())
}

/// Handle registration form submission.
///
/// On success the modal switches to login.
#[instrument(skip_all, fields(username = %form.username))]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RegisterForm>,
) -> Response {
    let next = safe_return_path(form.next.as_deref()).to_string();

    if let Err(e) = form.validate() {
        return reopen_modal(&session, &next, AuthMode::Register, &e.to_string()).await;
    }

    let request = RegisterRequest {
        username: form.username.trim(),
        email: form.email.trim(),
        password: &form.password,
        phone: form.phone(),
    };

    match state.api().register(&request).await {
        Ok(message) => {
            tracing::info!("Account registered");
            let message = message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "Registration successful, please log in".to_string());
            push_flash(&session, Flash::success(message)).await;
            Redirect::to(&with_auth_modal(&next, AuthMode::Login)).into_response()
        }
        Err(e) => {
            tracing::warn!("Registration failed: {e}");
            let message = failure_message(&e, "Registration failed, please try again");
            reopen_modal(&session, &next, AuthMode::Register, &message).await
        }
    }
}

/// Handle logout.
///
/// The backend is told best effort. Carts stay in the session.
#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    session: Session,
    OptionalUser(user): OptionalUser,
    Form(form): Form<LogoutForm>,
) -> Result<Redirect> {
    if let Some(user) = user {
        if let Err(e) = state.api().logout(user.token.as_ref()).await {
            tracing::warn!("Backend logout failed: {e}");
        }
        clear_current_user(&session).await?;
        clear_sentry_user();
        tracing::info!(user_id = %user.id, "User logged out");
        push_flash(&session, Flash::info("You have been logged out")).await;
    }

    Ok(Redirect::to(safe_return_path(form.next.as_deref())))
}
