//! Handlers for `/api/auth` and `/api/profile`.
//!
//! | Method   | Path                | Notes |
//! |----------|---------------------|-------|
//! | `POST`   | `/api/auth/register` | Body: [`RegisterBody`]; 201 + token |
//! | `POST`   | `/api/auth/login`    | Body: [`LoginBody`]; token |
//! | `POST`   | `/api/auth/external` | Body: [`ExternalLoginBody`]; find-or-create, token |
//! | `POST`   | `/api/auth/logout`   | Tokens are stateless; acknowledgement only |
//! | `GET`    | `/api/auth/me`       | Principal + live subscription |
//! | `DELETE` | `/api/auth/me`       | Soft deactivation |
//! | `GET`    | `/api/profile/{id}`  | Self or admin, within the request tenant |

use axum::extract::{Path, State};
use chrono::Utc;
use gumbo_core::{
  principal::{NewPrincipal, Principal, normalize_email},
  store::Repository,
  subscription::Subscription,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  AppState,
  auth::RequireAuth,
  envelope::{Created, Data},
  error::ApiError,
  handlers::{JsonBody, save_transition},
  password::{hash_password, verify_password},
  tenant::ResolvedTenant,
};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Serialize)]
pub struct Session {
  pub token:     String,
  pub principal: Principal,
}

#[derive(Debug, Serialize)]
pub struct Me {
  pub principal:     Principal,
  pub subscription:  Option<Subscription>,
  pub is_subscribed: bool,
}

// ─── Register ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
  pub email:        String,
  pub password:     String,
  pub username:     Option<String>,
  pub display_name: Option<String>,
}

/// `POST /api/auth/register`
pub async fn register<S>(
  State(state): State<AppState<S>>,
  tenant: ResolvedTenant,
  JsonBody(body): JsonBody<RegisterBody>,
) -> Result<Created<Session>, ApiError>
where
  S: Repository + Clone + 'static,
{
  let email = normalize_email(&body.email);
  if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
    return Err(ApiError::Validation("a valid email is required".to_owned()));
  }
  if body.password.chars().count() < MIN_PASSWORD_LEN {
    return Err(ApiError::Validation(format!(
      "password must be at least {MIN_PASSWORD_LEN} characters"
    )));
  }

  let mut input = NewPrincipal::new(tenant.id, &email);
  input.username = body.username;
  input.display_name = body.display_name;
  input.password_hash = Some(hash_password(&body.password)?);

  let principal = state.store.create_principal(input).await.map_err(ApiError::store)?;
  let token = state.tokens.issue(principal.principal_id, Utc::now())?;
  tracing::info!(principal_id = %principal.principal_id, tenant = %principal.tenant, "registered");

  Ok(Created(Session { token, principal }))
}

// ─── Login ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginBody {
  pub email:    String,
  pub password: String,
}

/// `POST /api/auth/login`
pub async fn login<S>(
  State(state): State<AppState<S>>,
  tenant: ResolvedTenant,
  JsonBody(body): JsonBody<LoginBody>,
) -> Result<Data<Session>, ApiError>
where
  S: Repository + Clone + 'static,
{
  let principal = state
    .store
    .find_principal_by_email(&tenant.id, &normalize_email(&body.email))
    .await
    .map_err(ApiError::store)?
    .ok_or(ApiError::InvalidCredentials)?;

  let verified = principal
    .password_hash
    .as_deref()
    .is_some_and(|hash| verify_password(&body.password, hash));
  if !verified {
    return Err(ApiError::InvalidCredentials);
  }
  if !principal.is_active {
    return Err(ApiError::AccountDeactivated);
  }

  let now = Utc::now();
  state
    .store
    .record_login(principal.principal_id, now)
    .await
    .map_err(ApiError::store)?;
  let token = state.tokens.issue(principal.principal_id, now)?;

  Ok(Data(Session {
    token,
    principal: Principal { last_login_at: Some(now), ..principal },
  }))
}

// ─── External identity ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ExternalLoginBody {
  pub id_token: String,
}

/// `POST /api/auth/external`
///
/// Signs in with a provider identity token. The principal is found by its
/// linked subject, then by email (linking a local account on first use), and
/// created in the request tenant otherwise. Every login refreshes the display
/// name and `last_login_at`.
pub async fn external_login<S>(
  State(state): State<AppState<S>>,
  tenant: ResolvedTenant,
  JsonBody(body): JsonBody<ExternalLoginBody>,
) -> Result<Data<Session>, ApiError>
where
  S: Repository + Clone + 'static,
{
  let profile = state.identity.verify(&body.id_token).ok_or(ApiError::InvalidToken)?;

  let mut existing = state
    .store
    .find_principal_by_external_id(&tenant.id, &profile.subject)
    .await
    .map_err(ApiError::store)?;
  if existing.is_none() {
    existing = state
      .store
      .find_principal_by_email(&tenant.id, &profile.email)
      .await
      .map_err(ApiError::store)?;
  }

  let principal = match existing {
    Some(principal) => {
      if !principal.is_active {
        return Err(ApiError::AccountDeactivated);
      }
      if principal
        .external_id
        .as_deref()
        .is_some_and(|linked| linked != profile.subject)
      {
        return Err(ApiError::Conflict(
          "email is linked to a different external account".to_owned(),
        ));
      }
      principal
    }
    None => {
      let principal = state
        .store
        .create_principal(profile.new_principal(tenant.id.clone()))
        .await
        .map_err(ApiError::store)?;
      tracing::info!(
        principal_id = %principal.principal_id,
        tenant = %principal.tenant,
        "registered via external identity"
      );
      principal
    }
  };

  let now = Utc::now();
  state
    .store
    .record_external_login(principal.principal_id, &profile, now)
    .await
    .map_err(ApiError::store)?;
  let token = state.tokens.issue(principal.principal_id, now)?;

  Ok(Data(Session {
    token,
    principal: Principal {
      external_id: Some(profile.subject),
      display_name: profile.display_name.or(principal.display_name),
      last_login_at: Some(now),
      ..principal
    },
  }))
}

// ─── Session ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Message {
  pub message: &'static str,
}

/// `POST /api/auth/logout`
pub async fn logout(RequireAuth(_): RequireAuth) -> Data<Message> {
  Data(Message { message: "Logged out" })
}

/// `GET /api/auth/me`
pub async fn me(RequireAuth(ctx): RequireAuth) -> Data<Me> {
  let is_subscribed = ctx.viewer().is_subscribed(Utc::now());
  Data(Me {
    principal: ctx.principal,
    subscription: ctx.subscription,
    is_subscribed,
  })
}

/// `DELETE /api/auth/me`
///
/// Cancels the live subscription, then deactivates the account.
pub async fn delete_me<S>(
  State(state): State<AppState<S>>,
  RequireAuth(ctx): RequireAuth,
) -> Result<Data<Message>, ApiError>
where
  S: Repository + Clone + 'static,
{
  let now = Utc::now();
  if let Some(subscription) = ctx.subscription {
    let (_, verdict) =
      save_transition(state.store.as_ref(), subscription, |s| s.cancel("account deleted", now))
        .await?;
    verdict?;
  }

  state
    .store
    .deactivate_principal(ctx.principal.principal_id)
    .await
    .map_err(ApiError::store)?;
  tracing::info!(principal_id = %ctx.principal.principal_id, "account deactivated");

  Ok(Data(Message { message: "Account deleted" }))
}

// ─── Profile ──────────────────────────────────────────────────────────────────

/// `GET /api/profile/{id}`
pub async fn profile<S>(
  State(state): State<AppState<S>>,
  tenant: ResolvedTenant,
  RequireAuth(ctx): RequireAuth,
  Path(id): Path<Uuid>,
) -> Result<Data<Me>, ApiError>
where
  S: Repository + Clone + 'static,
{
  if ctx.principal.principal_id != id && !ctx.principal.is_admin() {
    return Err(ApiError::InsufficientRole);
  }

  let principal = state
    .store
    .get_principal_in_tenant(id, &tenant.id)
    .await
    .map_err(ApiError::store)?
    .filter(|p| p.is_active)
    .ok_or_else(|| ApiError::NotFound(format!("profile {id} not found")))?;

  let now = Utc::now();
  let subscription = state
    .store
    .active_subscription(principal.principal_id, now)
    .await
    .map_err(ApiError::store)?;

  Ok(Data(Me {
    is_subscribed: subscription.as_ref().is_some_and(|s| s.is_active_at(now)),
    principal,
    subscription,
  }))
}
