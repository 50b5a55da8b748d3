//! Access-token persistence for the cloud-drive API.
//!
//! The OAuth dance itself happens out-of-band (browser popup / device flow);
//! what lands here is the resulting bearer token plus its expiry. Every
//! remote operation fetches the token through [`access_token`], which fails
//! fast — before any network call — when the user is not logged in or the
//! token has lapsed.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::warn;

use crate::storage::{keys, LocalStore};

/// Default token lifetime when the provider does not say: one hour.
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

#[derive(Debug, Error, PartialEq)]
pub enum AuthError {
    #[error("not logged in")]
    NotLoggedIn,
    #[error("access token expired — log in again")]
    TokenExpired,
}

/// Store a freshly obtained access token with its expiry.
pub async fn save_token(store: &LocalStore, token: &str, ttl_secs: Option<i64>) -> Result<()> {
    let expires = Utc::now() + Duration::seconds(ttl_secs.unwrap_or(DEFAULT_TOKEN_TTL_SECS));
    store.set_setting(keys::ACCESS_TOKEN, token).await?;
    store
        .set_setting(keys::ACCESS_TOKEN_EXPIRES, &expires.to_rfc3339())
        .await?;
    Ok(())
}

/// Forget the stored token (logout).
pub async fn clear_token(store: &LocalStore) -> Result<()> {
    store.delete_setting(keys::ACCESS_TOKEN).await?;
    store.delete_setting(keys::ACCESS_TOKEN_EXPIRES).await?;
    Ok(())
}

/// The stored token, if present and unexpired. An expired token is removed
/// on the way out so the next attempt reports "not logged in".
pub async fn access_token(store: &LocalStore) -> Result<String> {
    let token = store
        .get_setting(keys::ACCESS_TOKEN)
        .await?
        .ok_or(AuthError::NotLoggedIn)?;

    if let Some(expires) = store.get_setting(keys::ACCESS_TOKEN_EXPIRES).await? {
        match DateTime::parse_from_rfc3339(&expires) {
            Ok(expires) if expires <= Utc::now() => {
                warn!("stored access token expired");
                clear_token(store).await?;
                return Err(AuthError::TokenExpired.into());
            }
            Ok(_) => {}
            Err(e) => warn!(err = %e, "unparseable token expiry — treating token as valid"),
        }
    }
    Ok(token)
}

pub async fn is_logged_in(store: &LocalStore) -> bool {
    access_token(store).await.is_ok()
}
