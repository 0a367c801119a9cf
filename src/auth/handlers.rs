use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{CredentialsRequest, PublicUser, SignInResponse, SignUpResponse},
        error::{AuthError, AuthResult},
    },
    state::AppState,
};

pub const MIN_PASSWORD_CHARS: usize = 6;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/signin", post(signin))
}

/// Pulls both fields out of the body; an empty string counts as missing.
fn require_credentials(
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> AuthResult<(String, String)> {
    let Json(req) = payload.map_err(|e| {
        warn!(error = %e, "malformed request body");
        AuthError::BadRequest("Email and password are required".into())
    })?;
    match (req.email, req.password) {
        (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
            Ok((email, password))
        }
        _ => {
            warn!("missing email or password");
            Err(AuthError::BadRequest("Email and password are required".into()))
        }
    }
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> AuthResult<(StatusCode, Json<SignUpResponse>)> {
    let (email, password) = require_credentials(payload)?;

    if password.chars().count() < MIN_PASSWORD_CHARS {
        warn!("password too short");
        return Err(AuthError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_CHARS} characters long"
        )));
    }

    if state.store.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AuthError::Conflict);
    }

    let hash = state.passwords.hash_blocking(password).await?;

    // The store re-checks uniqueness, so a concurrent sign-up that slipped
    // past the lookup above still ends as Conflict.
    let user = state.store.create(&email, &hash).await.map_err(|e| {
        let e = AuthError::from(e);
        if matches!(e, AuthError::Conflict) {
            warn!(email = %email, "email already registered");
        }
        e
    })?;

    info!(user_id = user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(SignUpResponse {
            message: "User created successfully",
            user: PublicUser::from(user),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn signin(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> AuthResult<Json<SignInResponse>> {
    let (email, password) = require_credentials(payload)?;

    let Some(user) = state.store.find_by_email(&email).await? else {
        // Same Argon2 work as a wrong password so timing does not reveal
        // whether the account exists.
        state.passwords.verify_blocking(password, None).await?;
        warn!(email = %email, "signin unknown email");
        return Err(AuthError::Unauthorized);
    };

    let ok = state
        .passwords
        .verify_blocking(password, Some(user.password_hash.clone()))
        .await?;
    if !ok {
        warn!(email = %email, user_id = user.id, "signin invalid password");
        return Err(AuthError::Unauthorized);
    }

    let token = state.keys.issue(user.id, &user.email)?;

    info!(user_id = user.id, email = %user.email, "user signed in");
    Ok(Json(SignInResponse {
        message: "Sign in successful",
        token,
        user: PublicUser::from(user),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use async_trait::async_trait;

    use crate::{
        auth::{
            repo::{MemoryUserStore, StoreError, UserStore},
            repo_types::User,
        },
        config::StorageBackend,
    };

    /// Memory store that counts every call it receives.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryUserStore,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl UserStore for CountingStore {
        async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.find_by_email(email).await
        }
        async fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.create(email, password_hash).await
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
        fn backend(&self) -> StorageBackend {
            StorageBackend::Memory
        }
    }

    /// Store whose lookup never sees the existing row, as when two sign-ups
    /// race past `find_by_email`.
    struct BlindLookupStore(MemoryUserStore);

    #[async_trait]
    impl UserStore for BlindLookupStore {
        async fn find_by_email(&self, _email: &str) -> Result<Option<User>, StoreError> {
            Ok(None)
        }
        async fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
            self.0.create(email, password_hash).await
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
        fn backend(&self) -> StorageBackend {
            StorageBackend::Memory
        }
    }

    fn body(email: Option<&str>, password: Option<&str>) -> Result<Json<CredentialsRequest>, JsonRejection> {
        Ok(Json(CredentialsRequest {
            email: email.map(String::from),
            password: password.map(String::from),
        }))
    }

    #[tokio::test]
    async fn short_password_rejected_before_store_access() {
        let store = Arc::new(CountingStore::default());
        let state = AppState::for_tests(store.clone());

        let err = signup(State(state), body(Some("a@x.com"), Some("12345")))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::BadRequest(_)));
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn six_unicode_chars_is_long_enough() {
        let state = AppState::for_tests(MemoryUserStore::shared());
        let (status, Json(res)) = signup(State(state), body(Some("a@x.com"), Some("pässwö")))
            .await
            .expect("signup");
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(res.user.id, 1);
    }

    #[tokio::test]
    async fn missing_or_empty_fields_are_bad_requests() {
        let state = AppState::for_tests(MemoryUserStore::shared());
        for (email, password) in [
            (None, Some("secret1")),
            (Some("a@x.com"), None),
            (Some(""), Some("secret1")),
            (Some("a@x.com"), Some("")),
        ] {
            let err = signup(State(state.clone()), body(email, password)).await.unwrap_err();
            assert!(matches!(err, AuthError::BadRequest(_)));
            let err = signin(State(state.clone()), body(email, password)).await.unwrap_err();
            assert!(matches!(err, AuthError::BadRequest(_)));
        }
    }

    #[tokio::test]
    async fn conflict_from_create_is_reported_as_conflict() {
        let state = AppState::for_tests(Arc::new(BlindLookupStore(MemoryUserStore::new())));
        signup(State(state.clone()), body(Some("a@x.com"), Some("secret1")))
            .await
            .expect("first signup");
        let err = signup(State(state), body(Some("a@x.com"), Some("secret2")))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict));
    }

    #[tokio::test]
    async fn signin_issues_token_for_registered_user() {
        let state = AppState::for_tests(MemoryUserStore::shared());
        signup(State(state.clone()), body(Some("a@x.com"), Some("secret1")))
            .await
            .expect("signup");

        let Json(res) = signin(State(state.clone()), body(Some("a@x.com"), Some("secret1")))
            .await
            .expect("signin");
        let claims = state.keys.verify(&res.token).expect("verify");
        assert_eq!(claims.user_id, res.user.id);
        assert_eq!(claims.email, "a@x.com");
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_look_the_same() {
        let state = AppState::for_tests(MemoryUserStore::shared());
        signup(State(state.clone()), body(Some("a@x.com"), Some("secret1")))
            .await
            .expect("signup");

        let unknown = signin(State(state.clone()), body(Some("b@x.com"), Some("secret1")))
            .await
            .unwrap_err();
        let wrong = signin(State(state), body(Some("a@x.com"), Some("wrong")))
            .await
            .unwrap_err();
        assert_eq!(unknown.status_code(), wrong.status_code());
        assert_eq!(unknown.to_string(), wrong.to_string());
        assert_eq!(unknown.to_string(), "Invalid credentials");
    }

    struct BrokenStore;

    #[async_trait]
    impl UserStore for BrokenStore {
        async fn find_by_email(&self, _email: &str) -> Result<Option<User>, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }
        async fn create(&self, _email: &str, _hash: &str) -> Result<User, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
        fn backend(&self) -> StorageBackend {
            StorageBackend::Postgres
        }
    }

    #[tokio::test]
    async fn storage_failure_is_unexpected() {
        let state = AppState::for_tests(Arc::new(BrokenStore));
        let err = signup(State(state.clone()), body(Some("a@x.com"), Some("secret1")))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unexpected(_)));
        let err = signin(State(state), body(Some("a@x.com"), Some("secret1")))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Internal server error");
    }

    #[tokio::test]
    async fn unrepresentable_expiry_fails_signin_without_panicking() {
        let mut state = AppState::for_tests(MemoryUserStore::shared());
        signup(State(state.clone()), body(Some("a@x.com"), Some("secret1")))
            .await
            .expect("signup");

        state.keys = crate::auth::jwt::JwtKeys::new(&crate::config::JwtConfig {
            secret: "test-secret".into(),
            secret_is_fallback: false,
            ttl_minutes: 10_000_000_000,
        });
        let err = signin(State(state), body(Some("a@x.com"), Some("secret1")))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unexpected(_)));
    }

    #[tokio::test]
    async fn unknown_email_still_reads_the_store_once() {
        let store = Arc::new(CountingStore::default());
        let state = AppState::for_tests(store.clone());
        let err = signin(State(state), body(Some("ghost@x.com"), Some("secret1")))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized));
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }
}
