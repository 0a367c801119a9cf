use serde::{Deserialize, Serialize};

use crate::auth::repo_types::User;

/// Request body for sign-up and sign-in. Fields are optional so that a
/// missing one is reported as a 400 by the handler rather than by the
/// JSON extractor.
#[derive(Debug, Default, Deserialize)]
pub struct CredentialsRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Response returned after sign-up.
#[derive(Debug, Serialize)]
pub struct SignUpResponse {
    pub message: &'static str,
    pub user: PublicUser,
}

/// Response returned after sign-in.
#[derive(Debug, Serialize)]
pub struct SignInResponse {
    pub message: &'static str,
    pub token: String,
    pub user: PublicUser,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct PublicUser {
    pub id: i64,
    pub email: String,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
        }
    }
}

/// Body of every error response.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
