use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{error, info};
use uuid::Uuid;

use parley_db::{AccountStore, MessageStore, NewAccount};
use parley_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use parley_types::models::Role;

use crate::error::ChatError;
use crate::service::{ChatService, blocking};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub chat: ChatService,
    pub accounts: Arc<dyn AccountStore>,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
}

impl AppStateInner {
    /// Wires one backend into both the chat service and the account store.
    pub fn new<B>(backend: Arc<B>, jwt_secret: String, token_ttl: chrono::Duration) -> AppState
    where
        B: MessageStore + AccountStore + 'static,
    {
        Arc::new(Self {
            chat: ChatService::new(backend.clone(), backend.clone()),
            accounts: backend,
            jwt_secret,
            token_ttl,
        })
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ChatError> {
    // Validate input
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(ChatError::InvalidArgument("username must be 3-32 characters".into()));
    }
    if req.password.len() < 8 {
        return Err(ChatError::InvalidArgument("password must be at least 8 characters".into()));
    }
    let role = req.role.unwrap_or(Role::User);
    if role == Role::Admin {
        return Err(ChatError::InvalidArgument("admin accounts cannot self-register".into()));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Password hashing failed: {}", e);
            ChatError::DependencyUnavailable("password hashing failed".into())
        })?
        .to_string();

    let user_id = Uuid::new_v4();
    let designer_profile_id = (role == Role::Designer).then(Uuid::new_v4);
    let display_name = req
        .display_name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| req.username.clone());
    let username = req.username.clone();

    let accounts = state.accounts.clone();
    blocking(move || {
        let created = accounts.create_account(NewAccount {
            id: user_id,
            username,
            password_hash,
            display_name,
            avatar: req.avatar,
            role,
        })?;
        if !created {
            return Err(ChatError::Conflict("username already taken".into()));
        }
        if let Some(profile_id) = designer_profile_id {
            accounts.create_designer_profile(profile_id, user_id)?;
        }
        Ok(())
    })
    .await?;

    info!("Registered {} ({}) as {}", req.username, user_id, role);

    let token = create_token(&state, user_id, &req.username)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id,
            token,
            designer_profile_id,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ChatError> {
    let accounts = state.accounts.clone();
    let username = req.username.clone();
    let creds = blocking(move || Ok(accounts.get_credentials(&username)?))
        .await?
        .ok_or(ChatError::Unauthorized)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&creds.password_hash).map_err(|e| {
        error!("Stored password hash for {} is unreadable: {}", creds.username, e);
        ChatError::DependencyUnavailable("credential store corrupt".into())
    })?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ChatError::Unauthorized)?;

    let token = create_token(&state, creds.user_id, &creds.username)?;

    Ok(Json(LoginResponse {
        user_id: creds.user_id,
        username: creds.username,
        token,
    }))
}

pub fn create_token(state: &AppStateInner, user_id: Uuid, username: &str) -> Result<String, ChatError> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + state.token_ttl).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.jwt_secret.as_bytes()),
    )
    .map_err(|e| {
        error!("Token encoding failed: {}", e);
        ChatError::DependencyUnavailable("token encoding failed".into())
    })
}
