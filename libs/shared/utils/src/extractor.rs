use std::sync::Arc;

use axum::{
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
    body::Body,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};

use shared_models::error::AppError;
use shared_config::AppConfig;

use crate::jwt::resolve_identity;

// Resolves the bearer token and stores the caller identity in request extensions.
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(auth) = bearer
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?;

    let user = resolve_identity(auth.token(), &config.supabase_jwt_secret)?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

