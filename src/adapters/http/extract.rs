use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};

use crate::{
    adapters::http::app_state::AppState,
    app_error::AppError,
    application::jwt,
    domain::entities::account::Account,
};

/// The account behind the request's bearer token.
///
/// Rejects with 401 when the header is missing, the token does not verify,
/// or the account no longer exists.
pub struct CurrentAccount(pub Account);

impl FromRequestParts<AppState> for CurrentAccount {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::InvalidCredentials)?;

        let claims = jwt::verify(bearer.token(), &state.config.jwt_secret)?;

        let account = state
            .subscription_use_cases
            .get_account(&claims.sub)
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        Ok(CurrentAccount(account))
    }
}
