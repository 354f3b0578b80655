//! HTTP surface over the ledger engine. Identity arrives pre-verified in
//! headers (`x-user-id`, `x-username`); the shared admin bearer token
//! elevates a session to the admin role.

use crate::websim::PlatformClient;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use coinworks_ledger::{system_now_ms, Ledger, Store, VipUpkeep};
use coinworks_types::api::{
    AwardRequest, AwardResponse, BalanceResponse, ConversionBody, ConversionListResponse,
    ConversionResponse, ErrorBody, HistoryResponse, LeaderboardEntry, LeaderboardResponse,
    PurchaseResponse, ResolveResponse, TipRedeemBody, TipRedeemResponse, VaultChargeBody,
    VaultGrantBody, VaultResponse,
};
use coinworks_types::{Coins, LedgerError, RequestStatus, Role, Session};
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

pub struct AppState<S: Store> {
    pub ledger: Arc<Ledger<S>>,
    pub upkeep: Arc<VipUpkeep<S>>,
    pub platform: Arc<PlatformClient>,
    pub admin_token: Arc<str>,
}

impl<S: Store> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            upkeep: self.upkeep.clone(),
            platform: self.platform.clone(),
            admin_token: self.admin_token.clone(),
        }
    }
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn unauthorized(message: &str) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, "admin role required")
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let status = match &err {
            LedgerError::InvalidAmount(_)
            | LedgerError::InvalidSource(_)
            | LedgerError::BelowMinimum { .. } => StatusCode::BAD_REQUEST,
            LedgerError::NotEligible | LedgerError::Forbidden => StatusCode::FORBIDDEN,
            LedgerError::AccountNotFound(_)
            | LedgerError::RequestNotFound(_)
            | LedgerError::NoQualifyingTip { .. } => StatusCode::NOT_FOUND,
            LedgerError::AlreadyProcessed(_)
            | LedgerError::TipAlreadyRedeemed(_)
            | LedgerError::PerkConflict(_) => StatusCode::CONFLICT,
            LedgerError::InsufficientFunds { .. } | LedgerError::InsufficientVaultFunds { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            LedgerError::Storage(source) => {
                error!(error = ?source, "storage failure");
                return Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error");
            }
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

fn session_from<S: Store>(state: &AppState<S>, headers: &HeaderMap) -> Result<Session, ApiError> {
    let username = headers
        .get("x-username")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ApiError::unauthorized("missing x-username header"))?;
    let user_id = headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
        .ok_or_else(|| ApiError::unauthorized("missing or malformed x-user-id header"))?;

    let admin = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| token == state.admin_token.as_ref());

    Ok(if admin {
        Session::admin(user_id, username)
    } else {
        Session::player(user_id, username)
    })
}

pub fn router<S: Store + Send + Sync + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/accounts/:username", get(get_account))
        .route("/accounts/:username/award", post(award))
        .route("/accounts/:username/transactions", get(transactions))
        .route("/accounts/:username/conversions", get(user_conversions))
        .route("/leaderboard", get(leaderboard))
        .route("/conversions", post(request_conversion).get(list_conversions))
        .route("/conversions/:id/approve", post(approve_conversion))
        .route("/conversions/:id/reject", post(reject_conversion))
        .route("/vault", get(vault))
        .route("/vault/charge", post(vault_charge))
        .route("/vault/grant", post(vault_grant))
        .route("/tips/redeem", post(redeem_tip))
        .route("/store/vip", post(buy_vip))
        .route("/store/boost", post(buy_boost))
        .route("/session/close", post(close_session))
        .with_state(state)
}

fn balance_response(account: &coinworks_types::Account, now_ms: u64) -> BalanceResponse {
    BalanceResponse {
        username: account.username.clone(),
        coins: account.coins,
        total_coins_earned: account.total_coins_earned,
        games_played: account.games_played,
        vip: account.is_vip(now_ms),
        boost_uses_remaining: account.boost_uses_remaining,
    }
}

async fn get_account<S: Store>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(username): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let session = session_from(&state, &headers)?;
    let now_ms = system_now_ms();
    // Reading your own account creates it on first sight.
    let account = if session.username == username {
        state
            .ledger
            .get_or_create_account(&username, session.user_id, now_ms)
            .await?
    } else {
        state.ledger.account(&username).await?
    };
    Ok(Json(balance_response(&account, now_ms)))
}

async fn award<S: Store>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(username): Path<String>,
    Json(body): Json<AwardRequest>,
) -> Result<Json<AwardResponse>, ApiError> {
    let session = session_from(&state, &headers)?;
    if session.username != username && !session.has_role(Role::Admin) {
        return Err(ApiError::forbidden());
    }
    let outcome = state
        .ledger
        .award(
            &username,
            session.user_id,
            body.amount,
            &body.source,
            body.session_id,
            system_now_ms(),
        )
        .await?;
    Ok(Json(AwardResponse {
        new_balance: outcome.new_balance,
        awarded: outcome.awarded,
        vip_bonus_applied: outcome.vip_bonus_applied,
        boost_applied: outcome.boost_applied,
    }))
}

async fn transactions<S: Store>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(username): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let session = session_from(&state, &headers)?;
    if session.username != username && !session.has_role(Role::Admin) {
        return Err(ApiError::forbidden());
    }
    let transactions = state.ledger.history(&username).await?;
    Ok(Json(HistoryResponse { transactions }))
}

async fn user_conversions<S: Store>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(username): Path<String>,
) -> Result<Json<ConversionListResponse>, ApiError> {
    let session = session_from(&state, &headers)?;
    if session.username != username && !session.has_role(Role::Admin) {
        return Err(ApiError::forbidden());
    }
    let requests = state.ledger.conversions_for(&username).await?;
    Ok(Json(ConversionListResponse { requests }))
}

#[derive(Deserialize)]
struct LeaderboardQuery {
    #[serde(default = "default_leaderboard_limit")]
    limit: usize,
}

fn default_leaderboard_limit() -> usize {
    10
}

async fn leaderboard<S: Store>(
    State(state): State<AppState<S>>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardResponse>, ApiError> {
    let now_ms = system_now_ms();
    let entries = state
        .ledger
        .leaderboard(query.limit.min(100))
        .await?
        .into_iter()
        .map(|account| LeaderboardEntry {
            username: account.username.clone(),
            coins: account.coins,
            games_played: account.games_played,
            vip: account.is_vip(now_ms),
        })
        .collect();
    Ok(Json(LeaderboardResponse { entries }))
}

async fn request_conversion<S: Store>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Json(body): Json<ConversionBody>,
) -> Result<Json<ConversionResponse>, ApiError> {
    let session = session_from(&state, &headers)?;
    let outcome = state
        .ledger
        .request_conversion(&session, body.coins, &*state.platform, system_now_ms())
        .await?;
    Ok(Json(ConversionResponse {
        request_id: outcome.request_id,
        new_balance: outcome.new_balance,
        credits: outcome.credits,
    }))
}

#[derive(Deserialize)]
struct ListQuery {
    status: Option<RequestStatus>,
}

async fn list_conversions<S: Store>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<ConversionListResponse>, ApiError> {
    let session = session_from(&state, &headers)?;
    let requests = state
        .ledger
        .conversion_requests(&session, query.status)
        .await?;
    Ok(Json(ConversionListResponse { requests }))
}

async fn approve_conversion<S: Store>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<ResolveResponse>, ApiError> {
    let session = session_from(&state, &headers)?;
    let request = state
        .ledger
        .approve_conversion(id, &session, system_now_ms())
        .await?;
    Ok(Json(ResolveResponse { request }))
}

async fn reject_conversion<S: Store>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<ResolveResponse>, ApiError> {
    let session = session_from(&state, &headers)?;
    let request = state
        .ledger
        .reject_conversion(id, &session, system_now_ms())
        .await?;
    Ok(Json(ResolveResponse { request }))
}

async fn vault<S: Store>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
) -> Result<Json<VaultResponse>, ApiError> {
    let session = session_from(&state, &headers)?;
    let coins = state.ledger.vault_balance().await?;
    let transactions = if session.has_role(Role::Admin) {
        state.ledger.vault_history(&session).await?
    } else {
        Vec::new()
    };
    Ok(Json(VaultResponse {
        coins,
        transactions,
    }))
}

async fn vault_charge<S: Store>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Json(body): Json<VaultChargeBody>,
) -> Result<Json<VaultResponse>, ApiError> {
    let session = session_from(&state, &headers)?;
    let amount = Coins::parse(body.amount)
        .ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, "invalid amount"))?;
    let outcome = state
        .ledger
        .charge_to_vault(&session.username, amount, &body.reason, system_now_ms())
        .await?;
    Ok(Json(VaultResponse {
        coins: outcome.vault_balance,
        transactions: Vec::new(),
    }))
}

async fn vault_grant<S: Store>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Json(body): Json<VaultGrantBody>,
) -> Result<Json<VaultResponse>, ApiError> {
    let session = session_from(&state, &headers)?;
    let amount = Coins::parse(body.amount)
        .ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, "invalid amount"))?;
    let outcome = state
        .ledger
        .grant_from_vault(
            &session,
            &body.username,
            amount,
            &body.reason,
            system_now_ms(),
        )
        .await?;
    Ok(Json(VaultResponse {
        coins: outcome.vault_balance,
        transactions: Vec::new(),
    }))
}

async fn redeem_tip<S: Store>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Json(body): Json<TipRedeemBody>,
) -> Result<Json<TipRedeemResponse>, ApiError> {
    let session = session_from(&state, &headers)?;
    let outcome = state
        .ledger
        .redeem_tip(&session, body.credits, &*state.platform, system_now_ms())
        .await?;
    Ok(Json(TipRedeemResponse {
        tip_id: outcome.tip_id,
        coins_granted: outcome.coins_granted,
        new_balance: outcome.new_balance,
    }))
}

async fn buy_vip<S: Store + Send + Sync + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
) -> Result<Json<PurchaseResponse>, ApiError> {
    let session = session_from(&state, &headers)?;
    let outcome = state.ledger.purchase_vip(&session, system_now_ms()).await?;
    // The upkeep charge starts ticking as soon as the pass is active.
    state.upkeep.track(&session.username);
    Ok(Json(PurchaseResponse {
        new_balance: outcome.new_balance,
        vip_until: outcome.vip_until,
        boost_uses_remaining: outcome.boost_uses_remaining,
    }))
}

async fn buy_boost<S: Store>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
) -> Result<Json<PurchaseResponse>, ApiError> {
    let session = session_from(&state, &headers)?;
    let outcome = state
        .ledger
        .purchase_boost(&session, system_now_ms())
        .await?;
    Ok(Json(PurchaseResponse {
        new_balance: outcome.new_balance,
        vip_until: outcome.vip_until,
        boost_uses_remaining: outcome.boost_uses_remaining,
    }))
}

async fn close_session<S: Store + Send + Sync + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let session = session_from(&state, &headers)?;
    state.upkeep.stop(&session.username);
    Ok(StatusCode::NO_CONTENT)
}
