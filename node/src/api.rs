//! # REST API
//!
//! Builds the axum router that exposes the vault registry over HTTP. All
//! endpoints share application state through axum's `State` extractor.
//! Callers name themselves in the request body; authentication happens in
//! front of this service.
//!
//! ## Endpoints
//!
//! | Method | Path                                          | Description                      |
//! |--------|-----------------------------------------------|----------------------------------|
//! | GET    | `/health`                                     | Liveness probe                   |
//! | GET    | `/status`                                     | Node status summary              |
//! | GET    | `/vaults`                                     | Every vault handle               |
//! | POST   | `/register`                                   | Self-service registration        |
//! | POST   | `/provision`                                  | Admin-only registration          |
//! | GET    | `/identities/:id`                             | Registration and vault handle    |
//! | GET    | `/identities/:id/bank-counts`                 | Bank counts per class            |
//! | GET    | `/identities/:id/total-balance`               | Base and token totals            |
//! | POST   | `/vaults/:vault/banks`                        | Open a bank                      |
//! | GET    | `/vaults/:vault/banks/:class/:index`          | One bank with its lock state     |
//! | POST   | `/vaults/:vault/banks/:class/:index/deposit`  | Deposit into a bank              |
//! | POST   | `/vaults/:vault/banks/:class/:index/withdraw` | Withdraw from a bank             |
//! | GET    | `/vaults/:vault/total-balance`                | Class total of one vault         |
//! | GET    | `/accounts/:id`                               | Custody ledger balance           |
//! | POST   | `/faucet`                                     | Devnet mint                      |
//! | POST   | `/clock/advance`                              | Move the manual clock forward    |

use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use parking_lot::{RwLock, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use piggy_contracts::{
    BankIndex, LockStatus, Registry, RegistryError, Vault, VaultError, Withdrawal,
};
use piggy_protocol::config::FAUCET_MAX_AMOUNT;
use piggy_protocol::{
    Asset, AssetClass, Clock, Identity, InMemoryLedger, Ledger, LedgerError, ManualClock,
    SystemClock,
};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Everything a call may touch. One lock guards all of it, so every
/// operation runs to completion before the next one starts.
#[derive(Debug)]
pub struct Chain {
    pub registry: Registry,
    pub ledger: InMemoryLedger,
}

/// Shared application state available to all request handlers.
///
/// Cheap to clone; everything lives behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// Registry and custody ledger.
    pub chain: Arc<RwLock<Chain>>,
    /// Source of "now" for every lock computation.
    pub clock: Arc<dyn Clock>,
    /// Set when the node runs on a manual clock; enables `/clock/advance`.
    pub manual_clock: Option<ManualClock>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

impl AppState {
    /// Creates state for a fresh registry administered by `admin`.
    pub fn new(
        admin: Identity,
        manual_clock: Option<ManualClock>,
        metrics: SharedMetrics,
        version: String,
    ) -> Self {
        let clock: Arc<dyn Clock> = match &manual_clock {
            Some(manual) => Arc::new(manual.clone()),
            None => Arc::new(SystemClock),
        };
        Self {
            version,
            chain: Arc::new(RwLock::new(Chain {
                registry: Registry::new(admin),
                ledger: InMemoryLedger::new(),
            })),
            clock,
            manual_clock,
            metrics,
        }
    }

    /// Takes the chain for writing, then reads the clock. Instants handed out
    /// here follow the order in which writers commit.
    pub fn write_chain(&self) -> (RwLockWriteGuard<'_, Chain>, DateTime<Utc>) {
        let chain = self.chain.write();
        let now = self.clock.now();
        (chain, now)
    }

    /// Records a rejected operation and hands the error back.
    fn rejected(&self, err: impl Into<ApiError>) -> ApiError {
        let err = err.into();
        self.metrics.reject(err.kind());
        tracing::debug!(kind = err.kind(), "operation rejected: {}", err);
        err
    }

    fn note_registration(&self, registry: &Registry) {
        self.metrics.registrations_total.inc();
        self.metrics
            .vaults_registered
            .set(registry.total_registered() as i64);
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
///
/// `/clock/advance` is only mounted when the state carries a manual clock.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/vaults", get(vaults_handler))
        .route("/register", post(register_handler))
        .route("/provision", post(provision_handler))
        .route("/identities/:id", get(identity_handler))
        .route("/identities/:id/bank-counts", get(bank_counts_handler))
        .route("/identities/:id/total-balance", get(identity_total_handler))
        .route("/vaults/:vault/banks", post(create_bank_handler))
        .route("/vaults/:vault/banks/:class/:index", get(bank_handler))
        .route(
            "/vaults/:vault/banks/:class/:index/deposit",
            post(deposit_handler),
        )
        .route(
            "/vaults/:vault/banks/:class/:index/withdraw",
            post(withdraw_handler),
        )
        .route("/vaults/:vault/total-balance", get(vault_total_handler))
        .route("/accounts/:id", get(account_handler))
        .route("/faucet", post(faucet_handler));

    if state.manual_clock.is_some() {
        router = router.route("/clock/advance", post(advance_clock_handler));
    }

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Any failure a handler can report.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("unknown vault: {0}")]
    UnknownVault(Identity),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    /// Stable discriminator echoed in the error body.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Registry(e) => e.kind(),
            ApiError::Vault(e) => e.kind(),
            ApiError::Ledger(_) => "ledger_rejected",
            ApiError::UnknownVault(_) => "unknown_vault",
            ApiError::BadRequest(_) => "bad_request",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Registry(RegistryError::NotRegistered { .. })
            | ApiError::Vault(VaultError::InvalidBank { .. })
            | ApiError::UnknownVault(_) => StatusCode::NOT_FOUND,
            ApiError::Registry(RegistryError::NotAdmin { .. })
            | ApiError::Vault(VaultError::NotOwner { .. }) => StatusCode::FORBIDDEN,
            ApiError::Registry(RegistryError::AlreadyRegistered { .. })
            | ApiError::Vault(VaultError::DuplicateLockPeriod { .. }) => StatusCode::CONFLICT,
            ApiError::Vault(VaultError::InsufficientBalance { .. })
            | ApiError::Vault(VaultError::TransferFailed { .. })
            | ApiError::Ledger(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Vault(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

/// Error body returned by every endpoint on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
            kind: self.kind().to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn parse_identity(s: &str) -> Result<Identity, ApiError> {
    s.parse()
        .map_err(|e| ApiError::BadRequest(format!("identity '{s}': {e}")))
}

fn parse_class(s: &str) -> Result<AssetClass, ApiError> {
    s.parse()
        .map_err(|e| ApiError::BadRequest(format!("asset class: {e}")))
}

fn parse_token(token: Option<&str>) -> Result<Option<Identity>, ApiError> {
    token.map(parse_identity).transpose()
}

/// Resolves `/vaults/:vault/banks/:class/:index` path segments.
fn parse_bank_path(
    (vault, class, index): &(String, String, String),
) -> Result<(Identity, AssetClass, BankIndex), ApiError> {
    let index = index
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("bank index '{index}' is not a number")))?;
    Ok((parse_identity(vault)?, parse_class(class)?, index))
}

fn vault_ref<'a>(registry: &'a Registry, handle: &Identity) -> Result<&'a Vault, ApiError> {
    registry
        .vault(handle)
        .ok_or(ApiError::UnknownVault(*handle))
}

fn vault_mut<'a>(registry: &'a mut Registry, handle: &Identity) -> Result<&'a mut Vault, ApiError> {
    registry
        .vault_mut(handle)
        .ok_or(ApiError::UnknownVault(*handle))
}

// ---------------------------------------------------------------------------
// Request Types
// ---------------------------------------------------------------------------

/// Body of `POST /register`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub caller: Identity,
}

/// Body of `POST /provision`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub caller: Identity,
    pub target: Identity,
}

/// Body of `POST /vaults/:vault/banks`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateBankRequest {
    pub caller: Identity,
    pub asset_class: AssetClass,
    #[serde(default)]
    pub label: String,
    /// Required for token banks, ignored for base banks.
    #[serde(default)]
    pub token: Option<Identity>,
    pub lock_duration_secs: u64,
}

/// Body of `POST .../deposit`.
#[derive(Debug, Serialize, Deserialize)]
pub struct DepositRequest {
    pub caller: Identity,
    pub amount: u64,
}

/// Body of `POST .../withdraw`.
#[derive(Debug, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub caller: Identity,
    pub destination: Identity,
    pub amount: u64,
}

/// Body of `POST /faucet`. Omitting `token` mints base currency.
#[derive(Debug, Serialize, Deserialize)]
pub struct FaucetRequest {
    pub to: Identity,
    pub amount: u64,
    #[serde(default)]
    pub token: Option<Identity>,
}

/// Body of `POST /clock/advance`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AdvanceClockRequest {
    pub secs: u64,
}

/// Query of the total-balance and account endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct BalanceQuery {
    pub class: Option<String>,
    pub token: Option<String>,
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub admin: Identity,
    pub total_registered: usize,
    /// Whether time only moves via `/clock/advance`.
    pub manual_clock: bool,
    /// The node's idea of "now", RFC 3339.
    pub time: String,
}

/// Response payload for `GET /vaults`.
#[derive(Debug, Serialize, Deserialize)]
pub struct VaultListResponse {
    pub total: usize,
    pub vaults: Vec<Identity>,
}

/// Response payload for `POST /register` and `POST /provision`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub identity: Identity,
    pub vault: Identity,
}

/// Response payload for `GET /identities/:id`.
#[derive(Debug, Serialize, Deserialize)]
pub struct IdentityResponse {
    pub identity: Identity,
    pub registered: bool,
    pub vault: Option<Identity>,
}

/// Response payload for `GET /identities/:id/bank-counts`.
#[derive(Debug, Serialize, Deserialize)]
pub struct BankCountsResponse {
    pub base: usize,
    pub token: usize,
}

/// Response payload for `GET /identities/:id/total-balance`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TotalsResponse {
    pub base: u64,
    pub token: u64,
}

/// Response payload for `POST /vaults/:vault/banks`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateBankResponse {
    pub vault: Identity,
    pub asset_class: AssetClass,
    pub index: BankIndex,
}

/// Response payload for `GET /vaults/:vault/banks/:class/:index`.
#[derive(Debug, Serialize, Deserialize)]
pub struct BankResponse {
    pub vault: Identity,
    pub asset_class: AssetClass,
    pub index: BankIndex,
    pub label: String,
    pub token: Option<Identity>,
    pub lock_duration_secs: u64,
    pub balance: u64,
    pub created_at: DateTime<Utc>,
    pub unlocks_at: DateTime<Utc>,
    pub remaining_lock_secs: u64,
    pub status: LockStatus,
}

/// Response payload for `POST .../deposit`.
#[derive(Debug, Serialize, Deserialize)]
pub struct DepositResponse {
    pub vault: Identity,
    pub asset_class: AssetClass,
    pub index: BankIndex,
    pub amount: u64,
    /// Bank balance after the deposit.
    pub balance: u64,
}

/// Response payload for `POST .../withdraw`.
#[derive(Debug, Serialize, Deserialize)]
pub struct WithdrawResponse {
    #[serde(flatten)]
    pub receipt: Withdrawal,
    /// Bank balance after the withdrawal.
    pub balance: u64,
}

/// Response payload for `GET /vaults/:vault/total-balance`.
#[derive(Debug, Serialize, Deserialize)]
pub struct VaultTotalResponse {
    pub vault: Identity,
    pub asset_class: AssetClass,
    pub token: Option<Identity>,
    pub total: u64,
}

/// Response payload for `GET /accounts/:id` and `POST /faucet`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub identity: Identity,
    pub asset: Asset,
    pub balance: u64,
}

/// Response payload for `POST /clock/advance`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ClockResponse {
    pub now: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Handlers: node
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`: returns node status summary.
async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let chain = state.chain.read();
    Json(StatusResponse {
        version: state.version.clone(),
        admin: chain.registry.admin(),
        total_registered: chain.registry.total_registered(),
        manual_clock: state.manual_clock.is_some(),
        time: state.clock.now().to_rfc3339(),
    })
}

// ---------------------------------------------------------------------------
// Handlers: registry
// ---------------------------------------------------------------------------

/// `GET /vaults`: every vault handle in creation order.
async fn vaults_handler(State(state): State<AppState>) -> Json<VaultListResponse> {
    let chain = state.chain.read();
    let vaults = chain.registry.all_vaults();
    Json(VaultListResponse {
        total: vaults.len(),
        vaults,
    })
}

/// `POST /register`: gives the caller a vault.
async fn register_handler(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<RegistrationResponse> {
    let (mut chain, now) = state.write_chain();
    let vault = chain
        .registry
        .register(req.caller, now)
        .map_err(|e| state.rejected(e))?;
    state.note_registration(&chain.registry);
    Ok(Json(RegistrationResponse {
        identity: req.caller,
        vault,
    }))
}

/// `POST /provision`: the admin gives `target` a vault.
async fn provision_handler(
    State(state): State<AppState>,
    Json(req): Json<ProvisionRequest>,
) -> ApiResult<RegistrationResponse> {
    let (mut chain, now) = state.write_chain();
    let vault = chain
        .registry
        .provision(req.caller, req.target, now)
        .map_err(|e| state.rejected(e))?;
    state.note_registration(&chain.registry);
    Ok(Json(RegistrationResponse {
        identity: req.target,
        vault,
    }))
}

/// `GET /identities/:id`: whether `id` has a vault, and which one.
async fn identity_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<IdentityResponse> {
    let identity = parse_identity(&id)?;
    let chain = state.chain.read();
    Ok(Json(IdentityResponse {
        identity,
        registered: chain.registry.is_registered(&identity),
        vault: chain.registry.vault_of(&identity).ok(),
    }))
}

/// `GET /identities/:id/bank-counts`
async fn bank_counts_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<BankCountsResponse> {
    let identity = parse_identity(&id)?;
    let (base, token) = state.chain.read().registry.bank_counts_of(&identity)?;
    Ok(Json(BankCountsResponse { base, token }))
}

/// `GET /identities/:id/total-balance?token=<hex>`
async fn identity_total_handler(
    Path(id): Path<String>,
    Query(query): Query<BalanceQuery>,
    State(state): State<AppState>,
) -> ApiResult<TotalsResponse> {
    let identity = parse_identity(&id)?;
    let token = parse_token(query.token.as_deref())?;
    let (base, token) = state
        .chain
        .read()
        .registry
        .total_balance_of(&identity, token.as_ref())?;
    Ok(Json(TotalsResponse { base, token }))
}

// ---------------------------------------------------------------------------
// Handlers: vaults
// ---------------------------------------------------------------------------

/// `POST /vaults/:vault/banks`: opens a bank.
async fn create_bank_handler(
    Path(vault): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<CreateBankRequest>,
) -> ApiResult<CreateBankResponse> {
    let handle = parse_identity(&vault)?;
    let (mut chain, now) = state.write_chain();
    let index = vault_mut(&mut chain.registry, &handle)
        .and_then(|v| {
            v.create_bank(
                req.caller,
                req.asset_class,
                req.label,
                req.token,
                req.lock_duration_secs,
                now,
            )
            .map_err(ApiError::from)
        })
        .map_err(|e| state.rejected(e))?;
    state.metrics.banks_created_total.inc();
    Ok(Json(CreateBankResponse {
        vault: handle,
        asset_class: req.asset_class,
        index,
    }))
}

/// `GET /vaults/:vault/banks/:class/:index`
async fn bank_handler(
    Path(path): Path<(String, String, String)>,
    State(state): State<AppState>,
) -> ApiResult<BankResponse> {
    let (handle, asset_class, index) = parse_bank_path(&path)?;
    let chain = state.chain.read();
    let now = state.clock.now();
    let bank = vault_ref(&chain.registry, &handle)?.bank(asset_class, index)?;
    Ok(Json(BankResponse {
        vault: handle,
        asset_class,
        index,
        label: bank.label().to_string(),
        token: bank.token(),
        lock_duration_secs: bank.lock_duration_secs(),
        balance: bank.balance(),
        created_at: bank.created_at(),
        unlocks_at: bank.unlocks_at(),
        remaining_lock_secs: bank.remaining_lock_secs(now),
        status: bank.lock_status(now),
    }))
}

/// `POST /vaults/:vault/banks/:class/:index/deposit`
async fn deposit_handler(
    Path(path): Path<(String, String, String)>,
    State(state): State<AppState>,
    Json(req): Json<DepositRequest>,
) -> ApiResult<DepositResponse> {
    let (handle, asset_class, index) = parse_bank_path(&path)?;
    let mut guard = state.chain.write();
    let Chain { registry, ledger } = &mut *guard;
    let balance = vault_mut(registry, &handle)
        .and_then(|v| {
            v.deposit(ledger, req.caller, asset_class, index, req.amount)
                .map_err(ApiError::from)
        })
        .map_err(|e| state.rejected(e))?;
    state.metrics.deposits_total.inc();
    Ok(Json(DepositResponse {
        vault: handle,
        asset_class,
        index,
        amount: req.amount,
        balance,
    }))
}

/// `POST /vaults/:vault/banks/:class/:index/withdraw`
async fn withdraw_handler(
    Path(path): Path<(String, String, String)>,
    State(state): State<AppState>,
    Json(req): Json<WithdrawRequest>,
) -> ApiResult<WithdrawResponse> {
    let (handle, asset_class, index) = parse_bank_path(&path)?;
    let (mut guard, now) = state.write_chain();
    let Chain { registry, ledger } = &mut *guard;
    let (receipt, balance) = vault_mut(registry, &handle)
        .and_then(|v| {
            let receipt = v.withdraw(
                ledger,
                req.caller,
                asset_class,
                index,
                req.destination,
                req.amount,
                now,
            )?;
            Ok((receipt, v.bank_balance(asset_class, index)?))
        })
        .map_err(|e| state.rejected(e))?;

    state.metrics.withdrawals_total.inc();
    if receipt.early {
        state.metrics.early_withdrawals_total.inc();
        state.metrics.breaking_fees_collected_total.inc_by(receipt.fee);
    }
    Ok(Json(WithdrawResponse { receipt, balance }))
}

/// `GET /vaults/:vault/total-balance?class=base|token&token=<hex>`
///
/// `class` defaults to `base`.
async fn vault_total_handler(
    Path(vault): Path<String>,
    Query(query): Query<BalanceQuery>,
    State(state): State<AppState>,
) -> ApiResult<VaultTotalResponse> {
    let handle = parse_identity(&vault)?;
    let asset_class = query
        .class
        .as_deref()
        .map(parse_class)
        .transpose()?
        .unwrap_or(AssetClass::Base);
    let token = parse_token(query.token.as_deref())?;
    let chain = state.chain.read();
    let total = vault_ref(&chain.registry, &handle)?.total_balance(asset_class, token.as_ref());
    Ok(Json(VaultTotalResponse {
        vault: handle,
        asset_class,
        token,
        total,
    }))
}

// ---------------------------------------------------------------------------
// Handlers: custody ledger
// ---------------------------------------------------------------------------

/// `GET /accounts/:id?token=<hex>`: ledger balance; base unless a token is
/// named.
async fn account_handler(
    Path(id): Path<String>,
    Query(query): Query<BalanceQuery>,
    State(state): State<AppState>,
) -> ApiResult<AccountResponse> {
    let identity = parse_identity(&id)?;
    let asset = parse_token(query.token.as_deref())?.map_or(Asset::Base, Asset::Token);
    let balance = state.chain.read().ledger.balance_of(&asset, &identity);
    Ok(Json(AccountResponse {
        identity,
        asset,
        balance,
    }))
}

/// `POST /faucet`: mints devnet funds.
async fn faucet_handler(
    State(state): State<AppState>,
    Json(req): Json<FaucetRequest>,
) -> ApiResult<AccountResponse> {
    if req.amount == 0 || req.amount > FAUCET_MAX_AMOUNT {
        return Err(state.rejected(ApiError::BadRequest(format!(
            "faucet amount must be 1..={FAUCET_MAX_AMOUNT}, got {}",
            req.amount
        ))));
    }
    let asset = req.token.map_or(Asset::Base, Asset::Token);
    let balance = state
        .chain
        .write()
        .ledger
        .mint(asset, req.to, req.amount)
        .map_err(|e| state.rejected(e))?;
    tracing::info!(to = %req.to.short(), %asset, amount = req.amount, "faucet mint");
    Ok(Json(AccountResponse {
        identity: req.to,
        asset,
        balance,
    }))
}

/// `POST /clock/advance`: only mounted with a manual clock.
async fn advance_clock_handler(
    State(state): State<AppState>,
    Json(req): Json<AdvanceClockRequest>,
) -> ApiResult<ClockResponse> {
    let clock = state
        .manual_clock
        .as_ref()
        .ok_or_else(|| ApiError::BadRequest("node is not running a manual clock".into()))?;
    let now = clock.advance_secs(req.secs);
    tracing::info!(secs = req.secs, now = %now, "clock advanced");
    Ok(Json(ClockResponse { now }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use piggy_protocol::config::ONE_DAY_SECS;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn admin() -> Identity {
        Identity::derive("admin")
    }

    fn alice() -> Identity {
        Identity::derive("alice")
    }

    /// Creates a test AppState on a manual clock.
    fn test_app_state() -> AppState {
        let metrics = Arc::new(crate::metrics::NodeMetrics::new().unwrap());
        AppState::new(
            admin(),
            Some(ManualClock::starting_now()),
            metrics,
            "0.1.0-test".into(),
        )
    }

    #[test]
    fn writers_read_the_clock_after_taking_the_chain() {
        let state = test_app_state();
        let manual = state.manual_clock.clone().unwrap();
        let before = manual.now();

        let held = state.chain.write();
        let writer = {
            let state = state.clone();
            std::thread::spawn(move || state.write_chain().1)
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        let advanced = manual.advance_secs(60);
        drop(held);

        let stamped = writer.join().unwrap();
        assert_eq!(stamped, advanced);
        assert!(stamped > before);
    }

    /// Sends a GET request and returns the (status, json body).
    async fn get(router: &Router, path: &str) -> (StatusCode, Value) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    /// Sends a POST request with JSON body and returns (status, json body).
    async fn post_json(router: &Router, path: &str, body: Value) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    /// Registers alice, funds her with 1_000 base units and opens a one-day
    /// base bank. Returns the vault handle.
    async fn alice_with_bank(router: &Router) -> String {
        let (status, body) = post_json(router, "/register", json!({ "caller": alice() })).await;
        assert_eq!(status, StatusCode::OK);
        let vault = body["vault"].as_str().unwrap().to_string();

        let (status, _) = post_json(router, "/faucet", json!({ "to": alice(), "amount": 1_000 })).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = post_json(
            router,
            &format!("/vaults/{vault}/banks"),
            json!({
                "caller": alice(),
                "asset_class": "base",
                "label": "rainy day",
                "lock_duration_secs": ONE_DAY_SECS,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["index"], 0);
        vault
    }

    // -- Node ----------------------------------------------------------------

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let router = create_router(test_app_state());
        let (status, body) = get(&router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn status_reports_admin_and_registrations() {
        let router = create_router(test_app_state());
        post_json(&router, "/register", json!({ "caller": alice() })).await;

        let (status, body) = get(&router, "/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["admin"], admin().to_hex());
        assert_eq!(body["total_registered"], 1);
        assert_eq!(body["manual_clock"], true);
    }

    // -- Registry ------------------------------------------------------------

    #[tokio::test]
    async fn double_registration_is_conflict() {
        let router = create_router(test_app_state());
        post_json(&router, "/register", json!({ "caller": alice() })).await;
        let (status, body) = post_json(&router, "/register", json!({ "caller": alice() })).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "already_registered");
    }

    #[tokio::test]
    async fn provision_requires_admin() {
        let router = create_router(test_app_state());
        let bob = Identity::derive("bob");

        let (status, body) = post_json(
            &router,
            "/provision",
            json!({ "caller": alice(), "target": bob }),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["kind"], "not_admin");

        let (status, body) = post_json(
            &router,
            "/provision",
            json!({ "caller": admin(), "target": bob }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["identity"], bob.to_hex());
        let vault = body["vault"].clone();

        let (_, body) = get(&router, &format!("/identities/{bob}")).await;
        assert_eq!(body["registered"], true);
        assert_eq!(body["vault"], vault);
    }

    #[tokio::test]
    async fn unregistered_identity_queries_are_not_found() {
        let router = create_router(test_app_state());
        let ghost = Identity::derive("ghost");

        let (status, body) = get(&router, &format!("/identities/{ghost}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["registered"], false);
        assert!(body["vault"].is_null());

        let (status, body) = get(&router, &format!("/identities/{ghost}/bank-counts")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_registered");
    }

    #[tokio::test]
    async fn malformed_identity_is_bad_request() {
        let router = create_router(test_app_state());
        let (status, body) = get(&router, "/identities/xyz").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "bad_request");
    }

    // -- Vaults --------------------------------------------------------------

    #[tokio::test]
    async fn end_to_end_early_withdrawal() {
        let state = test_app_state();
        let router = create_router(state.clone());
        let vault = alice_with_bank(&router).await;
        let bob = Identity::derive("bob");

        let (status, body) = post_json(
            &router,
            &format!("/vaults/{vault}/banks/base/0/deposit"),
            json!({ "caller": alice(), "amount": 100 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["balance"], 100);

        let (status, body) = post_json(
            &router,
            &format!("/vaults/{vault}/banks/base/0/withdraw"),
            json!({ "caller": alice(), "destination": bob, "amount": 100 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["fee"], 3);
        assert_eq!(body["net"], 97);
        assert_eq!(body["early"], true);
        assert_eq!(body["balance"], 0);

        let (_, body) = get(&router, &format!("/accounts/{}", admin())).await;
        assert_eq!(body["balance"], 3);
        let (_, body) = get(&router, &format!("/accounts/{bob}")).await;
        assert_eq!(body["balance"], 97);

        assert_eq!(state.metrics.early_withdrawals_total.get(), 1);
        assert_eq!(state.metrics.breaking_fees_collected_total.get(), 3);
    }

    #[tokio::test]
    async fn late_withdrawal_after_clock_advance_is_free() {
        let router = create_router(test_app_state());
        let vault = alice_with_bank(&router).await;
        post_json(
            &router,
            &format!("/vaults/{vault}/banks/base/0/deposit"),
            json!({ "caller": alice(), "amount": 100 }),
        )
        .await;

        let (status, _) = post_json(&router, "/clock/advance", json!({ "secs": ONE_DAY_SECS })).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = get(&router, &format!("/vaults/{vault}/banks/base/0")).await;
        assert_eq!(body["remaining_lock_secs"], 0);
        assert_eq!(body["status"], "unlocked");

        let (status, body) = post_json(
            &router,
            &format!("/vaults/{vault}/banks/base/0/withdraw"),
            json!({ "caller": alice(), "destination": alice(), "amount": 100 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["fee"], 0);
        assert_eq!(body["net"], 100);
    }

    #[tokio::test]
    async fn bank_view_reports_remaining_lock() {
        let router = create_router(test_app_state());
        let vault = alice_with_bank(&router).await;

        let (status, body) = get(&router, &format!("/vaults/{vault}/banks/base/0")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["label"], "rainy day");
        assert_eq!(body["remaining_lock_secs"], ONE_DAY_SECS);
        assert_eq!(body["status"], "locked");

        let (status, body) = get(&router, &format!("/vaults/{vault}/banks/token/0")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "invalid_bank");
    }

    #[tokio::test]
    async fn error_kinds_map_to_status_codes() {
        let router = create_router(test_app_state());
        let vault = alice_with_bank(&router).await;
        let mallory = Identity::derive("mallory");

        let (status, body) = post_json(
            &router,
            &format!("/vaults/{vault}/banks"),
            json!({ "caller": alice(), "asset_class": "base", "lock_duration_secs": ONE_DAY_SECS }),
        )
        .await;
        assert_eq!((status, body["kind"].as_str()), (StatusCode::CONFLICT, Some("duplicate_lock_period")));

        let (status, body) = post_json(
            &router,
            &format!("/vaults/{vault}/banks/base/0/deposit"),
            json!({ "caller": mallory, "amount": 1 }),
        )
        .await;
        assert_eq!((status, body["kind"].as_str()), (StatusCode::FORBIDDEN, Some("not_owner")));

        let (status, body) = post_json(
            &router,
            &format!("/vaults/{vault}/banks/base/0/deposit"),
            json!({ "caller": alice(), "amount": 0 }),
        )
        .await;
        assert_eq!((status, body["kind"].as_str()), (StatusCode::BAD_REQUEST, Some("invalid_amount")));

        let (status, body) = post_json(
            &router,
            &format!("/vaults/{vault}/banks/base/0/withdraw"),
            json!({ "caller": alice(), "destination": alice(), "amount": 5 }),
        )
        .await;
        assert_eq!(
            (status, body["kind"].as_str()),
            (StatusCode::UNPROCESSABLE_ENTITY, Some("insufficient_balance"))
        );

        let (status, body) = post_json(
            &router,
            &format!("/vaults/{vault}/banks/base/0/deposit"),
            json!({ "caller": alice(), "amount": 5_000 }),
        )
        .await;
        assert_eq!(
            (status, body["kind"].as_str()),
            (StatusCode::UNPROCESSABLE_ENTITY, Some("transfer_failed"))
        );

        let unknown = Identity::derive("nowhere");
        let (status, body) = get(&router, &format!("/vaults/{unknown}/total-balance")).await;
        assert_eq!((status, body["kind"].as_str()), (StatusCode::NOT_FOUND, Some("unknown_vault")));
    }

    #[tokio::test]
    async fn totals_follow_token_filter() {
        let router = create_router(test_app_state());
        let vault = alice_with_bank(&router).await;
        let usd = Identity::derive("usd-token");

        post_json(&router, "/faucet", json!({ "to": alice(), "amount": 40, "token": usd })).await;
        let (status, body) = post_json(
            &router,
            &format!("/vaults/{vault}/banks"),
            json!({
                "caller": alice(),
                "asset_class": "token",
                "label": "dollars",
                "token": usd,
                "lock_duration_secs": ONE_DAY_SECS,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        post_json(
            &router,
            &format!("/vaults/{vault}/banks/token/0/deposit"),
            json!({ "caller": alice(), "amount": 40 }),
        )
        .await;
        post_json(
            &router,
            &format!("/vaults/{vault}/banks/base/0/deposit"),
            json!({ "caller": alice(), "amount": 7 }),
        )
        .await;

        let (_, body) = get(&router, &format!("/identities/{}/total-balance?token={usd}", alice())).await;
        assert_eq!((body["base"].as_u64(), body["token"].as_u64()), (Some(7), Some(40)));

        let (_, body) = get(&router, &format!("/vaults/{vault}/total-balance?class=token&token={usd}")).await;
        assert_eq!(body["total"], 40);

        let (_, body) = get(&router, &format!("/identities/{}/bank-counts", alice())).await;
        assert_eq!((body["base"].as_u64(), body["token"].as_u64()), (Some(1), Some(1)));

        let (_, body) = get(&router, &format!("/accounts/{vault}?token={usd}")).await;
        assert_eq!(body["balance"], 40);
    }

    #[tokio::test]
    async fn faucet_rejects_zero_amount() {
        let router = create_router(test_app_state());
        let (status, body) = post_json(&router, "/faucet", json!({ "to": alice(), "amount": 0 })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "bad_request");
    }

    #[tokio::test]
    async fn clock_route_absent_on_system_clock() {
        let metrics = Arc::new(crate::metrics::NodeMetrics::new().unwrap());
        let state = AppState::new(admin(), None, metrics, "0.1.0-test".into());
        let router = create_router(state);
        let (status, _) = post_json(&router, "/clock/advance", json!({ "secs": 1 })).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn vault_list_grows_with_registrations() {
        let state = test_app_state();
        let router = create_router(state.clone());
        post_json(&router, "/register", json!({ "caller": alice() })).await;
        post_json(&router, "/register", json!({ "caller": Identity::derive("bob") })).await;

        let (_, body) = get(&router, "/vaults").await;
        assert_eq!(body["total"], 2);
        assert_eq!(body["vaults"].as_array().unwrap().len(), 2);
        assert_eq!(state.metrics.vaults_registered.get(), 2);
        assert_eq!(state.metrics.registrations_total.get(), 2);
    }
}
