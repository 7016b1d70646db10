//! Endpoint handlers. Each translates a request into one coordinator
//! operation and maps the outcome back onto the wire types.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use tracing::debug;

use ai4a_auth::verify_admin_key;
use ai4a_kernel::StatusReport;
use ai4a_store_core::OperationalStore;
use ai4a_types::{AccountId, BlockSubmission, DayId};

use crate::dto;
use crate::{ApiError, ServiceState};

const DEFAULT_LIMIT: usize = 50;

//─────────────────────────────
//  Request guards
//─────────────────────────────

async fn authenticate(
    state: &ServiceState,
    auth: &dto::AuthFields,
) -> Result<AccountId, ApiError> {
    let account = AccountId::parse(&auth.account_id)
        .map_err(|e| ApiError::validation(e.to_string()))?;
    let key = state
        .coordinator
        .stores()
        .operational
        .get_node_key(&account)
        .await?
        .ok_or_else(|| ApiError::unauthorized(format!("unknown account {account}")))?;
    let public_key = hex::decode(&key.public_key_hex)
        .map_err(|_| ApiError::unauthorized("corrupt key binding"))?;
    state
        .authenticator
        .verify_request(&account, &auth.timestamp, &auth.signature, &public_key, Utc::now())?;
    Ok(account)
}

fn require_admin(state: &ServiceState, headers: &HeaderMap) -> Result<(), ApiError> {
    let provided = headers.get("x-admin-key").and_then(|v| v.to_str().ok());
    if !verify_admin_key(provided, &state.admin_key) {
        return Err(ApiError::forbidden());
    }
    Ok(())
}

fn parse_day(raw: &str) -> Result<DayId, ApiError> {
    DayId::parse(raw).map_err(|e| ApiError::validation(e.to_string()))
}

fn parse_account(raw: &str) -> Result<AccountId, ApiError> {
    AccountId::parse(raw).map_err(|e| ApiError::validation(e.to_string()))
}

fn status_dto(report: StatusReport) -> dto::DayStatusResponse {
    dto::DayStatusResponse {
        phase: report.phase,
        day_id: report.day_id.map(|d| d.to_string()),
        day_number: report.day_number,
        contributor_count: report.contributor_count,
        roster_size: report.roster_size,
        pending_submissions: report.pending_submissions,
    }
}

//─────────────────────────────
//  Node endpoints
//─────────────────────────────

pub(crate) async fn register(
    State(state): State<ServiceState>,
    Json(body): Json<dto::RegisterRequest>,
) -> Result<Json<dto::RegisterResponse>, ApiError> {
    let account = parse_account(&body.account_id)?;
    let public_key = hex::decode(&body.public_key)
        .map_err(|_| ApiError::validation("publicKey is not hex"))?;
    state
        .authenticator
        .verify_registration(&account, &public_key)
        .map_err(|e| ApiError::validation(e.to_string()))?;

    let outcome = state
        .coordinator
        .register(account, body.public_key, Utc::now())
        .await?;
    Ok(Json(dto::RegisterResponse {
        account_id: outcome.account_id.to_string(),
        created: outcome.created,
    }))
}

pub(crate) async fn heartbeat(
    State(state): State<ServiceState>,
    Json(body): Json<dto::HeartbeatRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let account = authenticate(&state, &body.auth).await?;
    state.coordinator.heartbeat(&account, Utc::now()).await?;
    debug!(account = %account, "heartbeat");
    Ok(Json(serde_json::json!({ "ok": true })))
}

//─────────────────────────────
//  Admin endpoints
//─────────────────────────────

pub(crate) async fn day_start(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    body: Option<Json<dto::DayStartRequest>>,
) -> Result<Json<dto::DayStartResponse>, ApiError> {
    require_admin(&state, &headers)?;
    let day_id = body
        .and_then(|Json(b)| b.day_id)
        .map(|raw| parse_day(&raw))
        .transpose()?;

    let outcome = state.coordinator.start_day(day_id, Utc::now()).await?;
    Ok(Json(dto::DayStartResponse {
        day_id: outcome.day_id.to_string(),
        seed: outcome.seed,
        roster_hash: outcome.roster_hash,
        roster_size: outcome.roster_size,
        total_blocks: outcome.total_blocks,
        assignment_count: outcome.assignment_count,
        canary_count: outcome.canary_count,
    }))
}

pub(crate) async fn day_status(
    State(state): State<ServiceState>,
    headers: HeaderMap,
) -> Result<Json<dto::DayStatusResponse>, ApiError> {
    require_admin(&state, &headers)?;
    Ok(Json(status_dto(state.coordinator.status().await)))
}

pub(crate) async fn day_finalize(
    State(state): State<ServiceState>,
    headers: HeaderMap,
) -> Result<Json<dto::FinalizeResponse>, ApiError> {
    require_admin(&state, &headers)?;
    let outcome = state.coordinator.finalize_day(Utc::now()).await?;
    Ok(Json(dto::FinalizeResponse {
        day_id: outcome.day_id.to_string(),
        day_number: outcome.day_number,
        reward_root: outcome.reward_root,
        state_hash: outcome.state_hash,
        active_contributor_count: outcome.distribution.active_contributor_count,
        rewards: outcome.distribution.rewards,
    }))
}

//─────────────────────────────
//  Work endpoints
//─────────────────────────────

pub(crate) async fn work_request(
    State(state): State<ServiceState>,
    Json(body): Json<dto::WorkRequest>,
) -> Result<Json<dto::WorkRequestResponse>, ApiError> {
    let account = authenticate(&state, &body.auth).await?;
    let response = state.coordinator.request_work(&account).await?;
    Ok(Json(dto::WorkRequestResponse {
        assignments: response.assignments,
        reason: response.reason,
    }))
}

pub(crate) async fn work_submit(
    State(state): State<ServiceState>,
    Json(body): Json<dto::WorkSubmitRequest>,
) -> Result<Json<dto::WorkSubmitResponse>, ApiError> {
    let account = authenticate(&state, &body.auth).await?;
    let day_id = body.day_id.as_deref().map(parse_day).transpose()?;
    let now = Utc::now();
    let submissions: Vec<BlockSubmission> = body
        .submissions
        .into_iter()
        .map(|s| BlockSubmission {
            contributor_id: account.clone(),
            block_id: s.block_id,
            block_type: s.block_type,
            resource_usage: s.resource_usage,
            difficulty_multiplier: s.difficulty_multiplier,
            validation_passed: s.validation_passed,
            canary_answer_correct: s.canary_answer_correct,
            timestamp: now,
        })
        .collect();

    let outcome = state
        .coordinator
        .submit_work(&account, day_id, submissions, now)
        .await?;
    Ok(Json(dto::WorkSubmitResponse {
        day_id: outcome.day_id.to_string(),
        results: outcome.results,
        pending_count: outcome.pending_count,
    }))
}

//─────────────────────────────
//  Reward read models
//─────────────────────────────

pub(crate) async fn rewards_day(
    State(state): State<ServiceState>,
    Query(query): Query<dto::RewardsDayQuery>,
) -> Result<Json<dto::RewardsDayResponse>, ApiError> {
    let day = parse_day(&query.day_id)?;
    let finalized = state
        .coordinator
        .day_distribution(&day)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("no distribution for {day}")))?;
    Ok(Json(dto::RewardsDayResponse {
        day_id: day.to_string(),
        total_emissions: finalized.total_emissions,
        base_pool_total: finalized.base_pool_total,
        performance_pool_total: finalized.performance_pool_total,
        active_contributor_count: finalized.active_count,
        rewards: finalized.rewards,
        reward_root: finalized.reward_root,
    }))
}

pub(crate) async fn rewards_root(
    State(state): State<ServiceState>,
    Query(query): Query<dto::RewardsDayQuery>,
) -> Result<Json<dto::RewardsRootResponse>, ApiError> {
    let day = parse_day(&query.day_id)?;
    let (reward_root, leaf_count) = state
        .coordinator
        .reward_root(&day)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("no distribution for {day}")))?;
    Ok(Json(dto::RewardsRootResponse {
        day_id: day.to_string(),
        reward_root,
        leaf_count,
    }))
}

pub(crate) async fn rewards_proof(
    State(state): State<ServiceState>,
    Query(query): Query<dto::RewardsProofQuery>,
) -> Result<Json<dto::RewardsProofResponse>, ApiError> {
    let day = parse_day(&query.day_id)?;
    let account = parse_account(&query.account_id)?;
    let (leaf, proof, root) = state
        .coordinator
        .reward_proof(&day, &account)
        .await?
        .ok_or_else(|| {
            ApiError::not_found(format!("no reward entry for {account} on {day}"))
        })?;
    Ok(Json(dto::RewardsProofResponse {
        day_id: day.to_string(),
        account_id: account.to_string(),
        leaf,
        proof,
        root,
    }))
}

//─────────────────────────────
//  Ledger read models
//─────────────────────────────

pub(crate) async fn balance(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
) -> Result<Json<dto::BalanceResponse>, ApiError> {
    let account = parse_account(&id)?;
    match state.coordinator.ledger().balance(&account).await? {
        Some(row) => Ok(Json(dto::BalanceResponse {
            account_id: row.account_id.to_string(),
            balance_micro: row.balance_micro,
            total_earned_micro: row.total_earned_micro,
            last_reward_day: row.last_reward_day.map(|d| d.to_string()),
        })),
        // A registered account with no credits yet reads as zero.
        None => {
            let registered = state
                .coordinator
                .stores()
                .operational
                .get_node_key(&account)
                .await?
                .is_some();
            if !registered {
                return Err(ApiError::not_found(format!("unknown account {account}")));
            }
            Ok(Json(dto::BalanceResponse {
                account_id: account.to_string(),
                balance_micro: 0,
                total_earned_micro: 0,
                last_reward_day: None,
            }))
        }
    }
}

pub(crate) async fn history(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
    Query(query): Query<dto::LimitQuery>,
) -> Result<Json<dto::HistoryResponse>, ApiError> {
    let account = parse_account(&id)?;
    let entries = state
        .coordinator
        .ledger()
        .history(&account, query.limit.unwrap_or(DEFAULT_LIMIT))
        .await?;
    Ok(Json(dto::HistoryResponse {
        account_id: account.to_string(),
        entries,
    }))
}

pub(crate) async fn leaderboard(
    State(state): State<ServiceState>,
    Query(query): Query<dto::LimitQuery>,
) -> Result<Json<Vec<dto::LeaderboardEntry>>, ApiError> {
    let rows = state
        .coordinator
        .ledger()
        .leaderboard(query.limit.unwrap_or(DEFAULT_LIMIT))
        .await?;
    Ok(Json(
        rows.into_iter()
            .enumerate()
            .map(|(i, row)| dto::LeaderboardEntry {
                rank: i + 1,
                account_id: row.account_id.to_string(),
                total_earned_micro: row.total_earned_micro,
            })
            .collect(),
    ))
}

pub(crate) async fn supply(
    State(state): State<ServiceState>,
) -> Result<Json<dto::SupplyResponse>, ApiError> {
    Ok(Json(dto::SupplyResponse {
        total_supply_micro: state.coordinator.ledger().total_supply().await?,
    }))
}

pub(crate) async fn devices(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<dto::DeviceDto>>, ApiError> {
    let account = parse_account(&id)?;
    let records = state
        .coordinator
        .stores()
        .operational
        .devices_for_account(&account)
        .await?;
    Ok(Json(
        records
            .into_iter()
            .map(|d| dto::DeviceDto {
                device_id: d.device_id,
                label: d.label,
                added_at: d.added_at,
            })
            .collect(),
    ))
}

//─────────────────────────────
//  Health
//─────────────────────────────

pub(crate) async fn health(
    State(state): State<ServiceState>,
) -> Result<Json<dto::HealthResponse>, ApiError> {
    Ok(Json(dto::HealthResponse {
        status: "ok".to_string(),
        day: status_dto(state.coordinator.status().await),
    }))
}
