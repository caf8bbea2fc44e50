use crate::{ApiError, ApiState};
use axum::{
    Json,
    extract::{Path, State},
};
use indexer_types::Transaction;

/// `GET /txs`
pub(crate) async fn list_txs(
    State(state): State<ApiState>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    Ok(Json(state.storage.txs().await?))
}

/// `GET /txs/{hash}`
pub(crate) async fn get_tx(
    State(state): State<ApiState>,
    Path(hash): Path<String>,
) -> Result<Json<Transaction>, ApiError> {
    Ok(Json(state.storage.tx_by_hash(&hash).await?))
}
