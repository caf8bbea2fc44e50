use crate::{ApiError, ApiState};
use axum::{
    Json,
    extract::{Path, State},
};
use indexer_types::Block;

/// `GET /blocks`
///
/// Every stored block, ordered by number.
pub(crate) async fn list_blocks(
    State(state): State<ApiState>,
) -> Result<Json<Vec<Block>>, ApiError> {
    Ok(Json(state.storage.blocks().await?))
}

/// `GET /blocks/{number}`
pub(crate) async fn get_block(
    State(state): State<ApiState>,
    Path(number): Path<String>,
) -> Result<Json<Block>, ApiError> {
    let number = number
        .parse::<u64>()
        .map_err(|err| ApiError::BadRequest(format!("invalid block number {number:?}: {err}")))?;
    Ok(Json(state.storage.block_by_number(number).await?))
}
