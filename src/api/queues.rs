use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;
use serde_json::json;
use tracing::warn;

use crate::app::AppState;
use crate::domain::ProjectId;

#[derive(Debug, Serialize)]
pub(crate) struct QueueDepth {
    project_id: ProjectId,
    depth: u64,
    max_depth: u64,
}

pub(crate) async fn depth(
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
) -> Result<Json<QueueDepth>, (StatusCode, Json<serde_json::Value>)> {
    let queue = state.queue();
    match queue.depth(project_id).await {
        Ok(depth) => Ok(Json(QueueDepth {
            project_id,
            depth,
            max_depth: queue.max_depth(),
        })),
        Err(error) => {
            warn!(project_id, %error, "queue depth lookup failed");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": error.to_string() })),
            ))
        }
    }
}
