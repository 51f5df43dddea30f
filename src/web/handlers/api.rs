use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::chat::rows::ResultRow;
use crate::chat::summary::ConversationMessage;
use crate::db::values::Scalar;
use crate::db::warehouse::render_table_summary;
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Deserialize)]
pub struct SummarizeRequest {
    #[serde(default)]
    pub history: Vec<ConversationMessage>,
    pub visuals: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub summary: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DbInfoResponse {
    pub size: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MyDataResponse {
    pub summary: String,
    pub erd_url: Option<String>,
    pub erd_desc: Option<String>,
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let query = payload.query.trim();
    if query.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Query cannot be empty".to_string()));
    }

    info!("Chat query received");
    let response = state.chat.handle_query(query).await;
    Ok(Json(ChatResponse { response }))
}

pub async fn clear_history(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.chat.clear_history().await;
    Json(serde_json::json!({ "status": "cleared" }))
}

pub async fn summarize_history(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let summary = state.chat.summarize_history().await;
    Json(SummaryResponse { summary })
}

pub async fn summarize_conversation(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SummarizeRequest>,
) -> impl IntoResponse {
    let visuals = payload.visuals.unwrap_or_default();
    let summary = state
        .chat
        .summarize_conversation(&payload.history, &visuals)
        .await;
    Json(SummaryResponse { summary })
}

pub async fn db_info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(DbInfoResponse {
        size: state.warehouse.database_size(),
    })
}

/// Table overview. More than five tables are sent as a rendered table image.
pub async fn my_data(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let summary = match state.warehouse.summarize_tables().await {
        Ok(tables) if tables.len() > 5 => {
            let rows: Vec<ResultRow> = tables
                .iter()
                .map(|t| {
                    ResultRow::Generic(vec![
                        Scalar::Text(t.name.clone()),
                        t.row_count.map_or(Scalar::Null, Scalar::Int),
                        Scalar::Text(t.columns.iter().take(5).cloned().collect::<Vec<_>>().join(", ")),
                    ])
                })
                .collect();
            state.chat.format_rows(&rows)
        }
        Ok(tables) => render_table_summary(&tables),
        Err(e) => {
            error!("get_data_summary error: {}", e);
            String::new()
        }
    };

    Json(MyDataResponse {
        summary,
        erd_url: None,
        erd_desc: None,
    })
}
