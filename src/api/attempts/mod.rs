mod handlers;
mod helpers;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::core::state::AppState;

pub(crate) use handlers::start_attempt;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:attempt_id", get(handlers::get_attempt))
        .route("/:attempt_id/answers/:question_id", patch(handlers::answer_question))
        .route("/:attempt_id/submit", post(handlers::submit_attempt))
        .route("/:attempt_id/result", get(handlers::get_attempt_result))
        .route("/:attempt_id/void", post(handlers::void_attempt))
}

#[cfg(test)]
mod tests;
