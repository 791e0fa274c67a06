mod handlers;
mod helpers;
mod queries;

use axum::{
    routing::{delete, get, patch, post, put},
    Router,
};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_exam).get(handlers::list_exams))
        .route("/available", get(handlers::list_available_exams))
        .route(
            "/:exam_id",
            get(handlers::get_exam).patch(handlers::update_exam).delete(handlers::delete_exam),
        )
        .route("/:exam_id/publish", post(handlers::publish_exam))
        .route("/:exam_id/finalize", post(handlers::finalize_exam))
        .route("/:exam_id/duplicate", post(handlers::duplicate_exam))
        .route("/:exam_id/assembly", post(handlers::assemble_exam))
        .route("/:exam_id/questions/:question_id", delete(handlers::remove_exam_question))
        .route("/:exam_id/subtests", post(handlers::create_subtest))
        .route(
            "/:exam_id/subtests/:subtest_id",
            patch(handlers::update_subtest).delete(handlers::delete_subtest),
        )
        .route(
            "/:exam_id/postulations",
            get(handlers::list_postulations).post(handlers::create_postulation),
        )
        .route(
            "/:exam_id/postulations/:postulation_id",
            patch(handlers::update_postulation).delete(handlers::delete_postulation),
        )
        .route("/:exam_id/postulations/:postulation_id/rules", put(handlers::replace_score_rules))
        .route("/:exam_id/participants", put(handlers::replace_participants))
        .route("/:exam_id/results", get(handlers::list_exam_results))
        .route("/:exam_id/attempts", post(crate::api::attempts::start_attempt))
}
