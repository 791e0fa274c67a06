mod assembly;
mod create;
mod lifecycle;
mod list;
mod manage;
mod postulations;
mod subtests;

pub(super) use assembly::{assemble_exam, remove_exam_question};
pub(super) use create::{create_exam, duplicate_exam};
pub(super) use lifecycle::{finalize_exam, publish_exam};
pub(super) use list::{list_available_exams, list_exam_results, list_exams};
pub(super) use manage::{delete_exam, get_exam, replace_participants, update_exam};
pub(super) use postulations::{
    create_postulation, delete_postulation, list_postulations, replace_score_rules,
    update_postulation,
};
pub(super) use subtests::{create_subtest, delete_subtest, update_subtest};
