pub(crate) mod answers;
pub(crate) mod attachments;
pub(crate) mod attempts;
pub(crate) mod categories;
pub(crate) mod contexts;
pub(crate) mod exam_questions;
pub(crate) mod exam_rules;
pub(crate) mod exams;
pub(crate) mod health;
pub(crate) mod participants;
pub(crate) mod postulations;
pub(crate) mod questions;
pub(crate) mod results;
pub(crate) mod subtests;
pub(crate) mod users;
