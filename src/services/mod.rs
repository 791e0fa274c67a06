pub(crate) mod assembly;
pub(crate) mod attempt_finalize;
pub(crate) mod attempt_timing;
pub(crate) mod errors;
pub(crate) mod exam_lifecycle;
pub(crate) mod postulations;
pub(crate) mod question_bank;
pub(crate) mod scoring;
