//! Intent resolution and answer routing
//!
//! Tracks the loan topic of a session across noisy, partial utterances,
//! rewrites short follow-ups into fully specified questions and routes each
//! turn through the knowledge box before falling back to grounded generation.

pub mod policy;
pub mod prompt;
pub mod router;
pub mod topic;

pub use policy::QuestionPolicy;
pub use prompt::build_prompt;
pub use router::{AnswerOrigin, AnswerRouter, ChatOutcome, GenerateAnswer, GeneratedAnswer};
pub use topic::LoanTopic;
