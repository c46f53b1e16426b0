pub mod chat_flow;
pub mod grading_flow;
pub mod ingest_flow;
pub mod quiz_ctx;
pub mod quiz_flow;

pub use chat_flow::{ChatFlow, ChatRequest};
pub use grading_flow::{GradingFlow, ResultReport, SubmitRequest};
pub use ingest_flow::{IngestError, IngestFlow, IngestReport, IngestRequest};
pub use quiz_ctx::QuizCtx;
pub use quiz_flow::{QuizFlow, QuizOutcome, QuizRequest};
