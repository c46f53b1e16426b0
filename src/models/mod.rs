pub mod chunk;
pub mod conversation;
pub mod document;
pub mod quiz;
pub mod timetable;
pub mod user;

pub use chunk::{ChunkMetadata, DocumentChunk, MetadataFilter, ScoredChunk};
pub use conversation::{
    Conversation, ConversationInput, ConversationMessage, MessageInput, DEFAULT_CONVERSATION_TITLE,
};
pub use document::{Course, DocumentRecord};
pub use quiz::{
    AnswerValue, Difficulty, GradedQuestion, PublicQuestion, PublicQuiz, Question, QuestionType,
    Quiz, QuizResult, SubmittedAnswer,
};
pub use timetable::{TimetableEntry, TimetableInput};
pub use user::{User, UserUpdate};
