mod answer;
mod ids;
mod question;
mod session;

pub use ids::{AnswerId, QuestionId, SessionId, UserId};

pub use answer::Answer;
pub use question::{Difficulty, Question, QuestionDraft, QuestionError};
pub use session::{SessionStateError, SessionStatus, TrainingSession};
