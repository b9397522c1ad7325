// Start of file: /src/models/mod.rs

/*
    * Domain models: packages, questions, typed responses and the
    * users / permissions that guard them.
*/

pub mod flow;
pub mod question;
pub mod response;
pub mod user;
pub mod value;

pub use flow::{Flow, FlowDraft, FlowVersion, NewFlow};
pub use question::{FlowQuestion, NewQuestion, QuestionType};
pub use response::{FlowResponse, NewFlowResponse};
pub use user::{generate_token_key, Permission, User};
pub use value::{TypedValue, ValueType};

// End of file: /src/models/mod.rs
