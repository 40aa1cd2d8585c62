pub mod question_set;
pub mod record;

pub use question_set::{SetId, SetSummary};
pub use record::{Decision, FieldChanges, Record, Verdict};
