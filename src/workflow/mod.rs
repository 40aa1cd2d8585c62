pub mod selection;
pub mod sequencer;

pub use sequencer::{Current, Progress, Sequencer, SequencerOptions};
