pub mod classifier;
pub mod runner;

pub use classifier::{classify, LineClass, OutputClassifier, SHARD_FINISHED_MARKER};
pub use runner::{
    describe_exit_code, CommandSpec, OutputLine, ProcessOutcome, ProcessRun, ProcessRunner,
    RunEvent, StreamKind,
};
