mod clock;
mod commands;
mod context;
mod dispatcher;
mod engine;
mod eval;
mod matcher;
mod registry;
mod sink;

pub use clock::{Clock, ManualClock, SystemClock};
pub use commands::{format_number, general_commands, register_general_commands};
pub use context::{
    ExecutionContext, ExecutionFrame, FrameExit, LoopContext, ResumePoint, ScriptTimer,
};
pub use dispatcher::{
    CallSite, CommandEffect, CommandInvocation, Dispatched, Dispatcher, ScriptLibrary,
    ScriptRegistry, DEFAULT_MAX_CALL_DEPTH,
};
pub use engine::{CodaEngine, EngineOptions, ScriptOutcome, DEFAULT_MAX_STEPS};
pub use eval::{ExpressionEvaluator, RhaiEvaluator};
pub use matcher::{match_arguments, Bindings};
pub use registry::{
    CommandDescriptor, CommandDoc, CommandHandler, CommandTable, ParameterSetDoc,
};
pub use sink::{BufferedSink, ConsoleSink, OutputSink};
