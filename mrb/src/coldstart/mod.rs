//! Cold-start measurement.
//!
//! - [`platform_log`] - decoding and parsing of the platform execution log
//! - [`signals`] - ordered cold/warm signal extractors
//! - [`invoker`] - direct invocation behind the [`Invoker`] trait
//! - [`orchestrator`] - the idle/invoke/classify/record loop

pub mod invoker;
pub mod orchestrator;
pub mod platform_log;
pub mod signals;

pub use invoker::{AwsCliInvoker, InvocationOutcome, InvokeError, Invoker};
pub use orchestrator::{ColdStartConfig, ColdStartOrchestrator, RecordSink, VariantRunSummary};
pub use platform_log::{PlatformLog, PlatformReport};
pub use signals::{Classification, Classifier, Observation, SignalExtractor, SignalSource, Verdict};
