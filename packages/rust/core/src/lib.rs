//! Pipeline stages and orchestration for the monthly SEO run.
//!
//! Each stage module is usable on its own; [`pipeline`] wires them into one
//! ordered run over a shared [`RunContext`](context::RunContext).

pub mod context;
pub mod generative;
pub mod generator;
pub mod images;
pub mod linking;
pub mod pipeline;
pub mod publisher;
pub mod rankings;
pub mod recommendations;
pub mod report;
pub mod run_log;
pub mod selector;

pub use context::{RunContext, RunOptions, Services, StageResults};
pub use generative::{GenerationRequest, OpenRouterClient, TextGenerator};
pub use pipeline::{Pipeline, ProgressReporter, RunReport, SilentProgress, Stage, StageFailure};
pub use publisher::{CommandGitRunner, GitRunner, PublishOutcome};
pub use rankings::{SearchAnalytics, SearchConsoleClient};
pub use report::{DeliveryOutcome, Mailer, SmtpMailer};
