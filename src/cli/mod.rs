//! CLI command handlers
//!
//! Each subcommand is implemented in its own module.

pub mod feedback;
pub mod helpers;
pub mod init;
pub mod recommend;
pub mod status;
pub mod train;

use clap::Args;
use ergrank_core::{ContextKey, Emotion, EmotionCause};

/// Context selection shared by every context-scoped subcommand
#[derive(Args, Debug, Clone)]
pub struct ContextArgs {
    /// Use case identifier
    #[arg(long = "use-case")]
    pub use_case: u32,

    /// Step within the use case
    #[arg(long)]
    pub step: u32,

    /// Detected emotion (happy, angry, anxious, embarrassed, relaxed, sad)
    #[arg(long)]
    pub emotion: Emotion,

    /// Emotion cause (retail, not_retail)
    #[arg(long)]
    pub cause: EmotionCause,
}

impl From<ContextArgs> for ContextKey {
    fn from(args: ContextArgs) -> Self {
        ContextKey::new(args.use_case, args.step, args.emotion, args.cause)
    }
}
