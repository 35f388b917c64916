pub mod batching;
pub mod enrichment;
pub mod parsing;
pub mod pipeline;
pub mod prompt;
pub mod sources;
