//! Concrete [`crate::convert::DocumentConverter`] implementations.
//!
//! Both engines live outside this process; these modules only speak their
//! protocols.
//!
//! 1. [`command`]: the layout-analysis + OCR engine, run as a child process
//!    per conversion. Receives the [`crate::pipeline::PipelineConfig`] as JSON
//!    on stdin and prints Markdown on stdout.
//! 2. [`docint`]: the cloud document-intelligence service: upload, then poll
//!    the long-running analyze operation until the Markdown is ready.

pub mod command;
pub mod docint;

pub use command::CommandConverter;
pub use docint::DocIntelligenceClient;
