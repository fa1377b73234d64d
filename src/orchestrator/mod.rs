pub mod batch;
pub mod conditional;

// Re-exports for convenience
pub use batch::BatchOrchestrator;
pub use conditional::ConditionalCaptureOrchestrator;
