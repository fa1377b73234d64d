pub mod client;
pub mod transport;

// Re-exports for convenience
pub use client::CaptureClient;
pub use transport::{CaptureTransport, HttpTransport};
