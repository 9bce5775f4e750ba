//! # talecraft-client
//!
//! Network layer for the story-generation service:
//!
//! - **Retrying executor**: timeouts, jittered exponential backoff, bearer
//!   credentials with coalesced refresh on 401
//! - **Stream decoding**: `data: {json}` records split across arbitrary
//!   transport chunks
//! - **Cancellation**: every operation observes a [`CancelToken`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use talecraft_client::{CancelToken, ClientConfig, GenerationClient};
//! use talecraft_types::{GenerateRequest, Length, StreamMessage, Tone};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), talecraft_client::ApiError> {
//!     let client = GenerationClient::anonymous(ClientConfig::new("http://localhost:8000"))?;
//!     let request = GenerateRequest::new("The lighthouse keeper heard a knock", Tone::Mysterious, Length::Short);
//!
//!     client
//!         .stream_generation(&request, &CancelToken::new(), |message| {
//!             if let StreamMessage::Chunk { text } = message {
//!                 print!("{}", text);
//!             }
//!         })
//!         .await
//! }
//! ```

pub mod auth;
pub mod backoff;
pub mod cancel;
pub mod client;
pub mod config;
pub mod error;
pub mod stream;


pub use auth::{Anonymous, AuthError, AuthProvider, CoalescingAuth, Credential, StaticToken};
pub use backoff::BackoffPolicy;
pub use cancel::{CancelRegistration, CancelToken};
pub use client::{GenerationClient, RequestExecutor, RequestSpec, RetryState, StreamSource};
pub use config::{normalize_base_url, ClientConfig, DEFAULT_API_URL};
pub use error::{status_message, ApiError, TRANSIENT_STATUSES};
pub use stream::{decode, ByteStream, StreamDecoder};
