#![cfg_attr(not(feature = "std"), no_std)]

pub mod frame;
pub mod types;

#[cfg(feature = "std")]
pub mod cache;
#[cfg(feature = "std")]
pub mod clock;
#[cfg(feature = "std")]
pub mod error;
#[cfg(feature = "std")]
pub mod pacer;
#[cfg(feature = "std")]
pub mod pipeline;
#[cfg(feature = "std")]
pub mod platform;
#[cfg(feature = "std")]
pub mod source;

// Re-exports
pub use frame::*;
pub use types::*;

#[cfg(feature = "std")]
pub use cache::*;
#[cfg(feature = "std")]
pub use clock::*;
#[cfg(feature = "std")]
pub use error::*;
#[cfg(feature = "std")]
pub use pacer::*;
#[cfg(feature = "std")]
pub use pipeline::*;
#[cfg(feature = "std")]
pub use source::*;
