//! Kestrel Core Domain
//!
//! Pure domain types for the Kestrel signal-gating system.
//! This crate contains no async, no I/O, and is 100% unit testable.
//!
//! The central type is [`CompactSignal`]: the fixed 64-byte record that is
//! the only representation of a trading signal crossing component or thread
//! boundaries. Everything else here exists to produce, encode, or interpret
//! that record:
//!
//! - [`codec`]: the explicit little-endian wire layout, checksum, and
//!   stable hashing
//! - [`quant`]: the only write path for the record's scaled integer fields
//! - [`LLMSignalInput`]: the rich, transient producer record that gets
//!   compressed into a `CompactSignal`

pub mod codec;
pub mod input;
pub mod quant;
pub mod signal;

// Re-export commonly used types at crate root
pub use codec::{CodecError, SIGNAL_WIRE_SIZE, WIRE_VERSION, fnv1a_64};
pub use input::LLMSignalInput;
pub use signal::{CompactSignal, DecayFunction, SignalType};
