//! Codec Module
//!
//! Everything that touches the shape of a row before it reaches the engine.
//!
//! ## Responsibilities
//! - The [`Value`] tagged union stored under each key
//! - Encoding values to a checksummed, text-safe frame and back
//! - Key name validation and the reserved metadata key

mod value;
mod frame;
mod name;

pub use value::{Value, ERROR_SENTINEL_TAG};
pub use frame::{decode_value, encode_value, FRAME_HEADER_SIZE, FRAME_VERSION};
pub use name::{check_key_name, RESERVED_KEY};
