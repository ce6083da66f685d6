//! Image rendering: decode, resize, encode.
//!
//! | Stage | Crate / function |
//! |---|---|
//! | **Decode** | `image::guess_format` + `load_from_memory_with_format` |
//! | **Resize** | [`Resizer`] trait, [`LanczosResizer`] (Lanczos3) |
//! | **Encode** | [`Encoder`]: PNG vs. JPEG, smaller acceptable output wins |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Encoding quality and format policy
//! - **Surface**: The pixel buffer the resizer draws into
//! - **Resize / Encode**: The collaborators the request controller drives
//!
//! Everything here is synchronous and CPU-bound; the controller runs it on
//! the blocking pool.

mod calculations;
mod decode;
mod encoder;
mod params;
mod resize;
mod surface;

pub use calculations::calculate_target_dimensions;
pub use decode::decode;
pub use encoder::{EncodeError, EncodedFormat, EncodedImage, Encoder, choose_format};
pub use params::{EncodePolicy, Quality};
pub use resize::{LanczosResizer, ResizeError, Resizer};
pub use surface::Surface;
