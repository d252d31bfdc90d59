#![deny(
    rust_2018_idioms,
    unreachable_pub,
    unsafe_code,
    unused_imports,
    unused_mut,
    missing_debug_implementations
)]

pub mod archive;
pub mod cipher;
pub mod error;
pub mod index;
pub mod loader;
pub mod util;
pub mod version;
pub mod view;

pub use archive::{Extractor, OpenArchive};
pub use error::{Result, UnrpaError};

/// Preferred size of a single passthrough copy
pub const CHUNK_SIZE: usize = 1 << 16;
