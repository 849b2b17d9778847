// Container image layers and their identities.
//
// A layer has two hashes: the digest of its compressed bytes, which is what
// registries store and serve it under, and the diff id of its uncompressed
// bytes, which image configs list in rootfs.diff_ids. Every Layer here
// guarantees those hashes match what its streams actually return.
#[macro_use]
extern crate log;

pub mod cache;
pub mod error;
pub mod hash;
pub mod layer;
pub mod media_type;
pub mod tarball;

pub use crate::cache::CachedLayer;
pub use crate::error::{Error, Result};
pub use crate::hash::{Algorithm, Hash};
pub use crate::layer::{Descriptor, Layer, RootFs, StaticLayer, Stream};
pub use crate::media_type::MediaType;
pub use crate::tarball::TarballLayer;
