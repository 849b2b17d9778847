use serde::{Deserialize, Serialize};
use std::fmt;

pub const DOCKER_LAYER: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";
pub const DOCKER_UNCOMPRESSED_LAYER: &str = "application/vnd.docker.image.rootfs.diff.tar";
pub const OCI_LAYER: &str = "application/vnd.oci.image.layer.v1.tar+gzip";
pub const OCI_UNCOMPRESSED_LAYER: &str = "application/vnd.oci.image.layer.v1.tar";

/// Tag describing the format of a blob, as it appears in manifests.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaType(String);

impl MediaType {
    pub fn new<S: Into<String>>(s: S) -> MediaType {
        MediaType(s.into())
    }

    pub fn docker_layer() -> MediaType {
        MediaType::new(DOCKER_LAYER)
    }

    pub fn docker_uncompressed_layer() -> MediaType {
        MediaType::new(DOCKER_UNCOMPRESSED_LAYER)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the tag claims gzip-compressed content.
    pub fn is_compressed(&self) -> bool {
        self.0.ends_with(".gzip") || self.0.ends_with("+gzip")
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MediaType {
    fn from(s: &str) -> MediaType {
        MediaType::new(s)
    }
}

impl From<String> for MediaType {
    fn from(s: String) -> MediaType {
        MediaType(s)
    }
}
