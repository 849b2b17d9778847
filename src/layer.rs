use crate::error::{Error, Result};
use crate::hash::{self, Hash};
use crate::media_type::MediaType;
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read};
use std::sync::Arc;

/// A readable layer stream. Dropping it releases whatever backs it.
pub type Stream = Box<dyn Read + Send>;

/// One filesystem layer of an image.
///
/// `digest` must be the hash of the bytes `compressed` yields and `diff_id`
/// the hash of the bytes `uncompressed` yields. Registries and runtimes
/// address layers by these hashes, so an implementation returning anything
/// else is broken.
///
/// Any of these may block on I/O for layers that aren't held in memory.
pub trait Layer: Send + Sync {
    /// Hash of the compressed layer.
    fn digest(&self) -> Result<Hash>;

    /// Hash of the uncompressed layer.
    fn diff_id(&self) -> Result<Hash>;

    /// A new stream positioned at the start of the compressed contents.
    fn compressed(&self) -> Result<Stream>;

    /// A new stream positioned at the start of the uncompressed contents.
    fn uncompressed(&self) -> Result<Stream>;

    /// Number of bytes `compressed` yields.
    fn size(&self) -> Result<u64>;

    fn media_type(&self) -> Result<MediaType>;
}

/// Layer held entirely in memory. Nothing is compressed: both streams
/// return the raw contents and digest and diff id are the same SHA256.
pub struct StaticLayer {
    b: Arc<[u8]>,
    h: Hash,
    mt: MediaType,
}

impl StaticLayer {
    pub fn new<B: Into<Vec<u8>>>(contents: B, media_type: MediaType) -> Result<StaticLayer> {
        let b: Arc<[u8]> = contents.into().into();
        let (h, _) = hash::sha256(&b[..])?;
        Ok(StaticLayer {
            b,
            h,
            mt: media_type,
        })
    }

    fn reader(&self) -> Stream {
        Box::new(Cursor::new(Arc::clone(&self.b)))
    }
}

impl Layer for StaticLayer {
    fn digest(&self) -> Result<Hash> {
        Ok(self.h)
    }

    fn diff_id(&self) -> Result<Hash> {
        Ok(self.h)
    }

    fn compressed(&self) -> Result<Stream> {
        Ok(self.reader())
    }

    fn uncompressed(&self) -> Result<Stream> {
        Ok(self.reader())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.b.len() as u64)
    }

    fn media_type(&self) -> Result<MediaType> {
        Ok(self.mt.clone())
    }
}

/// A layer entry in a v2 image manifest.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: MediaType,
    pub size: u64,   // compressed
    pub digest: Hash, // compressed
}

/// The rootfs section of an image config.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RootFs {
    #[serde(rename = "type")]
    pub type_: String,
    pub diff_ids: Vec<Hash>, // NB no camel case
}

pub fn descriptor(layer: &dyn Layer) -> Result<Descriptor> {
    Ok(Descriptor {
        media_type: layer.media_type()?,
        size: layer.size()?,
        digest: layer.digest()?,
    })
}

/// Collects diff ids, bottom layer first.
pub fn root_fs(layers: &[&dyn Layer]) -> Result<RootFs> {
    let diff_ids = layers
        .iter()
        .map(|l| l.diff_id())
        .collect::<Result<Vec<_>>>()?;
    Ok(RootFs {
        type_: "layers".to_string(),
        diff_ids,
    })
}

/// Drains both streams of `layer` and checks them against what the layer
/// reports about itself.
pub fn verify(layer: &dyn Layer) -> Result<()> {
    let (actual, size) = hash::sha256(layer.compressed()?)?;
    let expected = layer.digest()?;
    if actual != expected {
        return Err(Error::DigestMismatch { expected, actual });
    }
    let expected_size = layer.size()?;
    if size != expected_size {
        return Err(Error::SizeMismatch {
            expected: expected_size,
            actual: size,
        });
    }

    let (actual, _) = hash::sha256(layer.uncompressed()?)?;
    let expected = layer.diff_id()?;
    if actual != expected {
        return Err(Error::DigestMismatch { expected, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::thread;

    fn drain(mut r: Stream) -> Vec<u8> {
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_static_hello() {
        let layer = StaticLayer::new("hello", "application/vnd.test".into()).unwrap();
        assert_eq!(layer.size().unwrap(), 5);
        assert_eq!(
            layer.digest().unwrap().to_string(),
            "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(layer.digest().unwrap(), layer.diff_id().unwrap());
        assert_eq!(drain(layer.uncompressed().unwrap()), b"hello");
        assert_eq!(drain(layer.compressed().unwrap()), b"hello");
        assert_eq!(layer.media_type().unwrap().as_str(), "application/vnd.test");
    }

    #[test]
    fn test_static_empty() {
        let layer = StaticLayer::new(Vec::new(), "application/vnd.empty".into()).unwrap();
        assert_eq!(layer.size().unwrap(), 0);
        assert_eq!(layer.digest().unwrap(), layer.diff_id().unwrap());
        assert_eq!(layer.digest().unwrap(), hash::sha256(io::empty()).unwrap().0);
        assert!(drain(layer.compressed().unwrap()).is_empty());
        assert!(drain(layer.uncompressed().unwrap()).is_empty());
        verify(&layer).unwrap();
    }

    #[test]
    fn test_static_identity() {
        let a = StaticLayer::new("same bytes", "application/vnd.a".into()).unwrap();
        let b = StaticLayer::new("same bytes", "application/vnd.b".into()).unwrap();
        let c = StaticLayer::new("other bytes", "application/vnd.a".into()).unwrap();
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());
        assert_ne!(a.digest().unwrap(), c.digest().unwrap());
        // stable across calls
        assert_eq!(a.digest().unwrap(), a.digest().unwrap());
    }

    #[test]
    fn test_static_size_matches_stream() {
        let contents: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let layer = StaticLayer::new(contents.clone(), MediaType::docker_uncompressed_layer()).unwrap();
        let drained = drain(layer.compressed().unwrap());
        assert_eq!(drained.len() as u64, layer.size().unwrap());
        assert_eq!(drained, contents);
        verify(&layer).unwrap();
    }

    #[test]
    fn test_static_streams_are_independent() {
        let contents: Vec<u8> = (0..64 * 1024u32).map(|i| (i % 253) as u8).collect();
        let layer = Arc::new(StaticLayer::new(contents.clone(), "application/vnd.test".into()).unwrap());

        // a half-read stream doesn't move another one
        let mut first = layer.compressed().unwrap();
        let mut buf = [0u8; 100];
        first.read_exact(&mut buf).unwrap();
        assert_eq!(drain(layer.compressed().unwrap()), contents);
        assert_eq!(&buf[..], &contents[..100]);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let layer = Arc::clone(&layer);
                thread::spawn(move || {
                    if i % 2 == 0 {
                        drain(layer.compressed().unwrap())
                    } else {
                        drain(layer.uncompressed().unwrap())
                    }
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), contents);
        }
    }

    struct LyingLayer;

    impl Layer for LyingLayer {
        fn digest(&self) -> Result<Hash> {
            Ok(hash::sha256(&b"something else"[..])?.0)
        }
        fn diff_id(&self) -> Result<Hash> {
            self.digest()
        }
        fn compressed(&self) -> Result<Stream> {
            Ok(Box::new(Cursor::new(b"contents".to_vec())))
        }
        fn uncompressed(&self) -> Result<Stream> {
            self.compressed()
        }
        fn size(&self) -> Result<u64> {
            Ok(8)
        }
        fn media_type(&self) -> Result<MediaType> {
            Ok("application/vnd.test".into())
        }
    }

    #[test]
    fn test_verify_rejects_lying_layer() {
        match verify(&LyingLayer) {
            Err(Error::DigestMismatch { expected, actual }) => {
                assert_eq!(expected, LyingLayer.digest().unwrap());
                assert_eq!(actual, hash::sha256(&b"contents"[..]).unwrap().0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    /// Streams are honest, the size is one byte too many.
    struct PaddedSize(StaticLayer);

    impl Layer for PaddedSize {
        fn digest(&self) -> Result<Hash> {
            self.0.digest()
        }
        fn diff_id(&self) -> Result<Hash> {
            self.0.diff_id()
        }
        fn compressed(&self) -> Result<Stream> {
            self.0.compressed()
        }
        fn uncompressed(&self) -> Result<Stream> {
            self.0.uncompressed()
        }
        fn size(&self) -> Result<u64> {
            Ok(self.0.size()? + 1)
        }
        fn media_type(&self) -> Result<MediaType> {
            self.0.media_type()
        }
    }

    #[test]
    fn test_verify_rejects_wrong_size() {
        let padded = PaddedSize(StaticLayer::new("hello", "application/vnd.test".into()).unwrap());
        match verify(&padded) {
            Err(Error::SizeMismatch { expected, actual }) => {
                assert_eq!(expected, 6);
                assert_eq!(actual, 5);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_descriptor_json() {
        let layer = StaticLayer::new("hello", MediaType::docker_uncompressed_layer()).unwrap();
        let json = serde_json::to_value(descriptor(&layer).unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "mediaType": "application/vnd.docker.image.rootfs.diff.tar",
                "size": 5,
                "digest": "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824",
            })
        );
    }

    #[test]
    fn test_root_fs_keeps_order() {
        let a = StaticLayer::new("a", "application/vnd.test".into()).unwrap();
        let b = StaticLayer::new("b", "application/vnd.test".into()).unwrap();
        let rootfs = root_fs(&[&b, &a]).unwrap();
        assert_eq!(rootfs.type_, "layers");
        assert_eq!(rootfs.diff_ids, vec![b.diff_id().unwrap(), a.diff_id().unwrap()]);
        let json = serde_json::to_value(&rootfs).unwrap();
        assert_eq!(json["type"], "layers");
        assert_eq!(json["diff_ids"].as_array().unwrap().len(), 2);
    }
}
