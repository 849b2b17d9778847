// Uncompressed tar layers living on disk, and packing filesystem paths into
// them.
//
// Could be better:
// * no gzip, so the compressed stream is the tar itself
use crate::error::{Error, Result};
use crate::hash::{self, Hash, HashAndWrite};
use crate::layer::{Layer, Stream};
use crate::media_type::MediaType;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A tar file on disk. The hash is computed on first use and then kept, so
/// the file must not change while the layer is alive.
pub struct TarballLayer {
    path: PathBuf,
    media_type: MediaType,
    identity: Mutex<Option<(Hash, u64)>>,
}

impl TarballLayer {
    pub fn open<P: Into<PathBuf>>(path: P, media_type: MediaType) -> TarballLayer {
        TarballLayer {
            path: path.into(),
            media_type,
            identity: Mutex::new(None),
        }
    }

    /// For a file whose hash and size are already known, e.g. because it was
    /// just written through a `HashAndWrite`.
    pub fn with_digest<P: Into<PathBuf>>(
        path: P,
        media_type: MediaType,
        digest: Hash,
        size: u64,
    ) -> TarballLayer {
        TarballLayer {
            path: path.into(),
            media_type,
            identity: Mutex::new(Some((digest, size))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_file(&self) -> Result<File> {
        File::open(&self.path).map_err(Error::SourceUnavailable)
    }

    // Errors aren't remembered, the next call hashes again.
    fn identity(&self) -> Result<(Hash, u64)> {
        let mut identity = self.identity.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(known) = *identity {
            return Ok(known);
        }
        info!("hashing {:?}", self.path);
        let computed = hash::sha256(BufReader::new(self.open_file()?))?;
        *identity = Some(computed);
        Ok(computed)
    }
}

impl Layer for TarballLayer {
    fn digest(&self) -> Result<Hash> {
        Ok(self.identity()?.0)
    }

    fn diff_id(&self) -> Result<Hash> {
        self.digest()
    }

    fn compressed(&self) -> Result<Stream> {
        Ok(Box::new(BufReader::new(self.open_file()?)))
    }

    fn uncompressed(&self) -> Result<Stream> {
        self.compressed()
    }

    fn size(&self) -> Result<u64> {
        Ok(self.identity()?.1)
    }

    fn media_type(&self) -> Result<MediaType> {
        Ok(self.media_type.clone())
    }
}

/// Archives `paths` into a single tar layer in `blob_root`, named by its
/// digest. Directories are added recursively and symlinks are kept as
/// links, which is what we want in images.
pub fn pack<P: AsRef<Path>>(paths: &[P], blob_root: &Path) -> Result<TarballLayer> {
    let staging = tempfile::NamedTempFile::new_in(blob_root).map_err(Error::Archive)?;
    let haw = HashAndWrite::new(BufWriter::new(staging.reopen().map_err(Error::Archive)?));
    let mut archive_builder = tar::Builder::new(haw);
    archive_builder.follow_symlinks(false);

    for path in paths {
        let path = path.as_ref();
        // entries in a layer are relative to the image root
        let name = path.strip_prefix("/").unwrap_or(path);
        debug!("adding {:?} as {:?}", path, name);
        // symlink_metadata, so a link to a directory is archived as a link
        let is_dir = std::fs::symlink_metadata(path)
            .map_err(Error::Archive)?
            .file_type()
            .is_dir();
        let appended = if is_dir {
            archive_builder.append_dir_all(name, path)
        } else {
            archive_builder.append_path_with_name(path, name)
        };
        appended.map_err(Error::Archive)?;
    }

    let haw = archive_builder.into_inner().map_err(Error::Archive)?;
    let (mut writer, digest, size) = haw.finish();
    writer.flush().map_err(Error::Archive)?;
    drop(writer);

    let blob_path = blob_root.join(digest.to_string());
    staging
        .persist(&blob_path)
        .map_err(|e| Error::Archive(io::Error::from(e)))?;
    info!("packed {} paths into {:?} ({} bytes)", paths.len(), blob_path, size);

    Ok(TarballLayer::with_digest(
        blob_path,
        MediaType::docker_uncompressed_layer(),
        digest,
        size,
    ))
}
