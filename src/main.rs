// Computes layer descriptors for tarballs and packs paths into layers.
#[macro_use]
extern crate log;
use crlayer::cache::{self, CachedLayer};
use crlayer::layer::{self, Descriptor, Layer, RootFs};
use crlayer::tarball::{self, TarballLayer};
use crlayer::MediaType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

const USAGE: &str = "
Usage: crlayer describe [--media-type MEDIATYPE] [--verify] [--cache-dir CACHEDIR] [--cache-size BYTES] FILE...
       crlayer pack --out OUT PATH...
       crlayer (-h | --help)

Options:
    --media-type MEDIATYPE  Media type recorded for each layer
                            [default: application/vnd.docker.image.rootfs.diff.tar]
    --verify                Re-read every layer and check it against its digest
    --cache-dir CACHEDIR    Spool layers through a disk cache in this directory
    --cache-size BYTES      Maximum size of the disk cache [default: 1073741824]
    --out OUT               Blob directory to write the packed layer to (must exist)
";

#[allow(non_snake_case)]
#[derive(Deserialize, Debug)]
struct Args {
    cmd_describe: bool,
    flag_media_type: String,
    flag_verify: bool,
    flag_cache_dir: Option<String>,
    flag_cache_size: u64,
    flag_out: Option<String>,
    arg_FILE: Vec<String>,
    arg_PATH: Vec<String>,
}

#[derive(Debug)]
enum Config {
    Describe {
        files: Vec<PathBuf>,
        media_type: MediaType,
        verify: bool,
        /// Directory and capacity of the optional blob cache.
        cache: Option<(PathBuf, u64)>,
    },
    Pack {
        paths: Vec<PathBuf>,
        blob_root: PathBuf,
    },
}

impl Config {
    fn from_args(args: Args) -> Config {
        if args.cmd_describe {
            let cache_size = args.flag_cache_size;
            Config::Describe {
                files: args.arg_FILE.iter().map(PathBuf::from).collect(),
                media_type: MediaType::new(args.flag_media_type),
                verify: args.flag_verify,
                cache: args
                    .flag_cache_dir
                    .map(|dir| (PathBuf::from(dir), cache_size)),
            }
        } else {
            Config::Pack {
                paths: args.arg_PATH.iter().map(PathBuf::from).collect(),
                blob_root: PathBuf::from(args.flag_out.unwrap_or_default()),
            }
        }
    }
}

#[derive(Serialize)]
struct Described {
    layers: Vec<Descriptor>,
    rootfs: RootFs,
}

fn describe(
    files: &[PathBuf],
    media_type: &MediaType,
    verify: bool,
    cache: &Option<(PathBuf, u64)>,
) -> crlayer::Result<Described> {
    let shared = match cache {
        Some((dir, size)) => Some(cache::layer_cache(dir, *size)?),
        None => None,
    };

    if media_type.is_compressed() {
        warn!(
            "{} claims gzip, but tarballs are described as they are on disk",
            media_type
        );
    }

    let mut layers: Vec<Box<dyn Layer>> = Vec::new();
    for file in files {
        let tarball = TarballLayer::open(file, media_type.clone());
        let l: Box<dyn Layer> = match &shared {
            Some(shared) => Box::new(CachedLayer::new(Arc::new(tarball), shared.clone())),
            None => Box::new(tarball),
        };
        // draining through the cache checks the digest anyway
        if verify || shared.is_some() {
            info!("verifying {:?}", file);
            layer::verify(l.as_ref())?;
        }
        layers.push(l);
    }

    let refs: Vec<&dyn Layer> = layers.iter().map(|l| l.as_ref()).collect();
    Ok(Described {
        layers: refs
            .iter()
            .map(|l| layer::descriptor(*l))
            .collect::<crlayer::Result<_>>()?,
        rootfs: layer::root_fs(&refs)?,
    })
}

fn run(config: Config) -> Result<String, Box<dyn std::error::Error>> {
    debug!("{:?}", config);
    let json = match config {
        Config::Describe {
            files,
            media_type,
            verify,
            cache,
        } => serde_json::to_string_pretty(&describe(&files, &media_type, verify, &cache)?)?,
        Config::Pack { paths, blob_root } => {
            let packed = tarball::pack(&paths, &blob_root)?;
            serde_json::to_string_pretty(&layer::descriptor(&packed)?)?
        }
    };
    Ok(json)
}

fn main() {
    env_logger::init();

    let args: Args = docopt::Docopt::new(USAGE)
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    match run(Config::from_args(args)) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            error!("{}", e);
            eprintln!("crlayer: {}", e);
            std::process::exit(1);
        }
    }
}
