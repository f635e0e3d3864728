//! Compression codec (C3): zstd-over-tar with tuned, non-negotiable parameters.
//!
//! These are part of the archive format, not tunables. Chosen for
//! native-codebase workloads: many near-duplicate trees,
//! tens of MB each, where long-distance matching does almost all the work
//! and a high compression level buys little over level 1.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

const WINDOW_LOG: i32 = 30;
const COMPRESSION_LEVEL: i32 = 1;

fn encoder(writer: File) -> Result<zstd::Encoder<'static, BufWriter<File>>> {
    let mut encoder = zstd::Encoder::new(BufWriter::new(writer), COMPRESSION_LEVEL)?;
    encoder.window_log(WINDOW_LOG as u32)?;
    encoder.long_distance_matching(true)?;
    encoder.set_parameter(zstd::stream::raw::CParameter::LdmHashLog(27))?;
    encoder.set_parameter(zstd::stream::raw::CParameter::LdmMinMatch(4))?;
    encoder.set_parameter(zstd::stream::raw::CParameter::Strategy(
        zstd::zstd_safe::Strategy::BtUltra2,
    ))?;
    Ok(encoder)
}

fn decoder(reader: File) -> Result<zstd::Decoder<'static, BufReader<File>>> {
    let mut decoder = zstd::Decoder::new(reader)?;
    decoder.window_log_max(WINDOW_LOG as u32)?;
    Ok(decoder)
}

/// Writes `folders` (each named by its basename inside the archive) as one
/// zstd-compressed tar to `output_path`, replacing any existing file there.
pub fn compress(folders: &[PathBuf], output_path: &Path) -> Result<()> {
    if output_path.exists() {
        std::fs::remove_file(output_path)?;
    }
    let file = File::create(output_path)?;
    let enc = encoder(file)?;
    let mut builder = tar::Builder::new(enc);
    for folder in folders {
        let arcname = folder
            .file_name()
            .ok_or_else(|| Error::compress_failed(output_path.display().to_string(), "folder has no name"))?;
        builder.append_dir_all(arcname, folder)?;
    }
    let enc = builder.into_inner()?;
    enc.finish()?;
    Ok(())
}

/// Extracts only members whose path begins with `prefix` (a commit ID) from
/// `bundle_path` into `output_dir`. Returns `Ok(true)` if anything matched.
pub fn extract_with_prefix(bundle_path: &Path, prefix: &str, output_dir: &Path) -> Result<bool> {
    if !bundle_path.exists() {
        return Err(Error::decompress_failed(
            bundle_path.display().to_string(),
            "archive does not exist",
        ));
    }
    let file = File::open(bundle_path)?;
    let dec = decoder(file)?;
    let mut archive = tar::Archive::new(dec);
    let mut extracted_any = false;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        if path.starts_with(prefix) {
            entry.unpack_in(output_dir)?;
            extracted_any = true;
        }
    }

    Ok(extracted_any)
}
