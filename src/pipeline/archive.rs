//! Packaging delivered variants into a single zip.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::models::variant::VariantArtifact;
use crate::pipeline::error::PipelineError;

/// Object name of the archive inside a job's output prefix.
pub const ARCHIVE_NAME: &str = "variants.zip";

/// Deflate every artifact into one archive, entries named after the variant.
/// An empty slice yields a valid empty archive.
pub fn build_archive(artifacts: &[VariantArtifact]) -> Result<Vec<u8>, PipelineError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for artifact in artifacts {
        writer.start_file(artifact.name.as_str(), options)?;
        writer.write_all(&artifact.bytes)?;
    }

    Ok(writer.finish()?.into_inner())
}
