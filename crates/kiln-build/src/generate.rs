//! Artifact generators.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path};

use tracing::debug;
use zip::CompressionMethod;
use zip::write::FileOptions;

use crate::checksum::source_files;
use crate::descriptor::BuildDescriptor;
use crate::error::{BuildError, BuildResult};

/// Produces one artifact from its source directories.
///
/// Implementations must write [`BuildDescriptor::output`] and report every
/// source file they consume through `progress`.
pub trait ArtifactGenerator: Send {
    /// Regenerate `descriptor.output`.
    ///
    /// # Errors
    ///
    /// Returns an error when the artifact cannot be produced; the previous
    /// artifact, if any, must then be left untouched.
    fn generate(
        &mut self,
        descriptor: &BuildDescriptor,
        progress: &mut dyn FnMut(&Path),
    ) -> BuildResult<()>;
}

/// Packs every checksummed source file into a deflated zip archive.
///
/// Entries are named `<short_path>/<relative path>`. When several search paths
/// provide the same entry, the first one wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipGenerator;

impl ArtifactGenerator for ZipGenerator {
    fn generate(
        &mut self,
        descriptor: &BuildDescriptor,
        progress: &mut dyn FnMut(&Path),
    ) -> BuildResult<()> {
        let output = &descriptor.output;
        let dir = output
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|err| BuildError::io("zip.create_dir", dir, err))?;

        let temp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|err| BuildError::io("zip.tempfile", dir, err))?;
        let mut archive = zip::ZipWriter::new(temp);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut seen = BTreeSet::new();

        for source in &descriptor.sources {
            for file in source_files(&source.root, &descriptor.options)? {
                let Ok(relative) = file.strip_prefix(&source.root) else {
                    continue;
                };
                let name = entry_name(&source.short_path, relative);
                if !seen.insert(name.clone()) {
                    continue;
                }
                archive
                    .start_file(name, options)
                    .map_err(|err| BuildError::zip("zip.start_file", output, err))?;
                let mut input =
                    File::open(&file).map_err(|err| BuildError::io("zip.open_source", &file, err))?;
                io::copy(&mut input, &mut archive)
                    .map_err(|err| BuildError::io("zip.write_entry", &file, err))?;
                progress(&file);
            }
        }

        let temp = archive
            .finish()
            .map_err(|err| BuildError::zip("zip.finish", output, err))?;
        temp.persist(output)
            .map_err(|err| BuildError::io("zip.persist", output, err.error))?;
        debug!(artifact = %output.display(), entries = seen.len(), "wrote zip artifact");
        Ok(())
    }
}

fn entry_name(short_path: &str, relative: &Path) -> String {
    let mut name = short_path.trim_end_matches('/').to_string();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            if !name.is_empty() {
                name.push('/');
            }
            name.push_str(&part.to_string_lossy());
        }
    }
    name
}
