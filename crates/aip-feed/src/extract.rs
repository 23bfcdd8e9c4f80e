//! Archive extraction
//!
//! The AIP image is an ISO 9660 file; extraction is delegated to an external
//! program (`7z` or `bsdtar`), both of which read ISO images.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::FetchError;

/// Unpacks a downloaded archive into a directory.
#[async_trait]
pub trait ArchiveExtractor: Send + Sync {
    async fn extract(&self, archive: &Path, dest: &Path) -> Result<(), FetchError>;
}

/// Supported extractor command lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractorProgram {
    /// `7z x -y -o<dest> <archive>`
    SevenZip(String),
    /// `bsdtar -xf <archive> -C <dest>`
    Bsdtar(String),
}

impl ExtractorProgram {
    /// Pick the command line from the program name (anything ending in `tar`
    /// uses bsdtar syntax, everything else 7z syntax).
    pub fn from_program(program: &str) -> Self {
        let stem = Path::new(program)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| program.to_string());
        if stem.ends_with("tar") {
            ExtractorProgram::Bsdtar(program.to_string())
        } else {
            ExtractorProgram::SevenZip(program.to_string())
        }
    }

    fn program(&self) -> &str {
        match self {
            ExtractorProgram::SevenZip(p) | ExtractorProgram::Bsdtar(p) => p,
        }
    }

    fn command(&self, archive: &Path, dest: &Path) -> Command {
        let mut cmd = Command::new(self.program());
        match self {
            ExtractorProgram::SevenZip(_) => {
                cmd.arg("x")
                    .arg("-y")
                    .arg(format!("-o{}", dest.display()))
                    .arg(archive);
            }
            ExtractorProgram::Bsdtar(_) => {
                cmd.arg("-xf").arg(archive).arg("-C").arg(dest);
            }
        }
        cmd.kill_on_drop(true);
        cmd
    }
}

/// Extractor spawning an external program.
#[derive(Debug, Clone)]
pub struct CommandExtractor {
    program: ExtractorProgram,
}

impl CommandExtractor {
    pub fn new(program: &str) -> Self {
        Self {
            program: ExtractorProgram::from_program(program),
        }
    }
}

#[async_trait]
impl ArchiveExtractor for CommandExtractor {
    async fn extract(&self, archive: &Path, dest: &Path) -> Result<(), FetchError> {
        tokio::fs::create_dir_all(dest).await?;
        debug!(
            program = self.program.program(),
            archive = %archive.display(),
            dest = %dest.display(),
            "extracting archive"
        );

        let output = match self.program.command(archive, dest).output().await {
            Ok(o) => o,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FetchError::ExtractorUnavailable(
                    self.program.program().to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("Extractor failed: {}", stderr);
            Err(FetchError::Extract {
                archive: archive.display().to_string(),
                reason: stderr.trim().to_string(),
            })
        }
    }
}
