// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Export artifact assembly.
//!
//! A backup is a single XML document: a fixed envelope header, the body of
//! every exported category in order, and a closing footer. Category bodies
//! are streamed to disk as they arrive, with each body's own XML declaration
//! removed so the combined document has exactly one envelope.
//!
//! The local file never outlives its run: [`Artifact`] removes it when
//! dropped, so abort paths, cancellation and panics release it too.

use crate::time_utils::artifact_timestamp;
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

/// Closing tag of the envelope.
pub const ENVELOPE_FOOTER: &str = "</xml>";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Envelope header stamped with the export time.
pub fn envelope_header(exported_at: DateTime<Utc>) -> String {
    format!(
        "<xml>\n\
         <title>Toodledo :: XML Backup</title>\n\
         <link>http://www.toodledo.com/</link>\n\
         <toodledoversion>20</toodledoversion>\n\
         <description>Your Toodledo backup</description>\n\
         <export_date>{}</export_date>\n",
        exported_at.timestamp()
    )
}

/// Remove a leading byte-order mark and `<?xml ...?>` declaration.
///
/// Whitespace following the declaration goes with it. Bodies without a
/// declaration are returned unchanged.
pub fn strip_preamble(body: &[u8]) -> &[u8] {
    let body = body.strip_prefix(UTF8_BOM).unwrap_or(body);

    if !body.starts_with(b"<?xml") {
        return body;
    }

    match body.windows(2).position(|w| w == b"?>") {
        Some(end) => {
            let rest = &body[end + 2..];
            let skip = rest
                .iter()
                .take_while(|b| b.is_ascii_whitespace())
                .count();
            &rest[skip..]
        }
        // Unterminated declaration: nothing usable follows it.
        None => &[],
    }
}

/// Local path of a user's artifact for a run started at `started_at`.
pub fn artifact_path(dir: &Path, username: &str, started_at: DateTime<Utc>) -> PathBuf {
    dir.join(format!(
        "{}_{}.xml",
        urlencoding::encode(username),
        artifact_timestamp(started_at)
    ))
}

/// A local artifact file that is deleted when dropped.
#[derive(Debug)]
pub struct Artifact {
    path: PathBuf,
    len: u64,
    removed: bool,
}

impl Artifact {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            len: 0,
            removed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the completed document in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Delete the file now. A file that is already gone counts as removed.
    pub async fn remove(mut self) -> io::Result<()> {
        self.removed = true;
        match tokio::fs::remove_file(&self.path).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

// Last-resort cleanup for abandoned runs; completed runs go through
// `Artifact::remove`. The removal is a blocking call on the runtime thread.
impl Drop for Artifact {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Removed abandoned artifact");
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Failed to remove artifact");
            }
        }
    }
}

/// Incremental writer for one export artifact.
///
/// Writes are strictly sequential; [`ArtifactWriter::offset`] is the number
/// of bytes written so far and only ever grows.
pub struct ArtifactWriter {
    // Declared before `artifact` so the handle closes before the file is removed.
    file: BufWriter<File>,
    offset: u64,
    categories: usize,
    artifact: Artifact,
}

impl ArtifactWriter {
    /// Create the artifact file and write the envelope header.
    pub async fn open(path: PathBuf, exported_at: DateTime<Utc>) -> io::Result<Self> {
        let file = File::create(&path).await?;
        // Own the path from here on so a failed header write still cleans up.
        let artifact = Artifact::new(path);

        let mut writer = Self {
            file: BufWriter::new(file),
            offset: 0,
            categories: 0,
            artifact,
        };
        writer.write(envelope_header(exported_at).as_bytes()).await?;
        Ok(writer)
    }

    /// Bytes written so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of category bodies appended.
    pub fn categories(&self) -> usize {
        self.categories
    }

    /// Append one category body, minus its XML declaration.
    ///
    /// Returns the offset at which the body was written.
    pub async fn append_category(&mut self, body: &[u8]) -> io::Result<u64> {
        let start = self.offset;
        self.write(strip_preamble(body)).await?;
        self.categories += 1;
        Ok(start)
    }

    /// Write the envelope footer and flush the file to disk.
    ///
    /// The returned [`Artifact`] is a complete, well-formed document.
    pub async fn close(mut self) -> io::Result<Artifact> {
        self.write(ENVELOPE_FOOTER.as_bytes()).await?;
        self.file.flush().await?;
        self.file.get_ref().sync_all().await?;
        let ArtifactWriter {
            file,
            offset,
            mut artifact,
            ..
        } = self;
        drop(file);
        artifact.len = offset;
        Ok(artifact)
    }

    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes).await?;
        self.offset += bytes.len() as u64;
        Ok(())
    }
}
