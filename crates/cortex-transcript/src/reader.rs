//! Resumable transcript reader.
//!
//! The transcript is append-only; the reader consumes complete lines from
//! a byte offset and reports the offset just past the last complete line.
//! A partial trailing line (the host mid-write) is left unread for the
//! next invocation, which makes extraction safely re-entrant.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use cortex_core::errors::{CortexResult, TranscriptError};
use tracing::debug;

use crate::entry::{parse_record, TranscriptEntry};

pub struct TranscriptReader {
    path: PathBuf,
    last_offset: u64,
}

impl TranscriptReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_offset: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte position immediately following the last complete line consumed
    /// by [`read_new`](Self::read_new). Persist this in hook-state to make
    /// the next extraction incremental.
    pub fn last_offset(&self) -> u64 {
        self.last_offset
    }

    /// Read all complete records from `from_offset` to the end of file.
    ///
    /// Malformed and metadata lines are consumed (their bytes count toward
    /// the new offset) but produce no entry. If the file shrank below the
    /// stored offset (rotation/truncation) the read restarts from zero.
    pub fn read_new(&mut self, from_offset: u64) -> CortexResult<Vec<TranscriptEntry>> {
        let file = File::open(&self.path).map_err(|_| TranscriptError::Missing {
            path: self.path.display().to_string(),
        })?;
        let file_len = file
            .metadata()
            .map_err(TranscriptError::from)?
            .len();

        let start = if from_offset > file_len { 0 } else { from_offset };
        let mut reader = BufReader::new(file);
        reader
            .seek(SeekFrom::Start(start))
            .map_err(TranscriptError::from)?;

        let mut offset = start;
        let mut entries = Vec::new();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let n = reader.read_until(b'\n', &mut buf).map_err(TranscriptError::from)?;
            if n == 0 {
                break;
            }
            if buf.last() != Some(&b'\n') {
                // Incomplete trailing line; pick it up next time.
                break;
            }
            offset += n as u64;

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(entry) = parse_record(line) {
                entries.push(entry);
            }
        }

        debug!(
            path = %self.path.display(),
            from = start,
            to = offset,
            entries = entries.len(),
            "read transcript records"
        );
        self.last_offset = offset;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn user_line(text: &str) -> String {
        serde_json::json!({
            "type": "user",
            "sessionId": "s",
            "message": {"role": "user", "content": text}
        })
        .to_string()
    }

    #[test]
    fn reads_complete_lines_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.jsonl");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "{}", user_line("one")).unwrap();
        // Partial line, no trailing newline.
        write!(f, "{}", &user_line("two")[..20]).unwrap();
        f.flush().unwrap();

        let mut reader = TranscriptReader::new(&path);
        let entries = reader.read_new(0).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text_content(), "one");

        // Offset stops before the partial line.
        let consumed = reader.last_offset();
        assert_eq!(consumed as usize, user_line("one").len() + 1);
    }

    #[test]
    fn resumes_from_stored_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.jsonl");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "{}", user_line("one")).unwrap();
        f.flush().unwrap();

        let mut reader = TranscriptReader::new(&path);
        let first = reader.read_new(0).unwrap();
        assert_eq!(first.len(), 1);
        let offset = reader.last_offset();

        // Append and resume: only the new line comes back.
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(f, "{}", user_line("two")).unwrap();
        f.flush().unwrap();

        let second = reader.read_new(offset).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].text_content(), "two");
    }

    #[test]
    fn malformed_lines_are_consumed_silently() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.jsonl");
        std::fs::write(
            &path,
            format!("{{broken\n{}\n{{\"type\":\"summary\"}}\n", user_line("ok")),
        )
        .unwrap();

        let mut reader = TranscriptReader::new(&path);
        let entries = reader.read_new(0).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text_content(), "ok");
        // The whole file was consumed despite the bad lines.
        assert_eq!(reader.last_offset(), path.metadata().unwrap().len());
    }

    #[test]
    fn offset_past_eof_restarts_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.jsonl");
        std::fs::write(&path, format!("{}\n", user_line("fresh"))).unwrap();

        let mut reader = TranscriptReader::new(&path);
        let entries = reader.read_new(1_000_000).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn missing_transcript_is_an_error() {
        let mut reader = TranscriptReader::new("/nonexistent/t.jsonl");
        assert!(reader.read_new(0).is_err());
    }

    #[test]
    fn empty_transcript_yields_no_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.jsonl");
        std::fs::write(&path, "").unwrap();

        let mut reader = TranscriptReader::new(&path);
        assert!(reader.read_new(0).unwrap().is_empty());
        assert_eq!(reader.last_offset(), 0);
    }
}
