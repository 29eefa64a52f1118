//! Stream transcripts.
//!
//! Every stream can be mirrored into a plain-text transcript of what came
//! over the wire, one timestamped entry per read. Diagnostics go through the
//! `log` facade; transcripts are for replaying a conversation byte for byte.

use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
    sync::{Arc, Mutex},
};

use chrono::{SecondsFormat, Utc};

/// Shared, append-only transcript file. `None` means transcripts are off.
pub type LogHandle = Arc<Mutex<Option<File>>>;

pub fn disabled() -> LogHandle {
    Arc::new(Mutex::new(None))
}

/// Entry timestamp, e.g. `2026-02-04T10:15:30.123Z`.
fn entry_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Append `[timestamp] DIRECTION: data` to the transcript.
///
/// Write failures are ignored.
pub fn log_line(handle: &LogHandle, direction: &str, data: &str) {
    let Ok(mut slot) = handle.lock() else {
        return;
    };
    let Some(file) = slot.as_mut() else {
        return;
    };

    let entry = format!(
        "[{}] {}: {}\n",
        entry_timestamp(),
        direction,
        data.trim_end_matches(['\r', '\n'])
    );
    let _ = file.write_all(entry.as_bytes()).and_then(|_| file.flush());
}

/// Open `{dir}/{stream_id}.log` for appending, creating `dir` if needed.
///
/// With no directory, or when the file cannot be opened, the handle is
/// disabled; a transcript problem never stops a stream.
pub fn open_log_file(dir: Option<&Path>, stream_id: &str) -> LogHandle {
    let Some(dir) = dir else {
        return disabled();
    };

    if let Err(err) = std::fs::create_dir_all(dir) {
        log::warn!("Cannot create transcript dir {}: {}", dir.display(), err);
        return disabled();
    }

    let path = dir.join(format!("{}.log", stream_id));
    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => {
            log::debug!("Writing transcript to {}", path.display());
            Arc::new(Mutex::new(Some(file)))
        }
        Err(err) => {
            log::warn!("Cannot open transcript {}: {}", path.display(), err);
            disabled()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn read(dir: &Path, stream_id: &str) -> String {
        std::fs::read_to_string(dir.join(format!("{}.log", stream_id))).unwrap()
    }

    #[test]
    fn timestamp_is_utc_with_millis() {
        let ts = entry_timestamp();
        assert_eq!(ts.len(), "2026-02-04T10:15:30.123Z".len());
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.as_bytes()[10], b'T');
        assert_eq!(ts.as_bytes()[19], b'.');
    }

    #[test]
    fn no_dir_means_disabled() {
        assert!(open_log_file(None, "s").lock().unwrap().is_none());
    }

    #[test]
    fn creates_nested_transcript_dir() {
        let root = tempdir().unwrap();
        let nested = root.path().join("transcripts").join("today");

        let handle = open_log_file(Some(&nested), "stream-1");

        assert!(handle.lock().unwrap().is_some());
        assert!(nested.join("stream-1.log").exists());
    }

    #[test]
    fn unopenable_path_is_disabled() {
        let root = tempdir().unwrap();
        // A directory where the file should go.
        std::fs::create_dir(root.path().join("taken.log")).unwrap();

        assert!(open_log_file(Some(root.path()), "taken")
            .lock()
            .unwrap()
            .is_none());
    }

    #[test]
    fn entries_are_one_per_line() {
        let root = tempdir().unwrap();
        let handle = open_log_file(Some(root.path()), "t");

        log_line(&handle, "SEND", "hello");
        log_line(&handle, "RECV", "data: {\"type\":\"delta\"}\r\n");
        log_line(&handle, "END", "");

        let contents = read(root.path(), "t");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] SEND: hello"));
        assert!(lines[1].ends_with("RECV: data: {\"type\":\"delta\"}"));
        assert!(lines[2].ends_with("END: "));
    }

    #[test]
    fn reopening_appends() {
        let root = tempdir().unwrap();
        log_line(&open_log_file(Some(root.path()), "s"), "SEND", "one");
        log_line(&open_log_file(Some(root.path()), "s"), "SEND", "two");

        assert_eq!(read(root.path(), "s").lines().count(), 2);
    }

    #[test]
    fn disabled_handle_ignores_writes() {
        log_line(&disabled(), "RECV", "ignored");
    }
}
