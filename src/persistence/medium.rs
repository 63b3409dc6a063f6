use crate::telemetry::logging;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const LOG_FILE_NAME: &str = "reservations.log";

/// Where the reservation log lives. Appends must be on stable storage when
/// `append_lines` returns `Ok`.
pub trait LogMedium: Send {
    /// Every line currently stored, oldest first. Invalid UTF-8 is decoded
    /// lossy so that the store can skip it as corrupt.
    fn read_lines(&mut self) -> Result<Vec<String>, String>;

    fn append_lines(&mut self, lines: &[String]) -> Result<(), String>;

    /// Atomically replaces the whole log.
    fn rewrite(&mut self, lines: &[String]) -> Result<(), String>;

    fn location(&self) -> PathBuf;
}

#[derive(Debug)]
pub struct FileLog {
    path: PathBuf,
    file: File,
    /// Set when a failed append could not be cut back off the file. Appends
    /// stay refused until the log is reopened and replayed.
    poisoned: Option<String>,
    #[cfg(test)]
    fault: Option<WriteFault>,
}

/// Simulated device failures for the write path.
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub(crate) enum WriteFault {
    /// The next write stores only this many bytes, then errors.
    ShortWrite(usize),
    /// As `ShortWrite`, and cutting the partial bytes off fails too.
    ShortWriteStuck(usize),
}

impl FileLog {
    pub fn open(storage_dir: &Path) -> Result<Self, String> {
        fs::create_dir_all(storage_dir).map_err(|err| {
            format!(
                "reservation dir create failed for {}: {}",
                storage_dir.display(),
                err
            )
        })?;
        let path = storage_dir.join(LOG_FILE_NAME);
        let file = open_append(&path)?;
        Ok(FileLog {
            path,
            file,
            poisoned: None,
            #[cfg(test)]
            fault: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    #[cfg(test)]
    pub(crate) fn inject_fault(&mut self, fault: WriteFault) {
        self.fault = Some(fault);
    }

    fn current_len(&self) -> Result<u64, String> {
        self.file
            .metadata()
            .map(|meta| meta.len())
            .map_err(|err| format!("reservation log stat failed for {}: {}", self.path.display(), err))
    }

    // A crash or a foreign writer can leave a final line without its
    // newline; the next record must not glue onto it.
    fn ends_torn(&self, len: u64) -> Result<bool, String> {
        if len == 0 {
            return Ok(false);
        }
        let mut reader = File::open(&self.path)
            .map_err(|err| format!("reservation log open failed for {}: {}", self.path.display(), err))?;
        reader
            .seek(SeekFrom::Start(len - 1))
            .map_err(|err| format!("reservation log seek failed for {}: {}", self.path.display(), err))?;
        let mut last = [0u8; 1];
        reader
            .read_exact(&mut last)
            .map_err(|err| format!("reservation log read failed for {}: {}", self.path.display(), err))?;
        Ok(last[0] != b'\n')
    }

    fn write_synced(&mut self, bytes: &[u8]) -> Result<(), String> {
        if let Some(err) = self.injected_write_error(bytes) {
            return Err(err);
        }
        self.file
            .write_all(bytes)
            .map_err(|err| format!("reservation log write failed for {}: {}", self.path.display(), err))?;
        self.file
            .sync_data()
            .map_err(|err| format!("reservation log sync failed for {}: {}", self.path.display(), err))
    }

    /// Cuts the file back to `len` after a failed append, so neither a
    /// fragment nor a record the caller was told had failed survives.
    fn truncate_to(&mut self, len: u64) -> Result<(), String> {
        if self.injected_truncate_error() {
            return Err("truncate refused by device".to_string());
        }
        self.file
            .set_len(len)
            .and_then(|_| self.file.sync_data())
            .map_err(|err| err.to_string())
    }

    #[cfg(test)]
    fn injected_write_error(&mut self, bytes: &[u8]) -> Option<String> {
        let keep = match self.fault? {
            WriteFault::ShortWrite(keep) | WriteFault::ShortWriteStuck(keep) => keep.min(bytes.len()),
        };
        let _ = self.file.write_all(&bytes[..keep]);
        Some(format!(
            "reservation log write failed for {}: device error after {} bytes",
            self.path.display(),
            keep
        ))
    }

    // The fault is spent once the failed append has tried to cut back.
    #[cfg(test)]
    fn injected_truncate_error(&mut self) -> bool {
        matches!(self.fault.take(), Some(WriteFault::ShortWriteStuck(_)))
    }

    #[cfg(not(test))]
    fn injected_write_error(&mut self, _bytes: &[u8]) -> Option<String> {
        None
    }

    #[cfg(not(test))]
    fn injected_truncate_error(&mut self) -> bool {
        false
    }
}

impl LogMedium for FileLog {
    fn read_lines(&mut self) -> Result<Vec<String>, String> {
        read_log_file(&self.path)
    }

    fn append_lines(&mut self, lines: &[String]) -> Result<(), String> {
        if let Some(reason) = &self.poisoned {
            return Err(format!(
                "reservation log {} is unusable until reopened: {}",
                self.path.display(),
                reason
            ));
        }
        let len = self.current_len()?;
        let mut buffer = String::new();
        if self.ends_torn(len)? {
            buffer.push('\n');
        }
        for line in lines {
            buffer.push_str(line);
            buffer.push('\n');
        }
        let Err(err) = self.write_synced(buffer.as_bytes()) else {
            return Ok(());
        };
        if let Err(cut_err) = self.truncate_to(len) {
            let reason = format!("cutting back to {} bytes failed: {}", len, cut_err);
            logging::log_error(&format!("{}: {}", self.path.display(), reason));
            self.poisoned = Some(reason);
        }
        Err(err)
    }

    fn rewrite(&mut self, lines: &[String]) -> Result<(), String> {
        let tmp_path = self.path.with_extension("log.tmp");
        {
            let mut tmp = File::create(&tmp_path).map_err(|err| {
                format!("reservation snapshot create failed for {}: {}", tmp_path.display(), err)
            })?;
            for line in lines {
                writeln!(tmp, "{}", line).map_err(|err| {
                    format!("reservation snapshot write failed for {}: {}", tmp_path.display(), err)
                })?;
            }
            tmp.sync_all().map_err(|err| {
                format!("reservation snapshot sync failed for {}: {}", tmp_path.display(), err)
            })?;
        }
        fs::rename(&tmp_path, &self.path).map_err(|err| {
            format!(
                "reservation snapshot rename failed for {}: {}",
                self.path.display(),
                err
            )
        })?;
        if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            sync_dir(dir)?;
        }
        self.file = open_append(&self.path)?;
        self.poisoned = None;
        Ok(())
    }

    fn location(&self) -> PathBuf {
        self.path.clone()
    }
}

/// Reads a log file without opening it for writing. A missing file is an
/// empty log.
pub fn read_log_file(path: &Path) -> Result<Vec<String>, String> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(format!(
                "reservation log read failed for {}: {}",
                path.display(),
                err
            ))
        }
    };
    let content = String::from_utf8_lossy(&bytes);
    Ok(content.lines().map(str::to_string).collect())
}

// The rename is only durable once the directory entry is.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), String> {
    File::open(dir)
        .and_then(|handle| handle.sync_all())
        .map_err(|err| format!("reservation dir sync failed for {}: {}", dir.display(), err))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<(), String> {
    Ok(())
}

fn open_append(path: &Path) -> Result<File, String> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| format!("reservation log open failed for {}: {}", path.display(), err))
}

/// In-process log. Clones share the same lines, so a test can keep a handle,
/// drop the allocator, and reload from what was "written".
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    inner: Arc<Mutex<MemoryLogState>>,
}

#[derive(Debug, Default)]
struct MemoryLogState {
    lines: Vec<String>,
    fail_appends: bool,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lines(lines: &[&str]) -> Self {
        Self::from_lines(lines.iter().map(|line| line.to_string()).collect())
    }

    pub fn from_lines(lines: Vec<String>) -> Self {
        let log = Self::new();
        if let Ok(mut state) = log.inner.lock() {
            state.lines = lines;
        }
        log
    }

    /// Makes every following append fail until turned off again.
    pub fn set_fail_appends(&self, fail: bool) {
        if let Ok(mut state) = self.inner.lock() {
            state.fail_appends = fail;
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.inner
            .lock()
            .map(|state| state.lines.clone())
            .unwrap_or_default()
    }
}

impl LogMedium for MemoryLog {
    fn read_lines(&mut self) -> Result<Vec<String>, String> {
        Ok(self.lines())
    }

    fn append_lines(&mut self, lines: &[String]) -> Result<(), String> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| "memory log lock poisoned".to_string())?;
        if state.fail_appends {
            return Err("memory log append refused".to_string());
        }
        state.lines.extend(lines.iter().cloned());
        Ok(())
    }

    fn rewrite(&mut self, lines: &[String]) -> Result<(), String> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| "memory log lock poisoned".to_string())?;
        if state.fail_appends {
            return Err("memory log rewrite refused".to_string());
        }
        state.lines = lines.to_vec();
        Ok(())
    }

    fn location(&self) -> PathBuf {
        PathBuf::from("<memory>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(label: &str) -> PathBuf {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        std::env::temp_dir().join(format!("skyplot-medium-{}-{}", label, suffix))
    }

    #[test]
    fn file_log_appends_and_reads_back() {
        let dir = temp_dir("append");
        let mut log = FileLog::open(&dir).expect("open");
        log.append_lines(&["a".to_string(), "b".to_string()]).expect("append");
        log.append_lines(&["c".to_string()]).expect("append");
        assert_eq!(log.read_lines().expect("read"), vec!["a", "b", "c"]);

        let mut reopened = FileLog::open(&dir).expect("reopen");
        assert_eq!(reopened.read_lines().expect("read"), vec!["a", "b", "c"]);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn file_log_terminates_torn_tail_before_appending() {
        let dir = temp_dir("torn");
        fs::create_dir_all(&dir).expect("dir");
        let path = dir.join(LOG_FILE_NAME);
        fs::write(&path, "first\nhalf-writ").expect("seed");
        let mut log = FileLog::open(&dir).expect("open");
        assert_eq!(fs::read(&path).expect("raw"), b"first\nhalf-writ");
        log.append_lines(&["next".to_string()]).expect("append");
        assert_eq!(
            log.read_lines().expect("read"),
            vec!["first", "half-writ", "next"]
        );
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn file_log_terminates_fragment_left_while_open() {
        let dir = temp_dir("fragment");
        let mut log = FileLog::open(&dir).expect("open");
        log.append_lines(&["1;10;0;ORPHAN;".to_string()]).expect("append");
        let mut other = OpenOptions::new()
            .append(true)
            .open(log.path())
            .expect("second handle");
        other.write_all(b"2;10;0;ASSI").expect("fragment");
        drop(other);

        log.append_lines(&["3;10;0;ASSIGN;carol".to_string()]).expect("append");
        assert_eq!(
            log.read_lines().expect("read"),
            vec!["1;10;0;ORPHAN;", "2;10;0;ASSI", "3;10;0;ASSIGN;carol"]
        );
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn file_log_cuts_back_a_short_write() {
        let dir = temp_dir("short");
        let mut log = FileLog::open(&dir).expect("open");
        log.append_lines(&["a".to_string(), "b".to_string()]).expect("append");

        log.inject_fault(WriteFault::ShortWrite(7));
        let err = log
            .append_lines(&["3;10;0;ASSIGN;carol".to_string(), "3;10;0;CURSOR_ADVANCE;".to_string()])
            .unwrap_err();
        assert!(err.contains("device error"));
        assert!(!log.is_poisoned());
        assert_eq!(fs::read(log.path()).expect("raw"), b"a\nb\n");

        log.append_lines(&["c".to_string()]).expect("retry");
        assert_eq!(log.read_lines().expect("read"), vec!["a", "b", "c"]);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn file_log_refuses_appends_until_reopened_when_cut_back_fails() {
        let dir = temp_dir("stuck");
        let mut log = FileLog::open(&dir).expect("open");
        log.append_lines(&["a".to_string()]).expect("append");

        log.inject_fault(WriteFault::ShortWriteStuck(4));
        assert!(log.append_lines(&["1;10;0;ASSIGN;x".to_string()]).is_err());
        assert!(log.is_poisoned());
        let err = log.append_lines(&["b".to_string()]).unwrap_err();
        assert!(err.contains("unusable until reopened"));
        assert_eq!(log.read_lines().expect("read"), vec!["a", "1;10"]);

        let mut reopened = FileLog::open(&dir).expect("reopen");
        assert!(!reopened.is_poisoned());
        reopened.append_lines(&["b".to_string()]).expect("append");
        assert_eq!(reopened.read_lines().expect("read"), vec!["a", "1;10", "b"]);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn read_log_file_never_creates_anything() {
        let dir = temp_dir("readonly");
        assert!(read_log_file(&dir.join(LOG_FILE_NAME)).expect("read").is_empty());
        assert!(!dir.exists());

        fs::create_dir_all(&dir).expect("dir");
        let path = dir.join(LOG_FILE_NAME);
        fs::write(&path, "1;10;0;ASSIGN;a\n2;10;0;CURS").expect("seed");
        assert_eq!(
            read_log_file(&path).expect("read"),
            vec!["1;10;0;ASSIGN;a", "2;10;0;CURS"]
        );
        assert_eq!(fs::read(&path).expect("raw"), b"1;10;0;ASSIGN;a\n2;10;0;CURS");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn file_log_rewrite_replaces_content() {
        let dir = temp_dir("rewrite");
        let mut log = FileLog::open(&dir).expect("open");
        log.append_lines(&["old".to_string(), "older".to_string()]).expect("append");
        log.rewrite(&["fresh".to_string()]).expect("rewrite");
        log.append_lines(&["after".to_string()]).expect("append");
        assert_eq!(log.read_lines().expect("read"), vec!["fresh", "after"]);
        assert!(!dir.join("reservations.log.tmp").exists());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn memory_log_failure_leaves_lines_untouched() {
        let mut log = MemoryLog::with_lines(&["kept"]);
        log.set_fail_appends(true);
        assert!(log.append_lines(&["lost".to_string()]).is_err());
        log.set_fail_appends(false);
        log.append_lines(&["added".to_string()]).expect("append");
        assert_eq!(log.lines(), vec!["kept", "added"]);
    }
}
