//! Streaming reader for `zilstat`.
//!
//! `zilstat <interval>` prints a header line and then one line of ZIL
//! statistics per interval until it is killed. The reader owns the child,
//! parses each line on its own thread and exposes only the newest sample.

use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::collector::zfs::parser::ParseError;

/// Default location of the `zilstat` script.
pub const DEFAULT_ZILSTAT_PATH: &str = "/usr/local/bin/zilstat";

/// Number of whitespace-separated fields in a sample line.
const FIELD_COUNT: usize = 10;

/// One line of `zilstat` output.
///
/// Only `ops` is interpreted; the other columns are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZilstatSample {
    pub n_bytes: String,
    pub n_bytes_per_sec: String,
    pub n_max_rate: String,
    pub b_bytes: String,
    pub b_bytes_per_sec: String,
    pub b_max_rate: String,
    /// ZIL operations during the interval.
    pub ops: u64,
    pub lteq_4kb: String,
    pub from_4_to_32kb: String,
    pub gteq_4kb: String,
    /// When the line was read; `None` for the initial all-zero sample.
    pub received_at: Option<DateTime<Utc>>,
}

impl Default for ZilstatSample {
    fn default() -> Self {
        let zero = || "0".to_string();
        Self {
            n_bytes: zero(),
            n_bytes_per_sec: zero(),
            n_max_rate: zero(),
            b_bytes: zero(),
            b_bytes_per_sec: zero(),
            b_max_rate: zero(),
            ops: 0,
            lteq_4kb: zero(),
            from_4_to_32kb: zero(),
            gteq_4kb: zero(),
            received_at: None,
        }
    }
}

/// Parses one sample line: exactly ten whitespace-separated fields, the
/// seventh an integer operation count.
pub fn parse_zilstat_line(line: &str) -> Result<ZilstatSample, ParseError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() != FIELD_COUNT {
        return Err(ParseError::new(format!(
            "zilstat: expected {} fields, got {} in '{}'",
            FIELD_COUNT,
            parts.len(),
            line.trim()
        )));
    }

    let ops = parts[6]
        .parse()
        .map_err(|_| ParseError::new(format!("zilstat: invalid ops '{}'", parts[6])))?;

    Ok(ZilstatSample {
        n_bytes: parts[0].to_string(),
        n_bytes_per_sec: parts[1].to_string(),
        n_max_rate: parts[2].to_string(),
        b_bytes: parts[3].to_string(),
        b_bytes_per_sec: parts[4].to_string(),
        b_max_rate: parts[5].to_string(),
        ops,
        lteq_4kb: parts[7].to_string(),
        from_4_to_32kb: parts[8].to_string(),
        gteq_4kb: parts[9].to_string(),
        received_at: Some(Utc::now()),
    })
}

/// Why a read loop ended.
#[derive(Debug)]
pub enum StreamEnd {
    /// The stream reached EOF.
    Eof,
    /// A line could not be read.
    Io(io::Error),
    /// A line could not be parsed.
    Parse(ParseError),
}

/// Latest-sample cell shared between the reader thread and its readers.
type LatestSample = Arc<Mutex<Arc<ZilstatSample>>>;

/// Reads `reader` to the end, replacing `latest` with every parsed line.
///
/// The first line is a header and is discarded. Blank lines are skipped.
/// Returns the number of samples stored and why the loop ended; a parse
/// failure stops the loop and leaves the last good sample in place.
fn read_samples<R: BufRead>(reader: R, latest: &LatestSample) -> (u64, StreamEnd) {
    let mut lines = reader.lines();
    let mut stored = 0u64;

    match lines.next() {
        None => return (stored, StreamEnd::Eof),
        Some(Err(e)) => return (stored, StreamEnd::Io(e)),
        Some(Ok(header)) => debug!(header = header.trim(), "zilstat header skipped"),
    }

    for line in lines {
        let line = match line {
            Ok(l) => l,
            Err(e) => return (stored, StreamEnd::Io(e)),
        };
        if line.trim().is_empty() {
            continue;
        }

        let sample = match parse_zilstat_line(&line) {
            Ok(s) => s,
            Err(e) => return (stored, StreamEnd::Parse(e)),
        };

        *latest.lock().unwrap_or_else(|e| e.into_inner()) = Arc::new(sample);
        stored += 1;
    }

    (stored, StreamEnd::Eof)
}

/// The running `zilstat` process, if any. Emptied once it has been reaped.
type ChildSlot = Arc<Mutex<Option<Child>>>;

/// Sends SIGKILL to the child's whole process group.
///
/// `zilstat` is a script: the process producing output is a grandchild that
/// shares the stdout pipe, so killing only the direct child would leave the
/// pipe open.
#[cfg(unix)]
fn kill_group(child: &mut Child) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pgid = i32::try_from(child.id()).map_err(io::Error::other)?;
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(io::Error::from(e)),
    }
}

#[cfg(not(unix))]
fn kill_group(child: &mut Child) -> io::Result<()> {
    child.kill()
}

/// Kills and reaps the child in `slot`, if it is still there.
///
/// The group is signalled before `wait`, while the unreaped child still
/// pins its pid, so the signal cannot reach a recycled process group.
fn terminate(slot: &ChildSlot, interval: u32) {
    let mut guard = slot.lock().unwrap_or_else(|e| e.into_inner());
    let Some(mut child) = guard.take() else {
        return;
    };
    if let Err(e) = kill_group(&mut child) {
        warn!(interval, pid = child.id(), error = %e, "failed to kill zilstat");
    }
    match child.wait() {
        Ok(status) => debug!(interval, %status, "zilstat reaped"),
        Err(e) => warn!(interval, error = %e, "failed to reap zilstat"),
    }
}

/// Supervises one `zilstat` process and keeps its newest sample.
///
/// The process is not restarted when it exits; the last sample stays
/// available and the process is reaped as soon as its output ends.
pub struct ZilstatReader {
    interval: u32,
    latest: LatestSample,
    child: ChildSlot,
    handle: Option<JoinHandle<()>>,
}

impl ZilstatReader {
    /// Launches `program <interval>` and starts reading its output.
    pub fn spawn(program: &Path, interval: u32) -> io::Result<Self> {
        let mut command = Command::new(program);
        command
            .arg(interval.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command.spawn()?;
        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                terminate(&Arc::new(Mutex::new(Some(child))), interval);
                return Err(io::Error::other("zilstat stdout was not captured"));
            }
        };

        info!(program = %program.display(), interval, pid = child.id(), "zilstat started");

        Self::start(interval, BufReader::new(stdout), Some(child))
    }

    /// Starts reading samples from an already-open stream.
    pub fn from_reader<R: BufRead + Send + 'static>(interval: u32, reader: R) -> io::Result<Self> {
        Self::start(interval, reader, None)
    }

    fn start<R: BufRead + Send + 'static>(
        interval: u32,
        reader: R,
        child: Option<Child>,
    ) -> io::Result<Self> {
        let latest: LatestSample = Arc::new(Mutex::new(Arc::new(ZilstatSample::default())));
        let slot: ChildSlot = Arc::new(Mutex::new(child));
        let thread_latest = Arc::clone(&latest);
        let thread_slot = Arc::clone(&slot);

        let spawned = thread::Builder::new()
            .name(format!("zilstat-{}s", interval))
            .spawn(move || {
                let (stored, end) = read_samples(reader, &thread_latest);
                match end {
                    StreamEnd::Eof => {
                        info!(interval, samples = stored, "zilstat output ended, keeping last sample")
                    }
                    StreamEnd::Io(e) => {
                        error!(interval, samples = stored, error = %e, "zilstat read failed, reader stopped")
                    }
                    StreamEnd::Parse(e) => {
                        error!(interval, samples = stored, error = %e, "zilstat line rejected, reader stopped")
                    }
                }
                terminate(&thread_slot, interval);
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                terminate(&slot, interval);
                return Err(e);
            }
        };

        Ok(Self {
            interval,
            latest,
            child: slot,
            handle: Some(handle),
        })
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    /// The newest sample (all zero until the first line arrives).
    pub fn latest(&self) -> Arc<ZilstatSample> {
        Arc::clone(&self.latest.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Operation count of the newest sample.
    pub fn ops(&self) -> u64 {
        self.latest().ops
    }

    /// Whether the reader thread is still consuming output.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Pid of the `zilstat` process while it has not been reaped.
    pub fn pid(&self) -> Option<u32> {
        self.child
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(Child::id)
    }

    /// Kills the process group (if any) and waits for the reader thread.
    /// Idempotent.
    ///
    /// For a reader built with [`ZilstatReader::from_reader`] this waits for
    /// the stream to end.
    pub fn stop(&mut self) {
        terminate(&self.child, self.interval);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!(interval = self.interval, "zilstat reader thread panicked");
        }
    }
}

impl Drop for ZilstatReader {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The three readers behind `zfsZilstatOps{1,5,10}sec`.
///
/// A slot is `None` when its reader could not be started; it then
/// publishes zero.
pub struct ZilstatReaders {
    pub one_sec: Option<ZilstatReader>,
    pub five_sec: Option<ZilstatReader>,
    pub ten_sec: Option<ZilstatReader>,
}

impl ZilstatReaders {
    /// No readers; every ops value reads as zero.
    pub fn disabled() -> Self {
        Self {
            one_sec: None,
            five_sec: None,
            ten_sec: None,
        }
    }

    /// Spawns `program 1`, `program 5` and `program 10`.
    ///
    /// A reader that fails to start is logged and left empty.
    pub fn spawn(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        let start = |interval: u32| match ZilstatReader::spawn(&program, interval) {
            Ok(reader) => Some(reader),
            Err(e) => {
                warn!(
                    program = %program.display(),
                    interval,
                    error = %e,
                    "failed to start zilstat, publishing zero"
                );
                None
            }
        };

        Self {
            one_sec: start(1),
            five_sec: start(5),
            ten_sec: start(10),
        }
    }

    /// Current `(1s, 5s, 10s)` operation counts.
    pub fn ops(&self) -> (u64, u64, u64) {
        let ops = |r: &Option<ZilstatReader>| r.as_ref().map_or(0, ZilstatReader::ops);
        (ops(&self.one_sec), ops(&self.five_sec), ops(&self.ten_sec))
    }

    pub fn stop(&mut self) {
        for reader in [&mut self.one_sec, &mut self.five_sec, &mut self.ten_sec]
            .into_iter()
            .flatten()
        {
            reader.stop();
        }
    }
}
