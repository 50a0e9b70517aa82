use std::{
    ffi::OsString,
    fs,
    io::{self, Write},
    path::Path,
    sync::OnceLock,
};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::error::{Error, Result};

/// Every progress bar is drawn through this so log output can hide them.
fn progress() -> &'static MultiProgress {
    static PROGRESS: OnceLock<MultiProgress> = OnceLock::new();
    PROGRESS.get_or_init(MultiProgress::new)
}

pub fn progress_bar(len: u64) -> ProgressBar {
    progress().add(
        ProgressBar::new(len).with_style(
            ProgressStyle::with_template("{percent}% {pos}/{len} ({eta_precise})")
                .expect("hardcoded"),
        ),
    )
}

/// Stderr that clears any progress bar while a log line is written and
/// redraws it afterwards.
pub struct ProgressStderr;

impl Write for ProgressStderr {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        progress().suspend(|| io::stderr().write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

/// Writes next to the destination first so a failed write never leaves a
/// truncated file behind.
pub fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let mut partial = OsString::from(path.as_os_str());
    partial.push(".partial");

    fs::write(&partial, contents).map_err(|e| Error::io(&partial, e))?;
    fs::rename(&partial, path).map_err(|e| Error::io(path, e))
}
