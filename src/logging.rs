//! Run log sinks
//!
//! A [`RunLog`] appends timestamped lines to a log file and forwards each
//! record once to the `log` facade (console output is configured by
//! `env_logger` in the binary). Child sinks, created per fold, write to their
//! own file and to every ancestor's file, so the top-level `log.log` holds the
//! complete history of a run while each `<k>-fold/log.log` holds only its
//! fold. Sinks are passed explicitly to the components that log; there is no
//! global logger state beyond the console facade.

use std::fs::{self, File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::Level;

use crate::error::Result;

struct Sink {
    scope: String,
    path: Option<PathBuf>,
    file: Option<Mutex<LineWriter<File>>>,
    parent: Option<RunLog>,
}

/// Cloneable handle to a log sink
#[derive(Clone)]
pub struct RunLog {
    sink: Arc<Sink>,
}

impl RunLog {
    /// Open (append) a log file for the given scope
    pub fn create(path: impl AsRef<Path>, scope: impl Into<String>) -> Result<Self> {
        Self::open(path.as_ref(), scope.into(), None)
    }

    /// Sink that only forwards to the console facade
    pub fn console(scope: impl Into<String>) -> Self {
        Self {
            sink: Arc::new(Sink {
                scope: scope.into(),
                path: None,
                file: None,
                parent: None,
            }),
        }
    }

    /// Child sink writing to its own file and to all ancestors
    pub fn child(&self, path: impl AsRef<Path>, scope: impl Into<String>) -> Result<Self> {
        Self::open(path.as_ref(), scope.into(), Some(self.clone()))
    }

    fn open(path: &Path, scope: String, parent: Option<RunLog>) -> Result<Self> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            sink: Arc::new(Sink {
                scope,
                path: Some(path.to_path_buf()),
                file: Some(Mutex::new(LineWriter::new(file))),
                parent,
            }),
        })
    }

    /// Scope label of this sink
    pub fn scope(&self) -> &str {
        &self.sink.scope
    }

    /// File backing this sink, if any
    pub fn path(&self) -> Option<&Path> {
        self.sink.path.as_deref()
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        self.record(Level::Info, msg.as_ref());
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        self.record(Level::Warn, msg.as_ref());
    }

    pub fn error(&self, msg: impl AsRef<str>) {
        self.record(Level::Error, msg.as_ref());
    }

    pub fn debug(&self, msg: impl AsRef<str>) {
        self.record(Level::Debug, msg.as_ref());
    }

    fn record(&self, level: Level, msg: &str) {
        log::log!(target: "foldwise", level, "[{}] {}", self.sink.scope, msg);

        // Debug records stay on the console
        if level == Level::Debug {
            return;
        }
        let line = format!(
            "{} {:<5} [{}] {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            level,
            self.sink.scope,
            msg
        );
        self.write_line(&line);
    }

    fn write_line(&self, line: &str) {
        if let Some(file) = &self.sink.file {
            if let Ok(mut w) = file.lock() {
                // A failing log write must not abort training
                let _ = writeln!(w, "{line}");
            }
        }
        if let Some(parent) = &self.sink.parent {
            parent.write_line(line);
        }
    }
}

impl std::fmt::Debug for RunLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLog")
            .field("scope", &self.sink.scope)
            .field("path", &self.sink.path)
            .finish()
    }
}
