//! Leveled logging, routed through a dedicated writer thread.
use std::fmt::Display;
use std::sync::mpsc::{Sender, channel};
use std::thread::spawn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

/// A logging sink backed by a channel to one writer thread, so callers
/// from any of the adapter/event/dispatch threads never contend on a
/// shared file handle.
#[derive(Debug, Clone)]
pub struct Logger {
    sender: Sender<String>,
}

impl Logger {
    /// Writes timestamped lines to `path`, appending if it exists.
    pub fn to_file(path: &str) -> Logger {
        let (sender, receiver) = channel();
        let path = path.to_string();
        spawn(move || write_to_file(&path, receiver));
        Logger { sender }
    }

    /// A sink that discards everything; used by tests.
    pub fn null() -> Logger {
        let (sender, receiver) = channel::<String>();
        spawn(move || for _ in receiver {});
        Logger { sender }
    }

    pub fn log(&self, level: Level, module: &str, message: &str) {
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let line = format!("[{}] - {now} - {module}: {message}", level.tag());
        let _ = self.sender.send(line);
    }

    pub fn debug(&self, module: &str, message: &str) {
        self.log(Level::Debug, module, message);
    }

    pub fn info(&self, module: &str, message: &str) {
        self.log(Level::Info, module, message);
    }

    pub fn warn(&self, module: &str, message: &str) {
        self.log(Level::Warn, module, message);
    }

    pub fn error(&self, module: &str, message: &str) {
        self.log(Level::Error, module, message);
    }

    pub fn debug_with<T: Display>(&self, module: &str, message: &str, data: T) {
        self.log(Level::Debug, module, &format!("{message} - {data}"));
    }
}

fn write_to_file(path: &str, receiver: std::sync::mpsc::Receiver<String>) {
    use std::fs::OpenOptions;
    use std::io::Write;

    let file = OpenOptions::new().create(true).append(true).open(path);
    let mut file = match file {
        Ok(file) => file,
        Err(e) => {
            eprintln!("clusterlib: failed to open log file {path}: {e}");
            return;
        }
    };

    for line in receiver {
        if let Err(e) = writeln!(file, "{line}") {
            eprintln!("clusterlib: failed to write log line: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn writes_leveled_lines() {
        let path = "clusterlib_common_test_logger.log";
        let _ = std::fs::remove_file(path);
        let logger = Logger::to_file(path);

        logger.info("test", "hello");
        logger.error("test", "boom");
        sleep(Duration::from_millis(100));

        let file = std::fs::File::open(path).unwrap();
        let lines: Vec<String> = std::io::BufReader::new(file)
            .lines()
            .map_while(Result::ok)
            .collect();
        assert!(lines.iter().any(|l| l.contains("[INFO]") && l.contains("hello")));
        assert!(lines.iter().any(|l| l.contains("[ERROR]") && l.contains("boom")));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn null_sink_never_blocks() {
        let logger = Logger::null();
        for _ in 0..100 {
            logger.debug("test", "discarded");
        }
    }
}
