use chrono::Local;
use ffdeck_runner::Config;
use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::Path,
    sync::{Arc, Mutex as StdMutex},
};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

/// Keeps the shared log file handle alive for the life of the process.
pub struct LogGuard {
    file: Option<Arc<StdMutex<File>>>,
}

struct MultiWriter {
    file: Option<Arc<StdMutex<File>>>,
}

/// `RUST_LOG` wins; otherwise the configured level (flag, `FFDECK_LOG_LEVEL`,
/// config file, `info`). Output goes to stderr so stdout stays parseable.
pub fn init(config: &Config) -> Option<LogGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let guard = match config.log_dir.as_deref().map(open_log_file).transpose() {
        Ok(file) => LogGuard {
            file: file.map(|file| Arc::new(StdMutex::new(file))),
        },
        Err(err) => {
            eprintln!("log_file_error: {err}");
            LogGuard { file: None }
        }
    };
    let file = guard.file.clone();
    let ansi = file.is_none();
    let make_writer = BoxMakeWriter::new(move || MultiWriter { file: file.clone() });
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .with_ansi(ansi)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return None;
    }
    Some(guard)
}

fn open_log_file(dir: &Path) -> io::Result<File> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("ffdeck-{}.log", Local::now().format("%Y-%m-%d")));
    OpenOptions::new().create(true).append(true).open(path)
}

impl Write for MultiWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _ = io::stderr().write_all(buf);
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.write_all(buf);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = io::stderr().flush();
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
        Ok(())
    }
}
