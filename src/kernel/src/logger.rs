//! Kernel logger.
//!
//! Implements the `log::Log` trait to route log messages to a serial console
//! registered at boot. Supports runtime log level filtering.

use core::fmt::{self, Write};

use log::{LevelFilter, Metadata, Record, SetLoggerError};
use rtx_hal::Serial;
use spin::{Mutex, Once};

/// Destination of formatted log lines.
pub trait LogSink: Sync {
    /// Writes one complete line.
    fn write_line(&self, args: fmt::Arguments<'_>);
}

struct SerialWriter<'a, S: Serial>(&'a mut S);

impl<S: Serial> Write for SerialWriter<'_, S> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.0.write_byte(byte);
        }
        Ok(())
    }
}

impl<S: Serial + Send> LogSink for Mutex<S> {
    fn write_line(&self, args: fmt::Arguments<'_>) {
        let mut serial = self.lock();
        // Serial writes cannot fail.
        let _ = SerialWriter(&mut *serial).write_fmt(format_args!("{}\r\n", args));
    }
}

static SINK: Once<&'static dyn LogSink> = Once::new();

static LOGGER: KernelLogger = KernelLogger;

struct KernelLogger;

impl log::Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Some(sink) = SINK.get() {
            sink.write_line(format_args!("[{}] {}", record.level(), record.args()));
        }
    }

    fn flush(&self) {}
}

/// Installs the kernel logger writing to `sink`.
///
/// Only the first call registers a sink; later calls fail like
/// [`log::set_logger`] does.
pub fn init(sink: &'static dyn LogSink, max_level: LevelFilter) -> Result<(), SetLoggerError> {
    SINK.call_once(|| sink);
    log::set_logger(&LOGGER)?;
    log::set_max_level(max_level);
    Ok(())
}

/// Changes the runtime log level.
pub fn set_level(level: LevelFilter) {
    log::set_max_level(level);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Capture(Vec<u8>);

    impl Serial for Capture {
        fn write_byte(&mut self, byte: u8) {
            self.0.push(byte);
        }

        fn read_byte(&mut self) -> Option<u8> {
            None
        }
    }

    static CAPTURE: Mutex<Capture> = Mutex::new(Capture(Vec::new()));
    static INSTALLED: Mutex<Capture> = Mutex::new(Capture(Vec::new()));

    #[test]
    fn test_lines_are_prefixed_with_level() {
        CAPTURE.write_line(format_args!("[{}] {}", log::Level::Warn, "heap low"));
        let text = String::from_utf8(core::mem::take(&mut CAPTURE.lock().0)).expect("utf8");
        assert_eq!(text, "[WARN] heap low\r\n");
    }

    #[test]
    fn test_second_init_fails() {
        // Another test may have installed the logger already.
        let _ = init(&INSTALLED, LevelFilter::Warn);
        assert!(init(&INSTALLED, LevelFilter::Warn).is_err());
        set_level(LevelFilter::Off);
    }
}
