use std::io;

use tracing::{Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;

/// Routes each formatted line to the browser console method for its level.
#[derive(Clone, Copy, Default)]
pub struct ConsoleMakeWriter;

pub struct ConsoleWriter {
    level: Level,
    buf: Vec<u8>,
}

impl io::Write for ConsoleWriter {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&self.buf);
        let line = line.trim_end();
        console_line(self.level, line);
        self.buf.clear();
        Ok(())
    }
}

impl Drop for ConsoleWriter {
    fn drop(&mut self) {
        let _ = io::Write::flush(self);
    }
}

impl<'a> MakeWriter<'a> for ConsoleMakeWriter {
    type Writer = ConsoleWriter;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleWriter {
            level: Level::INFO,
            buf: Vec::new(),
        }
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        ConsoleWriter {
            level: *meta.level(),
            buf: Vec::new(),
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn console_line(level: Level, line: &str) {
    let line = wasm_bindgen::JsValue::from_str(line);
    match level {
        Level::ERROR => web_sys::console::error_1(&line),
        Level::WARN => web_sys::console::warn_1(&line),
        Level::INFO => web_sys::console::info_1(&line),
        _ => web_sys::console::debug_1(&line),
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn console_line(level: Level, line: &str) {
    eprintln!("{level} {line}");
}

/// Install the global subscriber. Safe to call more than once.
pub fn init() {
    let max_level = if cfg!(debug_assertions) {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let _ = tracing_subscriber::fmt()
        .with_writer(ConsoleMakeWriter)
        .with_max_level(max_level)
        .with_ansi(false)
        .without_time()
        .try_init();
}
