use crate::util::fifo::Fifo;
use core::fmt::{self, Write};
use log::{Level, LevelFilter, Record, SetLoggerError};
use spin::Mutex;

const LOG_RING_SIZE: usize = 4096;

static LOG_RING: Mutex<Fifo<u8, LOG_RING_SIZE>> = Mutex::new(Fifo::new(0));
static LOGGER: SimpleLogger = SimpleLogger;

pub fn init() -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER).map(|()| log::set_max_level(LevelFilter::Info))
}

/// Moves buffered log bytes into `buf`; the console collaborator calls this
/// to render them. Returns the number of bytes moved.
pub fn drain(buf: &mut [u8]) -> usize {
    LOG_RING.lock().drain_into(buf)
}

struct RingWriter<'a> {
    ring: &'a mut Fifo<u8, LOG_RING_SIZE>,
}

impl Write for RingWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            // oldest records give way when the console falls behind
            if self.ring.enqueue(byte).is_err() {
                let _ = self.ring.dequeue();
                let _ = self.ring.enqueue(byte);
            }
        }
        Ok(())
    }
}

struct SimpleLogger;

impl log::Log for SimpleLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut ring = LOG_RING.lock();
        let mut writer = RingWriter { ring: &mut ring };

        if record.level() == Level::Error || record.level() == Level::Debug {
            let _ = write!(writer, "[{}]: ", record.level());
        } else {
            let _ = write!(writer, "[ {}]: ", record.level());
        }

        if record.level() == Level::Error {
            let _ = write!(
                writer,
                "{}@{}: ",
                record.file().unwrap_or("Unknown"),
                record.line().unwrap_or(0)
            );
        }

        let _ = write!(writer, "{:?}\n", record.args());
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_formatted_records() {
        let _guard = crate::test::lock();
        let _ = init();
        LOG_RING.lock().reset();

        log::info!("logger: Buffered a record");

        let mut buf = [0; 256];
        let n = drain(&mut buf);
        let text = core::str::from_utf8(&buf[..n]).unwrap();
        assert!(text.contains("[ INFO]"));
        assert!(text.contains("logger: Buffered a record"));
    }
}
