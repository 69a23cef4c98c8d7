use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

/// Destination of `PrintToConsole` output.
pub trait OutputSink: Send + Sync {
    fn write(&self, message: &str) -> io::Result<()>;
}

/// Writes one line per message to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn write(&self, message: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", message)?;
        out.flush()
    }
}

/// Collects messages in memory.
#[derive(Debug, Default)]
pub struct BufferedSink {
    messages: Mutex<Vec<String>>,
}

impl BufferedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.messages.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl OutputSink for BufferedSink {
    fn write(&self, message: &str) -> io::Result<()> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffered_sink_keeps_messages_in_order() {
        let sink = BufferedSink::new();
        sink.write("one").expect("write");
        sink.write("two").expect("write");
        assert_eq!(sink.messages(), vec!["one", "two"]);
        assert_eq!(sink.take().len(), 2);
        assert!(sink.messages().is_empty());
    }
}
