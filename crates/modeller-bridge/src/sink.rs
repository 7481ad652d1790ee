//! Destinations for text printed by engine tools.

/// Receives every `PrintMessage` the engine sends during a call.
///
/// Runs on the calling thread while the bridge lock is held, so it must
/// not call back into the bridge.
pub trait MessageSink: Send {
    fn print(&mut self, text: &str);
}

impl<F> MessageSink for F
where
    F: FnMut(&str) + Send,
{
    fn print(&mut self, text: &str) {
        self(text)
    }
}

/// Default sink: one `tracing` event per printed message.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MessageSink for TracingSink {
    fn print(&mut self, text: &str) {
        let text = text.trim_end_matches(['\r', '\n']);
        if !text.is_empty() {
            tracing::info!(target: "modeller::engine", "{}", text);
        }
    }
}
