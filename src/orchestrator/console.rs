use std::io::Write;

use tracing::{debug, info};

use super::outcome::OutcomeNotification;
use super::present::{Clipboard, Present, TextBuffers};

/// Presenter for terminal hosts: notifications go to stderr, texts are printed on demand.
#[derive(Debug, Clone, Default)]
pub struct ConsolePresenter;

impl ConsolePresenter {
    pub fn print_texts(texts: &TextBuffers) {
        println!("extracted:\n{}", texts.extracted);
        println!("translated:\n{}", texts.translated);
    }
}

impl Present for ConsolePresenter {
    fn show_texts(&self, texts: &TextBuffers) {
        debug!(
            "texts updated (extracted: {} chars, translated: {} chars)",
            texts.extracted.chars().count(),
            texts.translated.chars().count()
        );
    }

    fn notify(&self, notification: &OutcomeNotification) {
        eprintln!(
            "[{}] {}",
            notification.severity.as_str(),
            notification.message
        );
    }

    fn reveal_window(&self) {
        info!("window reveal requested");
    }

    fn set_busy(&self, busy: bool) {
        if busy {
            eprintln!("working...");
        }
    }
}

/// Terminal stand-in for a clipboard: writes the text to stdout.
#[derive(Debug, Clone, Default)]
pub struct StdoutClipboard;

impl Clipboard for StdoutClipboard {
    fn write_text(&self, text: &str) -> anyhow::Result<()> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", text)?;
        stdout.flush()?;
        Ok(())
    }
}
