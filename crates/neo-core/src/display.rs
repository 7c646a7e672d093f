//! Display backends that do not draw pixels

use crate::pages::{DisplayPages, PageId};

/// Logs every page change instead of drawing it. Used on boards whose OLED
/// is driven by a separate renderer, and when running off-target.
#[derive(Debug, Default)]
pub struct LogDisplay {
    renders: u64,
}

impl LogDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pages rendered so far
    pub fn renders(&self) -> u64 {
        self.renders
    }
}

impl DisplayPages for LogDisplay {
    fn render(&mut self, page: PageId) -> neo_hal::Result<()> {
        self.renders += 1;
        tracing::info!("Display page: {:?}", page);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_display_counts_renders() {
        let mut display = LogDisplay::new();
        display.render(PageId::Main).unwrap();
        display.render(PageId::Blank).unwrap();
        assert_eq!(display.renders(), 2);
    }
}
