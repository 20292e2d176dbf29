use crossterm::{
    cursor::MoveToPreviousLine,
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use std::io;

/// In-place progress display for a crawl run. One status line per target,
/// rewritten as pages complete, plus a green summary when the target is
/// done.
pub struct CrawlTui {
    target_line_printed: bool,
    targets_done: usize,
    listings_total: usize,
}

impl CrawlTui {
    pub fn new() -> Self {
        Self {
            target_line_printed: false,
            targets_done: 0,
            listings_total: 0,
        }
    }

    pub fn start_target(&mut self, base_url: &str, max_pages: usize) -> io::Result<()> {
        execute!(
            io::stdout(),
            SetForegroundColor(Color::White),
            Print(format!(
                "⏳ Crawling {} (0/{} pages)...\n",
                shorten(base_url),
                max_pages
            )),
            ResetColor
        )?;
        self.target_line_printed = true;
        Ok(())
    }

    pub fn page_done(
        &mut self,
        page: usize,
        max_pages: usize,
        listings_so_far: usize,
    ) -> io::Result<()> {
        if !self.target_line_printed {
            return Ok(());
        }
        execute!(
            io::stdout(),
            MoveToPreviousLine(1),
            Clear(ClearType::CurrentLine),
            SetForegroundColor(Color::Blue),
            Print(format!(
                "📥 Page {}/{} - {} listings gathered\n",
                page, max_pages, listings_so_far
            )),
            ResetColor
        )
    }

    pub fn finish_target(&mut self, pages: usize, listings: usize) -> io::Result<()> {
        self.targets_done += 1;
        self.listings_total += listings;
        if self.target_line_printed {
            execute!(
                io::stdout(),
                MoveToPreviousLine(1),
                Clear(ClearType::CurrentLine),
            )?;
            self.target_line_printed = false;
        }
        execute!(
            io::stdout(),
            SetForegroundColor(Color::Green),
            Print(format!(
                "✅ Target done: {} listings from {} page{}\n",
                listings,
                pages,
                if pages == 1 { "" } else { "s" }
            )),
            ResetColor
        )
    }

    pub fn summary(&self) -> io::Result<()> {
        execute!(
            io::stdout(),
            SetForegroundColor(Color::Green),
            Print(format!(
                "✅ Crawl complete: {} listings across {} target{}\n",
                self.listings_total,
                self.targets_done,
                if self.targets_done == 1 { "" } else { "s" }
            )),
            ResetColor
        )
    }
}

impl Default for CrawlTui {
    fn default() -> Self {
        Self::new()
    }
}

fn shorten(url: &str) -> String {
    if url.chars().count() > 60 {
        let cut: String = url.chars().take(57).collect();
        format!("{}...", cut)
    } else {
        url.to_string()
    }
}
