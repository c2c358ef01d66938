//! Identifier report output.
//!
//! One line of text per presence event: the uppercase hex UID on a change,
//! the literal `removed` on a removal.

use cardwatch_core::PresenceEvent;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::Result;

/// Writes presence events as report lines.
#[derive(Debug)]
pub struct LineReporter<W> {
    out: W,
    lines_written: u64,
}

impl<W: AsyncWrite + Unpin> LineReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            lines_written: 0,
        }
    }

    /// Write the report line for `event` and flush it.
    pub async fn report(&mut self, event: &PresenceEvent) -> Result<()> {
        let mut line = event.report_line();
        line.push('\n');
        self.out.write_all(line.as_bytes()).await?;
        self.out.flush().await?;
        self.lines_written += 1;
        Ok(())
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
