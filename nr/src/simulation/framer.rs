//! Sentinel-delimited stage framer
//!
//! The simulation stream interleaves free text with blocks of the form
//! `NEURA_TICK_START{json}NEURA_TICK_END`. The framer consumes chunks as they
//! arrive and yields each complete block, independent of the transport.

use tracing::{debug, warn};

use crate::domain::SimulationStageData;

pub const START: &str = "NEURA_TICK_START";
pub const END: &str = "NEURA_TICK_END";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    /// Looking for `START`; the buffer holds at most a partial sentinel
    SeekStart,
    /// Inside a block; the body begins at `buffer[body_start..]`
    SeekEnd { body_start: usize },
}

#[derive(Debug)]
pub struct StageFramer {
    buffer: String,
    scan: Scan,
    dropped: usize,
}

impl Default for StageFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl StageFramer {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            scan: Scan::SeekStart,
            dropped: 0,
        }
    }

    /// Blocks dropped because their body did not parse
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// True while a started block awaits its end sentinel
    pub fn in_block(&self) -> bool {
        matches!(self.scan, Scan::SeekEnd { .. })
    }

    /// Feed one chunk, returning every block it completes in source order
    pub fn push(&mut self, chunk: &str) -> Vec<SimulationStageData> {
        debug!(chunk_len = chunk.len(), "StageFramer::push: called");
        self.buffer.push_str(chunk);
        let mut stages = Vec::new();

        loop {
            match self.scan {
                Scan::SeekStart => match self.buffer.find(START) {
                    Some(at) => {
                        self.buffer.drain(..at);
                        self.scan = Scan::SeekEnd {
                            body_start: START.len(),
                        };
                    }
                    None => {
                        let keep = partial_suffix(&self.buffer, START);
                        let cut = self.buffer.len() - keep;
                        self.buffer.drain(..cut);
                        break;
                    }
                },
                Scan::SeekEnd { body_start } => match self.buffer[body_start..].find(END) {
                    Some(offset) => {
                        let end = body_start + offset;
                        let body = &self.buffer[body_start..end];
                        match SimulationStageData::parse(body) {
                            Ok(stage) => {
                                debug!(phase = %stage.phase(), "StageFramer::push: framed stage");
                                stages.push(stage);
                            }
                            Err(e) => {
                                warn!(error = %e, "Dropping malformed simulation block");
                                self.dropped += 1;
                            }
                        }
                        self.buffer.drain(..end + END.len());
                        self.scan = Scan::SeekStart;
                    }
                    None => break,
                },
            }
        }

        stages
    }

    /// End of stream; discards an unterminated block
    pub fn finish(&mut self) {
        debug!(in_block = self.in_block(), "StageFramer::finish: called");
        if self.in_block() {
            warn!(pending = self.buffer.len(), "Simulation stream ended inside a block");
        }
        self.buffer.clear();
        self.scan = Scan::SeekStart;
    }
}

/// Length of the longest suffix of `text` that is a proper prefix of `sentinel`
fn partial_suffix(text: &str, sentinel: &str) -> usize {
    (1..sentinel.len().min(text.len() + 1))
        .rev()
        .find(|&n| text.is_char_boundary(text.len() - n) && text.ends_with(&sentinel[..n]))
        .unwrap_or(0)
}
