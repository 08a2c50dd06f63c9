//! # Previously, on kwp...
//!
//! 🎬 The tests needed a clickstream. Not a 10GB one. Four lines, maybe five, typed
//! by hand into a TOML file or a `Vec<String>`, gone the moment the test ends.
//!
//! [`InMemorySource`] serves exactly those lines, in order, each with a `\n`
//! stuck on the end so it looks like it came off a disk. No I/O. No network.
//! No mortgage on the line. 🦆

use std::collections::VecDeque;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backends::{InputOrigin, Source};

/// 🔧 The lines, inline. `[source_config.InMemory] lines = ["...", "..."]`.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct InMemorySourceConfig {
    #[serde(default)]
    pub lines: Vec<String>,
}

/// 📦 A source with no origin story. Just a queue of strings.
#[derive(Debug, Default)]
pub(crate) struct InMemorySource {
    remaining: VecDeque<String>,
}

impl InMemorySource {
    pub(crate) fn new(config: InMemorySourceConfig) -> Self {
        Self {
            remaining: config.lines.into(),
        }
    }
}

#[async_trait]
impl Source for InMemorySource {
    async fn read_line(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        buf.clear();
        let Some(the_line) = self.remaining.pop_front() else {
            return Ok(0);
        };
        buf.extend_from_slice(the_line.as_bytes());
        buf.push(b'\n');
        Ok(buf.len())
    }

    fn origin(&self) -> InputOrigin {
        InputOrigin::InMemory
    }
}
