//! In-memory collaborators shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crate::cache::{Clock, FeedCache};
use crate::probe::{ImageInfo, ImageProbe};
use crate::source::{Feed, FeedSource};

/// Replays scripted fetch results, then keeps returning the last success.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<Vec<Feed>>>>,
    last: Mutex<Vec<Feed>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<Vec<Feed>>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn repeating(feeds: Vec<Feed>) -> Self {
        Self::new(vec![Ok(feeds)])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FeedSource for ScriptedSource {
    fn fetch_all(&self) -> Result<Vec<Feed>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let mut last = self.last.lock().unwrap();
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(feeds)) => {
                *last = feeds.clone();
                Ok(feeds)
            }
            Some(Err(e)) => Err(e),
            None => Ok(last.clone()),
        }
    }
}

pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }
}

/// Answers every URL containing "broken" with an error and everything else
/// with a 600x600 JPEG.
#[derive(Default)]
pub struct FixedProbe {
    calls: AtomicUsize,
}

impl FixedProbe {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageProbe for FixedProbe {
    fn inspect(&self, url: &str) -> Result<ImageInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if url.contains("broken") {
            return Err(anyhow!("cannot decode {url}"));
        }
        Ok(ImageInfo {
            width: 600,
            height: 600,
            mime_type: "image/jpeg".to_string(),
        })
    }
}

/// A cache that never expires within a test, over a scripted source.
pub fn cache_over(source: &Arc<ScriptedSource>) -> Arc<FeedCache> {
    Arc::new(FeedCache::with_clock(
        source.clone(),
        Duration::from_secs(3600),
        Arc::new(ManualClock::new()),
    ))
}
