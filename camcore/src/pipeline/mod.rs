//! Per-device recording pipelines.
//!
//! Each device that sends frames gets one external transcoder fed through a
//! bounded sink. The manager worker is the only owner of the pipeline map;
//! transcoder processes report back to it by message.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate, Timelike};

pub mod manager;
pub mod transcoder;

pub use manager::{PipelineEvent, PipelineManager};

/// Source of wall-clock time for file naming and rollover.
pub trait Clock: Send + Sync + fmt::Debug + 'static {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// The hour a recording file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub date: NaiveDate,
    pub hour: u32,
}

impl Segment {
    pub fn at(t: DateTime<Local>) -> Self {
        Self {
            date: t.date_naive(),
            hour: t.hour(),
        }
    }

    /// `{device}/{YYYY-MM-DD}` below the recordings root.
    pub fn dir(&self, root: &Path, device_id: &str) -> PathBuf {
        root.join(sanitize_device_id(device_id))
            .join(self.date.format("%Y-%m-%d").to_string())
    }

    /// `{HH}.mp4`, or `{HH}-{n}.mp4` for the n-th extra file of the same hour.
    pub fn file_name(&self, n: u32) -> String {
        if n == 0 {
            format!("{:02}.mp4", self.hour)
        } else {
            format!("{:02}-{}.mp4", self.hour, n)
        }
    }
}

/// Keep ASCII letters, digits, `-` and `_`; everything else becomes `_`.
pub fn sanitize_device_id(device_id: &str) -> String {
    let s: String = device_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if s.is_empty() {
        "_".to_string()
    } else {
        s
    }
}
