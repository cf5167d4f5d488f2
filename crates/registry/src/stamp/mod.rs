//! Change detection for watched manifest files.
//!
//! # Role
//!
//! A [`StampedFile`] answers "has this file changed since I last said so"
//! from filesystem timestamps, never from content. Stat calls are rate
//! limited by a [`FileTimeout`] so hot lookups do not hit the filesystem.
//!
//! # Invariants
//!
//! - The observed stamp is refreshed only when it was never computed or the
//!   polling window has elapsed since the last refresh.
//! - A missing path stamps as "now". While the file stays missing every
//!   refresh yields a new stamp, so `changed()` keeps reporting true; this is
//!   intentional and covered by `missing_file_reports_changed_on_every_refresh`.
//! - [`FileTimeout::Disabled`] makes `changed()` unconditionally true.
//! - The refresh check-then-act sequence runs under a per-file mutex.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;

/// Polling window between filesystem metadata reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileTimeout {
	/// Never trust a cached stamp; every check reports a change.
	Disabled,
	/// Re-stat at most once per window. A zero window re-stats every time.
	Every(Duration),
}

impl FileTimeout {
	/// Interprets a signed seconds setting; negative values disable polling.
	pub fn from_secs(secs: i64) -> Self {
		u64::try_from(secs).map_or(Self::Disabled, |secs| Self::Every(Duration::from_secs(secs)))
	}
}

#[derive(Debug, Default)]
struct StampState {
	/// Latest observed change indicator.
	observed: Option<SystemTime>,
	/// When `observed` was last read from the filesystem.
	statted_at: Option<Instant>,
	/// Stamp most recently reported as a change (or the baseline).
	reported: Option<SystemTime>,
}

/// Timestamp-based change detector for one path.
#[derive(Debug)]
pub struct StampedFile {
	path: PathBuf,
	timeout: FileTimeout,
	state: Mutex<StampState>,
}

impl StampedFile {
	/// Creates a detector and records the file's current stamp as the baseline.
	pub fn new(path: impl Into<PathBuf>, timeout: FileTimeout) -> Self {
		let file = Self {
			path: path.into(),
			timeout,
			state: Mutex::new(StampState::default()),
		};
		{
			let mut state = file.state.lock();
			let baseline = file.refresh(&mut state);
			state.reported = Some(baseline);
		}
		file
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn timeout(&self) -> FileTimeout {
		self.timeout
	}

	/// Returns the current change indicator, re-reading metadata only when the
	/// polling window has elapsed.
	pub fn stamp(&self) -> SystemTime {
		let mut state = self.state.lock();
		self.refresh(&mut state)
	}

	/// Returns true when the observed stamp differs from the one last reported.
	pub fn changed(&self) -> bool {
		if self.timeout == FileTimeout::Disabled {
			return true;
		}

		let mut state = self.state.lock();
		let current = self.refresh(&mut state);
		if state.reported == Some(current) {
			return false;
		}
		state.reported = Some(current);
		tracing::debug!(path = %self.path.display(), "watched file changed");
		true
	}

	/// Pins both the observed and reported stamp, restarting the polling window.
	pub fn seed(&self, stamp: SystemTime) {
		let mut state = self.state.lock();
		state.observed = Some(stamp);
		state.statted_at = Some(Instant::now());
		state.reported = Some(stamp);
	}

	fn refresh(&self, state: &mut StampState) -> SystemTime {
		if let (Some(observed), Some(statted_at)) = (state.observed, state.statted_at) {
			let due = match self.timeout {
				FileTimeout::Disabled => true,
				FileTimeout::Every(window) => statted_at.elapsed() >= window,
			};
			if !due {
				return observed;
			}
		}

		let observed = read_stamp(&self.path);
		state.observed = Some(observed);
		state.statted_at = Some(Instant::now());
		observed
	}
}

fn read_stamp(path: &Path) -> SystemTime {
	match std::fs::metadata(path).and_then(|meta| meta.modified()) {
		Ok(modified) => modified,
		Err(err) if matches!(err.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
			tracing::debug!(path = %path.display(), "watched file missing; treating as changed");
			SystemTime::now()
		}
		Err(err) => {
			tracing::warn!(path = %path.display(), error = %err, "cannot stat watched file; treating as changed");
			SystemTime::now()
		}
	}
}

/// A watched input whose staleness cannot be observed from the filesystem.
#[derive(Debug)]
pub struct AlwaysStaleFile {
	inner: StampedFile,
}

impl AlwaysStaleFile {
	pub fn new(path: impl Into<PathBuf>, timeout: FileTimeout) -> Self {
		Self {
			inner: StampedFile::new(path, timeout),
		}
	}

	pub fn changed(&self) -> bool {
		true
	}
}

/// One entry of a registry's watch set.
#[derive(Debug)]
pub enum WatchedFile {
	Stamped(StampedFile),
	AlwaysStale(AlwaysStaleFile),
}

impl WatchedFile {
	pub fn new(path: impl Into<PathBuf>, timeout: FileTimeout, always_stale: bool) -> Self {
		if always_stale {
			Self::AlwaysStale(AlwaysStaleFile::new(path, timeout))
		} else {
			Self::Stamped(StampedFile::new(path, timeout))
		}
	}

	pub fn changed(&self) -> bool {
		match self {
			Self::Stamped(file) => file.changed(),
			Self::AlwaysStale(file) => file.changed(),
		}
	}

	pub fn path(&self) -> &Path {
		self.stamped().path()
	}

	pub fn is_always_stale(&self) -> bool {
		matches!(self, Self::AlwaysStale(_))
	}

	/// The underlying stamp tracker, e.g. for seeding in tests.
	pub fn stamped(&self) -> &StampedFile {
		match self {
			Self::Stamped(file) => file,
			Self::AlwaysStale(file) => &file.inner,
		}
	}
}

#[cfg(test)]
mod tests;
