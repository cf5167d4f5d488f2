use std::fs::{self, File};
use std::time::{Duration, SystemTime};

use super::*;

const MINUTE: FileTimeout = FileTimeout::Every(Duration::from_secs(60));
const ALWAYS_RESTAT: FileTimeout = FileTimeout::Every(Duration::ZERO);

fn touch(path: &Path, modified: SystemTime) {
	let file = File::options().write(true).create(true).truncate(false).open(path).expect("open");
	file.set_modified(modified).expect("set mtime");
}

#[test]
fn timeout_from_secs() {
	assert_eq!(FileTimeout::from_secs(-1), FileTimeout::Disabled);
	assert_eq!(FileTimeout::from_secs(0), ALWAYS_RESTAT);
	assert_eq!(FileTimeout::from_secs(15), FileTimeout::Every(Duration::from_secs(15)));
}

#[test]
fn unchanged_file_is_not_changed_within_window() {
	let dir = tempfile::tempdir().expect("create tempdir");
	let path = dir.path().join("site.pp");
	touch(&path, SystemTime::UNIX_EPOCH + Duration::from_secs(1_000));

	let file = StampedFile::new(&path, MINUTE);
	assert!(!file.changed());
	assert!(!file.changed());
}

#[test]
fn disabled_timeout_always_reports_changed() {
	let dir = tempfile::tempdir().expect("create tempdir");
	let path = dir.path().join("site.pp");
	touch(&path, SystemTime::UNIX_EPOCH + Duration::from_secs(1_000));

	let file = StampedFile::new(&path, FileTimeout::Disabled);
	assert!(file.changed());
	assert!(file.changed());
}

#[test]
fn modification_is_reported_once() {
	let dir = tempfile::tempdir().expect("create tempdir");
	let path = dir.path().join("site.pp");
	touch(&path, SystemTime::UNIX_EPOCH + Duration::from_secs(1_000));

	let file = StampedFile::new(&path, ALWAYS_RESTAT);
	assert!(!file.changed());

	touch(&path, SystemTime::UNIX_EPOCH + Duration::from_secs(2_000));
	assert!(file.changed());
	assert!(!file.changed(), "a reported change is not reported again");
}

#[test]
fn cached_stamp_hides_modification_until_window_elapses() {
	let dir = tempfile::tempdir().expect("create tempdir");
	let path = dir.path().join("site.pp");
	touch(&path, SystemTime::UNIX_EPOCH + Duration::from_secs(1_000));

	let file = StampedFile::new(&path, MINUTE);
	touch(&path, SystemTime::UNIX_EPOCH + Duration::from_secs(2_000));

	assert!(!file.changed());
	assert_eq!(file.stamp(), SystemTime::UNIX_EPOCH + Duration::from_secs(1_000));
}

#[test]
fn seeded_stamp_differs_from_disk() {
	let dir = tempfile::tempdir().expect("create tempdir");
	let path = dir.path().join("site.pp");
	touch(&path, SystemTime::UNIX_EPOCH + Duration::from_secs(1_000));

	let file = StampedFile::new(&path, ALWAYS_RESTAT);
	file.seed(SystemTime::UNIX_EPOCH);
	assert!(file.changed());
	assert!(!file.changed());
}

/// Intentional quirk: a missing file stamps as "now" on every refresh, so it
/// keeps reporting a change for as long as it stays missing.
#[test]
fn missing_file_reports_changed_on_every_refresh() {
	let dir = tempfile::tempdir().expect("create tempdir");
	let path = dir.path().join("gone.pp");
	touch(&path, SystemTime::UNIX_EPOCH + Duration::from_secs(1_000));

	let file = StampedFile::new(&path, ALWAYS_RESTAT);
	fs::remove_file(&path).expect("remove");

	assert!(file.changed());
	std::thread::sleep(Duration::from_millis(5));
	assert!(file.changed());
}

#[test]
fn path_under_a_regular_file_is_treated_as_missing() {
	let dir = tempfile::tempdir().expect("create tempdir");
	let parent = dir.path().join("plain");
	touch(&parent, SystemTime::UNIX_EPOCH + Duration::from_secs(1_000));

	let file = StampedFile::new(parent.join("child.pp"), ALWAYS_RESTAT);
	std::thread::sleep(Duration::from_millis(5));
	assert!(file.changed());
}

#[test]
fn always_stale_ignores_stamps() {
	let dir = tempfile::tempdir().expect("create tempdir");
	let path = dir.path().join("version");
	touch(&path, SystemTime::UNIX_EPOCH + Duration::from_secs(1_000));

	let watched = WatchedFile::new(&path, MINUTE, true);
	assert!(watched.is_always_stale());
	assert!(watched.changed());
	assert!(watched.changed());
	assert_eq!(watched.path(), path.as_path());
}

#[test]
fn concurrent_checks_report_a_change_once() {
	let dir = tempfile::tempdir().expect("create tempdir");
	let path = dir.path().join("site.pp");
	touch(&path, SystemTime::UNIX_EPOCH + Duration::from_secs(1_000));

	let file = StampedFile::new(&path, ALWAYS_RESTAT);
	touch(&path, SystemTime::UNIX_EPOCH + Duration::from_secs(2_000));

	let reported = std::thread::scope(|scope| {
		let handles: Vec<_> = (0..8).map(|_| scope.spawn(|| file.changed())).collect();
		handles.into_iter().map(|handle| handle.join().expect("join")).filter(|changed| *changed).count()
	});
	assert_eq!(reported, 1);
}
