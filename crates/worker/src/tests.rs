use std::time::Duration;

use super::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn spawn_blocking_runs_on_ambient_runtime() {
	let handle = spawn_blocking(TaskClass::IoBlocking, || 40 + 2).expect("runtime available");
	assert_eq!(handle.await.expect("join"), 42);
}

#[test]
fn spawn_blocking_outside_runtime_uses_global() {
	let handle = spawn_blocking(TaskClass::Process, || 7).expect("global runtime");
	let rt = tokio::runtime::Builder::new_current_thread().build().expect("runtime");
	assert_eq!(rt.block_on(handle).expect("join"), 7);
}

#[test]
fn block_on_returns_future_output() {
	let value = block_on(TaskClass::Process, async {
		tokio::task::yield_now().await;
		"done"
	})
	.expect("global runtime");
	assert_eq!(value, "done");
}

#[tokio::test]
async fn block_on_inside_current_thread_runtime_does_not_deadlock() {
	let value = block_on(TaskClass::Process, async {
		tokio::time::sleep(Duration::from_millis(10)).await;
		9
	})
	.expect("global runtime");
	assert_eq!(value, 9);
}

async fn explode() -> u8 {
	panic!("boom")
}

#[test]
fn block_on_reports_panicking_future() {
	let err = block_on(TaskClass::Process, explode()).unwrap_err();
	assert_eq!(err.kind(), std::io::ErrorKind::Other);
}

#[test]
fn class_labels_are_stable() {
	assert_eq!(TaskClass::IoBlocking.as_str(), "io_blocking");
	assert_eq!(TaskClass::Process.as_str(), "process");
}
