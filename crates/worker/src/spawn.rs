use std::future::Future;
use std::io;
use std::sync::OnceLock;

use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;

use crate::TaskClass;

/// The shared runtime used outside any ambient runtime and by [`block_on`].
fn global_runtime() -> io::Result<&'static Runtime> {
	static GLOBAL_RT: OnceLock<Runtime> = OnceLock::new();
	if let Some(runtime) = GLOBAL_RT.get() {
		return Ok(runtime);
	}
	let runtime = tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.worker_threads(2)
		.thread_name("keel-worker-global")
		.build()?;
	Ok(GLOBAL_RT.get_or_init(|| runtime))
}

fn runtime_handle() -> io::Result<Handle> {
	if let Ok(handle) = Handle::try_current() {
		return Ok(handle);
	}
	Ok(global_runtime()?.handle().clone())
}

/// Spawns blocking work on the runtime's blocking pool.
pub fn spawn_blocking<F, R>(class: TaskClass, f: F) -> io::Result<JoinHandle<R>>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	tracing::trace!(worker_class = class.as_str(), "worker.spawn_blocking");
	Ok(runtime_handle()?.spawn_blocking(f))
}

/// Drives `fut` on the shared runtime and parks the calling thread until it
/// finishes.
///
/// The future never runs on the caller's runtime, so this may be called from
/// synchronous code anywhere, including a blocking-pool thread. A future that
/// panics surfaces as an error.
pub fn block_on<F>(class: TaskClass, fut: F) -> io::Result<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!(worker_class = class.as_str(), "worker.block_on");
	let (tx, rx) = std::sync::mpsc::sync_channel(1);
	global_runtime()?.spawn(async move {
		let _ = tx.send(fut.await);
	});
	rx.recv().map_err(|_| io::Error::other("worker task ended without a result"))
}
