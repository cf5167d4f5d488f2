/// Execution classes used for worker scheduling and observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Blocking filesystem I/O, such as stamping watched manifests.
	IoBlocking,
	/// External process execution, such as the registry version command.
	Process,
}

impl TaskClass {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::IoBlocking => "io_blocking",
			Self::Process => "process",
		}
	}
}
