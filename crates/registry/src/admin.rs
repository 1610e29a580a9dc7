/// Capability token for destructive registry operations.
///
/// Unfreezing, applying snapshots and reverting to checkpoints all require a
/// `&RegistryAdmin`. Exactly one is handed out per context, by
/// [`crate::RegistryContext::new`]; ordinary consumers never see it.
#[derive(Debug)]
pub struct RegistryAdmin {
	_private: (),
}

impl RegistryAdmin {
	pub(crate) fn new() -> Self {
		Self { _private: () }
	}
}
