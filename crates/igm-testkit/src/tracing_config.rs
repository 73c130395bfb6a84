//! Log capture for tests.

use std::sync::OnceLock;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Workspace crates log at debug, dependencies at info, unless `RUST_LOG` says otherwise.
const TEST_FILTER: &str =
    "info,igm_mapper=debug,igm_pxgrid=debug,igm_meraki=debug,igm_streaming=debug,igm_bridge=debug";

static INSTALLED: OnceLock<bool> = OnceLock::new();

/// Route `tracing` output through the libtest capture.
///
/// Returns whether a subscriber is in place; `false` means another one was
/// installed first, which is harmless.
pub fn init_test_tracing() -> bool {
    *INSTALLED.get_or_init(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(TEST_FILTER));
        tracing_subscriber::registry()
            .with(fmt::layer().with_test_writer().without_time().compact())
            .with(filter)
            .try_init()
            .is_ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeat_calls_agree() {
        let first = init_test_tracing();
        assert_eq!(init_test_tracing(), first);
        tracing::debug!(target: "igm_bridge", "captured");
    }
}
