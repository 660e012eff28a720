/*! Integration tests for Vouch.
 *
 * This test suite is organized as a single integration test binary
 * following the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * The module structure mirrors the main library structure:
 * - multisig: Weighted thresholds and the approval aggregator
 * - policy: Policy evaluation and usage accounting
 * - validator: The three validator kinds behind the common interface
 * - state: AuthorizationState encoding, decoding and restoration
 * - session: Session key approval, hand-off and activation
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vouch=info".parse().unwrap()))
        .with_test_writer()
        .try_init();
}

mod multisig;
mod session;
mod state;
mod validator;
