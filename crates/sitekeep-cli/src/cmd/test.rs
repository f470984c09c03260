use sitekeep_core::config::TransferConfig;
use sitekeep_core::selftest::{self, SelfTestReport};

/// Returns `Ok` only when the marker round-trip succeeded.
pub(crate) fn run_self_test(cfg: &TransferConfig) -> Result<(), String> {
    println!(
        "Testing {} transfer to {}:{}{} ...",
        cfg.backend.as_str(),
        cfg.host,
        cfg.port,
        cfg.remote_path
    );

    match selftest::run_self_test(cfg) {
        SelfTestReport::Success => {
            println!("OK: marker file uploaded and deleted");
            Ok(())
        }
        SelfTestReport::Failed { phase, cause } => {
            Err(format!("self-test failed at phase '{phase}': {cause}"))
        }
    }
}
