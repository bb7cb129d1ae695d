#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Arbitrary TOML must either fail to parse or validate without panicking.
    if let Ok(cfg) = indent_config::load_toml(data) {
        if cfg.validate().is_ok() {
            // Anything that validates must also map onto the runtime config.
            let _: indent_core::CompletionCfg = (&cfg.completion).into();
            let _: indent_core::ProtocolCfg = (&cfg.protocol).into();
            let _: indent_core::SessionCfg = (&cfg.session).into();
        }
    }
});
