#![no_main]
use indent_core::{Codec, Decoded, ProtocolCfg, RawLine, SignConvention, TelemetryParser};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let protocol = ProtocolCfg::default();
    let codec = Codec::new(protocol.clone());
    let parser = TelemetryParser::new(&protocol);
    let line = RawLine::new(data.to_string(), std::time::Instant::now());

    // Never panics; a line is either a sample with finite values or a typed failure.
    if let Decoded::Telemetry = codec.classify(&line.text) {
        for sign in [SignConvention::AsReported, SignConvention::Inverted] {
            match parser.parse(&line, sign) {
                Ok(s) => assert!(s.force_n.is_finite() && s.displacement_raw_mm.is_finite()),
                Err(f) => assert_eq!(f.original, line.text),
            }
        }
    }
});
