use indent_core::{RawLine, SignConvention, TelemetryParser, accumulate, Sample};
use proptest::prelude::*;
use std::time::Instant;

fn parse_twice(text: &str, sign: SignConvention) -> (String, String) {
    let p = TelemetryParser::default();
    let at = Instant::now();
    let a = p.parse(&RawLine::new(text, at), sign);
    let b = p.parse(&RawLine::new(text, at), sign);
    (format!("{a:?}"), format!("{b:?}"))
}

proptest! {
    #[test]
    fn well_formed_lines_always_parse(
        f in -1.0e4f64..1.0e4,
        d in -1.0e3f64..1.0e3,
        invert in any::<bool>(),
    ) {
        let text = format!("Force:{f:.2}N, Displacement:{d:.2}mm");
        let sign = SignConvention::from_inverted(invert);
        let s = TelemetryParser::default()
            .parse(&RawLine::new(text.clone(), Instant::now()), sign)
            .expect("documented shape parses");
        let want_d: f64 = format!("{d:.2}").parse().unwrap();
        let want_f: f64 = format!("{f:.2}").parse().unwrap();
        prop_assert_eq!(s.force_n, want_f);
        prop_assert_eq!(s.displacement_raw_mm, sign.apply(want_d));
    }

    #[test]
    fn parsing_is_deterministic_for_any_text(text in ".{0,64}", invert in any::<bool>()) {
        let (a, b) = parse_twice(&text, SignConvention::from_inverted(invert));
        prop_assert_eq!(a, b);
    }

    #[test]
    fn near_miss_lines_are_deterministic(
        f in "[-0-9.a-z]{0,6}",
        d in "[-0-9.a-z]{0,6}",
        sep in prop::sample::select(vec![", ", ",", " ", ",  "]),
    ) {
        let text = format!("Force:{f}N{sep}Displacement:{d}mm");
        let (a, b) = parse_twice(&text, SignConvention::AsReported);
        prop_assert_eq!(a, b);
    }

    #[test]
    fn stitched_segments_are_continuous(
        segs in prop::collection::vec(prop::collection::vec(-20.0f64..20.0, 1..12), 2..6)
    ) {
        let at = Instant::now();
        let mut offset = 0.0;
        let mut prev_last: Option<f64> = None;
        for seg in &segs {
            let samples: Vec<Sample> = seg
                .iter()
                .map(|&d| Sample { force_n: 0.0, displacement_raw_mm: d, at })
                .collect();
            let (points, next) = accumulate(offset, &samples);
            if let Some(last) = prev_last {
                prop_assert_eq!(last, offset);
            }
            prop_assert_eq!(points[0].displacement_mm, offset + seg[0]);
            prev_last = Some(points[points.len() - 1].displacement_mm);
            offset = next;
        }
    }
}
