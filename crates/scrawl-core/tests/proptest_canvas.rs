//! Property tests for the canvas, normalizer, and interpreter.

use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;

use scrawl_core::config::CanvasConfig;
use scrawl_core::{
    ImageNormalizer, Intensity, ProbabilityDistribution, Raster, ResampleFilter,
    ResultInterpreter, StrokeCanvasBuffer, StrokePoint,
};

fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);
    ProptestConfig {
        cases,
        ..ProptestConfig::default()
    }
}

fn canvas(side: u32) -> StrokeCanvasBuffer {
    StrokeCanvasBuffer::new(&CanvasConfig {
        side,
        ..CanvasConfig::default()
    })
}

fn arb_point(side: u32) -> impl Strategy<Value = StrokePoint> {
    let lo = -(side as f32) / 2.0;
    let hi = side as f32 * 1.5;
    (lo..hi, lo..hi).prop_map(|(x, y)| StrokePoint::new(x, y))
}

fn arb_stroke(side: u32) -> impl Strategy<Value = (StrokePoint, u32, Intensity)> {
    (
        arb_point(side),
        0u32..24,
        prop_oneof![Just(Intensity::Ink), Just(Intensity::Background)],
    )
}

proptest! {
    #![proptest_config(proptest_config())]

    #[test]
    fn clear_restores_background_after_any_strokes(
        strokes in prop::collection::vec(arb_stroke(48), 0..20)
    ) {
        let mut canvas = canvas(48);
        for (point, radius, intensity) in strokes {
            canvas.paint(point, radius, intensity);
        }
        canvas.clear();
        prop_assert!(canvas.is_blank());
        canvas.clear();
        prop_assert!(canvas.is_blank());
    }

    #[test]
    fn erasing_the_same_disk_restores_background(
        point in arb_point(48),
        radius in 0u32..30
    ) {
        let mut canvas = canvas(48);
        canvas.paint(point, radius, Intensity::Ink);
        canvas.paint(point, radius, Intensity::Background);
        prop_assert!(canvas.is_blank());
    }

    #[test]
    fn painted_pixels_lie_within_radius(
        point in arb_point(32),
        radius in 0u32..12
    ) {
        let mut canvas = canvas(32);
        canvas.paint(point, radius, Intensity::Ink);
        let r = radius as f32;
        for y in 0..32u32 {
            for x in 0..32u32 {
                let dx = x as f32 + 0.5 - point.x;
                let dy = y as f32 + 0.5 - point.y;
                let inside = dx * dx + dy * dy <= r * r;
                let inked = canvas.pixel(x, y) == Some(canvas.ink());
                // Skip pixels sitting on the boundary where f32 and f64 may disagree.
                if ((dx * dx + dy * dy) - r * r).abs() > 1e-2 {
                    prop_assert_eq!(inside, inked, "pixel ({}, {})", x, y);
                }
            }
        }
    }

    #[test]
    fn canvas_side_never_changes(
        strokes in prop::collection::vec(arb_stroke(40), 0..10)
    ) {
        let mut canvas = canvas(40);
        for (point, radius, intensity) in strokes {
            canvas.paint(point, radius, intensity);
        }
        prop_assert_eq!(canvas.side(), 40);
        prop_assert_eq!(canvas.pixels().len(), 1600);
    }

    #[test]
    fn uniform_rasters_normalize_to_constant_tensors(
        side in 1u32..120,
        model_side in 1u32..40,
        nearest in any::<bool>()
    ) {
        let filter = if nearest { ResampleFilter::Nearest } else { ResampleFilter::Area };
        let normalizer = ImageNormalizer::new(model_side, filter);

        let zeros = normalizer.normalize(&Raster::filled(side, 255)).expect("normalizes");
        prop_assert!(zeros.as_slice().iter().all(|&v| v == 0.0));

        let ones = normalizer.normalize(&Raster::filled(side, 0)).expect("normalizes");
        prop_assert!(ones.as_slice().iter().all(|&v| v == 1.0));
        prop_assert_eq!(ones.shape(), [model_side as usize, model_side as usize, 1]);
    }

    #[test]
    fn tensor_values_stay_in_unit_interval(
        strokes in prop::collection::vec(arb_stroke(56), 1..12)
    ) {
        let mut canvas = canvas(56);
        for (point, radius, intensity) in strokes {
            canvas.paint(point, radius, intensity);
        }
        let tensor = ImageNormalizer::default().normalize(canvas.raster()).expect("normalizes");
        prop_assert!(tensor.as_slice().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn interpreter_label_is_a_maximal_index(
        scores in prop::collection::vec(-0.5f32..1.5, 1..16)
    ) {
        let dist = ProbabilityDistribution::new(scores.clone());
        let result = ResultInterpreter.interpret(&dist).expect("finite scores");
        let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let first_max = scores.iter().position(|&s| s == max).expect("non-empty");

        prop_assert_eq!(result.label, first_max);
        prop_assert!((0.0..=100.0).contains(&result.confidence));
        prop_assert_eq!(result, ResultInterpreter.interpret(&dist).expect("deterministic"));
    }
}
