use image::{DynamicImage, ImageBuffer, Rgb};
use pilar_core::{format_waste_type, CategoryTable, Confidence, WasteCategory};
use pilar_vision::{FeatureExtractor, FeatureSpec, ImageLimits};
use proptest::prelude::*;

proptest! {
    #[test]
    fn test_confidence_bounds(value in prop::num::f64::ANY) {
        for confidence in [
            Confidence::from_percent(value),
            Confidence::from_probability(value),
            Confidence::from_margin(value),
        ] {
            let percent = confidence.percent();
            prop_assert!((Confidence::MIN..=Confidence::MAX).contains(&percent));
            prop_assert!((Confidence::MIN..=Confidence::MAX).contains(&confidence.rounded()));
        }
    }

    #[test]
    fn test_margin_order_preserved(a in -50.0f64..50.0, b in -50.0f64..50.0) {
        prop_assume!(a <= b);
        prop_assert!(Confidence::from_margin(a).percent() <= Confidence::from_margin(b).percent());
    }

    #[test]
    fn test_mapper_is_deterministic(label in "[a-zA-Z_ -]{0,24}", hint in proptest::option::of("[a-z]{0,12}")) {
        let table = CategoryTable::builtin();
        let first = table.map(&label, hint.as_deref());
        let second = table.map(&label, hint.as_deref());
        prop_assert_eq!(first, second);
    }

    #[test]
    fn test_anorganik_never_organic(prefix in "[a-z ]{0,8}", suffix in "[a-z ]{0,8}") {
        let label = format!("{}anorganik{}", prefix, suffix);
        let table = CategoryTable::builtin();
        prop_assert_ne!(table.resolve(&label), Some(WasteCategory::Organic));
        prop_assert_ne!(table.map(&label, None).category, WasteCategory::Organic);
    }

    #[test]
    fn test_format_waste_type_is_stable(label in "[a-z_]{0,20}") {
        let once = format_waste_type(&label);
        prop_assert_eq!(format_waste_type(&once), once.clone());
        prop_assert!(!once.contains('_'));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_extractor_length_matches_feature_spec(
        width in 16u32..80,
        height in 16u32..80,
        seed in any::<u8>(),
        grid in any::<bool>(),
    ) {
        let spec = if grid { FeatureSpec::grayscale_grid() } else { FeatureSpec::color_histogram() };
        let image = DynamicImage::ImageRgb8(ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([
                (x as u8).wrapping_mul(seed),
                (y as u8).wrapping_add(seed),
                seed,
            ])
        }));

        let vector = FeatureExtractor::new(spec.clone(), ImageLimits::default())
            .extract_image(&image);
        prop_assert_eq!(vector.len(), spec.len());
        prop_assert!(vector.as_slice().iter().all(|v| v.is_finite()));
    }
}
