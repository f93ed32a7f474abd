//! Property tests for the pure pipeline stages.

use image_classifier::types::PixelFormat;
use image_classifier::{
    rank, ConfidenceVector, InputShape, LabelSet, Preprocessor, RankError, RawImage,
};
use proptest::prelude::*;

fn arb_format() -> impl Strategy<Value = PixelFormat> {
    prop_oneof![
        Just(PixelFormat::Rgb8),
        Just(PixelFormat::Rgba8),
        Just(PixelFormat::Bgr8),
        Just(PixelFormat::Luma8),
    ]
}

/// A packed image with a buffer of exactly the right size.
fn arb_image() -> impl Strategy<Value = RawImage> {
    (1u32..48, 1u32..48, arb_format()).prop_flat_map(|(width, height, format)| {
        let bpp = format.bytes_per_pixel().unwrap_or(3);
        let len = width as usize * height as usize * bpp;
        prop::collection::vec(any::<u8>(), len)
            .prop_map(move |data| RawImage::new(width, height, format, data))
    })
}

fn arb_shape() -> impl Strategy<Value = InputShape> {
    (1u32..32, 1u32..32, prop_oneof![Just(1u32), Just(3u32)])
        .prop_map(|(width, height, channels)| InputShape::new(width, height, channels))
}

fn labels(n: usize) -> LabelSet {
    LabelSet::new((0..n).map(|i| format!("label{i}"))).unwrap()
}

proptest! {
    #[test]
    fn preprocess_output_matches_shape(image in arb_image(), shape in arb_shape()) {
        let preprocessor = Preprocessor::new(shape).unwrap();
        let input = preprocessor.preprocess(&image).unwrap();
        prop_assert_eq!(input.len(), shape.byte_len());
        prop_assert_eq!(input.shape(), shape);
    }

    #[test]
    fn preprocess_is_deterministic(image in arb_image(), shape in arb_shape()) {
        let preprocessor = Preprocessor::new(shape).unwrap();
        let first = preprocessor.preprocess(&image).unwrap();
        let second = preprocessor.preprocess(&image).unwrap();
        prop_assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[test]
    fn rank_orders_and_truncates(
        scores in prop::collection::vec(any::<u8>(), 1..64),
        k in 0usize..10,
    ) {
        let labels = labels(scores.len());
        let result = rank(&ConfidenceVector::new(scores.clone()), &labels, k).unwrap();
        prop_assert_eq!(result.len(), k.min(scores.len()));

        let picked: Vec<(usize, u8)> = result
            .iter()
            .map(|r| {
                let index = r.label["label".len()..].parse::<usize>().unwrap();
                (index, r.confidence)
            })
            .collect();
        for (index, confidence) in &picked {
            prop_assert_eq!(scores[*index], *confidence);
        }
        for pair in picked.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            prop_assert!(a.1 >= b.1);
            if a.1 == b.1 {
                prop_assert!(a.0 < b.0);
            }
        }
        // Nothing left out beats the last pick.
        if let Some(&(_, lowest)) = picked.last() {
            let better_left_out = scores
                .iter()
                .enumerate()
                .filter(|(i, _)| !picked.iter().any(|(p, _)| p == i))
                .any(|(_, s)| *s > lowest);
            prop_assert!(!better_left_out);
        }
    }

    #[test]
    fn rank_rejects_length_mismatch(
        scores in prop::collection::vec(any::<u8>(), 1..32),
        extra in 1usize..8,
    ) {
        let labels = labels(scores.len() + extra);
        let result = rank(&ConfidenceVector::new(scores.clone()), &labels, 3);
        prop_assert_eq!(
            result,
            Err(RankError::LengthMismatch { confidences: scores.len(), labels: scores.len() + extra })
        );
    }
}

#[test]
fn rank_rejects_empty_confidences() {
    assert_eq!(
        rank(&ConfidenceVector::new(Vec::new()), &labels(3), 3),
        Err(RankError::EmptyConfidences)
    );
}

#[test]
fn rank_breaks_ties_by_index() {
    let labels = LabelSet::new(["cat", "dog", "fish"]).unwrap();
    let result = rank(&ConfidenceVector::new(vec![10, 200, 200]), &labels, 2).unwrap();
    assert_eq!(result.to_string(), "dog or fish");
    let best = result.best().unwrap();
    assert_eq!((best.label.as_str(), best.confidence), ("dog", 200));
}
