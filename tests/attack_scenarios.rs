//! End-to-end attack scenarios.
//!
//! Covers the documented FGSM examples, gradients of real linear
//! classifiers, argument validation, and file-driven sessions.

use std::io::Write;

use enganar::attack::{AttackConfig, AttackSession, PerturbationEngine, TargetedLoss};
use enganar::autograd::{clear_graph, get_grad, memory, GradientOracle, TapeGradient, Tensor};
use enganar::classify::{ClassLabels, Classifier, ModuleClassifier, Preprocessing};
use enganar::error::Result;
use enganar::image;
use enganar::nn::{Flatten, Linear, Sequential};

/// Ignores the image and scores every class equally.
struct ConstantLogits;

impl Classifier for ConstantLogits {
    fn num_classes(&self) -> usize {
        1000
    }

    fn infer(&self, _image: &Tensor) -> Result<Tensor> {
        Ok(Tensor::zeros(&[1000]))
    }
}

/// Claims five classes but returns three logits.
struct ShortLogits;

impl Classifier for ShortLogits {
    fn num_classes(&self) -> usize {
        5
    }

    fn infer(&self, _image: &Tensor) -> Result<Tensor> {
        Ok(Tensor::zeros(&[3]))
    }
}

fn linear_classifier(
    weights: &[f32],
    bias: &[f32],
    shape: &[usize],
) -> ModuleClassifier<Sequential> {
    let classes = bias.len();
    let features: usize = shape.iter().product();
    let layer = Linear::from_weights(
        Tensor::new(weights, &[classes, features]),
        Some(Tensor::from_slice(bias)),
    )
    .expect("valid weights");
    let network = Sequential::new().add(Flatten::new()).add(layer);
    ModuleClassifier::new(network, ClassLabels::numbered(classes), shape).expect("valid classifier")
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.iter().map(|e| e / total).collect()
}

/// Deterministic small weights in `[-0.05, 0.05]`.
fn pattern_weights(classes: usize, features: usize) -> Vec<f32> {
    (0..classes * features)
        .map(|i| ((i * 37 % 101) as f32 / 100.0 - 0.5) * 0.1)
        .collect()
}

// ============================================================================
// Documented examples
// ============================================================================

#[test]
fn constant_classifier_leaves_gray_image_unchanged() {
    let gray = image::filled(4, 4, 3, 128.0);
    let adv = PerturbationEngine::new()
        .generate(&ConstantLogits, &gray, 0, 5.0)
        .unwrap();

    assert_eq!(adv.shape(), &[4, 4, 3]);
    assert!(adv.data().iter().all(|&p| p == 128.0));
}

#[test]
fn huge_epsilon_stays_in_range() {
    let clf = linear_classifier(&pattern_weights(4, 12), &[0.0; 4], &[2, 2, 3]);
    let img = Tensor::new(
        &[0.0, 10.0, 20.0, 30.0, 100.0, 128.0, 140.0, 200.0, 220.0, 240.0, 250.0, 255.0],
        &[2, 2, 3],
    );

    let adv = PerturbationEngine::new().generate(&clf, &img, 2, 1000.0).unwrap();
    assert!(adv.data().iter().all(|&p| p == 0.0 || p == 255.0 || img.data().contains(&p)));
    assert!(adv.data().iter().all(|&p| (0.0..=255.0).contains(&p)));
}

#[test]
fn low_pixel_with_positive_gradient_clips_to_zero() {
    // class 0 logit = first pixel; pushing toward class 1 lowers it
    let clf = linear_classifier(&[1.0, 0.0, 0.0, 0.0, 0.0, 0.0], &[0.0, 0.0], &[1, 1, 3]);
    let img = Tensor::new(&[2.0, 100.0, 200.0], &[1, 1, 3]);

    let adv = PerturbationEngine::new().generate(&clf, &img, 1, 5.0).unwrap();
    assert_eq!(adv.data(), &[0.0, 100.0, 200.0]);
}

#[test]
fn zero_epsilon_returns_clipped_original() {
    let clf = linear_classifier(&[0.5, -0.5, 1.0], &[0.0], &[1, 1, 3]);
    let img = Tensor::new(&[-5.0, 42.0, 300.0], &[1, 1, 3]);

    let adv = PerturbationEngine::new().generate(&clf, &img, 0, 0.0).unwrap();
    assert_eq!(adv.data(), &[0.0, 42.0, 255.0]);
}

// ============================================================================
// Gradients of a real classifier
// ============================================================================

fn analytic_gradient(weights: &[f32], logits: &[f32], target: usize, features: usize) -> Vec<f32> {
    let p = softmax(logits);
    (0..features)
        .map(|i| {
            (0..logits.len())
                .map(|k| {
                    let t = if k == target { 1.0 } else { 0.0 };
                    weights[k * features + i] * (p[k] - t)
                })
                .sum()
        })
        .collect()
}

#[test]
fn linear_classifier_gradient_matches_closed_form() {
    clear_graph();
    let (classes, features) = (3, 12);
    let weights = pattern_weights(classes, features);
    let bias = [0.1, -0.2, 0.05];
    let clf = linear_classifier(&weights, &bias, &[2, 2, 3]);
    let img = Tensor::new(
        &[12.0, 40.0, 99.0, 130.0, 7.0, 250.0, 64.0, 64.0, 180.0, 3.0, 77.0, 201.0],
        &[2, 2, 3],
    );

    let loss = TargetedLoss::new(&clf, 2).unwrap();
    let grad = TapeGradient.gradient(&loss, &img).unwrap();

    let logits: Vec<f32> = (0..classes)
        .map(|k| {
            bias[k]
                + (0..features)
                    .map(|i| weights[k * features + i] * img.data()[i])
                    .sum::<f32>()
        })
        .collect();
    let expected = analytic_gradient(&weights, &logits, 2, features);

    assert_eq!(grad.shape(), &[2, 2, 3]);
    for (g, e) in grad.data().iter().zip(&expected) {
        assert!((g - e).abs() < 1e-4, "{g} vs {e}");
    }
}

#[test]
fn preprocessing_scales_gradient() {
    let weights = pattern_weights(2, 3);
    let raw = linear_classifier(&weights, &[0.0, 0.0], &[1, 1, 3]);
    let sym = linear_classifier(&weights, &[0.0, 0.0], &[1, 1, 3])
        .with_preprocessing(Preprocessing::SymmetricUnit);

    let img = Tensor::new(&[127.5, 127.5, 127.5], &[1, 1, 3]);
    // x/127.5 - 1 = 0 for mid-gray, so both models see the same logits at zero
    let zero = Tensor::zeros(&[1, 1, 3]);

    let g_raw = TapeGradient
        .gradient(&TargetedLoss::new(&raw, 0).unwrap(), &zero)
        .unwrap();
    let g_sym = TapeGradient
        .gradient(&TargetedLoss::new(&sym, 0).unwrap(), &img)
        .unwrap();

    for (r, s) in g_raw.data().iter().zip(g_sym.data()) {
        assert!((r / 127.5 - s).abs() < 1e-6, "{r} vs {s}");
    }
}

#[test]
fn one_step_lowers_targeted_loss() {
    let clf = linear_classifier(&pattern_weights(4, 12), &[0.3, 0.0, -0.1, 0.2], &[2, 2, 3]);
    let img = image::filled(2, 2, 3, 100.0);
    let loss = TargetedLoss::new(&clf, 1).unwrap();

    let before = loss.evaluate(&img).unwrap().item();
    let adv = PerturbationEngine::new().generate(&clf, &img, 1, 2.0).unwrap();
    let after = loss.evaluate(&adv).unwrap().item();

    assert!(after < before, "{after} >= {before}");
}

#[test]
fn generate_leaves_graph_memory_unchanged() {
    clear_graph();
    // unrelated recording made before the attack must survive it
    let outer = Tensor::from_slice(&[1.0, 2.0]).requires_grad();
    let _kept = outer.exp();
    let before = memory();
    assert!(before.tape_len > 0);

    let clf = linear_classifier(&pattern_weights(4, 12), &[0.0; 4], &[2, 2, 3]);
    let _ = PerturbationEngine::new()
        .generate(&clf, &image::filled(2, 2, 3, 50.0), 3, 5.0)
        .unwrap();

    assert_eq!(memory(), before);
    clear_graph();
}

// ============================================================================
// Argument validation
// ============================================================================

#[test]
fn invalid_arguments_are_rejected() {
    let clf = linear_classifier(&pattern_weights(4, 12), &[0.0; 4], &[2, 2, 3]);
    let engine = PerturbationEngine::new();
    let img = image::filled(2, 2, 3, 10.0);

    let cases = [
        ("target out of range", engine.generate(&clf, &img, 4, 1.0)),
        ("negative epsilon", engine.generate(&clf, &img, 0, -0.5)),
        ("NaN epsilon", engine.generate(&clf, &img, 0, f32::NAN)),
        ("infinite epsilon", engine.generate(&clf, &img, 0, f32::INFINITY)),
        ("rank-2 image", engine.generate(&clf, &Tensor::zeros(&[2, 6]), 0, 1.0)),
        ("wrong image size", engine.generate(&clf, &image::filled(3, 2, 3, 0.0), 0, 1.0)),
        ("short logits", engine.generate(&ShortLogits, &img, 0, 1.0)),
        (
            "NaN pixel",
            engine.generate(&clf, &Tensor::new(&[f32::NAN; 12], &[2, 2, 3]), 0, 1.0),
        ),
        (
            "infinite pixel",
            engine.generate(&clf, &image::filled(2, 2, 3, f32::INFINITY), 0, 1.0),
        ),
    ];

    for (name, result) in cases {
        let err = result.expect_err(name);
        assert!(err.is_invalid_argument(), "{name}: {err}");
    }

    // 48 pixel values feeding a layer that expects 10 features
    let miswired = Sequential::new()
        .add(Flatten::new())
        .add(Linear::with_seed(10, 3, Some(0)));
    let err = ModuleClassifier::new(miswired, ClassLabels::numbered(3), &[4, 4, 3]).unwrap_err();
    assert!(err.is_invalid_argument(), "{err}");
}

/// Scores classes with a caller-owned tensor that tracks gradients.
struct TrackedWeights {
    weights: Tensor,
}

impl Classifier for TrackedWeights {
    fn num_classes(&self) -> usize {
        3
    }

    fn infer(&self, image: &Tensor) -> Result<Tensor> {
        Ok(image.view(&[3]).mul(&self.weights))
    }
}

#[test]
fn generate_leaves_caller_tensors_untouched() {
    clear_graph();
    let weights = Tensor::from_slice(&[0.5, -1.0, 2.0]).requires_grad();
    let _ = weights.exp();
    let before = memory();

    let clf = TrackedWeights {
        weights: weights.clone(),
    };
    let adv = PerturbationEngine::new()
        .generate(&clf, &image::filled(1, 1, 3, 100.0), 0, 5.0)
        .unwrap();

    assert_eq!(adv.shape(), &[1, 1, 3]);
    assert!(get_grad(weights.id()).is_none());
    assert_eq!(memory(), before);
    clear_graph();
}

// ============================================================================
// Sessions
// ============================================================================

#[test]
fn session_reaches_target_with_large_step() {
    // class 0 likes bright pixels, class 1 has a small head start
    let clf = linear_classifier(
        &[0.01, 0.01, 0.01, -0.01, -0.01, -0.01],
        &[0.0, 0.5],
        &[1, 1, 3],
    );
    let mut session =
        AttackSession::with_classifier(clf, AttackConfig::new(1, 150.0).with_top_k(2)).unwrap();

    let report = session.run(&image::filled(1, 1, 3, 100.0)).unwrap();

    assert_eq!(report.original_top().map(|p| p.class_index), Some(0));
    assert!(report.hit_target());
    assert!(report.changed_prediction());
    assert_eq!(report.adversarial.data(), &[0.0, 0.0, 0.0]);
    assert_eq!(report.max_abs_change, 100.0);
    assert_eq!(report.leaked_bytes, 0);
}

#[test]
fn session_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("attack.json");
    let labels_path = dir.path().join("labels.json");

    let mut config_file = std::fs::File::create(&config_path).unwrap();
    write!(config_file, r#"{{"target_class": 2, "epsilon": 3.0}}"#).unwrap();
    let mut labels_file = std::fs::File::create(&labels_path).unwrap();
    write!(
        labels_file,
        r#"{{"0": "tench", "1": "goldfish", "2": "vase", "3": "tabby"}}"#
    )
    .unwrap();

    let config = AttackConfig::from_file(&config_path).unwrap();
    let mut session = AttackSession::new(
        move || {
            let labels = ClassLabels::from_file(&labels_path)?;
            let network = Sequential::new()
                .add(Flatten::new())
                .add(Linear::with_seed(4 * 4 * 3, labels.len(), Some(3)));
            Ok(ModuleClassifier::new(network, labels, &[4, 4, 3])?
                .with_preprocessing(Preprocessing::UnitRange))
        },
        config,
    )
    .unwrap();

    let img = image::filled(4, 4, 3, 128.0);
    let report = session.run(&img).unwrap();

    assert_eq!(report.target_class, 2);
    assert_eq!(report.original.len(), 3);
    assert!(report.max_abs_change <= 3.0);
    let names = ["tench", "goldfish", "vase", "tabby"];
    assert!(report
        .adversarial_predictions
        .iter()
        .all(|p| names.contains(&p.class_name.as_str())));
    assert!(report.original_top().unwrap().to_string().contains('('));
}

#[test]
fn pixels_round_trip_through_attack() {
    let rgba: Vec<u8> = (0..2 * 2 * 4).map(|i| (i * 15) as u8).collect();
    let img = image::from_pixels(&rgba, 2, 2, 4).unwrap();
    assert_eq!(img.shape(), &[2, 2, 3]);

    let clf = linear_classifier(&pattern_weights(3, 12), &[0.0; 3], &[2, 2, 3]);
    let adv = PerturbationEngine::new().generate(&clf, &img, 1, 4.0).unwrap();
    let bytes = image::to_pixels(&adv);

    assert_eq!(bytes.len(), 12);
    for (b, &orig) in bytes.iter().zip(img.data()) {
        assert!((f32::from(*b) - orig).abs() <= 4.0);
    }
}
