use std::{
    ops::Range,
    sync::atomic::{AtomicUsize, Ordering},
};

use geo::Rect;
use image::DynamicImage;
use ocrdoc::{
    Candidate, EngineError, FullText, LineObservation, NormalizedRect, OcrEngine, Orientation,
    PixelRect, RecognitionDocument, RecognitionError, SubrangeError, TextRecognizer,
    TextRecognizerBuilder, VerticalOrigin,
};

/// A line whose words sit at fixed normalized boxes, keyed by word text.
#[derive(Clone)]
struct ScriptedLine {
    candidates: Vec<(&'static str, f32)>,
    boxes: Vec<(&'static str, NormalizedRect)>,
}

impl LineObservation for ScriptedLine {
    fn top_candidates(&self, n: usize) -> Vec<Candidate> {
        self.candidates
            .iter()
            .take(n)
            .enumerate()
            .map(|(rank, (text, confidence))| Candidate::new(rank, *text, *confidence))
            .collect()
    }

    fn bounding_box(
        &self,
        candidate: &Candidate,
        range: Range<usize>,
    ) -> Result<NormalizedRect, SubrangeError> {
        let word = &candidate.text[range.clone()];
        self.boxes
            .iter()
            .find(|(text, _)| *text == word)
            .map(|(_, rect)| *rect)
            .ok_or(SubrangeError::Unresolved(range))
    }
}

enum Script {
    Lines(Vec<ScriptedLine>),
    Fail(&'static str),
    Panic,
}

struct ScriptedEngine {
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedEngine {
    fn new(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }
}

impl OcrEngine for ScriptedEngine {
    type Observation = ScriptedLine;

    fn perform(
        &self,
        _image: &DynamicImage,
        _orientation: Orientation,
        _languages: &[String],
    ) -> Result<Vec<ScriptedLine>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Lines(lines) => Ok(lines.clone()),
            Script::Fail(reason) => Err(EngineError::Internal(reason.to_string())),
            Script::Panic => panic!("engine crashed"),
        }
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn receipt() -> Vec<ScriptedLine> {
    vec![
        ScriptedLine {
            candidates: vec![("TOTAL 12.50", 0.87), ("TOTAL 12.50", 0.6), ("TOTAL 1250", 0.4)],
            boxes: vec![
                ("TOTAL", Rect::new((0.1, 0.8), (0.3, 0.9))),
                ("12.50", Rect::new((0.6, 0.8), (0.8, 0.9))),
            ],
        },
        ScriptedLine {
            candidates: vec![],
            boxes: vec![],
        },
        ScriptedLine {
            candidates: vec![("thank  you", 0.5)],
            boxes: vec![("thank", Rect::new((0.0, 0.0), (0.5, 0.1)))],
        },
    ]
}

fn image() -> DynamicImage {
    DynamicImage::new_rgb8(200, 100)
}

#[tokio::test]
async fn recognizes_receipt() {
    init_logging();
    let recognizer = TextRecognizer::new(ScriptedEngine::new(Script::Lines(receipt())));
    let document = recognizer
        .recognize(image(), vec!["en-US".into()], Orientation::Up)
        .await
        .expect("recognition failed");

    assert_eq!(document.text, "");
    assert_eq!(document.blocks.len(), 3);

    let first = &document.blocks[0];
    assert_eq!(first.lines.len(), 2);
    assert_eq!(first.lines[0].text(), "TOTAL 12.50");
    assert_eq!(first.lines[1].text(), "TOTAL 1250");
    assert!(first.lines[0].elements.iter().all(|it| it.confidence == 0.87));

    let total = &first.lines[0].elements[0];
    assert!((total.bounding_box.left - 20.0).abs() < 1e-9);
    assert!((total.bounding_box.right - 60.0).abs() < 1e-9);
    assert!((total.bounding_box.top - 90.0).abs() < 1e-9);
    assert!((total.bounding_box.bottom - 80.0).abs() < 1e-9);
    // "1250" has no scripted box
    assert_eq!(first.lines[1].elements[1].bounding_box, PixelRect::default());

    assert!(document.blocks[1].lines.is_empty());

    let words = &document.blocks[2].lines[0].elements;
    let texts = words.iter().map(|it| it.text.as_str()).collect::<Vec<_>>();
    assert_eq!(texts, ["thank", "", "you"]);
    assert!(!words[0].bounding_box.is_degenerate());
    assert_eq!(words[2].bounding_box, PixelRect::default());
}

#[tokio::test]
async fn engine_failure_rejects_without_document() {
    init_logging();
    let engine = ScriptedEngine::new(Script::Fail("malformed image"));
    let recognizer = TextRecognizer::new(engine);
    let err = recognizer
        .recognize(image(), vec![], Orientation::Up)
        .await
        .unwrap_err();
    assert!(matches!(err, RecognitionError::Engine(EngineError::Internal(_))));
    assert_eq!(err.to_string(), "malformed image");
    assert_eq!(recognizer.engine().calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn engine_panic_rejects_as_worker_failure() {
    init_logging();
    let recognizer = TextRecognizer::new(ScriptedEngine::new(Script::Panic));
    let err = recognizer
        .recognize(image(), vec![], Orientation::Up)
        .await
        .unwrap_err();
    assert!(matches!(err, RecognitionError::Worker(_)));
    assert!(err.to_string().contains("engine crashed"));
    assert_eq!(recognizer.engine().calls.load(Ordering::SeqCst), 1);

    // the recognizer stays usable after a failed pass
    let err = recognizer
        .recognize(image(), vec![], Orientation::Up)
        .await
        .unwrap_err();
    assert!(matches!(err, RecognitionError::Worker(_)));
    assert_eq!(recognizer.engine().calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn no_observations_resolve_with_empty_document() {
    init_logging();
    let recognizer = TextRecognizer::new(ScriptedEngine::new(Script::Lines(vec![])));
    let document = recognizer
        .recognize(image(), vec![], Orientation::Up)
        .await
        .unwrap();
    assert_eq!(document, RecognitionDocument::default());
    assert_eq!(document.to_json().unwrap(), r#"{"text":"","blocks":[]}"#);
}

#[tokio::test]
async fn rotated_images_use_upright_dimensions() {
    let line = ScriptedLine {
        candidates: vec![("x", 1.0)],
        boxes: vec![("x", Rect::new((0.0, 0.0), (1.0, 1.0)))],
    };
    let recognizer = TextRecognizer::new(ScriptedEngine::new(Script::Lines(vec![line])));
    let document = recognizer
        .recognize(image(), vec![], Orientation::Right)
        .await
        .unwrap();
    let rect = document.blocks[0].lines[0].elements[0].bounding_box;
    assert_eq!(
        rect,
        PixelRect {
            left: 0.0,
            top: 200.0,
            right: 100.0,
            bottom: 0.0
        }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_passes_keep_their_own_dimensions() {
    let line = ScriptedLine {
        candidates: vec![("x", 1.0)],
        boxes: vec![("x", Rect::new((0.0, 0.0), (1.0, 1.0)))],
    };
    let recognizer = TextRecognizer::new(ScriptedEngine::new(Script::Lines(vec![line])));

    let passes = (1..=16u32).map(|size| {
        let recognizer = recognizer.clone();
        tokio::spawn(async move {
            let document = recognizer
                .recognize(DynamicImage::new_rgb8(size, size * 2), vec![], Orientation::Up)
                .await
                .unwrap();
            (size, document.blocks[0].lines[0].elements[0].bounding_box)
        })
    });
    for pass in passes.collect::<Vec<_>>() {
        let (size, rect) = pass.await.unwrap();
        assert_eq!(rect.right, size as f64);
        assert_eq!(rect.top, (size * 2) as f64);
    }
}

#[test]
fn blocking_recognition_with_options() {
    init_logging();
    let recognizer = TextRecognizerBuilder::new()
        .max_candidates(1)
        .recognized_language("de")
        .vertical_origin(VerticalOrigin::TopLeft)
        .full_text(FullText::Joined)
        .build(ScriptedEngine::new(Script::Lines(receipt())));
    let document = recognizer
        .recognize_blocking(&image(), &["de-DE".to_string()], Orientation::Up)
        .unwrap();

    assert_eq!(document.text, "TOTAL 12.50\nthank  you");
    assert_eq!(document.blocks[0].lines.len(), 1);
    assert!(document.elements().all(|it| it.recognized_language == "de"));

    let total = &document.blocks[0].lines[0].elements[0];
    assert!((total.bounding_box.top - 10.0).abs() < 1e-9);
    assert!((total.bounding_box.bottom - 20.0).abs() < 1e-9);
}

#[test]
fn serialized_document_uses_wire_names() {
    let recognizer = TextRecognizer::new(ScriptedEngine::new(Script::Lines(receipt())));
    let document = recognizer
        .recognize_blocking(&image(), &[], Orientation::Up)
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&document.to_json().unwrap()).unwrap();
    let element = &value["blocks"][0]["lines"][0]["elements"][0];
    assert_eq!(element["text"], "TOTAL");
    assert_eq!(element["recognizedLanguage"], "eng");
    assert!(element["boundingBox"]["left"].is_number());
    assert!(element.get("bounding_box").is_none());
}

#[cfg(feature = "onnx")]
#[test]
#[ignore = "needs model files under tests/data"]
fn onnx_engine_recognizes_sample() {
    use ocrdoc::onnx::OnnxEngine;

    init_logging();
    let image = image::open("tests/data/test_image.png").expect("Failed to load test image");
    let cache = std::path::PathBuf::from(std::env!("CARGO_TARGET_TMPDIR")).join(".engine_cache");
    std::fs::create_dir_all(&cache).expect("Failed to create temp dir");
    let engine = OnnxEngine::builder()
        .det_model("tests/data/models/det.onnx")
        .cls_model("tests/data/models/cls.onnx")
        .rec_model(
            "tests/data/models/rec.onnx",
            "tests/data/models/ppocr_keys_v1.txt",
        )
        .with_engine_cache_path(cache)
        .max_side_len(2048)
        .build()
        .expect("Failed to build engine");
    let document = TextRecognizerBuilder::new()
        .full_text(FullText::Joined)
        .build(engine)
        .recognize_blocking(&image, &[], Orientation::Up)
        .expect("Failed recognition.");
    assert!(document.blocks.len() > 1);
    assert!(document
        .text
        .lines()
        .any(|it| it == "不行，头好痛-接下来要处理的事情太多了，现在必须好好休息·！"));
}
