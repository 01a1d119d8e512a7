// Local OCR backend: on-device text recognition behind a shared engine

use super::{BackendError, ImageInput, RawDetection, TextDetectionBackend};

const BACKEND_NAME: &str = "local_ocr";

/// Adapter for the on-device recognition engine. The engine itself is a
/// process-wide singleton (expensive to initialize) owned by a dedicated
/// thread; this struct is just the per-pipeline handle.
pub struct LocalTextRecognitionBackend;

impl LocalTextRecognitionBackend {
    pub fn new() -> Result<Self, BackendError> {
        Ok(Self)
    }
}

impl TextDetectionBackend for LocalTextRecognitionBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn detect(&self, image: &ImageInput) -> Result<Vec<RawDetection>, BackendError> {
        detect_impl(image).await
    }
}

#[cfg(feature = "local-ocr")]
async fn detect_impl(image: &ImageInput) -> Result<Vec<RawDetection>, BackendError> {
    engine::recognize(image.bytes.clone()).await
}

#[cfg(not(feature = "local-ocr"))]
async fn detect_impl(image: &ImageInput) -> Result<Vec<RawDetection>, BackendError> {
    let _ = image;
    Err(BackendError::Unavailable(
        "local text recognition was not compiled in (enable the local-ocr feature)".to_string(),
    ))
}

/// Release the shared recognition engine. Idempotent; the next detection
/// lazily re-creates it.
pub fn release_local_engine() {
    #[cfg(feature = "local-ocr")]
    engine::release();
}

/// Fix classic recognition confusions (0/O, 5/S, 1/I) inside words that are
/// mostly letters. Words that are mostly digits keep their digits, so titles
/// like "2001: A Space Odyssey" or "Se7en" come through intact. This is this
/// backend's own pre-processing step; the shared normalizer never rewrites
/// characters.
pub fn correct_ocr_confusions(line: &str) -> String {
    line.split(' ')
        .map(correct_word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn correct_word(word: &str) -> String {
    let letters = word.chars().filter(|c| c.is_alphabetic()).count();
    let digits = word.chars().filter(|c| c.is_ascii_digit()).count();
    if digits == 0 || letters < digits {
        return word.to_string();
    }
    word.chars()
        .map(|c| match c {
            '0' => 'O',
            '5' => 'S',
            '1' => 'I',
            other => other,
        })
        .collect()
}

#[cfg(feature = "local-ocr")]
mod engine {
    use super::super::{BackendError, RawDetection};
    use super::{BACKEND_NAME, correct_ocr_confusions};
    use std::sync::mpsc;
    use std::sync::{Mutex, OnceLock};

    struct Request {
        bytes: Vec<u8>,
        reply: mpsc::Sender<Result<Vec<RawDetection>, BackendError>>,
    }

    /// Handle to the engine thread. Dropping the sender (release) makes the
    /// thread drain and exit.
    struct EngineHandle {
        tx: mpsc::Sender<Request>,
    }

    fn slot() -> &'static Mutex<Option<EngineHandle>> {
        static SLOT: OnceLock<Mutex<Option<EngineHandle>>> = OnceLock::new();
        SLOT.get_or_init(|| Mutex::new(None))
    }

    /// Run one recognition pass on the shared engine, off the async runtime.
    pub async fn recognize(bytes: Vec<u8>) -> Result<Vec<RawDetection>, BackendError> {
        tokio::task::spawn_blocking(move || {
            let (reply_tx, reply_rx) = mpsc::channel();
            {
                let mut guard = slot()
                    .lock()
                    .map_err(|_| BackendError::Unavailable("engine state poisoned".to_string()))?;
                let handle = guard.get_or_insert_with(spawn_engine_thread);
                handle
                    .tx
                    .send(Request {
                        bytes,
                        reply: reply_tx,
                    })
                    .map_err(|_| {
                        BackendError::Unavailable("engine thread terminated".to_string())
                    })?;
            }
            reply_rx
                .recv()
                .map_err(|_| BackendError::Unavailable("engine thread terminated".to_string()))?
        })
        .await
        .map_err(|e| BackendError::Unavailable(format!("recognition task failed: {e}")))?
    }

    /// Drop the engine. Idempotent.
    pub fn release() {
        if let Ok(mut guard) = slot().lock() {
            if guard.take().is_some() {
                log::info!("released local text recognition engine");
            }
        }
    }

    fn spawn_engine_thread() -> EngineHandle {
        let (tx, rx) = mpsc::channel::<Request>();
        std::thread::spawn(move || run_engine(rx));
        EngineHandle { tx }
    }

    fn run_engine(rx: mpsc::Receiver<Request>) {
        let mut engine: Option<tesseract::Tesseract> = None;
        for request in rx {
            let result = recognize_one(&mut engine, &request.bytes);
            let _ = request.reply.send(result);
        }
        log::debug!("local OCR engine thread exiting");
    }

    fn recognize_one(
        engine: &mut Option<tesseract::Tesseract>,
        bytes: &[u8],
    ) -> Result<Vec<RawDetection>, BackendError> {
        let current = match engine.take() {
            Some(existing) => existing,
            None => {
                log::info!("initializing local text recognition engine");
                tesseract::Tesseract::new(None, Some("eng")).map_err(|e| {
                    BackendError::Unavailable(format!("engine init failed: {e}"))
                })?
            }
        };

        let mut loaded = current
            .set_image_from_mem(bytes)
            .map_err(|e| BackendError::MalformedResponse(format!("image rejected: {e}")))?;
        let text = loaded
            .get_text()
            .map_err(|e| BackendError::MalformedResponse(format!("recognition failed: {e}")))?;
        let confidence = (loaded.mean_text_conf().clamp(0, 100) as f32) / 100.0;

        // Keep the initialized engine for the next request.
        *engine = Some(loaded);

        Ok(lines_to_detections(&text, confidence))
    }

    fn lines_to_detections(text: &str, confidence: f32) -> Vec<RawDetection> {
        text.lines()
            .map(str::trim)
            .filter(|line| line.chars().count() >= 2)
            .map(|line| RawDetection {
                text: correct_ocr_confusions(line),
                backend_confidence: confidence,
                backend_name: BACKEND_NAME,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_confusions_in_letter_heavy_words() {
        assert_eq!(correct_ocr_confusions("G0LDFINGER"), "GOLDFINGER");
        assert_eq!(correct_ocr_confusions("M1SSION IMP0SSIBLE"), "MISSION IMPOSSIBLE");
        assert_eq!(correct_ocr_confusions("5NATCH"), "SNATCH");
    }

    #[test]
    fn keeps_digits_in_digit_heavy_words() {
        assert_eq!(correct_ocr_confusions("2001: A Space Odyssey"), "2001: A Space Odyssey");
        assert_eq!(correct_ocr_confusions("Apollo 13"), "Apollo 13");
        assert_eq!(correct_ocr_confusions("300"), "300");
    }

    #[test]
    fn unmapped_digits_pass_through() {
        assert_eq!(correct_ocr_confusions("Se7en"), "Se7en");
    }

    #[cfg(not(feature = "local-ocr"))]
    #[tokio::test]
    async fn detect_reports_unavailable_without_the_feature() {
        let backend = LocalTextRecognitionBackend::new().unwrap();
        let error = backend
            .detect(&ImageInput::new(vec![1, 2, 3]))
            .await
            .unwrap_err();
        assert!(matches!(error, BackendError::Unavailable(_)));
    }
}
