pub mod gemini;

use log::warn;

use crate::error::Result;

pub use gemini::GeminiClient;

/// Summary text used when the model call fails.
pub const SUMMARY_FAILED: &str = "- Summary generation failed";

/// Text in, text out. One blocking call per prompt.
pub trait TextGenerator {
    fn generate(&self, prompt: &str) -> Result<String>;
}

impl<G: TextGenerator + ?Sized> TextGenerator for &G {
    fn generate(&self, prompt: &str) -> Result<String> {
        (**self).generate(prompt)
    }
}

impl<G: TextGenerator + ?Sized> TextGenerator for Box<G> {
    fn generate(&self, prompt: &str) -> Result<String> {
        (**self).generate(prompt)
    }
}

pub fn build_prompt(subject: &str, body: &str) -> String {
    format!(
        "Summarize the following email in 3-5 concise bullet points.\n\
         Focus on key information, action items, and important details.\n\
         \n\
         Subject: {subject}\n\
         \n\
         Body:\n\
         {body}\n\
         \n\
         Provide the summary as bullet points (use - for bullets)."
    )
}

pub struct Summarizer<G> {
    generator: G,
}

impl<G: TextGenerator> Summarizer<G> {
    pub fn new(generator: G) -> Self {
        Self { generator }
    }

    /// Bullet-point summary of one message. No retries.
    pub fn summarize(&self, subject: &str, body: &str) -> String {
        match self.generator.generate(&build_prompt(subject, body)) {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                warn!("model returned an empty summary for {subject:?}");
                SUMMARY_FAILED.to_string()
            }
            Err(e) => {
                warn!("could not generate summary for {subject:?}: {e}");
                SUMMARY_FAILED.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::cell::RefCell;

    struct Recorder {
        prompts: RefCell<Vec<String>>,
        reply: Option<&'static str>,
    }

    impl TextGenerator for Recorder {
        fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.borrow_mut().push(prompt.to_string());
            self.reply
                .map(str::to_string)
                .ok_or_else(|| Error::Summarize("quota exceeded".into()))
        }
    }

    fn recorder(reply: Option<&'static str>) -> Recorder {
        Recorder {
            prompts: RefCell::new(Vec::new()),
            reply,
        }
    }

    #[test]
    fn test_prompt_embeds_subject_and_body_verbatim() {
        let prompt = build_prompt("Q3 *planning*", "line one\n  line two");
        assert!(prompt.contains("Subject: Q3 *planning*\n"));
        assert!(prompt.contains("Body:\nline one\n  line two\n"));
        assert!(prompt.contains("3-5"));
        assert!(prompt.contains("use - for bullets"));
        assert_eq!(prompt, build_prompt("Q3 *planning*", "line one\n  line two"));
    }

    #[test]
    fn test_summary_is_trimmed() {
        let summarizer = Summarizer::new(recorder(Some("\n- one\n- two\n\n")));
        assert_eq!(summarizer.summarize("s", "b"), "- one\n- two");
    }

    #[test]
    fn test_failure_becomes_sentinel() {
        let generator = recorder(None);
        let summarizer = Summarizer::new(&generator);
        assert_eq!(summarizer.summarize("s", "b"), SUMMARY_FAILED);
        assert_eq!(generator.prompts.borrow().len(), 1, "no retry expected");
    }

    #[test]
    fn test_blank_reply_becomes_sentinel() {
        let summarizer = Summarizer::new(recorder(Some("   \n")));
        assert_eq!(summarizer.summarize("s", "b"), SUMMARY_FAILED);
    }
}
