//! Prompts for VLM-based page transcription.
//!
//! Centralising every prompt here keeps prompt changes in one place and lets
//! unit tests inspect them without a live model.
//!
//! Each request carries two pieces of text: the system prompt (who the model
//! is and the output rules) and a per-page instruction chosen by
//! [`InstructionPolicy`]. The default policy assumes a bound book whose
//! marginal notes sit in the outer margin, so they switch sides between
//! odd (recto) and even (verso) pages.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default system prompt for transcribing a scanned page image.
///
/// Used when `BatchConfig::system_prompt` is `None`.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an expert transcriber of scanned printed books. You receive one image of one page and return its text.

Follow these rules precisely:

1. FIDELITY
   - Transcribe ALL printed text exactly as it appears, in reading order
   - Keep the original spelling, punctuation, capitalisation and archaic forms
   - Do not translate, summarise, modernise or correct the text
   - If a word is illegible, write [illegible] in its place

2. STRUCTURE
   - Keep paragraph breaks; join lines that were only broken by the page width
   - Re-join words hyphenated across a line break
   - Mark headings with # (chapter) and ## (section)
   - Keep footnotes at the end, prefixed with their printed marker

3. WHAT TO IGNORE
   - Running heads and page numbers
   - Printer's marks, catchwords and signature marks
   - Stains, scanner artefacts and library stamps

4. OUTPUT FORMAT
   - Output ONLY the transcription
   - Do NOT wrap it in ``` fences
   - Do NOT add commentary or explanations"#;

/// Instruction for odd-numbered (recto) pages: marginal notes on the right.
pub const ODD_PAGE_INSTRUCTION: &str = r#"Transcribe this page. It is an odd-numbered (right-hand) page, so marginal notes are printed in the RIGHT margin. Place each marginal note on its own line, wrapped in > [margin: ...], immediately before the paragraph it stands beside."#;

/// Instruction for even-numbered (verso) pages: marginal notes on the left.
pub const EVEN_PAGE_INSTRUCTION: &str = r#"Transcribe this page. It is an even-numbered (left-hand) page, so marginal notes are printed in the LEFT margin. Place each marginal note on its own line, wrapped in > [margin: ...], immediately before the paragraph it stands beside."#;

/// Instruction used by [`InstructionPolicy::Uniform`] when no custom text is given.
pub const UNIFORM_PAGE_INSTRUCTION: &str = r#"Transcribe this page. If there are marginal notes, place each one on its own line, wrapped in > [margin: ...], immediately before the paragraph it stands beside."#;

/// How the per-page instruction is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstructionPolicy {
    /// Alternate between two instructions by page parity (1-indexed).
    MirroredMargins { odd: String, even: String },
    /// Same instruction for every page.
    Uniform(String),
}

impl Default for InstructionPolicy {
    fn default() -> Self {
        InstructionPolicy::MirroredMargins {
            odd: ODD_PAGE_INSTRUCTION.to_string(),
            even: EVEN_PAGE_INSTRUCTION.to_string(),
        }
    }
}

impl InstructionPolicy {
    pub fn uniform() -> Self {
        InstructionPolicy::Uniform(UNIFORM_PAGE_INSTRUCTION.to_string())
    }

    /// Instruction for a 1-indexed page number.
    pub fn instruction_for(&self, page_number: usize) -> &str {
        match self {
            InstructionPolicy::MirroredMargins { odd, even } => {
                if page_number % 2 == 1 {
                    odd
                } else {
                    even
                }
            }
            InstructionPolicy::Uniform(text) => text,
        }
    }
}

static RE_TRAILING_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)$").unwrap());

/// Page number encoded in an image file name, e.g. `book_p0012.png` → 12.
///
/// Takes the trailing digits of the file stem; `None` when there are none.
pub fn page_number_from_path(path: &Path) -> Option<usize> {
    let stem = path.file_stem()?.to_str()?;
    RE_TRAILING_NUMBER
        .captures(stem)
        .and_then(|c| c[1].parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirrored_policy_alternates() {
        let policy = InstructionPolicy::default();
        assert_eq!(policy.instruction_for(1), ODD_PAGE_INSTRUCTION);
        assert_eq!(policy.instruction_for(2), EVEN_PAGE_INSTRUCTION);
        assert_eq!(policy.instruction_for(37), ODD_PAGE_INSTRUCTION);
        assert!(policy.instruction_for(1).contains("RIGHT"));
        assert!(policy.instruction_for(2).contains("LEFT"));
    }

    #[test]
    fn uniform_policy_ignores_parity() {
        let policy = InstructionPolicy::Uniform("read it".into());
        assert_eq!(policy.instruction_for(1), "read it");
        assert_eq!(policy.instruction_for(2), "read it");
    }

    #[test]
    fn page_numbers_from_file_names() {
        assert_eq!(page_number_from_path(Path::new("out/book_p0012.png")), Some(12));
        assert_eq!(page_number_from_path(Path::new("scan-7.PNG")), Some(7));
        assert_eq!(page_number_from_path(Path::new("cover.png")), None);
        assert_eq!(page_number_from_path(Path::new("v2_intro.jpg")), None);
    }

    #[test]
    fn system_prompt_forbids_fences() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains("Do NOT wrap"));
    }
}
