//! Prompt assembly. The pipeline treats the result as an opaque text blob.

use std::collections::BTreeSet;

use notewise_core::{NoteFormat, NoteStyle, SourceRequest};

/// Extras at least this long demote format and style instructions to supplementary notes.
const LONG_EXTRAS_CHARS: usize = 100;

/// Inputs available to a prompt builder.
#[derive(Debug, Clone)]
pub struct PromptInput<'a> {
    pub title: &'a str,
    pub rendered_segments: &'a str,
    pub tags: &'a [String],
    pub format_options: &'a BTreeSet<NoteFormat>,
    pub style: NoteStyle,
    pub extras: Option<&'a str>,
    pub screenshot: bool,
    pub link: bool,
}

impl<'a> PromptInput<'a> {
    pub fn from_request(request: &'a SourceRequest, rendered_segments: &'a str) -> Self {
        Self {
            title: &request.title,
            rendered_segments,
            tags: &request.tags,
            format_options: &request.format_options,
            style: request.style,
            extras: request.extras.as_deref(),
            screenshot: request.screenshot,
            link: request.link,
        }
    }
}

/// Builds the instruction text sent with every request. Must not fail.
pub trait PromptBuilder: Send + Sync {
    fn build_prompt(&self, input: &PromptInput<'_>) -> String;
}

/// Default note-taking prompt with per-format and per-style instructions.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplatePromptBuilder;

impl PromptBuilder for TemplatePromptBuilder {
    fn build_prompt(&self, input: &PromptInput<'_>) -> String {
        let mut prompt = base_prompt(input);
        let extras = input.extras.map(str::trim).filter(|e| !e.is_empty());

        // Dedicated briefs replace the generic format/style instructions.
        if let Some(brief) = dedicated_brief(input.style) {
            prompt.push_str(&format!("\n\n**{} (highest priority):**\n{}\n", brief.0, brief.1));
            if let Some(extras) = extras {
                prompt.push_str(&format!("\n**Additional user requirements:**\n{}\n", extras));
            }
            return prompt;
        }

        if let Some(extras) = extras {
            prompt.push_str(&format!(
                "\n\n**User requirements (highest priority):**\n{}\n\
                 \nFollow these requirements strictly; where they conflict with the default format, they win.\n",
                extras
            ));
        }
        let long_extras = extras.is_some_and(|e| e.chars().count() >= LONG_EXTRAS_CHARS);

        let formats = effective_formats(input);
        if !formats.is_empty() {
            let instructions = formats
                .iter()
                .map(|f| format_instruction(*f))
                .collect::<Vec<_>>()
                .join("\n");
            if long_extras {
                prompt.push_str(&format!(
                    "\n\n**Supplementary format requirements:**\n{}",
                    instructions
                ));
            } else {
                prompt.push('\n');
                prompt.push_str(&instructions);
            }
        }

        let style = style_instruction(input.style);
        if !style.is_empty() {
            if long_extras {
                prompt.push_str(&format!("\n\n**Style reference:**\n{}", style));
            } else {
                prompt.push('\n');
                prompt.push_str(style);
            }
        }

        prompt
    }
}

fn base_prompt(input: &PromptInput<'_>) -> String {
    let tags = if input.tags.is_empty() {
        "(none)".to_string()
    } else {
        input.tags.join(", ")
    };
    format!(
        "You are a careful note-taking assistant. Turn the transcript below into a well \
         structured Markdown note.\n\n\
         Title: {}\nTags: {}\n\n\
         Transcript (one `mm:ss - text` line per segment):\n---\n{}\n---\n\n\
         Rules:\n\
         1. Keep the original order of ideas and do not invent facts.\n\
         2. Use `##` headings for the main sections and bullet points for details.\n\
         3. Keep technical terms, names and numbers exactly as spoken.",
        input.title, tags, input.rendered_segments
    )
}

/// Screenshot and link flags imply their format instruction.
fn effective_formats(input: &PromptInput<'_>) -> BTreeSet<NoteFormat> {
    let mut formats = input.format_options.clone();
    if input.screenshot {
        formats.insert(NoteFormat::Screenshot);
    }
    if input.link {
        formats.insert(NoteFormat::Link);
    }
    formats
}

fn format_instruction(format: NoteFormat) -> &'static str {
    match format {
        NoteFormat::Toc => {
            "- **Table of contents**: generate a table of contents from the `##` headings, \
             without jump markers."
        }
        NoteFormat::Link => {
            "- **Timestamp links**: end every main section title with a marker in the form \
             `*Content-[mm:ss]`, title first and marker after it."
        }
        NoteFormat::Screenshot => {
            "- **Screenshots**: the attached images are frame grids with an `mm:ss` label in each \
             cell. Where a frame helps understanding, insert a marker in the exact form \
             `*Screenshot-[mm:ss]`."
        }
        NoteFormat::Summary => {
            "- **AI summary**: finish with a short section titled `## AI Summary`."
        }
    }
}

fn style_instruction(style: NoteStyle) -> &'static str {
    match style {
        NoteStyle::Academic => "Style: academic; formal, precise and well structured.",
        NoteStyle::Xiaohongshu => {
            "Style: lively social-media post; catchy title, short punchy paragraphs, emoji \
             accents and a clear call to save the note."
        }
        NoteStyle::LifeJournal => "Style: personal journal; reflective and warm.",
        NoteStyle::TaskOriented => {
            "Style: task oriented; lead with goals, action items and owners."
        }
        NoteStyle::Business => "Style: business report; formal, concise and decision focused.",
        NoteStyle::MeetingMinutes => {
            "Style: meeting minutes; attendees if known, decisions, action items, open questions."
        }
        // Covered by dedicated briefs.
        NoteStyle::Minimal | NoteStyle::Detailed | NoteStyle::Tutorial => "",
    }
}

fn dedicated_brief(style: NoteStyle) -> Option<(&'static str, &'static str)> {
    match style {
        NoteStyle::Minimal => Some((
            "Concise extraction task",
            "Extract only the core ideas. One heading per topic, at most five bullets each, \
             no filler, no repetition.",
        )),
        NoteStyle::Detailed => Some((
            "Detailed analysis task",
            "Cover every topic thoroughly: definitions, arguments, examples, numbers and \
             conclusions. Preserve nuance and explain how the ideas connect.",
        )),
        NoteStyle::Tutorial => Some((
            "Tutorial code extraction task",
            "Reconstruct every step of the tutorial in order. Put all code, commands and \
             configuration in fenced blocks with a language tag, and explain each step briefly.",
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(
        formats: &'a BTreeSet<NoteFormat>,
        tags: &'a [String],
        style: NoteStyle,
        extras: Option<&'a str>,
    ) -> PromptInput<'a> {
        PromptInput {
            title: "Async Rust",
            rendered_segments: "00:01 - hello",
            tags,
            format_options: formats,
            style,
            extras,
            screenshot: false,
            link: false,
        }
    }

    #[test]
    fn base_contains_title_tags_and_transcript() {
        let formats = BTreeSet::new();
        let tags = vec!["rust".to_string(), "tokio".to_string()];
        let prompt = TemplatePromptBuilder.build_prompt(&input(
            &formats,
            &tags,
            NoteStyle::Academic,
            None,
        ));
        assert!(prompt.contains("Title: Async Rust"));
        assert!(prompt.contains("Tags: rust, tokio"));
        assert!(prompt.contains("00:01 - hello"));
        assert!(prompt.contains("academic"));
    }

    #[test]
    fn dedicated_style_ignores_formats() {
        let formats: BTreeSet<_> = [NoteFormat::Toc].into_iter().collect();
        let prompt = TemplatePromptBuilder.build_prompt(&input(
            &formats,
            &[],
            NoteStyle::Tutorial,
            Some("show cargo commands"),
        ));
        assert!(prompt.contains("Tutorial code extraction task"));
        assert!(prompt.contains("Additional user requirements"));
        assert!(!prompt.contains("Table of contents"));
    }

    #[test]
    fn long_extras_demote_formats() {
        let formats: BTreeSet<_> = [NoteFormat::Summary].into_iter().collect();
        let long = "x".repeat(120);
        let prompt = TemplatePromptBuilder.build_prompt(&input(
            &formats,
            &[],
            NoteStyle::Business,
            Some(&long),
        ));
        assert!(prompt.contains("User requirements (highest priority)"));
        assert!(prompt.contains("Supplementary format requirements"));
        assert!(prompt.contains("Style reference"));
    }

    #[test]
    fn flags_imply_format_instructions() {
        let formats = BTreeSet::new();
        let mut inp = input(&formats, &[], NoteStyle::Business, None);
        inp.screenshot = true;
        inp.link = true;
        let prompt = TemplatePromptBuilder.build_prompt(&inp);
        assert!(prompt.contains("*Screenshot-[mm:ss]"));
        assert!(prompt.contains("*Content-[mm:ss]"));
    }
}
