use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// One timestamped transcript fragment. Order within a request is significant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start offset in seconds.
    pub start: f64,
    /// End offset in seconds.
    pub end: f64,
    pub text: String,
}

impl Segment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

/// Optional output sections the caller can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteFormat {
    /// Table of contents built from `##` headings.
    Toc,
    /// Timestamp jump markers after section titles.
    Link,
    /// Screenshot markers placed from the attached frame grid.
    Screenshot,
    /// Closing AI summary section.
    Summary,
}

/// Writing style of the generated note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteStyle {
    Minimal,
    #[default]
    Detailed,
    Academic,
    Tutorial,
    Xiaohongshu,
    LifeJournal,
    TaskOriented,
    Business,
    MeetingMinutes,
}

impl std::fmt::Display for NoteStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NoteStyle::Minimal => "minimal",
            NoteStyle::Detailed => "detailed",
            NoteStyle::Academic => "academic",
            NoteStyle::Tutorial => "tutorial",
            NoteStyle::Xiaohongshu => "xiaohongshu",
            NoteStyle::LifeJournal => "life_journal",
            NoteStyle::TaskOriented => "task_oriented",
            NoteStyle::Business => "business",
            NoteStyle::MeetingMinutes => "meeting_minutes",
        };
        f.write_str(name)
    }
}

/// Everything needed to produce one note. Read-only to the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceRequest {
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub format_options: BTreeSet<NoteFormat>,
    #[serde(default)]
    pub style: NoteStyle,
    #[serde(default)]
    pub extras: Option<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub screenshot: bool,
    #[serde(default)]
    pub link: bool,
}

impl SourceRequest {
    pub fn new(title: impl Into<String>, segments: Vec<Segment>) -> Self {
        Self {
            title: title.into(),
            segments,
            ..Default::default()
        }
    }

    /// Derive a request for `segments[range]`, labelled as part `part` of `total`.
    ///
    /// Parts never carry images, screenshot/link markers or format options;
    /// only the merge pass renders those.
    pub fn chunk(&self, range: std::ops::Range<usize>, part: usize, total: usize) -> Self {
        Self {
            title: format!("{} - part {}/{}", self.title, part, total),
            tags: self.tags.clone(),
            segments: self.segments[range].to_vec(),
            format_options: BTreeSet::new(),
            style: self.style,
            extras: Some(format!(
                "This is part {part} of {total} of the content. Summarize only the key points \
                 of this part, without an introduction or conclusion."
            )),
            image_urls: Vec::new(),
            screenshot: false,
            link: false,
        }
    }

    /// Derive the synthesis request whose single segment holds the joined part summaries.
    pub fn merge(&self, joined_summaries: String) -> Self {
        Self {
            title: self.title.clone(),
            tags: self.tags.clone(),
            segments: vec![Segment::new(0.0, 0.0, joined_summaries)],
            format_options: self.format_options.clone(),
            style: self.style,
            extras: Some(
                "The following are summaries of consecutive parts of one source. Integrate them \
                 into a single complete and coherent note."
                    .to_string(),
            ),
            image_urls: Vec::new(),
            screenshot: self.screenshot,
            link: self.link,
        }
    }
}
