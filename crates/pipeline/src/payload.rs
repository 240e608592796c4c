//! Request payload assembly: prompt + rendered transcript + reference images.

use std::sync::Arc;

use notewise_core::SourceRequest;
use notewise_llm::{ContentPart, Message, Role};

use crate::prompt::{PromptBuilder, PromptInput};
use crate::render::render_segments;

/// Inserted between the kept head and tail of over-long text.
pub const ELISION_MARKER: &str = "\n\n[... content too long, middle section omitted ...]\n\n";

/// Share of the cap kept from the start of the text.
const HEAD_RATIO: f64 = 0.3;

/// Shorten `text` to exactly `cap` characters by cutting out the middle.
///
/// Text at or under the cap is returned unchanged. Lengths are counted in
/// Unicode scalar values so a cut never splits a character.
pub fn truncate_middle(text: &str, cap: usize) -> String {
    let len = text.chars().count();
    if len <= cap {
        return text.to_string();
    }

    let marker_len = ELISION_MARKER.chars().count();
    let head = (cap as f64 * HEAD_RATIO).floor() as usize;
    if cap < head + marker_len {
        return text.chars().take(cap).collect();
    }
    let tail = cap - head - marker_len;

    let mut out = String::with_capacity(text.len().min(cap * 4));
    out.extend(text.chars().take(head));
    out.push_str(ELISION_MARKER);
    out.extend(text.chars().skip(len - tail));
    out
}

/// One request body: the text block and the images attached to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub text_block: String,
    pub images: Vec<String>,
}

impl Payload {
    /// A single user message: the text part first, then one part per image.
    pub fn to_messages(&self) -> Vec<Message> {
        let mut content = Vec::with_capacity(1 + self.images.len());
        content.push(ContentPart::text(self.text_block.clone()));
        content.extend(self.images.iter().map(ContentPart::image));
        vec![Message {
            role: Role::User,
            content,
        }]
    }

    /// Byte length of the serialized message list, as it would go on the wire.
    pub fn serialized_len(&self) -> usize {
        serde_json::to_vec(&self.to_messages())
            .map(|bytes| bytes.len())
            .unwrap_or(usize::MAX)
    }
}

/// Turns a [`SourceRequest`] into a [`Payload`]. Never fails.
#[derive(Clone)]
pub struct PayloadBuilder {
    prompt: Arc<dyn PromptBuilder>,
    max_content_length: usize,
    max_images: usize,
}

impl PayloadBuilder {
    pub fn new(
        prompt: Arc<dyn PromptBuilder>,
        max_content_length: usize,
        max_images: usize,
    ) -> Self {
        Self {
            prompt,
            max_content_length,
            max_images,
        }
    }

    /// The cap applies to the assembled prompt, extras and instructions included.
    pub fn build(&self, request: &SourceRequest) -> Payload {
        let rendered = render_segments(&request.segments);
        let prompt = self
            .prompt
            .build_prompt(&PromptInput::from_request(request, &rendered));
        let text_block = truncate_middle(&prompt, self.max_content_length);
        if text_block != prompt {
            tracing::debug!(
                chars = prompt.chars().count(),
                cap = self.max_content_length,
                "prompt over content limit, middle elided"
            );
        }

        if request.image_urls.len() > self.max_images {
            tracing::debug!(
                supplied = request.image_urls.len(),
                kept = self.max_images,
                "dropping surplus images"
            );
        }
        let images = request
            .image_urls
            .iter()
            .take(self.max_images)
            .cloned()
            .collect();

        Payload { text_block, images }
    }
}

impl std::fmt::Debug for PayloadBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadBuilder")
            .field("max_content_length", &self.max_content_length)
            .field("max_images", &self.max_images)
            .finish_non_exhaustive()
    }
}
