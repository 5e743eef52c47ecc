//! Slack Block Kit message types.
//!
//! Templates render to a JSON array of blocks, which is parsed into
//! [`MessageDocument`] and wrapped in a colored [`Attachment`] for delivery.

use serde::{Deserialize, Serialize};

/// A text object inside a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TextObject {
    #[serde(rename = "mrkdwn")]
    Markdown {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        verbatim: Option<bool>,
    },
    #[serde(rename = "plain_text")]
    PlainText {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        emoji: Option<bool>,
    },
}

impl TextObject {
    /// Markdown text without options.
    #[must_use]
    pub fn markdown(text: impl Into<String>) -> Self {
        Self::Markdown {
            text: text.into(),
            verbatim: None,
        }
    }

    /// Plain text without options.
    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        Self::PlainText {
            text: text.into(),
            emoji: None,
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Markdown { text, .. } | Self::PlainText { text, .. } => text,
        }
    }
}

/// Button visual style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonStyle {
    Primary,
    Danger,
}

/// A clickable button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonElement {
    pub text: TextObject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<ButtonStyle>,
}

/// An image element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageElement {
    pub image_url: String,
    pub alt_text: String,
}

/// Interactive or decorative element used as a section accessory or in an actions block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Element {
    Button(ButtonElement),
    Image(ImageElement),
}

/// Element of a context block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContextElement {
    #[serde(rename = "mrkdwn")]
    Markdown { text: String },
    #[serde(rename = "plain_text")]
    PlainText { text: String },
    #[serde(rename = "image")]
    Image(ImageElement),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextObject>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<TextObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessory: Option<Element>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DividerBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionsBlock {
    pub elements: Vec<Element>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderBlock {
    pub text: TextObject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBlock {
    pub elements: Vec<ContextElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,
}

/// One visual unit of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section(SectionBlock),
    Divider(DividerBlock),
    Actions(ActionsBlock),
    Header(HeaderBlock),
    Context(ContextBlock),
}

impl Block {
    /// All human-visible text carried by this block, in display order.
    fn collect_text<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Section(section) => {
                out.extend(section.text.iter().map(TextObject::text));
                out.extend(section.fields.iter().map(TextObject::text));
                if let Some(Element::Button(button)) = &section.accessory {
                    out.push(button.text.text());
                }
            }
            Self::Actions(actions) => {
                for element in &actions.elements {
                    if let Element::Button(button) = element {
                        out.push(button.text.text());
                    }
                }
            }
            Self::Header(header) => out.push(header.text.text()),
            Self::Context(context) => {
                for element in &context.elements {
                    match element {
                        ContextElement::Markdown { text } | ContextElement::PlainText { text } => {
                            out.push(text);
                        }
                        ContextElement::Image(_) => {}
                    }
                }
            }
            Self::Divider(_) => {}
        }
    }
}

/// The ordered block sequence produced by one template rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageDocument(Vec<Block>);

impl MessageDocument {
    #[must_use]
    pub fn new(blocks: Vec<Block>) -> Self {
        Self(blocks)
    }

    /// Parse a rendered JSON block array.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every piece of visible text, block by block.
    #[must_use]
    pub fn texts(&self) -> Vec<&str> {
        let mut out = vec![];
        for block in &self.0 {
            block.collect_text(&mut out);
        }
        out
    }
}

/// Colored wrapper around the message blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub color: String,
    pub blocks: MessageDocument,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

/// Payload posted to an incoming webhook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}
