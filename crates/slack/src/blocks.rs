use intake_core::{FieldKind, FieldOption, ResolvedField, ResolvedForm};
use serde::Serialize;

/// Slack rejects static selects with more options than this.
pub const MAX_SELECT_OPTIONS: usize = 100;
/// Slack's character limits for an option's `text` and `value`.
pub const MAX_OPTION_TEXT_CHARS: usize = 75;
pub const MAX_OPTION_VALUE_CHARS: usize = 150;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    #[serde(rename = "plain_text")]
    Plain { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { block_id: String, text: TextObject },
    Context { block_id: String, elements: Vec<TextObject> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub text: TextObject,
    pub value: String,
}

impl From<&FieldOption> for SelectOption {
    /// Long labels are shortened with an ellipsis. The value is kept whole up to
    /// Slack's limit since it is written back to the record store verbatim.
    fn from(option: &FieldOption) -> Self {
        Self {
            text: TextObject::plain(ellipsize(&option.label, MAX_OPTION_TEXT_CHARS)),
            value: option.value.chars().take(MAX_OPTION_VALUE_CHARS).collect(),
        }
    }
}

fn ellipsize(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let mut shortened = text.chars().take(max_chars.saturating_sub(1)).collect::<String>();
    shortened.push('…');
    shortened
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputElement {
    StaticSelect { action_id: String, options: Vec<SelectOption> },
    PlainTextInput { action_id: String, multiline: bool },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InputBlock {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub block_id: String,
    pub label: TextObject,
    pub element: InputElement,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ModalView {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub callback_id: String,
    pub title: TextObject,
    pub submit: TextObject,
    pub close: TextObject,
    pub blocks: Vec<InputBlock>,
}

pub fn modal_view(form: &ResolvedForm) -> ModalView {
    let definition = &form.definition;
    ModalView {
        kind: "modal",
        callback_id: definition.callback_id.clone(),
        title: TextObject::plain(definition.title.clone()),
        submit: TextObject::plain(definition.submit_label.clone()),
        close: TextObject::plain(definition.close_label.clone()),
        blocks: form.fields.iter().map(input_block).collect(),
    }
}

fn input_block(resolved: &ResolvedField) -> InputBlock {
    let field = &resolved.field;
    let element = match field.kind {
        FieldKind::SingleSelect { .. } => InputElement::StaticSelect {
            action_id: field.action_id(),
            options: resolved.options.iter().take(MAX_SELECT_OPTIONS).map(SelectOption::from).collect(),
        },
        FieldKind::SingleLineText => {
            InputElement::PlainTextInput { action_id: field.action_id(), multiline: false }
        }
        FieldKind::MultiLineText => {
            InputElement::PlainTextInput { action_id: field.action_id(), multiline: true }
        }
    };

    InputBlock {
        kind: "input",
        block_id: field.block_id(),
        label: TextObject::plain(field.label.clone()),
        element,
    }
}

pub fn confirmation_message(request_type: &str, title: &str) -> MessageTemplate {
    let text = format!("Your *{request_type}* request \"{title}\" has been added to the Notion database.");
    MessageBuilder::new(text.clone())
        .section("intake.confirmation.v1", |section| {
            section.mrkdwn(text);
        })
        .build()
}

pub fn failure_message(reason: &str, correlation_id: &str) -> MessageTemplate {
    let text = format!("Sorry, there was an error creating your ticket: {reason}");
    MessageBuilder::new(text.clone())
        .section("intake.error.summary.v1", |section| {
            section.mrkdwn(format!(":warning: {text}"));
        })
        .context("intake.error.context.v1", |context| {
            context.plain(format!("Correlation ID: {correlation_id}"));
        })
        .build()
}

pub fn help_message(command: &str) -> MessageTemplate {
    MessageBuilder::new(format!("Run {command} to file a new internal request"))
        .section("intake.help.summary.v1", |section| {
            section.mrkdwn(format!(
                "*File a request*\n• `{command}` opens the request form\n• `{command} help` shows this message"
            ));
        })
        .build()
}
