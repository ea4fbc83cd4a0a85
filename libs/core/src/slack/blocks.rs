//! The subset of Block Kit used by devopsbot modals.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Text {
    #[serde(rename = "plain_text")]
    Plain {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        emoji: Option<bool>,
    },
    #[serde(rename = "mrkdwn")]
    Markdown { text: String },
}

impl Text {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain {
            text: text.into(),
            emoji: None,
        }
    }

    pub fn markdown(text: impl Into<String>) -> Self {
        Self::Markdown { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Plain { text, .. } | Self::Markdown { text } => text,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptionObject {
    pub text: Text,
    pub value: String,
}

impl OptionObject {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            text: Text::plain(label),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section {
        #[serde(skip_serializing_if = "Option::is_none")]
        block_id: Option<String>,
        text: Text,
    },
    Context {
        #[serde(skip_serializing_if = "Option::is_none")]
        block_id: Option<String>,
        elements: Vec<Text>,
    },
    Input {
        block_id: String,
        label: Text,
        element: Element,
        #[serde(skip_serializing_if = "Option::is_none")]
        hint: Option<Text>,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        optional: bool,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        dispatch_action: bool,
    },
    Divider,
}

impl Block {
    pub fn context(block_id: impl Into<String>, text: Text) -> Self {
        Self::Context {
            block_id: Some(block_id.into()),
            elements: vec![text],
        }
    }

    pub fn input(block_id: impl Into<String>, label: impl Into<String>, element: Element) -> Self {
        Self::Input {
            block_id: block_id.into(),
            label: Text::plain(label),
            element,
            hint: None,
            optional: false,
            dispatch_action: false,
        }
    }

    pub fn with_hint(mut self, text: impl Into<String>) -> Self {
        if let Self::Input { hint, .. } = &mut self {
            *hint = Some(Text::plain(text));
        }
        self
    }

    pub fn optional(mut self) -> Self {
        if let Self::Input { optional, .. } = &mut self {
            *optional = true;
        }
        self
    }

    /// Makes the input emit `block_actions` while the user edits it.
    pub fn dispatching(mut self) -> Self {
        if let Self::Input {
            dispatch_action, ..
        } = &mut self
        {
            *dispatch_action = true;
        }
        self
    }

    pub fn block_id(&self) -> Option<&str> {
        match self {
            Self::Section { block_id, .. } | Self::Context { block_id, .. } => block_id.as_deref(),
            Self::Input { block_id, .. } => Some(block_id),
            Self::Divider => None,
        }
    }

    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Input { hint, .. } => hint.as_ref().map(Text::as_str),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DispatchActionConfig {
    pub trigger_actions_on: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConversationFilter {
    pub include: Vec<String>,
    pub exclude_bot_users: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Element {
    PlainTextInput {
        action_id: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        multiline: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        max_length: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        placeholder: Option<Text>,
        #[serde(skip_serializing_if = "Option::is_none")]
        dispatch_action_config: Option<DispatchActionConfig>,
    },
    Checkboxes {
        action_id: String,
        options: Vec<OptionObject>,
    },
    RadioButtons {
        action_id: String,
        options: Vec<OptionObject>,
        #[serde(skip_serializing_if = "Option::is_none")]
        initial_option: Option<OptionObject>,
    },
    UsersSelect {
        action_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        placeholder: Option<Text>,
    },
    MultiUsersSelect {
        action_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        placeholder: Option<Text>,
    },
    ConversationsSelect {
        action_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        placeholder: Option<Text>,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        default_to_current_conversation: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        initial_conversation: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        filter: Option<ConversationFilter>,
    },
}

impl Element {
    pub fn text_input(action_id: impl Into<String>) -> Self {
        Self::PlainTextInput {
            action_id: action_id.into(),
            multiline: false,
            max_length: None,
            placeholder: None,
            dispatch_action_config: None,
        }
    }

    pub fn multiline(mut self, max: u32) -> Self {
        if let Self::PlainTextInput {
            multiline,
            max_length,
            ..
        } = &mut self
        {
            *multiline = true;
            *max_length = Some(max);
        }
        self
    }

    pub fn max_length(mut self, max: u32) -> Self {
        if let Self::PlainTextInput { max_length, .. } = &mut self {
            *max_length = Some(max);
        }
        self
    }

    /// Dispatch a `block_actions` event on every character typed.
    pub fn on_character_entered(mut self) -> Self {
        if let Self::PlainTextInput {
            dispatch_action_config,
            ..
        } = &mut self
        {
            *dispatch_action_config = Some(DispatchActionConfig {
                trigger_actions_on: vec!["on_character_entered".into()],
            });
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModalView {
    #[serde(rename = "type")]
    kind: &'static str,
    pub callback_id: String,
    pub title: Text,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submit: Option<Text>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close: Option<Text>,
    pub blocks: Vec<Block>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub private_metadata: String,
}

impl ModalView {
    pub fn new(callback_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind: "modal",
            callback_id: callback_id.into(),
            title: Text::plain(title),
            submit: None,
            close: None,
            blocks: Vec::new(),
            private_metadata: String::new(),
        }
    }

    pub fn submit(mut self, label: impl Into<String>) -> Self {
        self.submit = Some(Text::plain(label));
        self
    }

    pub fn close(mut self, label: impl Into<String>) -> Self {
        self.close = Some(Text::plain(label));
        self
    }

    pub fn private_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.private_metadata = metadata.into();
        self
    }

    pub fn block(mut self, block: Block) -> Self {
        self.blocks.push(block);
        self
    }

    pub fn find_block(&self, block_id: &str) -> Option<&Block> {
        self.blocks
            .iter()
            .find(|block| block.block_id() == Some(block_id))
    }
}
