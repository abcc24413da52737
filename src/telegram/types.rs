//! Bot API wire types (the subset the bot uses)

use crate::chain::{Keyboard, Reply, ReplyFormat};
use serde::{Deserialize, Serialize};

/// Envelope of every Bot API response
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

impl Update {
    /// Chat id and text of a text message sent by a person
    pub fn into_text(self) -> Option<(i64, String)> {
        let message = self.message?;
        if message.from.as_ref().is_some_and(|u| u.is_bot) {
            return None;
        }
        Some((message.chat.id, message.text?))
    }
}

#[derive(Debug, Serialize)]
pub struct GetUpdates<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    pub timeout: u64,
    pub allowed_updates: &'a [&'a str],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyboardButton {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ReplyMarkup {
    Keyboard {
        keyboard: Vec<Vec<KeyboardButton>>,
        resize_keyboard: bool,
        one_time_keyboard: bool,
        selective: bool,
    },
    Remove {
        remove_keyboard: bool,
    },
}

impl From<&Keyboard> for ReplyMarkup {
    fn from(keyboard: &Keyboard) -> Self {
        if keyboard.is_empty() {
            return Self::Remove {
                remove_keyboard: true,
            };
        }
        Self::Keyboard {
            keyboard: keyboard
                .rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|text| KeyboardButton { text: text.clone() })
                        .collect()
                })
                .collect(),
            resize_keyboard: true,
            one_time_keyboard: keyboard.one_time,
            selective: true,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SendMessage<'a> {
    pub chat_id: i64,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<ReplyMarkup>,
}

impl<'a> SendMessage<'a> {
    pub fn new(chat_id: i64, reply: &'a Reply) -> Self {
        Self {
            chat_id,
            text: &reply.text,
            parse_mode: match reply.format {
                ReplyFormat::Plain => None,
                ReplyFormat::MarkdownV2 => Some("MarkdownV2"),
            },
            reply_markup: reply.keyboard.as_ref().map(ReplyMarkup::from),
        }
    }
}

/// Entry of the client-side command menu
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotCommand {
    pub command: String,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct SetMyCommands<'a> {
    pub commands: &'a [BotCommand],
}
