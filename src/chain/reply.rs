//! Outbound replies and suggested-reply keyboards
//!
//! Transport-neutral: the `Session` implementation decides how a keyboard is
//! rendered on the wire.

/// Affirmative label of the yes/no keyboard; any other answer means "no"
pub const YES: &str = "Yes";
pub const NO: &str = "No";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplyFormat {
    #[default]
    Plain,
    /// Text is already escaped for Telegram `MarkdownV2`
    MarkdownV2,
}

/// Set of suggested replies shown under a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<String>>,
    /// Hide the keyboard once a button is used
    pub one_time: bool,
}

impl Keyboard {
    /// Lay `labels` out left to right, `columns` per row
    pub fn grid<I, S>(labels: I, columns: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = columns.max(1);
        let mut rows: Vec<Vec<String>> = Vec::new();
        for label in labels {
            match rows.last_mut() {
                Some(row) if row.len() < columns => row.push(label.into()),
                _ => rows.push(vec![label.into()]),
            }
        }
        Self {
            rows,
            one_time: false,
        }
    }

    pub fn yes_no() -> Self {
        Self::grid([YES, NO], 2).one_time()
    }

    pub fn one_time(mut self) -> Self {
        self.one_time = true;
        self
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().flatten().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(Vec::is_empty)
    }
}

/// One message for the conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub format: ReplyFormat,
    pub keyboard: Option<Keyboard>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: ReplyFormat::Plain,
            keyboard: None,
        }
    }

    pub fn markdown(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: ReplyFormat::MarkdownV2,
            keyboard: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}
