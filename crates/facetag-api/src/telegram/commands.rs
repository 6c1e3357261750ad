//! Chat command parsing.

/// A command typed by the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/getface`
    GetFace,
    /// `/find <name>`; `None` when the name is missing
    Find(Option<String>),
    Unknown,
}

impl Command {
    /// Parse message text. Accepts the `/cmd@BotName` form used in group chats.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let (head, rest) = match text.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (text, ""),
        };
        let command = head.split('@').next().unwrap_or(head);

        match command {
            "/getface" => Self::GetFace,
            "/find" => Self::Find(Some(rest.to_string()).filter(|name| !name.is_empty())),
            _ => Self::Unknown,
        }
    }
}
