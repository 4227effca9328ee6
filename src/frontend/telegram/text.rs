// ABOUTME: Text helpers for Telegram messages
// ABOUTME: Strips mentions and commands using UTF-16 entity offsets, splits long replies

/// Maximum message length for Telegram Bot API, in characters
pub const MAX_MESSAGE_LENGTH: usize = 4096;

/// Entity kinds that affect how inbound text is adjusted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// `@username`
    Mention,
    /// Mention of a user without a username
    TextMention,
    /// `/command` or `/command@bot`
    BotCommand,
    Other,
}

/// An entity span; `offset` and `length` are in UTF-16 code units, as Telegram sends them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextEntity {
    pub kind: EntityKind,
    pub offset: usize,
    pub length: usize,
}

impl TextEntity {
    pub fn new(kind: EntityKind, offset: usize, length: usize) -> Self {
        Self {
            kind,
            offset,
            length,
        }
    }

    fn range(&self, total: usize) -> (usize, usize) {
        let start = self.offset.min(total);
        let end = self.offset.saturating_add(self.length).min(total);
        (start, end)
    }
}

/// The text covered by `entity`
pub fn entity_text(text: &str, entity: &TextEntity) -> String {
    let units: Vec<u16> = text.encode_utf16().collect();
    let (start, end) = entity.range(units.len());
    String::from_utf16_lossy(&units[start..end])
}

/// Remove mentions and bot commands from `text`.
///
/// A `/start` command replaces the whole text with `/start`. Blank text is
/// returned unchanged.
pub fn adjust_text(text: &str, entities: &[TextEntity]) -> String {
    if text.trim().is_empty() {
        return text.to_string();
    }

    let units: Vec<u16> = text.encode_utf16().collect();

    let is_start = entities.iter().any(|entity| {
        entity.kind == EntityKind::BotCommand && entity_text(text, entity).starts_with("/start")
    });
    if is_start {
        return "/start".to_string();
    }

    let mut removed: Vec<(usize, usize)> = entities
        .iter()
        .filter(|entity| {
            matches!(
                entity.kind,
                EntityKind::Mention | EntityKind::TextMention | EntityKind::BotCommand
            )
        })
        .map(|entity| entity.range(units.len()))
        .collect();
    if removed.is_empty() {
        return text.to_string();
    }
    removed.sort_unstable();

    let mut kept = Vec::with_capacity(units.len());
    let mut cursor = 0;
    for (start, end) in removed {
        if start > cursor {
            kept.extend_from_slice(&units[cursor..start]);
        }
        cursor = cursor.max(end);
    }
    kept.extend_from_slice(&units[cursor..]);

    String::from_utf16_lossy(&kept).trim().to_string()
}

/// Split text into chunks of at most `max_chars` characters, at line
/// boundaries when possible
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    loop {
        // Byte offset of the first character past the limit
        let Some((mut limit, _)) = remaining.char_indices().nth(max_chars) else {
            chunks.push(remaining);
            break;
        };
        if limit == 0 {
            limit = remaining.chars().next().map_or(remaining.len(), char::len_utf8);
        }

        // Try to split at a newline within the limit
        let split_at = remaining[..limit]
            .rfind('\n')
            .map(|pos| pos + 1)
            .unwrap_or(limit);

        chunks.push(&remaining[..split_at]);
        remaining = &remaining[split_at..];
        if remaining.is_empty() {
            break;
        }
    }

    chunks
}
