// ABOUTME: Canned-response generator standing in for a full language pipeline
// ABOUTME: Answers greetings and goodbyes in kind, everything else with a non-committal reply

use anyhow::Result;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use regex::Regex;
use vacbot_core::{ComputationError, Message, Responder};

const NON_COMMITTAL_RESPONSES: &[&str] = &[
    "Keep talking",
    "Keep talking.",
    "Go on.",
    "Go on",
    "Hmm?",
    "How about we talk about another topic?",
    "Hmmm... May I suggest we talk about another thing?",
    "Tell me more",
    "Tell me more.",
    "How so?",
    "Say what?",
    "Well, that's one way of putting it",
    "That's one way of putting it.",
];

const GREETING_RESPONSES: &[&str] = &[
    "Hello!",
    "Hello",
    "Hey!",
    "Hey",
    "Let's talk!",
    "Let's talk",
    "👋",
    "Hello there!",
    "Hey there!",
    "Hey! What do you want to ask?",
    "Welcome to my chat 🙂",
];

const GOODBYE_RESPONSES: &[&str] = &[
    "Goodbye",
    "Goodbye!",
    "👋",
    "See you",
    "See you!",
    "See you later",
    "See you later!",
    "Bye bye",
    "Bye now",
    "Cya!",
    "Cya",
    "Let's talk again soon!",
    "Take care",
    "Take care!",
    "Later",
    "Stay in touch",
    "Stay in touch!",
];

const GREETING_PATTERN: &str = concat!(
    r"(?i)^(?:Hi|Hey|Hello|Hiya|Greetings|Howdy|Good (?:morning|mornin|evening|evenin|afternoon|night|nigh)|",
    r"Wassup|Wh?at(?:'s|s| is)? (?:up|goin(?:g|'|) on|new)|(?:Good|Nice) (?:to )?see (?:you|u)|Yo[!,]*$|",
    r"Yo[!,]* (?: Wassup| Wh?at)|Long time no see|Salutation|I salute)"
);

const GOODBYE_PATTERN: &str = concat!(
    r"(?i)^(?:Bye|Goodbye|See (?:u|you)|Cya!*?|Later|Farewell|",
    r"Have a (?:good|nice|wonderful) (?:day|morning|mornin|evening|evenin|afternoon|night|nigh)|So long!*$)"
);

/// Greetings and goodbyes only count when the utterance is this short
const MAX_SMALL_TALK_WORDS: usize = 8;

/// What kind of utterance the responder recognised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Utterance {
    Greeting,
    Goodbye,
    Other,
}

/// Responder that picks a random canned reply by utterance kind
#[derive(Debug, Clone)]
pub struct CannedResponder {
    greeting: Regex,
    goodbye: Regex,
}

impl CannedResponder {
    pub fn new() -> Result<Self> {
        Ok(Self {
            greeting: Regex::new(GREETING_PATTERN)?,
            goodbye: Regex::new(GOODBYE_PATTERN)?,
        })
    }

    /// Classify an utterance. Small talk must match at the start and be short.
    pub fn classify(&self, text: &str) -> Utterance {
        let text = text.trim();
        let short = text.split_whitespace().count() < MAX_SMALL_TALK_WORDS;

        if short && self.greeting.is_match(text) {
            Utterance::Greeting
        } else if short && self.goodbye.is_match(text) {
            Utterance::Goodbye
        } else {
            Utterance::Other
        }
    }

    /// Reply text for `text`, or `None` if it is blank
    pub fn respond_to(&self, text: &str) -> Option<&'static str> {
        if text.trim().is_empty() {
            return None;
        }

        let candidates = match self.classify(text) {
            Utterance::Greeting => GREETING_RESPONSES,
            Utterance::Goodbye => GOODBYE_RESPONSES,
            Utterance::Other => NON_COMMITTAL_RESPONSES,
        };
        candidates.choose(&mut rand::thread_rng()).copied()
    }
}

#[async_trait]
impl<M> Responder<M> for CannedResponder
where
    M: Clone + Send + Sync + 'static,
{
    async fn compute(&self, message: &Message<M>) -> Result<Option<Message<M>>, ComputationError> {
        Ok(self
            .respond_to(message.text())
            .map(|reply| message.reply(reply)))
    }
}
