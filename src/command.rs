//! Free-text command parser.
//!
//! Lines are matched against case-insensitive prefixes; anything that is not
//! a recognised command is ordinary chat.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Help,
    Status,
    Exit,
    Ask,
    LearnAbout,
    Remember,
    Recall,
    SaveThought,
    Thoughts,
    ThinkAbout,
    Reflect,
    Summarize,
    Speak,
    Listen,
    Persona,
    Tools,
    Tool,
    Skills,
    LearnSkill,
    Skill,
    Push,
    Intentions,
    Approve,
    Reject,
    History,
    Clear,
    Chat,
}

/// A parsed command. `argument` keeps the user's original casing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub kind: ActionType,
    pub argument: String,
}

impl Action {
    pub fn new(kind: ActionType, argument: impl Into<String>) -> Self {
        Self {
            kind,
            argument: argument.into(),
        }
    }

    pub fn has_argument(&self) -> bool {
        !self.argument.is_empty()
    }
}

pub const HELP_TEXT: &str = "\
Commands:
  ask <question>                 one-off question (no history)
  learn about <topic>            research a topic and remember it
  remember <fact>                store a fact in memory
  recall <query>                 search memory
  save thought <text>            write to the thought history
  thoughts [n]                   show recent thoughts
  think about <topic>            reflect on a topic and save the thought
  reflect                        reflect on recent thoughts
  summarize <text>               summarise text
  speak <text>[;voice=v][;speed=s]
  listen <audio file>            transcribe and answer
  persona <name>                 switch persona
  tools | tool <name> [json]     list or run tools
  skills | skill <name> <input>  list or run skills
  learn skill <name>: <template> teach a new skill ({{input}} placeholder)
  push on|off                    toggle push mode
  intentions | approve <n> | reject <n>
  history | clear | status | help | exit
Chain commands with `|`; `$PIPE` inserts the previous output.";

/// Prefix table. Longer prefixes must come before shorter ones sharing a
/// first word (`learn skill` before `learn about`, `skills` before `skill`).
const PREFIXES: &[(&str, ActionType)] = &[
    ("learn skill", ActionType::LearnSkill),
    ("learn about", ActionType::LearnAbout),
    ("save thought", ActionType::SaveThought),
    ("think about", ActionType::ThinkAbout),
    ("thoughts", ActionType::Thoughts),
    ("remember", ActionType::Remember),
    ("recall", ActionType::Recall),
    ("summarize", ActionType::Summarize),
    ("summarise", ActionType::Summarize),
    ("speak", ActionType::Speak),
    ("say", ActionType::Speak),
    ("listen", ActionType::Listen),
    ("persona", ActionType::Persona),
    ("tools", ActionType::Tools),
    ("tool", ActionType::Tool),
    ("skills", ActionType::Skills),
    ("skill", ActionType::Skill),
    ("push", ActionType::Push),
    ("intentions", ActionType::Intentions),
    ("approve", ActionType::Approve),
    ("reject", ActionType::Reject),
    ("ask", ActionType::Ask),
];

/// Commands that only match as the whole line.
const BARE_WORDS: &[(&str, ActionType)] = &[
    ("help", ActionType::Help),
    ("?", ActionType::Help),
    ("status", ActionType::Status),
    ("exit", ActionType::Exit),
    ("quit", ActionType::Exit),
    ("bye", ActionType::Exit),
    ("reflect", ActionType::Reflect),
    ("history", ActionType::History),
    ("clear", ActionType::Clear),
];

pub fn parse_action(line: &str) -> Action {
    let line = line.trim();

    for (word, kind) in BARE_WORDS {
        if line.eq_ignore_ascii_case(word) {
            return Action::new(*kind, "");
        }
    }

    for (prefix, kind) in PREFIXES {
        if let Some(rest) = strip_command_prefix(line, prefix) {
            return Action::new(*kind, rest);
        }
    }

    Action::new(ActionType::Chat, line)
}

/// Match `prefix` case-insensitively as whole words at the start of `line`
/// and return the trimmed remainder.
fn strip_command_prefix<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    let rest = &line[prefix.len()..];
    match rest.chars().next() {
        None => Some(""),
        Some(c) if c.is_whitespace() => Some(rest.trim()),
        Some(_) => None,
    }
}

/// Split `learn skill NAME: TEMPLATE`. Returns `None` without a colon.
pub fn split_skill_definition(argument: &str) -> Option<(&str, &str)> {
    let (name, template) = argument.split_once(':')?;
    let (name, template) = (name.trim(), template.trim());
    if name.is_empty() || template.is_empty() {
        return None;
    }
    Some((name, template))
}

/// Split `NAME REST` at the first whitespace.
pub fn split_first_word(argument: &str) -> (&str, &str) {
    match argument.trim().split_once(char::is_whitespace) {
        Some((head, tail)) => (head, tail.trim()),
        None => (argument.trim(), ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(line: &str) -> ActionType {
        parse_action(line).kind
    }

    #[test]
    fn bare_words() {
        assert_eq!(kind("help"), ActionType::Help);
        assert_eq!(kind("  STATUS "), ActionType::Status);
        assert_eq!(kind("Quit"), ActionType::Exit);
        assert_eq!(kind("bye"), ActionType::Exit);
        assert_eq!(kind("reflect"), ActionType::Reflect);
        assert_eq!(kind("history"), ActionType::History);
        assert_eq!(kind("clear"), ActionType::Clear);
    }

    #[test]
    fn bare_words_with_text_are_chat() {
        assert_eq!(kind("help me write a poem"), ActionType::Chat);
        assert_eq!(kind("exit strategies for startups?"), ActionType::Chat);
    }

    #[test]
    fn prefixed_commands_keep_argument_case() {
        let action = parse_action("Ask What is Rust?");
        assert_eq!(action, Action::new(ActionType::Ask, "What is Rust?"));

        let action = parse_action("remember My cat is called Miso");
        assert_eq!(action.kind, ActionType::Remember);
        assert_eq!(action.argument, "My cat is called Miso");
    }

    #[test]
    fn multi_word_prefixes() {
        assert_eq!(parse_action("learn about tokio").kind, ActionType::LearnAbout);
        assert_eq!(parse_action("learn skill haiku: Write {{input}}").kind, ActionType::LearnSkill);
        assert_eq!(parse_action("save thought buy milk").argument, "buy milk");
        assert_eq!(parse_action("think about entropy").kind, ActionType::ThinkAbout);
        assert_eq!(parse_action("learn to cook").kind, ActionType::Chat);
    }

    #[test]
    fn prefix_needs_word_boundary() {
        assert_eq!(kind("asking for a friend"), ActionType::Chat);
        assert_eq!(kind("recalled something"), ActionType::Chat);
        assert_eq!(kind("sayonara"), ActionType::Chat);
    }

    #[test]
    fn plural_and_singular_forms() {
        assert_eq!(kind("tools"), ActionType::Tools);
        assert_eq!(parse_action("tool current_time").argument, "current_time");
        assert_eq!(kind("skills"), ActionType::Skills);
        assert_eq!(parse_action("skill haiku the sea").argument, "haiku the sea");
        assert_eq!(kind("thoughts"), ActionType::Thoughts);
        assert_eq!(parse_action("thoughts 5").argument, "5");
    }

    #[test]
    fn speech_and_autonomy_commands() {
        assert_eq!(kind("say hello"), ActionType::Speak);
        assert_eq!(parse_action("speak hi;voice=nova").argument, "hi;voice=nova");
        assert_eq!(parse_action("listen /tmp/a.wav").kind, ActionType::Listen);
        assert_eq!(parse_action("persona Aria").argument, "Aria");
        assert_eq!(parse_action("push ON").argument, "ON");
        assert_eq!(kind("intentions"), ActionType::Intentions);
        assert_eq!(parse_action("approve 3").argument, "3");
        assert_eq!(parse_action("reject 4").kind, ActionType::Reject);
        assert_eq!(kind("summarise this"), ActionType::Summarize);
    }

    #[test]
    fn prefix_without_argument() {
        let action = parse_action("remember");
        assert_eq!(action.kind, ActionType::Remember);
        assert!(!action.has_argument());
    }

    #[test]
    fn everything_else_is_chat() {
        let action = parse_action("  how are you today?  ");
        assert_eq!(action, Action::new(ActionType::Chat, "how are you today?"));
        assert_eq!(kind("ünïcödé ask"), ActionType::Chat);
    }

    #[test]
    fn skill_definition_split() {
        assert_eq!(
            split_skill_definition("haiku: Write a haiku about {{input}}"),
            Some(("haiku", "Write a haiku about {{input}}"))
        );
        assert_eq!(split_skill_definition("haiku"), None);
        assert_eq!(split_skill_definition(": template"), None);
    }

    #[test]
    fn first_word_split() {
        assert_eq!(split_first_word("haiku the sea"), ("haiku", "the sea"));
        assert_eq!(split_first_word("haiku"), ("haiku", ""));
        assert_eq!(split_first_word(r#"http_fetch {"url": "x"}"#), ("http_fetch", r#"{"url": "x"}"#));
    }
}
