//! Dialog state machine: which step of a dialog an operator is in.

use crate::transfer::{LinkClassifier, MessageLink};

use super::replies;

/// The steps of a dialog.
///
/// Batch: Idle → AwaitingLink → AwaitingCount → Idle.
/// Single: Idle → AwaitingSingleLink → Idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogStep {
    Idle,
    AwaitingLink,
    AwaitingCount,
    AwaitingSingleLink,
}

impl DialogStep {
    /// Check if a transition from `self` to `target` is valid.
    ///
    /// A start command may replace any dialog, and every step may stay put
    /// after rejected input.
    pub fn can_transition_to(&self, target: DialogStep) -> bool {
        use DialogStep::*;
        if self == &target && target != Idle {
            return true;
        }
        matches!(
            (self, target),
            (_, AwaitingLink)
                | (_, AwaitingSingleLink)
                | (AwaitingLink, AwaitingCount)
                | (AwaitingLink, Idle)
                | (AwaitingCount, Idle)
                | (AwaitingSingleLink, Idle)
        )
    }
}

impl std::fmt::Display for DialogStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::AwaitingLink => "awaiting_link",
            Self::AwaitingCount => "awaiting_count",
            Self::AwaitingSingleLink => "awaiting_single_link",
        };
        write!(f, "{s}")
    }
}

/// An operator's open dialog. Absence of a dialog is the idle step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dialog {
    AwaitingLink,
    AwaitingCount { link: MessageLink },
    AwaitingSingleLink,
}

/// What a text turn does to a dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Input rejected; the dialog is unchanged.
    Stay { dialog: Dialog, reply: String },
    /// Moved to the next step.
    Next { dialog: Dialog, reply: String },
    /// Dialog finished; transfer one message.
    LaunchSingle(MessageLink),
    /// Dialog finished; transfer `count` messages from `link`.
    LaunchBatch { link: MessageLink, count: u32 },
}

impl Transition {
    /// The step the dialog is in after this transition.
    pub fn step(&self) -> DialogStep {
        match self {
            Self::Stay { dialog, .. } | Self::Next { dialog, .. } => dialog.step(),
            Self::LaunchSingle(_) | Self::LaunchBatch { .. } => DialogStep::Idle,
        }
    }
}

impl Dialog {
    pub fn step(&self) -> DialogStep {
        match self {
            Self::AwaitingLink => DialogStep::AwaitingLink,
            Self::AwaitingCount { .. } => DialogStep::AwaitingCount,
            Self::AwaitingSingleLink => DialogStep::AwaitingSingleLink,
        }
    }

    /// Apply one text turn. Pure: replies and launches are left to the caller.
    pub fn advance(self, text: &str, classifier: &LinkClassifier, max_batch: u32) -> Transition {
        match self {
            Self::AwaitingSingleLink => match classifier.classify(text) {
                Some(link) => Transition::LaunchSingle(link),
                None => Transition::Stay {
                    dialog: self,
                    reply: replies::INVALID_LINK.to_string(),
                },
            },
            Self::AwaitingLink => match classifier.classify(text) {
                Some(link) => Transition::Next {
                    dialog: Self::AwaitingCount { link },
                    reply: replies::LINK_RECEIVED.to_string(),
                },
                None => Transition::Stay {
                    dialog: self,
                    reply: replies::INVALID_LINK.to_string(),
                },
            },
            Self::AwaitingCount { link } => match parse_count(text, max_batch) {
                Some(count) => Transition::LaunchBatch { link, count },
                None => Transition::Stay {
                    dialog: Self::AwaitingCount { link },
                    reply: replies::invalid_count(max_batch),
                },
            },
        }
    }
}

/// Parse a batch size: plain ASCII digits within `1..=max_batch`.
pub fn parse_count(text: &str, max_batch: u32) -> Option<u32> {
    let text = text.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse::<u32>()
        .ok()
        .filter(|count| (1..=max_batch).contains(count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::AccessClass;

    fn classifier() -> LinkClassifier {
        LinkClassifier::new()
    }

    #[test]
    fn count_boundaries() {
        assert_eq!(parse_count("1", 200), Some(1));
        assert_eq!(parse_count("200", 200), Some(200));
        assert_eq!(parse_count(" 42 ", 200), Some(42));
        for bad in ["0", "201", "abc", "-5", "", "+3", "1.5", "99999999999"] {
            assert_eq!(parse_count(bad, 200), None, "{bad:?} should be rejected");
        }
    }

    #[test]
    fn batch_dialog_walks_link_then_count() {
        let t = Dialog::AwaitingLink.advance("https://t.me/c/1001/10", &classifier(), 200);
        let Transition::Next { dialog, reply } = t else {
            panic!("expected Next, got {t:?}");
        };
        assert_eq!(reply, replies::LINK_RECEIVED);
        assert_eq!(dialog.step(), DialogStep::AwaitingCount);

        let t = dialog.advance("3", &classifier(), 200);
        let Transition::LaunchBatch { link, count } = t else {
            panic!("expected LaunchBatch, got {t:?}");
        };
        assert_eq!(count, 3);
        assert_eq!(link.chat.as_str(), "-1001001");
        assert_eq!(link.sequence, 10);
        assert_eq!(link.access, AccessClass::Private);
    }

    #[test]
    fn bad_input_stays_in_place() {
        let t = Dialog::AwaitingSingleLink.advance("not a link", &classifier(), 200);
        assert_eq!(
            t,
            Transition::Stay {
                dialog: Dialog::AwaitingSingleLink,
                reply: replies::INVALID_LINK.to_string(),
            }
        );

        let t = Dialog::AwaitingLink.advance("t.me/", &classifier(), 200);
        assert_eq!(t.step(), DialogStep::AwaitingLink);

        let link = classifier().classify("https://t.me/news/5").unwrap();
        let t = Dialog::AwaitingCount { link: link.clone() }.advance("201", &classifier(), 200);
        assert_eq!(
            t,
            Transition::Stay {
                dialog: Dialog::AwaitingCount { link },
                reply: replies::invalid_count(200),
            }
        );
    }

    #[test]
    fn single_dialog_launches_on_valid_link() {
        let t = Dialog::AwaitingSingleLink.advance("https://t.me/news/5", &classifier(), 200);
        match t {
            Transition::LaunchSingle(link) => {
                assert_eq!(link.chat.as_str(), "news");
                assert_eq!(link.access, AccessClass::Public);
            }
            other => panic!("expected LaunchSingle, got {other:?}"),
        }
    }

    #[test]
    fn every_advance_is_a_legal_transition() {
        let link = classifier().classify("https://t.me/news/5").unwrap();
        let dialogs = [
            Dialog::AwaitingLink,
            Dialog::AwaitingCount { link },
            Dialog::AwaitingSingleLink,
        ];
        for dialog in dialogs {
            for input in ["https://t.me/news/5", "7", "junk"] {
                let from = dialog.step();
                let to = dialog.clone().advance(input, &classifier(), 200).step();
                assert!(from.can_transition_to(to), "{from} -> {to} on {input:?}");
            }
        }
    }

    #[test]
    fn transition_table() {
        use DialogStep::*;
        assert!(Idle.can_transition_to(AwaitingLink));
        assert!(Idle.can_transition_to(AwaitingSingleLink));
        assert!(AwaitingCount.can_transition_to(AwaitingLink));
        assert!(!Idle.can_transition_to(AwaitingCount));
        assert!(!Idle.can_transition_to(Idle));
        assert!(!AwaitingSingleLink.can_transition_to(AwaitingCount));
        assert_eq!(AwaitingSingleLink.to_string(), "awaiting_single_link");
    }
}
