//! Maps a query to the smallest useful slice of the event document.
//!
//! Selection is keyword based and pure: the same text (ignoring case)
//! always yields the same topics and payload. Generic-knowledge questions
//! get a minimal bundle to save upstream tokens, unless the text names a
//! known entity, in which case it is always treated as an event question.

use super::knowledge::EventDocument;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Topic recorded when nothing more specific matched.
pub const GENERAL_TOPIC: &str = "general";

/// Sections sent when no topic group matched.
const OVERVIEW_SECTIONS: &[&str] = &["event", "overview", "contact"];

/// Sections sent with generic-knowledge questions.
const MINIMAL_SECTIONS: &[&str] = &["event", "contact"];

struct TopicGroup {
    name: &'static str,
    keywords: &'static [&'static str],
    sections: &'static [&'static str],
}

const TOPIC_GROUPS: &[TopicGroup] = &[
    TopicGroup {
        name: "schedule",
        keywords: &[
            "schedule", "agenda", "timeline", "when", "what time", "start", "starts", "end",
            "ends", "deadline", "opening", "closing", "ceremony", "kickoff", "breakfast",
            "lunch", "dinner", "workshop", "workshops",
        ],
        sections: &["schedule"],
    },
    TopicGroup {
        name: "registration",
        keywords: &[
            "register", "registration", "sign up", "signup", "apply", "application", "ticket",
            "tickets", "team", "teams", "team size", "eligible", "eligibility", "check-in",
            "check in",
        ],
        sections: &["registration", "teams"],
    },
    TopicGroup {
        name: "people",
        keywords: &[
            "judge", "judges", "mentor", "mentors", "organizer", "organizers", "organiser",
            "organisers", "speaker", "speakers", "who is", "who are", "host", "hosts",
        ],
        sections: &["people", "judges"],
    },
    TopicGroup {
        name: "prizes",
        keywords: &[
            "prize", "prizes", "prize pool", "award", "awards", "reward", "rewards", "win",
            "winner", "winners", "winning", "bounty", "bounties", "track", "tracks",
        ],
        sections: &["prizes", "tracks"],
    },
    TopicGroup {
        name: "logistics",
        keywords: &[
            "venue", "location", "where", "address", "parking", "wifi", "wi-fi", "food",
            "meal", "meals", "sleep", "sleeping", "travel", "hotel", "directions", "room",
            "shuttle", "accessibility",
        ],
        sections: &["logistics", "venue"],
    },
    TopicGroup {
        name: "statistics",
        keywords: &[
            "how many", "participants", "attendees", "hackers", "statistics", "stats",
            "number of", "countries",
        ],
        sections: &["statistics"],
    },
    TopicGroup {
        name: "faq",
        keywords: &[
            "faq", "rule", "rules", "allowed", "can i", "policy", "code of conduct",
            "submission", "submit", "judging criteria", "criteria", "requirements",
        ],
        sections: &["faq", "rules"],
    },
    TopicGroup {
        name: "perks",
        keywords: &[
            "perk", "perks", "swag", "credits", "free", "goodies", "t-shirt", "shirt",
            "stickers",
        ],
        sections: &["perks"],
    },
    TopicGroup {
        name: "background",
        keywords: &[
            "history", "previous", "last year", "past editions", "about the event",
            "background", "founded", "mission",
        ],
        sections: &["background", "history"],
    },
    TopicGroup {
        name: "theme",
        keywords: &[
            "theme", "themes", "challenge", "challenges", "problem statement",
            "problem statements", "idea", "ideas",
        ],
        sections: &["theme"],
    },
    TopicGroup {
        name: "communities",
        keywords: &[
            "community", "communities", "partner", "partners", "sponsor", "sponsors",
            "sponsored", "discord", "club", "clubs",
        ],
        sections: &["communities", "sponsors"],
    },
];

/// Phrasing typical of questions unrelated to the event.
const GENERIC_MARKERS: &[&str] = &[
    "what is a", "what is an", "what are", "explain", "define", "definition of",
    "meaning of", "how does", "how do i", "how to", "difference between", "tell me a joke",
    "write a", "write me", "translate", "capital of", "recipe", "in python", "in rust",
    "in javascript",
];

/// Words that mark an event question even when no topic group matched.
const DOMAIN_MARKERS: &[&str] = &[
    "hackathon", "event", "this event", "organizers", "the venue", "our team", "my team",
];

/// The topical context attached to one prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextBundle {
    pub topics: BTreeSet<String>,
    pub payload: Map<String, Value>,
    pub is_general_knowledge: bool,
}

impl ContextBundle {
    pub fn has_topic(&self, topic: &str) -> bool {
        self.topics.contains(topic)
    }
}

/// Keyword-driven selector over a shared event document.
#[derive(Debug, Clone)]
pub struct ContextSelector {
    document: Arc<EventDocument>,
}

impl ContextSelector {
    pub fn new(document: Arc<EventDocument>) -> Self {
        Self { document }
    }

    pub fn document(&self) -> &EventDocument {
        &self.document
    }

    pub fn select(&self, text: &str) -> ContextBundle {
        let lower = text.to_lowercase();

        let entity_topics: Vec<Option<&'static str>> = self
            .document
            .entities()
            .iter()
            .filter(|e| contains_term(&lower, &e.name))
            .map(|e| e.section.as_deref().and_then(topic_for_section))
            .collect();
        let mentions_entity = !entity_topics.is_empty();

        let mut topics: BTreeSet<&'static str> = TOPIC_GROUPS
            .iter()
            .filter(|g| g.keywords.iter().any(|k| contains_term(&lower, k)))
            .map(|g| g.name)
            .collect();
        topics.extend(entity_topics.into_iter().flatten());

        let generic = GENERIC_MARKERS.iter().any(|m| contains_term(&lower, m));
        let domain = !topics.is_empty() || DOMAIN_MARKERS.iter().any(|m| contains_term(&lower, m));

        if generic && !domain && !mentions_entity {
            return ContextBundle {
                topics: BTreeSet::new(),
                payload: self.subset(MINIMAL_SECTIONS.iter().copied()),
                is_general_knowledge: true,
            };
        }

        if topics.is_empty() {
            return ContextBundle {
                topics: BTreeSet::from([GENERAL_TOPIC.to_string()]),
                payload: self.subset(OVERVIEW_SECTIONS.iter().copied()),
                is_general_knowledge: false,
            };
        }

        let sections = TOPIC_GROUPS
            .iter()
            .filter(|g| topics.contains(g.name))
            .flat_map(|g| g.sections.iter().copied());

        ContextBundle {
            payload: self.subset(sections),
            topics: topics.into_iter().map(str::to_string).collect(),
            is_general_knowledge: false,
        }
    }

    /// Copy the named sections that exist in the document.
    fn subset<'a>(&self, sections: impl Iterator<Item = &'a str>) -> Map<String, Value> {
        let mut payload = Map::new();
        for name in sections {
            if let Some(value) = self.document.section(name) {
                payload.insert(name.to_string(), value.clone());
            }
        }
        payload
    }
}

fn topic_for_section(section: &str) -> Option<&'static str> {
    match section {
        "people" | "judges" => Some("people"),
        "sponsors" | "communities" => Some("communities"),
        _ => None,
    }
}

/// Whole-word (or whole-phrase) containment. Both sides are lowercase.
fn contains_term(haystack: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    let is_word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric());
    haystack.match_indices(term).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + term.len()..].chars().next();
        !is_word(before) && !is_word(after)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn selector() -> ContextSelector {
        let doc = EventDocument::from_value(json!({
            "event": {"name": "HackSpring", "dates": "March 14-16"},
            "overview": "A 48-hour student hackathon.",
            "contact": {"email": "team@hackspring.dev", "discord": "#help"},
            "schedule": [{"time": "09:00", "item": "Opening ceremony"}],
            "prizes": {"pool": "$10,000", "first": "$5,000"},
            "tracks": ["AI", "Climate"],
            "judges": [{"name": "Ada Lovelace"}, {"name": "Grace Hopper"}],
            "sponsors": [{"name": "Acme Cloud"}],
            "logistics": {"wifi": "HackSpring-Guest"},
            "faq": [{"q": "Can I work alone?", "a": "Yes"}]
        }));
        ContextSelector::new(Arc::new(doc))
    }

    #[test]
    fn prize_pool_question_selects_prizes() {
        let bundle = selector().select("what is the prize pool");
        assert!(bundle.has_topic("prizes"));
        assert!(!bundle.is_general_knowledge);
        assert!(bundle.payload.contains_key("prizes"));
        assert!(bundle.payload.contains_key("tracks"));
        assert!(!bundle.payload.contains_key("schedule"));
    }

    #[test]
    fn selection_is_deterministic_and_case_insensitive() {
        let s = selector();
        let a = s.select("When is LUNCH and where is the venue?");
        let b = s.select("when is lunch and where is the venue?");
        assert_eq!(a, b);
        assert_eq!(a, s.select("When is LUNCH and where is the venue?"));
        let topics: Vec<_> = a.topics.iter().map(String::as_str).collect();
        assert_eq!(topics, ["logistics", "schedule"]);
    }

    #[test]
    fn generic_question_gets_minimal_bundle() {
        let bundle = selector().select("Explain quantum entanglement");
        assert!(bundle.is_general_knowledge);
        assert!(bundle.topics.is_empty());
        let keys: BTreeSet<_> = bundle.payload.keys().map(String::as_str).collect();
        assert_eq!(keys, BTreeSet::from(["contact", "event"]));
    }

    #[test]
    fn entity_name_forces_domain() {
        let bundle = selector().select("Explain what Ada Lovelace is known for");
        assert!(!bundle.is_general_knowledge);
        assert!(bundle.has_topic("people"));
        assert!(bundle.payload.contains_key("judges"));
    }

    #[test]
    fn domain_marker_beats_generic_phrasing() {
        let bundle = selector().select("how does this hackathon work");
        assert!(!bundle.is_general_knowledge);
        assert!(bundle.has_topic(GENERAL_TOPIC));
    }

    #[test]
    fn unmatched_text_falls_back_to_overview() {
        let bundle = selector().select("hello there");
        assert!(bundle.has_topic(GENERAL_TOPIC));
        assert_eq!(bundle.topics.len(), 1);
        let keys: BTreeSet<_> = bundle.payload.keys().map(String::as_str).collect();
        assert_eq!(keys, BTreeSet::from(["contact", "event", "overview"]));
    }

    #[test]
    fn keywords_match_whole_words_only() {
        assert!(contains_term("who will win", "win"));
        assert!(!contains_term("open the window", "win"));
        assert!(contains_term("what's the prize pool?", "prize pool"));
        assert!(!contains_term("", "win"));
    }

    #[test]
    fn empty_document_degrades_to_empty_payload() {
        let s = ContextSelector::new(Arc::new(EventDocument::empty()));
        let bundle = s.select("what is the prize pool");
        assert!(bundle.has_topic("prizes"));
        assert!(bundle.payload.is_empty());
    }
}
