//! Example queries that suit semantic search.

use serde::Serialize;

/// A themed set of example queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SuggestionGroup {
    pub category: &'static str,
    pub queries: &'static [&'static str],
}

/// Example queries plus advice on phrasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Suggestions {
    pub suggestions: &'static [SuggestionGroup],
    pub tips: &'static [&'static str],
}

const GROUPS: &[SuggestionGroup] = &[
    SuggestionGroup {
        category: "Emotions",
        queries: &[
            "heartbreak and sadness",
            "joy and happiness",
            "anger and frustration",
            "nostalgia and memories",
            "hope and optimism",
        ],
    },
    SuggestionGroup {
        category: "Themes",
        queries: &[
            "love and romance",
            "friendship and loyalty",
            "success and ambition",
            "freedom and independence",
            "family and home",
        ],
    },
    SuggestionGroup {
        category: "Moods",
        queries: &[
            "party and dancing",
            "chill and relaxing",
            "motivation and energy",
            "peaceful and calm",
            "rebellious and edgy",
        ],
    },
    SuggestionGroup {
        category: "Life Events",
        queries: &[
            "breakup and moving on",
            "celebration and victory",
            "overcoming challenges",
            "growing up and maturing",
            "new beginnings",
        ],
    },
];

const TIPS: &[&str] = &[
    "Use descriptive phrases rather than single words",
    "Combine emotions with themes for better results",
    "Try different phrasings if you don't get good results",
    "Lower the similarity threshold to get more results",
];

/// The example query catalogue.
#[must_use]
pub const fn suggestions() -> Suggestions {
    Suggestions {
        suggestions: GROUPS,
        tips: TIPS,
    }
}
