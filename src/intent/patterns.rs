//! Pattern sets for the intent cascade. All sets are compiled
//! case-insensitively and matched against the trimmed, lower-cased query.

pub const IDENTITY: &[&str] = &[
    r"\bwho\s+(are|r)\s+(you|u)\b",
    r"\bwhat\s+are\s+you\b",
    r"\bare\s+you\s+(an?\s+)?(bot|robot|human|person|ai|chatgpt|gpt|claude|gemini|real)\b",
    r"\bwho\s+(built|made|created|developed|trained|owns)\s+(you|u)\b",
    r"\bwhat('?s|\s+is)\s+your\s+name\b",
    r"\bwhich\s+(model|llm|ai)\s+are\s+you\b",
    r"\bintroduce\s+yourself\b",
];

pub const CAPABILITY: &[&str] = &[
    r"\bwhat\s+can\s+(you|u)\s+do\b",
    r"\bwhat\s+are\s+you\s+(able|capable)\b",
    r"\bhow\s+can\s+you\s+help\b",
    r"\bwhat\s+do\s+you\s+do\b",
    r"\bwhat\s+are\s+your\s+(features|capabilities|abilities|skills)\b",
    r"^help[\s!.?]*$",
];

pub const COMPARISON: &[&str] = &[
    r"\bare\s+you\s+(better|smarter|faster|worse|different)\s+than\b",
    r"\bhow\s+do\s+you\s+compare\b",
    r"\bcompare\s+(yourself|you)\b",
    r"\b(you|yourself)\s+(vs\.?|versus)\s+",
    r"\b(vs\.?|versus)\s+(chatgpt|gpt|claude|gemini|bard|copilot)\b",
];

pub const GREETING: &[&str] = &[
    r"^(hi|hello|hey|hiya|howdy|greetings|yo|hola|good\s+(morning|afternoon|evening|day))(\s+(there|everyone|all|bot|assistant|friend))?[\s!.,?]*$",
    r"^how\s+are\s+(you|u)(\s+doing)?(\s+today)?[\s!.,?]*$",
    r"^(what'?s\s+up|sup|how'?s\s+it\s+going)[\s!.,?]*$",
    r"^nice\s+to\s+meet\s+you[\s!.,?]*$",
];

pub const GRATITUDE: &[&str] = &[
    r"^(thanks|thank\s+you|thank\s+u|thx|ty|cheers|much\s+appreciated)(\s+(so|very)\s+much)?(\s+(a\s+lot|again))?[\s!.,]*$",
    r"^(great|awesome|perfect|cool|nice)[\s,]*(thanks|thank\s+you)[\s!.,]*$",
];

pub const FAREWELL: &[&str] = &[
    r"^(bye|goodbye|good\s+bye|bye\s+bye|see\s+(you|ya)(\s+later)?|farewell|take\s+care|good\s+night|later|cya)[\s!.,]*$",
];

/// A document term combined with a request to relate it to general
/// knowledge.
pub const HYBRID: &[&str] = &[
    r"what\s+does.*\s+(in|from)\s+(my|the|this)\s+(document|file).*mean",
    r"explain.*\s+(in|from)\s+(my|the)\s+(document|file)",
    r"(compare|contrast).*\s+(with|to)\s+(general|standard|typical)",
    r"\b(term|phrase|word)\s+(in|from)\s+(my|the)\s+(document|file)\b",
    r"what\s+does\s+this\s+(term|phrase|word)\s+mean",
];

pub const DOCUMENT: &[&str] = &[
    r"\b(my|this|the|uploaded)\s+(document|documents|doc|docs|file|files|pdf|report|invoice|receipt|contract)\b",
    r"\b(in|from)\s+(the|this|my)\s+(document|file|pdf|report)\b",
    r"\b(summarize|summarise|summary)\s+(of\s+)?(this|the|my)\b",
    r"\bthe\s+(total|amount|number|date|name|value|invoice|order|item)\b",
    r"\b(invoice|receipt|contract|order)\s*(number|#|date|amount|total)\b",
    r"\bshow\s+me.*\b(from|in)\s+(my|the)\b",
    r"\bwhat\s+(is|are)\s+the\s+\w+\s+(in|from|on)\b",
    r"\b(extract|find|get|show)\s+(the|all|my)\b",
    r"\baccording\s+to\s+(the|my|this)\s+(document|file)\b",
    r"\b(my|the)\s+(uploaded|attached)\b",
];

pub const AMBIGUOUS: &[&str] = &[
    r"^(tell\s+me\s+(more\s+)?about|explain|describe|summari[sz]e|what\s+about)\s+(this|it|that)[\s!.?]*$",
    r"^what('?s|\s+is)\s+(this|it|that)(\s+about)?[\s!.?]*$",
    r"^(summari[sz]e|explain|describe|tell\s+me\s+more)[\s!.?]*$",
];

pub const GENERAL_KNOWLEDGE: &[&str] = &[
    r"^what\s+is\s+(a|an)\s+\w+\??$",
    r"^what\s+does\s+\w+\s+mean",
    r"^define\s+",
    r"^how\s+do\s+(i|you|we)\s+",
    r"^how\s+to\s+",
    r"\b(latest|current|recent|news|today|this\s+year|20\d\d)\b",
    r"^who\s+(is|was|are)\s+",
    r"^when\s+(did|was|is|will)\s+",
    r"^where\s+(is|are|can)\s+",
    r"^why\s+(do|does|is|are)\s+",
    r"\b(explain|definition|meaning)\s+of\b",
    r"\b(generally|typically|usually|normally)\b",
    r"^tell\s+me\s+about\s+",
];
