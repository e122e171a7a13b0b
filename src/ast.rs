// Syntax tree of a parsed filter script. Built once per load, never mutated.

/// A parsed script: its top-level commands in source order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Program {
    pub commands: Vec<Command>,
}

/// `{ command* }`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Block {
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Require {
        capabilities: StringList,
    },
    If(If),
    Keep,
    Discard,
    FileInto {
        mailbox: String,
    },
    AddFlag {
        /// Set when two strings precede the flag list; see `Parser::parse_addflag`.
        variable_name: Option<String>,
        flags: StringList,
    },
}

/// `if`/`elsif` node. An `elsif` chain is a nested `If` in `else_branch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct If {
    pub test: Test,
    pub block: Block,
    pub else_branch: Option<ElseBranch>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElseBranch {
    ElsIf(Box<If>),
    Else(Block),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Test {
    AllOf(Vec<Test>),
    AnyOf(Vec<Test>),
    Header(HeaderTest),
    Address(AddressTest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderTest {
    pub comparator: Option<String>,
    pub match_type: Option<MatchType>,
    pub header_names: StringList,
    pub keys: StringList,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressTest {
    pub comparator: Option<String>,
    pub address_part: Option<AddressPart>,
    pub match_type: Option<MatchType>,
    pub headers: StringList,
    pub keys: StringList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Is,
    Contains,
    Matches,
}

impl MatchType {
    pub const TAGS: [&'static str; 3] = ["is", "contains", "matches"];

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "is" => Some(MatchType::Is),
            "contains" => Some(MatchType::Contains),
            "matches" => Some(MatchType::Matches),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Is => "is",
            MatchType::Contains => "contains",
            MatchType::Matches => "matches",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressPart {
    LocalPart,
    Domain,
    All,
}

impl AddressPart {
    pub const TAGS: [&'static str; 3] = ["localpart", "domain", "all"];

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "localpart" => Some(AddressPart::LocalPart),
            "domain" => Some(AddressPart::Domain),
            "all" => Some(AddressPart::All),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AddressPart::LocalPart => "localpart",
            AddressPart::Domain => "domain",
            AddressPart::All => "all",
        }
    }
}

/// A single string or a bracketed list; never empty after a successful parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringList {
    pub values: Vec<String>,
}

impl StringList {
    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.values.iter()
    }
}

impl<'a> IntoIterator for &'a StringList {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}
