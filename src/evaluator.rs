// Tree-walking evaluator: runs a parsed Program against one message's headers.
//
// A single Decision is threaded through the whole walk by `&mut`, so
// `keep` and `fileinto` are last-write-wins across nested blocks and flags
// only accumulate.

use crate::ast::{AddressTest, Command, ElseBranch, HeaderTest, If, MatchType, Program, Test};
use crate::error::UnsupportedFeature;
use crate::headers::HeaderLookup;
use std::collections::BTreeSet;

/// Outcome of evaluating a script against one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decision {
    /// `None` if neither `keep` nor `discard` ran; means keep.
    pub keep: Option<bool>,
    pub fileinto: Option<String>,
    pub flags: BTreeSet<String>,
}

impl Decision {
    pub const DEFAULT_MAILBOX: &'static str = "INBOX";

    pub fn should_keep(&self) -> bool {
        self.keep.unwrap_or(true)
    }

    /// Destination mailbox, `INBOX` unless a `fileinto` ran.
    pub fn mailbox(&self) -> &str {
        self.fileinto.as_deref().unwrap_or(Self::DEFAULT_MAILBOX)
    }
}

fn log_trace(line: &str) {
    log::debug!("{line}");
}

static LOG_TRACE: fn(&str) = log_trace;

/// Evaluates programs, reporting each comparison and action to a trace sink.
///
/// The evaluator holds no per-message state; one instance may be shared by
/// any number of evaluations.
#[derive(Clone, Copy)]
pub struct Evaluator<'t> {
    trace: &'t dyn Fn(&str),
}

impl Default for Evaluator<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator<'static> {
    /// Traces to the `log` facade at debug level.
    pub fn new() -> Self {
        Evaluator { trace: &LOG_TRACE }
    }
}

impl<'t> Evaluator<'t> {
    pub fn with_trace(trace: &'t dyn Fn(&str)) -> Self {
        Evaluator { trace }
    }

    pub fn evaluate<M: HeaderLookup + ?Sized>(
        &self,
        program: &Program,
        message: &M,
    ) -> Result<Decision, UnsupportedFeature> {
        let mut decision = Decision::default();
        self.run(&program.commands, message, &mut decision)?;
        Ok(decision)
    }

    fn run<M: HeaderLookup + ?Sized>(
        &self,
        commands: &[Command],
        message: &M,
        decision: &mut Decision,
    ) -> Result<(), UnsupportedFeature> {
        for command in commands {
            match command {
                Command::Require { .. } => {}
                Command::If(node) => self.run_if(node, message, decision)?,
                Command::Keep => {
                    (self.trace)("Marking to keep");
                    decision.keep = Some(true);
                }
                Command::Discard => {
                    (self.trace)("Marking to discard");
                    decision.keep = Some(false);
                }
                Command::FileInto { mailbox } => {
                    (self.trace)(&format!("Setting destination mailbox to '{mailbox}'"));
                    decision.fileinto = Some(mailbox.clone());
                }
                Command::AddFlag { flags, .. } => {
                    for flag in flags {
                        (self.trace)(&format!("Adding flag '{flag}'"));
                        decision.flags.insert(flag.clone());
                    }
                }
            }
        }
        Ok(())
    }

    fn run_if<M: HeaderLookup + ?Sized>(
        &self,
        node: &If,
        message: &M,
        decision: &mut Decision,
    ) -> Result<(), UnsupportedFeature> {
        if self.test(&node.test, message)? {
            return self.run(&node.block.commands, message, decision);
        }
        match &node.else_branch {
            Some(ElseBranch::ElsIf(next)) => self.run_if(next, message, decision),
            Some(ElseBranch::Else(block)) => self.run(&block.commands, message, decision),
            None => Ok(()),
        }
    }

    /// `allof`/`anyof` stop at the first deciding test, so later tests can
    /// neither match nor fail.
    pub fn test<M: HeaderLookup + ?Sized>(
        &self,
        test: &Test,
        message: &M,
    ) -> Result<bool, UnsupportedFeature> {
        match test {
            Test::AllOf(tests) => {
                for t in tests {
                    if !self.test(t, message)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Test::AnyOf(tests) => {
                for t in tests {
                    if self.test(t, message)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Test::Header(header) => self.header_test(header, message),
            Test::Address(address) => self.address_test(address, message),
        }
    }

    fn header_test<M: HeaderLookup + ?Sized>(
        &self,
        test: &HeaderTest,
        message: &M,
    ) -> Result<bool, UnsupportedFeature> {
        if test.comparator.is_some() {
            return Err(UnsupportedFeature::new("header", "comparator"));
        }
        let match_type = test.match_type.unwrap_or(MatchType::Is);
        if match_type != MatchType::Contains {
            return Err(UnsupportedFeature::new("header", match_type.as_str()));
        }

        for name in &test.header_names {
            let values = message.lookup_header(&name.to_lowercase());
            for key in &test.keys {
                let needle = key.to_lowercase();
                for value in &values {
                    let text = value.text();
                    let res = text.to_lowercase().contains(&needle);
                    (self.trace)(&format!(
                        "Checking header '{name}': '{text}' contains '{key}' = {res}"
                    ));
                    if res {
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }

    fn address_test<M: HeaderLookup + ?Sized>(
        &self,
        test: &AddressTest,
        message: &M,
    ) -> Result<bool, UnsupportedFeature> {
        if test.comparator.is_some() {
            return Err(UnsupportedFeature::new("address", "comparator"));
        }
        if let Some(part) = test.address_part {
            return Err(UnsupportedFeature::new("address", part.as_str()));
        }
        let match_type = test.match_type.unwrap_or(MatchType::Is);
        if match_type != MatchType::Is {
            return Err(UnsupportedFeature::new("address", match_type.as_str()));
        }

        for name in &test.headers {
            let values = message.lookup_header(&name.to_lowercase());
            for key in &test.keys {
                let key_lower = key.to_lowercase();
                for address in values.iter().flat_map(|v| v.addresses()) {
                    let res = address.address.to_lowercase() == key_lower;
                    (self.trace)(&format!(
                        "Checking address '{name}': '{}' is '{key}' = {res}",
                        address.address
                    ));
                    if res {
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }
}

/// Evaluates `program` against `message`, tracing to the `log` facade.
pub fn evaluate<M: HeaderLookup + ?Sized>(
    program: &Program,
    message: &M,
) -> Result<Decision, UnsupportedFeature> {
    Evaluator::new().evaluate(program, message)
}

#[cfg(test)]
struct TestHeaders(Vec<(&'static str, crate::headers::HeaderValue<'static>)>);

#[cfg(test)]
impl HeaderLookup for TestHeaders {
    fn lookup_header(&self, name: &str) -> Vec<crate::headers::HeaderValue<'_>> {
        self.0
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
            .collect()
    }
}

#[cfg(test)]
fn test_headers() -> TestHeaders {
    use crate::headers::{Address, HeaderValue};
    use std::borrow::Cow::Borrowed;
    TestHeaders(vec![
        ("Subject", HeaderValue::Text(Borrowed("Hello World"))),
        (
            "From",
            HeaderValue::Addresses(vec![Address {
                name: Some(Borrowed("Bob")),
                address: Borrowed("bob@example.com"),
            }]),
        ),
    ])
}

#[cfg(test)]
fn run_script(source: &str) -> Result<Decision, UnsupportedFeature> {
    let program = crate::parser::parse_script(source).unwrap();
    evaluate(&program, &test_headers())
}

#[test]
fn test_header_contains() {
    let d = run_script(r#"if header :contains "subject" "hello" { keep; }"#).unwrap();
    assert_eq!(d.keep, Some(true));
    let d = run_script(r#"if header :contains "SUBJECT" "bye" { keep; }"#).unwrap();
    assert_eq!(d, Decision::default());
    let d = run_script(r#"if header :contains "from" "bob <bob@" { discard; }"#).unwrap();
    assert_eq!(d.keep, Some(false));
}

#[test]
fn test_address_is() {
    for (key, expected) in [
        ("bob@example.com", true),
        ("BOB@EXAMPLE.COM", true),
        ("eve@example.com", false),
    ] {
        let script = format!(r#"if address :is "from" "{key}" {{ fileinto "Bob"; }}"#);
        let d = run_script(&script).unwrap();
        assert_eq!(d.fileinto.is_some(), expected, "{key}");
    }
    // no address list on a text header, and absent headers never match
    let d = run_script(r#"if address "subject" "Hello World" { keep; }"#).unwrap();
    assert_eq!(d.keep, None);
    let d = run_script(r#"if address "sender" "bob@example.com" { keep; }"#).unwrap();
    assert_eq!(d.keep, None);
}

#[test]
fn test_unsupported_features() {
    let err = run_script(r#"if header :matches "subject" "*" { keep; }"#).unwrap_err();
    assert_eq!(err, UnsupportedFeature::new("header", "matches"));
    assert!(err.to_string().contains("matches"));

    let err = run_script(r#"if header "subject" "x" { keep; }"#).unwrap_err();
    assert_eq!(err.tag, "is");

    let err = run_script(r#"if address :domain "from" "example.com" { keep; }"#).unwrap_err();
    assert_eq!(err, UnsupportedFeature::new("address", "domain"));

    let err = run_script(r#"if address :contains "from" "bob" { keep; }"#).unwrap_err();
    assert_eq!(err.tag, "contains");

    let err =
        run_script(r#"if header :comparator "i;octet" :contains "subject" "x" { keep; }"#)
            .unwrap_err();
    assert_eq!(err.tag, "comparator");
}

#[test]
fn test_short_circuit() {
    let d = run_script(
        r#"if anyof (header :contains "subject" "hello", header :matches "subject" "*") { keep; }"#,
    )
    .unwrap();
    assert_eq!(d.keep, Some(true));

    let d = run_script(
        r#"if allof (header :contains "subject" "bye", header :matches "subject" "*") { keep; }"#,
    )
    .unwrap();
    assert_eq!(d.keep, None);

    run_script(r#"if allof (header :contains "subject" "hello", header :matches "subject" "*") { keep; }"#)
        .unwrap_err();
}

#[test]
fn test_elsif_selects_one_branch() {
    let d = run_script(
        r#"if header :contains "subject" "nope" { addflag "x"; }
           elsif address :is "from" "bob@example.com" { addflag "y"; }
           else { addflag "z"; }"#,
    )
    .unwrap();
    assert_eq!(d.flags, BTreeSet::from(["y".to_string()]));
    assert_eq!(d.keep, None);
}

#[test]
fn test_last_write_wins() {
    let d = run_script(r#"fileinto "Archive"; keep;"#).unwrap();
    assert_eq!(
        d,
        Decision {
            keep: Some(true),
            fileinto: Some("Archive".into()),
            flags: BTreeSet::new(),
        }
    );
    assert!(d.should_keep());
    assert_eq!(d.mailbox(), "Archive");

    let d = run_script(
        r#"keep; addflag "a";
           if header :contains "subject" "world" {
               discard; fileinto "Trash"; addflag ["b", "a"];
               if address :is "from" "bob@example.com" { fileinto "Bob"; }
           }"#,
    )
    .unwrap();
    assert_eq!(d.keep, Some(false));
    assert_eq!(d.fileinto.as_deref(), Some("Bob"));
    assert_eq!(d.flags.len(), 2);
    assert!(!d.should_keep());
}

#[test]
fn test_bare_if_is_noop() {
    let d = run_script(r#"require "fileinto"; if header :contains "subject" "nope" { discard; } addflag "seen";"#)
        .unwrap();
    assert_eq!(d.keep, None);
    assert_eq!(d.fileinto, None);
    assert!(d.flags.contains("seen"));
    assert!(d.should_keep());
    assert_eq!(d.mailbox(), "INBOX");
}

#[test]
fn test_injected_trace() {
    let lines = std::cell::RefCell::new(Vec::new());
    let sink = |line: &str| lines.borrow_mut().push(line.to_string());
    let program =
        crate::parser::parse_script(r#"if header :contains "subject" "world" { keep; }"#).unwrap();
    Evaluator::with_trace(&sink)
        .evaluate(&program, &test_headers())
        .unwrap();
    assert_eq!(
        lines.into_inner(),
        [
            "Checking header 'subject': 'Hello World' contains 'world' = true",
            "Marking to keep",
        ]
    );
}
