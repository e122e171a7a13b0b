pub mod ast;
pub mod cli;
pub mod daemon;
pub mod error;
pub mod evaluator;
pub mod forward;
pub mod headers;
pub mod lexer;
pub mod maildir;
pub mod parser;
pub mod store;

pub use error::{SyntaxError, UnsupportedFeature};
pub use evaluator::{Decision, Evaluator, evaluate};
pub use headers::{HeaderLookup, HeaderValue};
pub use parser::{parse, parse_script};

use anyhow::Context as _;
use ast::Program;
use mail_parser::{HeaderName, MessageParser};
use std::path::Path;
use std::str::FromStr;

/// Raw message plus the id it is known by in its source mailbox.
#[derive(Default)]
pub struct MailInfoStorage {
    pub id: String,
    pub mail_buffer: Vec<u8>,
}

pub struct MailInfo<'a> {
    pub storage: &'a MailInfoStorage,
    pub msg: mail_parser::Message<'a>,
}

impl<'a> MailInfo<'a> {
    /// `None` if the buffer is not a parsable message.
    pub fn parse(storage: &'a MailInfoStorage) -> Option<Self> {
        let msg = MessageParser::default().parse(&storage.mail_buffer)?;
        Some(MailInfo { storage, msg })
    }
}

impl MailInfo<'_> {
    pub fn get_id(&self) -> &str {
        &self.storage.id
    }
    pub fn get_subject(&self) -> &str {
        self.msg
            .header(HeaderName::Subject)
            .and_then(|v| v.as_text())
            .unwrap_or("")
    }
    pub fn get_from_address(&self) -> &str {
        self.msg
            .header(HeaderName::From)
            .and_then(|v| v.as_address())
            .and_then(|v| v.as_list())
            .and_then(|v| v.first())
            .and_then(|v| v.address())
            .unwrap_or("")
    }
    /// Distinct header names, lowercased, in order of first occurrence.
    pub fn header_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for header in self.msg.headers() {
            let name = header.name.as_str().to_ascii_lowercase();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
    /// Logs `msg` at info level, prefixed with the message id.
    pub fn log(&self, msg: &str) {
        log::info!("{}: {}", self.get_id(), msg);
    }
    /// Evaluation trace line, debug level, prefixed with the message id.
    pub fn trace(&self, msg: &str) {
        log::debug!("{}: {}", self.get_id(), msg);
    }
}

impl HeaderLookup for MailInfo<'_> {
    fn lookup_header(&self, name: &str) -> Vec<HeaderValue<'_>> {
        self.msg.lookup_header(name)
    }
}

/// A loaded filter script. Parsed once, evaluated per message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    program: Program,
}

impl Filter {
    pub fn parse(source: &str) -> Result<Self, SyntaxError> {
        Ok(Filter {
            program: parse_script(source)?,
        })
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("reading filter script {}", path.display()))?;
        Self::parse(&source).with_context(|| format!("parsing filter script {}", path.display()))
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn evaluate<M: HeaderLookup + ?Sized>(
        &self,
        message: &M,
    ) -> Result<Decision, UnsupportedFeature> {
        evaluate(&self.program, message)
    }

    /// Evaluates with the message id on every trace line. An unsupported
    /// feature drops the partial result and yields the default decision.
    pub fn decide(&self, mail_info: &MailInfo) -> Decision {
        let trace = |line: &str| mail_info.trace(line);
        match Evaluator::with_trace(&trace).evaluate(&self.program, mail_info) {
            Ok(decision) => decision,
            Err(e) => {
                log::warn!("{}: filter failed, using default: {e}", mail_info.get_id());
                Decision::default()
            }
        }
    }
}

impl FromStr for Filter {
    type Err = SyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Decision for a raw message; the default decision if there is no filter
/// or the message cannot be parsed.
pub fn filter_mail(filter: Option<&Filter>, storage: &MailInfoStorage) -> Decision {
    let Some(filter) = filter else {
        return Decision::default();
    };
    let Some(mail_info) = MailInfo::parse(storage) else {
        log::warn!("{}: unparsable message, using default", storage.id);
        return Decision::default();
    };
    let decision = filter.decide(&mail_info);
    mail_info.log(&format!(
        "keep={} mailbox={} flags={:?}",
        decision.should_keep(),
        decision.mailbox(),
        decision.flags
    ));
    decision
}
