use mail_parser::{
    Addr, Address as MailAddress, Header, HeaderValue as MailHeaderValue, Message,
};
use std::borrow::Cow;
use std::fmt;

/// One decoded mailbox of an address header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address<'a> {
    pub name: Option<Cow<'a, str>>,
    pub address: Cow<'a, str>,
}

impl fmt::Display for Address<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} <{}>", name, self.address),
            None => f.write_str(&self.address),
        }
    }
}

/// A single header occurrence as seen by the evaluator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue<'a> {
    Text(Cow<'a, str>),
    Addresses(Vec<Address<'a>>),
}

impl HeaderValue<'_> {
    /// Comparable text; address lists render as `Name <addr>, ...`.
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            HeaderValue::Text(text) => Cow::Borrowed(text),
            HeaderValue::Addresses(list) => Cow::Owned(
                list.iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
        }
    }

    /// Decoded addresses; empty for non-address headers.
    pub fn addresses(&self) -> &[Address<'_>] {
        match self {
            HeaderValue::Text(_) => &[],
            HeaderValue::Addresses(list) => list,
        }
    }
}

/// Header access the evaluator needs from a parsed message.
pub trait HeaderLookup {
    /// Every occurrence of header `name` (given lowercase, matched
    /// case-insensitively) in message order. Absent headers yield nothing.
    fn lookup_header(&self, name: &str) -> Vec<HeaderValue<'_>>;
}

fn convert_addr<'a>(addr: &'a Addr<'_>) -> Option<Address<'a>> {
    Some(Address {
        name: addr.name().map(Cow::Borrowed),
        address: Cow::Borrowed(addr.address()?),
    })
}

fn convert_address<'a>(address: &'a MailAddress<'_>) -> Vec<Address<'a>> {
    match address {
        MailAddress::List(list) => list.iter().filter_map(convert_addr).collect(),
        MailAddress::Group(groups) => groups
            .iter()
            .flat_map(|g| g.addresses.iter())
            .filter_map(convert_addr)
            .collect(),
    }
}

fn raw_value(msg: &Message<'_>, header: &Header<'_>) -> String {
    let raw = msg
        .raw_message()
        .get(header.offset_start as usize..header.offset_end as usize)
        .unwrap_or_default();
    String::from_utf8_lossy(raw)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

impl HeaderLookup for Message<'_> {
    fn lookup_header(&self, name: &str) -> Vec<HeaderValue<'_>> {
        let Some(part) = self.parts.first() else {
            return Vec::new();
        };
        let mut values = Vec::new();
        for h in part.headers.iter() {
            if !h.name.as_str().eq_ignore_ascii_case(name) {
                continue;
            }
            match &h.value {
                MailHeaderValue::Text(text) => values.push(HeaderValue::Text(Cow::Borrowed(text))),
                MailHeaderValue::TextList(list) => values.extend(
                    list.iter()
                        .map(|text| HeaderValue::Text(Cow::Borrowed(text.as_ref()))),
                ),
                MailHeaderValue::Address(address) => {
                    values.push(HeaderValue::Addresses(convert_address(address)))
                }
                MailHeaderValue::DateTime(date) => {
                    values.push(HeaderValue::Text(Cow::Owned(date.to_rfc3339())))
                }
                // parsed forms without a text rendering fall back to the
                // unfolded raw value
                _ => values.push(HeaderValue::Text(Cow::Owned(raw_value(self, h)))),
            }
        }
        values
    }
}

#[test]
fn test_message_lookup_header() {
    let raw = b"From: Bob <bob@example.com>\r\n\
        To: undisclosed: alice@example.com, carol@example.com;\r\n\
        Subject: Hello World\r\n\
        X-Tag: one\r\n\
        x-tag: two\r\n\
        \r\n\
        body\r\n";
    let msg = mail_parser::MessageParser::default().parse(&raw[..]).unwrap();

    assert_eq!(
        msg.lookup_header("subject"),
        [HeaderValue::Text(Cow::Borrowed("Hello World"))]
    );
    assert_eq!(msg.lookup_header("x-tag").len(), 2);
    assert!(msg.lookup_header("cc").is_empty());

    let from = msg.lookup_header("from");
    assert_eq!(from.len(), 1);
    assert_eq!(from[0].addresses()[0].address, "bob@example.com");
    assert_eq!(from[0].text(), "Bob <bob@example.com>");

    let to = msg.lookup_header("to");
    let to: Vec<&str> = to[0].addresses().iter().map(|a| a.address.as_ref()).collect();
    assert_eq!(to, ["alice@example.com", "carol@example.com"]);
}

#[test]
fn test_message_lookup_raw_fallback() {
    let raw = b"Received: from a.example.net\r\n\
        \tby mx.example.org; Tue, 14 Oct 2025 09:12:44 +0200\r\n\
        Content-Type: text/plain; charset=utf-8\r\n\
        X-Empty:\r\n\
        \r\n\
        body\r\n";
    let msg = mail_parser::MessageParser::default().parse(&raw[..]).unwrap();

    assert_eq!(
        msg.lookup_header("received")[0].text(),
        "from a.example.net by mx.example.org; Tue, 14 Oct 2025 09:12:44 +0200"
    );
    assert_eq!(
        msg.lookup_header("content-type")[0].text(),
        "text/plain; charset=utf-8"
    );
    assert_eq!(msg.lookup_header("x-empty").len(), 1);
}
